//! Directory transport interface
//!
//! A [`DirectoryConnector`] opens raw connections; a [`DirectoryConnection`]
//! carries the three protocol primitives the verifier needs. Identity
//! tracking lives one level up, in [`Session`](super::Session).

use async_trait::async_trait;
use ldapgate_core::{DirectoryConfig, Result};

use crate::ldap::types::DirectoryEntry;

/// LDAP result code for a successful operation
pub const RC_SUCCESS: u32 = 0;

/// LDAP result code for rejected credentials
pub const RC_INVALID_CREDENTIALS: u32 = 49;

/// One open connection to the directory
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind, returning the LDAP result code.
    ///
    /// A rejected credential is a non-zero code, not an error. Errors mean the
    /// transport itself failed.
    async fn simple_bind(&mut self, dn: &str, secret: &str) -> Result<u32>;

    /// Subtree search with alias dereferencing disabled, no size limit, and
    /// referrals left unfollowed.
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>>;

    /// Unbind and release the connection
    async fn unbind(&mut self) -> Result<()>;
}

/// Factory for directory connections
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectoryConnection>>;
}
