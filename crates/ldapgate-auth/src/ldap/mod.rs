//! LDAP directory verification
//!
//! Provides:
//! - Directory sessions with explicit bound-identity tracking
//! - Subject lookup by uid with filter escaping
//! - Password verification by rebind and restore
//! - Group membership checks

mod authorize;
mod client;
mod connection;
mod filter;
mod resolver;
mod session;
mod types;
mod verifier;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use authorize::{authorize, is_member, membership_matches};
pub use client::{LdapConnection, LdapConnector};
pub use connection::{DirectoryConnection, DirectoryConnector, RC_INVALID_CREDENTIALS, RC_SUCCESS};
pub use filter::{escape, group_filter, user_filter};
pub use resolver::resolve;
pub use session::Session;
pub use types::*;
pub use verifier::verify;
