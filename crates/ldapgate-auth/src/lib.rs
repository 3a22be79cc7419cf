//! Directory-backed credential verification for ldapgate

pub mod authenticator;
pub mod ldap;

pub use authenticator::Authenticator;
pub use ldap::{
    AuthDecision, BoundIdentity, DirectoryConnection, DirectoryConnector, DirectoryEntry,
    LdapConnector, Session, Subject,
};
