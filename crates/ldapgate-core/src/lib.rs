//! ldapgate Core Library
//!
//! Configuration and error types shared by the ldapgate directory verifier.

pub mod config;
pub mod error;

pub use config::{DirectoryConfig, GateConfig, HttpConfig, LoggingConfig, ServerConfig};
pub use error::{Error, Fault, Result};

/// ldapgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default LDAP port
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// Default HTTP listener port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default realm announced in `WWW-Authenticate` challenges
pub const DEFAULT_REALM: &str = "LDAP";
