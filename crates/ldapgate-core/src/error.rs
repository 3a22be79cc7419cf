//! Error types for ldapgate

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, used to pick the log channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Directory unreachable, service credentials rejected, session untrustworthy
    Infrastructure,
    /// Directory answered, but the data or query is inconsistent
    Data,
    /// Process configuration and startup
    Bootstrap,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::Infrastructure => "infrastructure",
            Fault::Data => "data",
            Fault::Bootstrap => "bootstrap",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Infrastructure Errors
    #[error("Directory connection failed: {0}")]
    Connection(String),

    #[error("Service bind as {dn} rejected with result code {rc}")]
    Bind { dn: String, rc: u32 },

    #[error("Could not restore service identity after subject bind: {0}")]
    RestoreFailed(String),

    #[error("Directory verification timed out after {0:?}")]
    Timeout(Duration),

    // Data Errors
    #[error("Directory query failed: {0}")]
    Query(String),

    #[error("Found too many subjects for {username}: {count}")]
    AmbiguousSubject { username: String, count: usize },

    // Bootstrap Errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn fault(&self) -> Fault {
        match self {
            Error::Connection(_)
            | Error::Bind { .. }
            | Error::RestoreFailed(_)
            | Error::Timeout(_) => Fault::Infrastructure,

            Error::Query(_) | Error::AmbiguousSubject { .. } => Fault::Data,

            Error::Config(_) | Error::Io(_) | Error::Other(_) => Fault::Bootstrap,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "ConnectionError",
            Error::Bind { .. } => "BindError",
            // The session can no longer be trusted
            Error::RestoreFailed(_) => "ConnectionError",
            Error::Timeout(_) => "TimeoutError",
            Error::Query(_) => "QueryError",
            Error::AmbiguousSubject { .. } => "AmbiguousSubjectError",
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Other(_) => "InternalError",
        }
    }

    /// Every fault is opaque to the HTTP caller.
    pub fn http_status(&self) -> u16 {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classification() {
        assert_eq!(
            Error::Connection("refused".into()).fault(),
            Fault::Infrastructure
        );
        assert_eq!(
            Error::Bind { dn: "cn=svc".into(), rc: 49 }.fault(),
            Fault::Infrastructure
        );
        assert_eq!(
            Error::Timeout(Duration::from_secs(1)).fault(),
            Fault::Infrastructure
        );
        assert_eq!(Error::Query("bad filter".into()).fault(), Fault::Data);
        assert_eq!(
            Error::AmbiguousSubject { username: "alice".into(), count: 2 }.fault(),
            Fault::Data
        );
        assert_eq!(Error::Config("port".into()).fault(), Fault::Bootstrap);
    }

    #[test]
    fn test_ambiguous_message() {
        let err = Error::AmbiguousSubject { username: "alice".into(), count: 3 };
        assert_eq!(err.to_string(), "Found too many subjects for alice: 3");
        assert_eq!(err.code(), "AmbiguousSubjectError");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_restore_failure_is_connection_error() {
        let err = Error::RestoreFailed("rc 49".into());
        assert_eq!(err.fault(), Fault::Infrastructure);
        assert_eq!(err.code(), "ConnectionError");
    }
}
