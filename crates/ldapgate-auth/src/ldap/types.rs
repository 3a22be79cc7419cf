//! Directory entries, subjects and verification outcomes

use ldapgate_core::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Directory Entry
// ============================================================================

/// One entry returned by a directory search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry DN (Distinguished Name)
    pub dn: String,

    /// Attribute values keyed by the name the directory returned
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    /// All values of an attribute; attribute names compare case-insensitively.
    pub fn values(&self, name: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(|s| s.as_str())
    }
}

// ============================================================================
// Subject
// ============================================================================

/// Snapshot of the end-user identity taken from a single search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject DN
    pub dn: String,

    /// Login name
    pub uid: String,

    /// Common name
    pub common_name: Option<String>,

    /// Values of the group membership attribute
    pub groups: Vec<String>,
}

impl Subject {
    /// Build a subject from a search entry.
    ///
    /// `uid` falls back to the name that was looked up when the directory did
    /// not return the attribute.
    pub fn from_entry(entry: &DirectoryEntry, username: &str, group_attribute: &str) -> Self {
        Self {
            dn: entry.dn.clone(),
            uid: entry
                .first("uid")
                .map(str::to_string)
                .unwrap_or_else(|| username.to_string()),
            common_name: entry.first("cn").map(str::to_string),
            groups: entry.values(group_attribute).to_vec(),
        }
    }
}

// ============================================================================
// Bound Identity
// ============================================================================

/// Identity a session's connection is currently authenticated as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundIdentity {
    /// The configured service account
    Service,
    /// A subject, transiently, during password verification
    Subject(String),
    /// No successful bind, or the last bind was rejected
    Anonymous,
    /// Connection released
    Closed,
}

// ============================================================================
// Authentication Decision
// ============================================================================

/// Outcome of verifying one request
#[derive(Debug)]
pub enum AuthDecision {
    /// Password verified and group requirement satisfied
    Allowed(Subject),
    /// No such subject, wrong password, or no credentials
    DeniedUnauthenticated,
    /// Authenticated, but not a member of the required group
    DeniedUnauthorized,
    /// Infrastructure or directory data fault
    Failed(Error),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allowed(_))
    }

    pub fn subject(&self) -> Option<&Subject> {
        match self {
            AuthDecision::Allowed(subject) => Some(subject),
            _ => None,
        }
    }

    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            AuthDecision::Allowed(_) => "allowed",
            AuthDecision::DeniedUnauthenticated => "unauthenticated",
            AuthDecision::DeniedUnauthorized => "unauthorized",
            AuthDecision::Failed(_) => "failed",
        }
    }
}
