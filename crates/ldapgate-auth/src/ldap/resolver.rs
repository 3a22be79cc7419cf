//! Subject lookup

use ldapgate_core::{Error, Result};
use tracing::debug;

use crate::ldap::filter;
use crate::ldap::session::Session;
use crate::ldap::types::Subject;

/// Look up the single subject whose uid is exactly `username`.
///
/// More than one match is a directory data fault, not a negative answer.
pub async fn resolve(session: &mut Session, username: &str) -> Result<Option<Subject>> {
    let config = session.config().clone();
    let filter = filter::user_filter(&config.user_filter, username);

    let mut entries = session
        .search(&config.base_dn, &filter, &config.attributes)
        .await?;

    match entries.len() {
        0 => {
            debug!("No subject found for {}", username);
            Ok(None)
        }
        1 => {
            let entry = entries.remove(0);
            debug!("Found subject DN: {}", entry.dn);
            Ok(Some(Subject::from_entry(
                &entry,
                username,
                &config.group_attribute,
            )))
        }
        count => Err(Error::AmbiguousSubject {
            username: username.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::memory::{MemoryDirectory, MemoryEntry};
    use ldapgate_core::DirectoryConfig;
    use std::sync::Arc;

    fn config() -> Arc<DirectoryConfig> {
        Arc::new(DirectoryConfig {
            host: "memory".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=admin,dc=example,dc=com".to_string(),
            bind_password: "admin".to_string(),
            ..Default::default()
        })
    }

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new("cn=admin,dc=example,dc=com", "admin")
            .with_entry(
                MemoryEntry::new("uid=alice,ou=people,dc=example,dc=com")
                    .password("hunter2")
                    .attr("uid", "alice")
                    .attr("cn", "Alice")
                    .attr("memberOf", "staff"),
            )
            .with_entry(
                MemoryEntry::new("uid=bob,ou=people,dc=example,dc=com")
                    .password("builder")
                    .attr("uid", "bob"),
            )
            .with_entry(
                MemoryEntry::new("uid=carol,ou=people,dc=other,dc=org")
                    .password("carol")
                    .attr("uid", "carol"),
            )
    }

    #[tokio::test]
    async fn test_resolve_single_subject() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();

        let subject = resolve(&mut session, "alice").await.unwrap().unwrap();
        assert_eq!(subject.dn, "uid=alice,ou=people,dc=example,dc=com");
        assert_eq!(subject.uid, "alice");
        assert_eq!(subject.common_name.as_deref(), Some("Alice"));
        assert_eq!(subject.groups, vec!["staff".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();

        assert!(resolve(&mut session, "mallory").await.unwrap().is_none());
        // Outside the base DN
        assert!(resolve(&mut session, "carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_ambiguous() {
        let dir = directory().with_entry(
            MemoryEntry::new("uid=alice,ou=contractors,dc=example,dc=com").attr("uid", "alice"),
        );
        let mut session = Session::open(&dir, config()).await.unwrap();

        let err = resolve(&mut session, "alice").await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousSubject { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_wildcard_username_matches_nothing() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();

        for username in ["*", "a*", "*)(uid=*", r"\2a", "alice)(|(uid=*"] {
            assert!(
                resolve(&mut session, username).await.unwrap().is_none(),
                "{} should not match",
                username
            );
        }
        assert_eq!(dir.searches()[0], r"(uid=\2a)");
    }

    #[tokio::test]
    async fn test_literal_metacharacter_username() {
        let dir = directory().with_entry(
            MemoryEntry::new(r"uid=we\2ard,dc=example,dc=com").attr("uid", "we*rd"),
        );
        let mut session = Session::open(&dir, config()).await.unwrap();

        let subject = resolve(&mut session, "we*rd").await.unwrap().unwrap();
        assert_eq!(subject.uid, "we*rd");
    }
}
