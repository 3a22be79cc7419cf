//! Password verification by rebind

use ldapgate_core::Result;
use tracing::debug;

use crate::ldap::session::Session;
use crate::ldap::types::Subject;

/// Check `password` by binding as the subject on the service session.
///
/// The session is rebound as the service identity before returning, whether
/// the subject bind succeeded or not. A failed restore is an error distinct
/// from a wrong password.
pub async fn verify(session: &mut Session, subject: &Subject, password: &str) -> Result<bool> {
    // Directories treat an empty credential as an unauthenticated bind that succeeds.
    if password.is_empty() {
        debug!("Rejecting empty password for {}", subject.dn);
        return Ok(false);
    }

    let attempt = session.rebind_as(&subject.dn, password).await;
    let restored = session.restore_service_identity().await;

    let matched = attempt?;
    restored?;

    if !matched {
        debug!("Password rejected for {}", subject.dn);
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::memory::{MemoryDirectory, MemoryEntry};
    use crate::ldap::resolver::resolve;
    use crate::ldap::types::BoundIdentity;
    use ldapgate_core::{DirectoryConfig, Error};
    use std::sync::Arc;

    const SERVICE_DN: &str = "cn=admin,dc=example,dc=com";

    fn config() -> Arc<DirectoryConfig> {
        Arc::new(DirectoryConfig {
            host: "memory".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: SERVICE_DN.to_string(),
            bind_password: "admin".to_string(),
            ..Default::default()
        })
    }

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new(SERVICE_DN, "admin").with_entry(
            MemoryEntry::new("uid=alice,dc=example,dc=com")
                .password("hunter2")
                .attr("uid", "alice"),
        )
    }

    async fn alice(session: &mut Session) -> Subject {
        resolve(session, "alice").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_correct_password() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        let subject = alice(&mut session).await;

        assert!(verify(&mut session, &subject, "hunter2").await.unwrap());
        assert_eq!(session.current_identity(), &BoundIdentity::Service);
    }

    #[tokio::test]
    async fn test_wrong_password_restores_service_identity() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        let subject = alice(&mut session).await;

        assert!(!verify(&mut session, &subject, "wrong").await.unwrap());
        assert_eq!(session.current_identity(), &BoundIdentity::Service);
        assert_eq!(
            dir.bind_attempts(),
            vec![
                SERVICE_DN.to_string(),
                subject.dn.clone(),
                SERVICE_DN.to_string(),
            ]
        );

        // A follow-up privileged search still works on the same session.
        assert!(resolve(&mut session, "alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_password_never_binds() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        let subject = alice(&mut session).await;

        assert!(!verify(&mut session, &subject, "").await.unwrap());
        assert_eq!(dir.bind_attempts(), vec![SERVICE_DN.to_string()]);
    }

    #[tokio::test]
    async fn test_restore_failure_is_fatal() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        let subject = alice(&mut session).await;
        dir.reject_service_rebind(true);

        let err = verify(&mut session, &subject, "hunter2").await.unwrap_err();
        assert!(matches!(err, Error::RestoreFailed(_)));
        assert_ne!(session.current_identity(), &BoundIdentity::Service);
    }

    #[tokio::test]
    async fn test_restore_failure_after_wrong_password() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        let subject = alice(&mut session).await;
        dir.reject_service_rebind(true);

        let err = verify(&mut session, &subject, "wrong").await.unwrap_err();
        assert!(matches!(err, Error::RestoreFailed(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_during_rebind() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        let subject = alice(&mut session).await;
        dir.set_reachable(false);

        let err = verify(&mut session, &subject, "hunter2").await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
