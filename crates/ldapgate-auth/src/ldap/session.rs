//! Directory session
//!
//! One session per request. The session always knows which identity its
//! connection is bound as, and privileged operations only run while it is
//! bound as the service identity.

use ldapgate_core::{DirectoryConfig, Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ldap::connection::{DirectoryConnection, DirectoryConnector, RC_SUCCESS};
use crate::ldap::types::{BoundIdentity, DirectoryEntry};

/// An open directory connection and the identity it is bound as
pub struct Session {
    conn: Option<Box<dyn DirectoryConnection>>,
    config: Arc<DirectoryConfig>,
    identity: BoundIdentity,
}

impl Session {
    /// Connect and bind as the configured service identity.
    ///
    /// The connection is released again when the service bind fails.
    pub async fn open(
        connector: &dyn DirectoryConnector,
        config: Arc<DirectoryConfig>,
    ) -> Result<Self> {
        let conn = connector.connect(&config).await?;

        let mut session = Self {
            conn: Some(conn),
            config,
            identity: BoundIdentity::Anonymous,
        };

        if let Err(e) = session.bind_service().await {
            session.close().await;
            return Err(e);
        }

        debug!("Directory session bound as {}", session.config.bind_dn);
        Ok(session)
    }

    pub fn config(&self) -> &Arc<DirectoryConfig> {
        &self.config
    }

    pub fn current_identity(&self) -> &BoundIdentity {
        &self.identity
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Search as the service identity, restoring the service bind first if
    /// the connection was left bound as someone else.
    pub async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        if self.identity != BoundIdentity::Service {
            warn!(
                identity = ?self.identity,
                "Session not bound as service identity before search, restoring"
            );
            self.restore_service_identity().await?;
        }

        debug!("Searching {} with filter: {}", base_dn, filter);

        let conn = self.conn.as_mut().ok_or_else(closed)?;
        conn.search(base_dn, filter, attributes).await
    }

    /// Re-authenticate the connection as another identity.
    ///
    /// Returns `false` when the directory rejects the credential. Either way
    /// the session is no longer bound as the service identity afterwards.
    pub async fn rebind_as(&mut self, dn: &str, secret: &str) -> Result<bool> {
        let conn = self.conn.as_mut().ok_or_else(closed)?;

        // Whatever happens next, the previous bind is gone.
        self.identity = BoundIdentity::Anonymous;

        let rc = conn.simple_bind(dn, secret).await?;
        if rc == RC_SUCCESS {
            self.identity = BoundIdentity::Subject(dn.to_string());
            Ok(true)
        } else {
            debug!("Bind as {} rejected with code {}", dn, rc);
            Ok(false)
        }
    }

    /// Bind as the service identity again after a subject bind.
    pub async fn restore_service_identity(&mut self) -> Result<()> {
        self.bind_service()
            .await
            .map_err(|e| Error::RestoreFailed(e.to_string()))
    }

    /// Unbind and release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.unbind().await {
                debug!("Ignoring unbind failure on close: {}", e);
            }
        }
        self.identity = BoundIdentity::Closed;
    }

    async fn bind_service(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or_else(closed)?;
        self.identity = BoundIdentity::Anonymous;

        let rc = conn
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await?;

        if rc != RC_SUCCESS {
            return Err(Error::Bind {
                dn: self.config.bind_dn.clone(),
                rc,
            });
        }

        self.identity = BoundIdentity::Service;
        Ok(())
    }
}

fn closed() -> Error {
    Error::Connection("directory session is closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::memory::{MemoryDirectory, MemoryEntry};

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

    fn uid_attrs() -> Vec<String> {
        vec!["uid".to_string()]
    }

    #[tokio::test]
    async fn test_open_binds_as_service() {
        let dir = directory();
        let session = Session::open(&dir, config()).await.unwrap();

        assert_eq!(session.current_identity(), &BoundIdentity::Service);
        assert!(session.is_open());
        assert_eq!(dir.bind_attempts(), vec![SERVICE_DN.to_string()]);
    }

    #[tokio::test]
    async fn test_open_rejected_service_credentials() {
        let dir = directory();
        let mut cfg = (*config()).clone();
        cfg.bind_password = "wrong".to_string();

        let err = Session::open(&dir, Arc::new(cfg)).await.err().unwrap();
        assert!(matches!(err, Error::Bind { rc: 49, .. }));
        assert_eq!(dir.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_open_unreachable() {
        let dir = directory();
        dir.set_reachable(false);

        let err = Session::open(&dir, config()).await.err().unwrap();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(dir.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_failed_rebind_leaves_anonymous() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();

        let matched = session
            .rebind_as("uid=alice,dc=example,dc=com", "wrong")
            .await
            .unwrap();
        assert!(!matched);
        assert_eq!(session.current_identity(), &BoundIdentity::Anonymous);
    }

    #[tokio::test]
    async fn test_search_restores_service_identity() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();

        assert!(session
            .rebind_as("uid=alice,dc=example,dc=com", "hunter2")
            .await
            .unwrap());
        assert_eq!(
            session.current_identity(),
            &BoundIdentity::Subject("uid=alice,dc=example,dc=com".to_string())
        );

        let entries = session
            .search("dc=example,dc=com", "(uid=alice)", &uid_attrs())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(session.current_identity(), &BoundIdentity::Service);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = directory();
        let mut session = Session::open(&dir, config()).await.unwrap();
        assert_eq!(dir.open_connections(), 1);

        session.close().await;
        session.close().await;

        assert_eq!(session.current_identity(), &BoundIdentity::Closed);
        assert_eq!(dir.open_connections(), 0);
        assert!(session.search("dc=example,dc=com", "(uid=alice)", &uid_attrs()).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_connection() {
        let dir = directory();
        {
            let _session = Session::open(&dir, config()).await.unwrap();
            assert_eq!(dir.open_connections(), 1);
        }
        assert_eq!(dir.open_connections(), 0);
    }
}
