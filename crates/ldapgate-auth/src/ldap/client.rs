//! LDAP Client implementation
//!
//! Backs [`DirectoryConnector`] with `ldap3`. Supports `ldap://` and, through
//! the library, `ldaps://` connections.

use async_trait::async_trait;
use ldap3::{DerefAliases, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use ldapgate_core::{DirectoryConfig, Error, Result};
use std::time::Duration;
use tracing::debug;

use crate::ldap::connection::{DirectoryConnection, DirectoryConnector};
use crate::ldap::types::DirectoryEntry;

/// Opens `ldap3` connections to the configured directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectoryConnection>> {
        let url = config.url();
        let settings = LdapConnSettings::new().set_conn_timeout(config.timeout());

        debug!("Connecting to LDAP server: {}", url);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        ldap3::drive!(conn);

        Ok(Box::new(LdapConnection {
            ldap,
            timeout: config.timeout(),
        }))
    }
}

/// Handle to one driven `ldap3` connection.
///
/// Dropping the handle ends the driver task.
pub struct LdapConnection {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn simple_bind(&mut self, dn: &str, secret: &str) -> Result<u32> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, secret)
            .await
            .map_err(|e| Error::Connection(format!("Bind as {} failed: {}", dn, e)))?;

        Ok(result.rc)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        let attrs: Vec<&str> = attributes.iter().map(String::as_str).collect();
        let options = SearchOptions::new()
            .deref(DerefAliases::Never)
            .sizelimit(0)
            .typesonly(false);

        let (rs, _res) = self
            .ldap
            .with_search_options(options)
            .with_timeout(self.timeout)
            .search(base_dn, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| Error::Query(format!("Search failed: {}", e)))?
            .success()
            .map_err(|e| Error::Query(format!("Search error: {}", e)))?;

        Ok(rs
            .into_iter()
            .filter(|entry| !entry.is_ref())
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| Error::Connection(format!("Unbind failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_unreachable_is_connection_error() {
        let config = DirectoryConfig {
            host: "127.0.0.1".to_string(),
            // Reserved port, nothing listens here
            port: 1,
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=admin,dc=example,dc=com".to_string(),
            bind_password: "admin".to_string(),
            timeout_seconds: 2,
            ..Default::default()
        };

        let result = LdapConnector.connect(&config).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
