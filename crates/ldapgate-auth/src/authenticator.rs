//! Per-request verification flow
//!
//! Service bind, subject lookup, password check and group check, strictly in
//! that order, on one session that is closed before the decision is returned.

use ldapgate_core::{DirectoryConfig, Error, Fault, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::ldap::{
    authorize, resolve, verify, AuthDecision, DirectoryConnector, LdapConnector, Session,
};

/// Default deadline for one verification sequence
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// Verifies Basic credentials against the directory
pub struct Authenticator {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn DirectoryConnector>,
    deadline: Duration,
}

impl Authenticator {
    pub fn new(config: Arc<DirectoryConfig>, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            config,
            connector,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Authenticator backed by a real LDAP server
    pub fn ldap(config: Arc<DirectoryConfig>) -> Self {
        Self::new(config, Arc::new(LdapConnector))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Produce the decision for one set of credentials.
    ///
    /// Expected negatives come back as denials; only infrastructure and data
    /// faults become `Failed`.
    pub async fn authenticate(&self, username: &str, password: &str) -> AuthDecision {
        let started = Instant::now();

        let decision = if username.is_empty() || password.is_empty() {
            debug!("Empty username or password, skipping directory");
            AuthDecision::DeniedUnauthenticated
        } else {
            match tokio::time::timeout(self.deadline, self.run(username, password)).await {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) => AuthDecision::Failed(e),
                Err(_) => AuthDecision::Failed(Error::Timeout(self.deadline)),
            }
        };

        log_decision(username, self.config.required_group.as_deref(), &decision, started);
        decision
    }

    async fn run(&self, username: &str, password: &str) -> Result<AuthDecision> {
        let mut session = Session::open(self.connector.as_ref(), self.config.clone()).await?;
        let outcome = self.decide(&mut session, username, password).await;
        session.close().await;
        outcome
    }

    async fn decide(
        &self,
        session: &mut Session,
        username: &str,
        password: &str,
    ) -> Result<AuthDecision> {
        let subject = match resolve(session, username).await? {
            Some(subject) => subject,
            None => return Ok(AuthDecision::DeniedUnauthenticated),
        };

        if !verify(session, &subject, password).await? {
            return Ok(AuthDecision::DeniedUnauthenticated);
        }

        let required_group = self.config.required_group.as_deref();
        if !authorize(session, &subject, required_group).await? {
            return Ok(AuthDecision::DeniedUnauthorized);
        }

        Ok(AuthDecision::Allowed(subject))
    }
}

fn log_decision(username: &str, group: Option<&str>, decision: &AuthDecision, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match decision {
        AuthDecision::Allowed(subject) => {
            info!(username, dn = %subject.dn, elapsed_ms, "Subject authenticated");
        }
        AuthDecision::DeniedUnauthenticated => {
            info!(username, elapsed_ms, "Authentication denied");
        }
        AuthDecision::DeniedUnauthorized => {
            info!(username, group, elapsed_ms, "Authorization denied, not a group member");
        }
        AuthDecision::Failed(e) => match e.fault() {
            Fault::Data => error!(
                username,
                fault = e.fault().as_str(),
                code = e.code(),
                elapsed_ms,
                "Directory data fault: {}",
                e
            ),
            _ => error!(
                username,
                fault = e.fault().as_str(),
                code = e.code(),
                elapsed_ms,
                "Directory infrastructure fault: {}",
                e
            ),
        },
    }
}
