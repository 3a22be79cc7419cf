//! Configuration for ldapgate
//!
//! Loaded once at startup, from a TOML file or from the environment, and then
//! shared read-only by every request.

use http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {}", path, e)))
    }

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// The directory connection settings are mandatory; everything else keeps
    /// its default when unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let dir = &mut config.directory;
        dir.host = required(&lookup, "LDAP_URL")?;
        dir.port = parse_var(&lookup, "LDAP_PORT")?
            .ok_or_else(|| Error::Config("LDAP_PORT is not set".into()))?;
        dir.base_dn = required(&lookup, "LDAP_BASE_DN")?;
        dir.bind_dn = required(&lookup, "LDAP_BIND_USERNAME")?;
        dir.bind_password = required(&lookup, "LDAP_BIND_PASSWORD")?;

        if let Some(group) = non_empty(&lookup, "LDAP_REQUIRED_GROUP") {
            dir.required_group = Some(group);
        }
        if let Some(tls) = parse_var(&lookup, "LDAP_USE_TLS")? {
            dir.use_tls = tls;
        }
        if let Some(filter) = non_empty(&lookup, "LDAP_USER_FILTER") {
            dir.user_filter = filter;
        }
        if let Some(attr) = non_empty(&lookup, "LDAP_GROUP_ATTRIBUTE") {
            dir.group_attribute = attr;
        }
        if let Some(base) = non_empty(&lookup, "LDAP_GROUP_BASE_DN") {
            dir.group_base_dn = Some(base);
        }
        if let Some(filter) = non_empty(&lookup, "LDAP_GROUP_FILTER") {
            dir.group_filter = filter;
        }
        if let Some(secs) = parse_var(&lookup, "LDAP_TIMEOUT_SECONDS")? {
            dir.timeout_seconds = secs;
        }

        if let Some(addr) = non_empty(&lookup, "LDAPGATE_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Some(port) = parse_var(&lookup, "LDAPGATE_PORT")? {
            config.server.port = port;
        }
        if let Some(port) = parse_var(&lookup, "LDAPGATE_ADMIN_PORT")? {
            config.server.admin_port = Some(port);
        }
        if let Some(secs) = parse_var(&lookup, "LDAPGATE_VERIFY_TIMEOUT_SECONDS")? {
            config.server.verify_timeout_secs = secs;
        }

        if let Some(realm) = non_empty(&lookup, "LDAPGATE_REALM") {
            config.http.realm = realm;
        }
        if let Some(header) = non_empty(&lookup, "LDAPGATE_REDIRECT_HEADER") {
            config.http.redirect_header = header;
        }
        // Set but empty turns the redirect header off
        if let Some(prefix) = lookup("LDAPGATE_REDIRECT_PREFIX") {
            config.http.redirect_prefix = Some(prefix.trim().to_string());
        }
        if let Some(header) = non_empty(&lookup, "LDAPGATE_USER_HEADER") {
            config.http.user_header = Some(header);
        }

        if let Some(level) = non_empty(&lookup, "LDAPGATE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = non_empty(&lookup, "LDAPGATE_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.directory.validate()?;
        self.http.validate()?;

        if self.server.verify_timeout_secs == 0 {
            return Err(Error::Config("verify_timeout_secs must be positive".into()));
        }
        if let Some(admin) = self.server.admin_port {
            if admin == self.server.port {
                return Err(Error::Config(format!(
                    "admin port {} collides with the auth port",
                    admin
                )));
            }
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(Error::Config(format!(
                "log format must be pretty or json, got {}",
                other
            ))),
        }
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).ok_or_else(|| Error::Config(format!("{} is not set", name)))
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} has invalid value {:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Separate listener for `/health` and `/metrics`
    #[serde(default)]
    pub admin_port: Option<u16>,
    /// Deadline for one complete verification sequence
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,
}

fn default_verify_timeout() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: crate::DEFAULT_HTTP_PORT,
            admin_port: None,
            verify_timeout_secs: default_verify_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

/// Directory connection and lookup settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory host name or address
    pub host: String,

    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Connect with `ldaps://` instead of `ldap://`
    #[serde(default)]
    pub use_tls: bool,

    /// Subtree root for subject lookups
    /// Example: "dc=example,dc=com"
    pub base_dn: String,

    /// Service identity used for lookups
    /// Example: "cn=admin,dc=example,dc=com"
    pub bind_dn: String,

    pub bind_password: String,

    /// Attributes requested for every subject
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,

    /// Subject search filter, `{username}` is replaced by the escaped username
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Attribute holding the subject's group memberships
    #[serde(default = "default_group_attribute")]
    pub group_attribute: String,

    /// Group a subject must belong to; none means every authenticated subject is allowed
    #[serde(default)]
    pub required_group: Option<String>,

    /// Base DN for the secondary group search, used when subjects carry no
    /// memberships; the base DN when unset
    #[serde(default)]
    pub group_base_dn: Option<String>,

    /// Group search filter with `{group}`, `{dn}` and `{username}` placeholders
    #[serde(default = "default_group_filter")]
    pub group_filter: String,

    /// Connect and per-operation timeout
    #[serde(default = "default_ldap_timeout")]
    pub timeout_seconds: u64,
}

fn default_ldap_port() -> u16 {
    crate::DEFAULT_LDAP_PORT
}

fn default_attributes() -> Vec<String> {
    ["dn", "cn", "uid", "memberOf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_user_filter() -> String {
    "(uid={username})".to_string()
}

fn default_group_attribute() -> String {
    "memberOf".to_string()
}

fn default_group_filter() -> String {
    "(&(cn={group})(member={dn}))".to_string()
}

fn default_ldap_timeout() -> u64 {
    10
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ldap_port(),
            use_tls: false,
            base_dn: String::new(),
            bind_dn: String::new(),
            bind_password: String::new(),
            attributes: default_attributes(),
            user_filter: default_user_filter(),
            group_attribute: default_group_attribute(),
            required_group: None,
            group_base_dn: None,
            group_filter: default_group_filter(),
            timeout_seconds: default_ldap_timeout(),
        }
    }
}

// bind_password stays out of logs
impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<redacted>")
            .field("attributes", &self.attributes)
            .field("user_filter", &self.user_filter)
            .field("group_attribute", &self.group_attribute)
            .field("required_group", &self.required_group)
            .field("group_base_dn", &self.group_base_dn)
            .field("group_filter", &self.group_filter)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl DirectoryConfig {
    /// Connection URL handed to the LDAP client
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("directory host is required".into()));
        }
        if self.host.contains("://") {
            return Err(Error::Config(format!(
                "directory host must be a bare host name, got {}",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(Error::Config("directory port must be non-zero".into()));
        }
        if self.base_dn.is_empty() {
            return Err(Error::Config("base DN is required".into()));
        }
        if self.bind_dn.is_empty() {
            return Err(Error::Config("service bind DN is required".into()));
        }
        // An empty secret turns the service bind into an anonymous one.
        if self.bind_password.is_empty() {
            return Err(Error::Config("service bind password is required".into()));
        }
        if self.attributes.is_empty() {
            return Err(Error::Config("attribute list must not be empty".into()));
        }
        if !self.user_filter.contains("{username}") {
            return Err(Error::Config(
                "user filter must contain {username} placeholder".into(),
            ));
        }
        if !self.group_filter.contains("{group}") {
            return Err(Error::Config(
                "group filter must contain {group} placeholder".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Config("directory timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Rendering of decisions for the reverse proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Realm announced in `WWW-Authenticate`
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Header carrying the internal redirect on success
    #[serde(default = "default_redirect_header")]
    pub redirect_header: String,

    /// Prefix joined with the original request URI; no redirect header when
    /// unset or empty
    #[serde(default = "default_redirect_prefix")]
    pub redirect_prefix: Option<String>,

    /// Header carrying the authenticated uid on success
    #[serde(default)]
    pub user_header: Option<String>,
}

fn default_realm() -> String {
    crate::DEFAULT_REALM.to_string()
}

fn default_redirect_header() -> String {
    "X-Accel-Redirect".to_string()
}

fn default_redirect_prefix() -> Option<String> {
    Some("/protected".to_string())
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            redirect_header: default_redirect_header(),
            redirect_prefix: default_redirect_prefix(),
            user_header: None,
        }
    }
}

impl HttpConfig {
    /// Redirect prefix in effect, if any
    pub fn redirect_prefix(&self) -> Option<&str> {
        self.redirect_prefix.as_deref().filter(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.realm.contains('"')
            || HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm)).is_err()
        {
            return Err(Error::Config(format!(
                "realm {:?} cannot be sent in a WWW-Authenticate header",
                self.realm
            )));
        }

        if let Some(prefix) = self.redirect_prefix() {
            header_name("redirect header", &self.redirect_header)?;
            if HeaderValue::from_str(prefix).is_err() {
                return Err(Error::Config(format!(
                    "redirect prefix {:?} is not a valid header value",
                    prefix
                )));
            }
        }
        if let Some(user_header) = &self.user_header {
            header_name("user header", user_header)?;
        }
        Ok(())
    }
}

fn header_name(what: &str, name: &str) -> Result<()> {
    HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| Error::Config(format!("{} {:?} is not a valid header name", what, name)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
