//! HTTP Basic credential extraction

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;

/// Username and password carried by an `Authorization: Basic` header
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Extract credentials from request headers.
    ///
    /// Returns `None` when the header is absent or is not well-formed Basic
    /// authentication; both are answered with a challenge.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        Self::parse(value)
    }

    /// Parse `Basic <base64(username:password)>`
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("Basic") {
            return None;
        }

        let decoded = BASE64.decode(encoded.trim()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;

        // The password may itself contain ':'
        let (username, password) = credentials.split_once(':')?;

        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn encode(raw: &str) -> String {
        format!("Basic {}", BASE64.encode(raw))
    }

    #[test]
    fn test_parse_basic() {
        let creds = BasicCredentials::parse(&encode("alice:hunter2")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_password_with_colon() {
        let creds = BasicCredentials::parse(&encode("alice:a:b:c")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "a:b:c");
    }

    #[test]
    fn test_scheme_case_insensitive() {
        let header = format!("basic {}", BASE64.encode("alice:hunter2"));
        assert!(BasicCredentials::parse(&header).is_some());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(BasicCredentials::parse("Bearer abc").is_none());
        assert!(BasicCredentials::parse("Basic").is_none());
        assert!(BasicCredentials::parse("Basic !!!not-base64!!!").is_none());
        assert!(BasicCredentials::parse(&encode("no-colon")).is_none());
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(BasicCredentials::from_headers(&headers).is_none());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&encode("bob:builder")).unwrap(),
        );
        let creds = BasicCredentials::from_headers(&headers).unwrap();
        assert_eq!(creds.username, "bob");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = BasicCredentials::parse(&encode("alice:hunter2")).unwrap();
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
