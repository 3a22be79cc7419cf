//! In-memory directory
//!
//! A scripted [`DirectoryConnector`] that behaves like a small LDAP server:
//! simple binds with result codes, subtree searches evaluated against a
//! parsed RFC 4515 filter, access control that only lets the service
//! identity search, and counters for connections and bind attempts.

use async_trait::async_trait;
use ldapgate_core::{DirectoryConfig, Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ldap::connection::{
    DirectoryConnection, DirectoryConnector, RC_INVALID_CREDENTIALS, RC_SUCCESS,
};
use crate::ldap::types::DirectoryEntry;

/// An entry stored in the in-memory directory
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    dn: String,
    password: Option<String>,
    attrs: HashMap<String, Vec<String>>,
}

impl MemoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            password: None,
            attrs: HashMap::new(),
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add one value to an attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.entry(name.into()).or_default().push(value.into());
        self
    }

    fn values(&self, name: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    fn is_under(&self, base_dn: &str) -> bool {
        let dn = self.dn.to_ascii_lowercase();
        let base = base_dn.to_ascii_lowercase();
        base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base))
    }

    fn project(&self, attributes: &[String]) -> DirectoryEntry {
        let all = attributes.is_empty() || attributes.iter().any(|a| a == "*");
        let attrs = self
            .attrs
            .iter()
            .filter(|(key, _)| all || attributes.iter().any(|a| a.eq_ignore_ascii_case(key)))
            .map(|(key, values)| (key.clone(), values.clone()))
            .collect();

        DirectoryEntry {
            dn: self.dn.clone(),
            attrs,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    service_dn: String,
    service_password: String,
    entries: Vec<MemoryEntry>,
    unreachable: bool,
    reject_service_rebind: bool,
    connects: usize,
    open_connections: usize,
    bind_attempts: Vec<String>,
    searches: Vec<String>,
}

/// Shared handle to an in-memory directory
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub fn new(service_dn: impl Into<String>, service_password: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                service_dn: service_dn.into(),
                service_password: service_password.into(),
                ..Default::default()
            })),
        }
    }

    pub fn with_entry(self, entry: MemoryEntry) -> Self {
        self.state.lock().entries.push(entry);
        self
    }

    /// Simulate the directory host going away
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Reject every service bind after the first one on a connection
    pub fn reject_service_rebind(&self, reject: bool) {
        self.state.lock().reject_service_rebind = reject;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    /// DNs of every bind attempt, in order
    pub fn bind_attempts(&self) -> Vec<String> {
        self.state.lock().bind_attempts.clone()
    }

    /// Filters of every search, in order
    pub fn searches(&self) -> Vec<String> {
        self.state.lock().searches.clone()
    }
}

#[async_trait]
impl DirectoryConnector for MemoryDirectory {
    async fn connect(&self, _config: &DirectoryConfig) -> Result<Box<dyn DirectoryConnection>> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(Error::Connection("connection refused".to_string()));
        }
        state.connects += 1;
        state.open_connections += 1;

        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
            bound_dn: None,
            service_binds: 0,
            released: false,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
    bound_dn: Option<String>,
    service_binds: usize,
    released: bool,
}

impl MemoryConnection {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.lock().open_connections -= 1;
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn simple_bind(&mut self, dn: &str, secret: &str) -> Result<u32> {
        let mut state = self.state.lock();
        if state.unreachable || self.released {
            return Err(Error::Connection("connection reset by peer".to_string()));
        }
        state.bind_attempts.push(dn.to_string());
        self.bound_dn = None;

        if dn.eq_ignore_ascii_case(&state.service_dn) {
            if state.reject_service_rebind && self.service_binds > 0 {
                return Ok(RC_INVALID_CREDENTIALS);
            }
            if secret != state.service_password {
                return Ok(RC_INVALID_CREDENTIALS);
            }
            self.service_binds += 1;
            self.bound_dn = Some(dn.to_string());
            return Ok(RC_SUCCESS);
        }

        // Unauthenticated bind (RFC 4513 5.1.2): succeeds without checking anything.
        if secret.is_empty() {
            return Ok(RC_SUCCESS);
        }

        let accepted = state.entries.iter().any(|entry| {
            entry.dn.eq_ignore_ascii_case(dn) && entry.password.as_deref() == Some(secret)
        });
        if accepted {
            self.bound_dn = Some(dn.to_string());
            Ok(RC_SUCCESS)
        } else {
            Ok(RC_INVALID_CREDENTIALS)
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        let mut state = self.state.lock();
        if state.unreachable || self.released {
            return Err(Error::Query("connection reset by peer".to_string()));
        }

        let is_service = self
            .bound_dn
            .as_deref()
            .map(|dn| dn.eq_ignore_ascii_case(&state.service_dn))
            .unwrap_or(false);
        if !is_service {
            return Err(Error::Query("insufficient access rights (50)".to_string()));
        }

        let parsed = rfc4515::parse(filter)
            .map_err(|e| Error::Query(format!("bad search filter {:?}: {}", filter, e)))?;
        state.searches.push(filter.to_string());

        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.is_under(base_dn) && parsed.matches(entry))
            .map(|entry| entry.project(attributes))
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.bound_dn = None;
        self.release();
        Ok(())
    }
}

/// RFC 4515 string filters, the subset needed for lookups: `&`, `|`, `!`,
/// equality, presence and substrings, with `\XX` escapes.
mod rfc4515 {
    use super::MemoryEntry;

    #[derive(Debug, PartialEq)]
    pub enum Filter {
        And(Vec<Filter>),
        Or(Vec<Filter>),
        Not(Box<Filter>),
        Present(String),
        Equal(String, String),
        Substring(String, Vec<String>),
    }

    impl Filter {
        pub fn matches(&self, entry: &MemoryEntry) -> bool {
            match self {
                Filter::And(items) => items.iter().all(|f| f.matches(entry)),
                Filter::Or(items) => items.iter().any(|f| f.matches(entry)),
                Filter::Not(inner) => !inner.matches(entry),
                Filter::Present(attr) => {
                    attr.eq_ignore_ascii_case("objectClass") || !entry.values(attr).is_empty()
                }
                Filter::Equal(attr, value) => entry
                    .values(attr)
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(value)),
                Filter::Substring(attr, parts) => entry
                    .values(attr)
                    .iter()
                    .any(|v| substring_match(&v.to_lowercase(), parts)),
            }
        }
    }

    fn substring_match(value: &str, parts: &[String]) -> bool {
        let (first, rest) = match parts.split_first() {
            Some(split) => split,
            None => return false,
        };
        let (last, middle) = match rest.split_last() {
            Some(split) => split,
            None => return value == first.to_lowercase(),
        };

        let first = first.to_lowercase();
        let last = last.to_lowercase();
        if !value.starts_with(&first) {
            return false;
        }
        let mut remaining = &value[first.len()..];
        for part in middle {
            let part = part.to_lowercase();
            match remaining.find(&part) {
                Some(idx) => remaining = &remaining[idx + part.len()..],
                None => return false,
            }
        }
        remaining.ends_with(&last)
    }

    pub fn parse(input: &str) -> Result<Filter, String> {
        let mut parser = Parser {
            input: input.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(format!("trailing input at offset {}", parser.pos));
        }
        Ok(filter)
    }

    struct Parser<'a> {
        input: &'a [u8],
        pos: usize,
    }

    impl Parser<'_> {
        fn peek(&self) -> Option<u8> {
            self.input.get(self.pos).copied()
        }

        fn expect(&mut self, byte: u8) -> Result<(), String> {
            if self.peek() == Some(byte) {
                self.pos += 1;
                Ok(())
            } else {
                Err(format!("expected {:?} at offset {}", byte as char, self.pos))
            }
        }

        fn filter(&mut self) -> Result<Filter, String> {
            self.expect(b'(')?;
            let filter = match self.peek() {
                Some(b'&') => {
                    self.pos += 1;
                    Filter::And(self.list()?)
                }
                Some(b'|') => {
                    self.pos += 1;
                    Filter::Or(self.list()?)
                }
                Some(b'!') => {
                    self.pos += 1;
                    Filter::Not(Box::new(self.filter()?))
                }
                Some(_) => self.item()?,
                None => return Err("unexpected end of filter".to_string()),
            };
            self.expect(b')')?;
            Ok(filter)
        }

        fn list(&mut self) -> Result<Vec<Filter>, String> {
            let mut items = Vec::new();
            while self.peek() == Some(b'(') {
                items.push(self.filter()?);
            }
            if items.is_empty() {
                return Err(format!("empty filter list at offset {}", self.pos));
            }
            Ok(items)
        }

        fn item(&mut self) -> Result<Filter, String> {
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c == b'=' || c == b'(' || c == b')' {
                    break;
                }
                self.pos += 1;
            }
            let attr = std::str::from_utf8(&self.input[start..self.pos])
                .map_err(|e| e.to_string())?
                .to_string();
            let valid = !attr.is_empty()
                && attr
                    .bytes()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'-' | b'.' | b';'));
            if !valid {
                return Err(format!("invalid attribute description {:?}", attr));
            }
            self.expect(b'=')?;

            let mut parts: Vec<Vec<u8>> = vec![Vec::new()];
            loop {
                match self.peek() {
                    None => return Err("unterminated filter value".to_string()),
                    Some(b')') => break,
                    Some(b'(') => return Err(format!("unescaped '(' at offset {}", self.pos)),
                    Some(b'*') => {
                        parts.push(Vec::new());
                        self.pos += 1;
                    }
                    Some(b'\\') => {
                        let hex = self
                            .input
                            .get(self.pos + 1..self.pos + 3)
                            .and_then(|h| std::str::from_utf8(h).ok())
                            .and_then(|h| u8::from_str_radix(h, 16).ok())
                            .ok_or_else(|| format!("invalid escape at offset {}", self.pos))?;
                        if let Some(last) = parts.last_mut() {
                            last.push(hex);
                        }
                        self.pos += 3;
                    }
                    Some(c) => {
                        if let Some(last) = parts.last_mut() {
                            last.push(c);
                        }
                        self.pos += 1;
                    }
                }
            }

            let mut values = parts
                .into_iter()
                .map(|p| String::from_utf8(p).map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(match values.len() {
                1 => Filter::Equal(attr, values.remove(0)),
                2 if values.iter().all(|v| v.is_empty()) => Filter::Present(attr),
                _ => Filter::Substring(attr, values),
            })
        }
    }

}
