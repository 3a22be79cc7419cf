//! Search filter construction
//!
//! Usernames and group names come from the HTTP caller, so every value is
//! escaped before it lands in a filter, and templates are filled in a single
//! pass so a substituted value is never scanned for placeholders again.

use ldap3::ldap_escape;
use std::borrow::Cow;

/// Escape `*`, `(`, `)`, `\` and NUL for use inside a filter value.
pub fn escape(value: &str) -> Cow<'_, str> {
    ldap_escape(value)
}

/// Subject lookup filter from a template with a `{username}` placeholder
pub fn user_filter(template: &str, username: &str) -> String {
    fill(template, &[("username", username)])
}

/// Group membership filter from a template with `{group}`, `{dn}` and
/// `{username}` placeholders
pub fn group_filter(template: &str, group: &str, dn: &str, username: &str) -> String {
    fill(
        template,
        &[("group", group), ("dn", dn), ("username", username)],
    )
}

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, value))
        });

        match replaced {
            Some((close, value)) => {
                out.push_str(&escape(value));
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
