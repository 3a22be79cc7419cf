//! Group membership check

use ldapgate_core::Result;
use tracing::debug;

use crate::ldap::filter;
use crate::ldap::session::Session;
use crate::ldap::types::Subject;

/// Decide whether `subject` may pass given the required group.
///
/// No required group allows every authenticated subject. Membership values
/// collected at lookup time decide first; a subject without any falls back
/// to a group search under the group base DN, or the base DN when unset.
pub async fn authorize(
    session: &mut Session,
    subject: &Subject,
    required_group: Option<&str>,
) -> Result<bool> {
    let group = match required_group {
        Some(group) => group,
        None => return Ok(true),
    };

    if !subject.groups.is_empty() {
        let member = is_member(subject, group);
        debug!(member, "Checked {} membership attribute for {}", group, subject.dn);
        return Ok(member);
    }

    let config = session.config().clone();
    let group_base = config.group_base_dn.as_deref().unwrap_or(&config.base_dn);

    let filter = filter::group_filter(&config.group_filter, group, &subject.dn, &subject.uid);
    let entries = session
        .search(group_base, &filter, &["cn".to_string()])
        .await?;

    debug!("Group search for {} returned {} entries", subject.dn, entries.len());
    Ok(!entries.is_empty())
}

/// Membership by attribute containment.
pub fn is_member(subject: &Subject, group: &str) -> bool {
    subject
        .groups
        .iter()
        .any(|value| membership_matches(value, group))
}

/// A membership value matches the exact group (ignoring ASCII case), or,
/// for a bare group name, the value of the membership DN's leading RDN.
pub fn membership_matches(value: &str, group: &str) -> bool {
    if value.trim().eq_ignore_ascii_case(group.trim()) {
        return true;
    }
    if group.contains('=') {
        return false;
    }
    leading_rdn_value(value)
        .map(|rdn| unescape_dn_value(rdn).eq_ignore_ascii_case(group.trim()))
        .unwrap_or(false)
}

fn leading_rdn_value(dn: &str) -> Option<&str> {
    let mut escaped = false;
    let mut end = dn.len();
    for (idx, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                end = idx;
                break;
            }
            _ => {}
        }
    }

    let (_, value) = dn[..end].split_once('=')?;
    Some(value.trim())
}

/// Undo RFC 4514 escaping: `\,` style pairs and `\XX` hex bytes
fn unescape_dn_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = value
                .get(i + 1..i + 3)
                .filter(|pair| pair.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
