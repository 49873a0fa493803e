//! Input line parsing.

use aibot_core::UserId;

/// Splits a `user: text` line. Lines without a single-word prefix belong
/// to `default_user`. Blank lines yield `None`.
pub fn parse_line(line: &str, default_user: &UserId) -> Option<(UserId, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some((prefix, rest)) = line.split_once(':') {
        let prefix = prefix.trim();
        let rest = rest.trim();
        if !prefix.is_empty() && !prefix.contains(char::is_whitespace) && !rest.is_empty() {
            return Some((UserId::from(prefix), rest.to_string()));
        }
    }
    Some((default_user.clone(), line.to_string()))
}
