//! Canonical shortcut identity key and the `next_string` primitive used to
//! turn a prefix match into a half-open range scan (spec §4.1, §6, §9).

/// `source#intentData#intentAction#intentQuery`, each field empty-string
/// encoded if absent.
pub fn intent_key(source: &str, intent_data: &str, intent_action: &str, intent_query: &str) -> String {
    format!("{source}#{intent_data}#{intent_action}#{intent_query}")
}

/// The least string `y` such that `s` is not a prefix of `y`.
///
/// Used to turn a prefix match (`query` begins with `p`) into a range query
/// `p <= x < next_string(p)` that a B-tree index can serve directly.
/// Increments the last Unicode scalar value; if `s` is empty or every
/// scalar is already at `char::MAX`, returns `None` (no such string exists
/// as a `String` — the caller should fall back to an unbounded upper
/// bound in that degenerate case).
pub fn next_string(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    let mut chars: Vec<char> = s.chars().collect();
    let last = *chars.last().unwrap();
    let incremented = char::from_u32(last as u32 + 1)?;
    *chars.last_mut().unwrap() = incremented;
    Some(chars.into_iter().collect())
}
