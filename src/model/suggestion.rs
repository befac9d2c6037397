//! `Suggestion`, `SourceResponse`, and the wire shape they're built from
//! (spec §3, §6).

use serde::{Deserialize, Serialize};

/// A presentation record. Immutable once built.
///
/// Equality for dedup is keyed on `(intent_action, intent_data)`; durable
/// identity for shortcutting is keyed on `(source, intent_data, intent_action,
/// query)` — see [`crate::intent_key::intent_key`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub source: String,
    pub format: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub icon1: Option<Icon>,
    pub icon2: Option<Icon>,
    pub intent_action: String,
    pub intent_data: String,
    pub intent_data_id: Option<String>,
    pub intent_extra_data: Option<String>,
    pub intent_component_name: Option<String>,
    pub query: Option<String>,
    pub action_msg_call: Option<String>,
    pub shortcut_id: Option<String>,
    pub pin_to_bottom: bool,
    pub spinner_while_refreshing: bool,
    pub background_color: Option<String>,
}

impl Suggestion {
    /// `(intent_action, intent_data)` — the dedup key spec §3 defines.
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.intent_action.as_str(), self.intent_data.as_str())
    }
}

/// Icon reference, decoded per spec §6's "Icon column semantics".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Icon {
    /// An opaque absolute URI (first character of the wire field is not a digit).
    Uri(String),
    /// A resource id, rendered by the host as `resource://<source_package>/<id>`.
    Resource { source_package: String, id: String },
}

impl Icon {
    /// Decode a wire icon column per spec §6: null/empty/"0" => `None`;
    /// first char non-digit => opaque URI; otherwise a resource id.
    pub fn decode(raw: Option<&str>, source_package: &str) -> Option<Icon> {
        let raw = raw?.trim();
        if raw.is_empty() || raw == "0" {
            return None;
        }
        match raw.chars().next() {
            Some(c) if !c.is_ascii_digit() => Some(Icon::Uri(raw.to_string())),
            _ => Some(Icon::Resource {
                source_package: source_package.to_string(),
                id: raw.to_string(),
            }),
        }
    }
}

/// Result code for a source's response to a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultCode {
    Ok,
    Error,
}

/// A source's response to one `suggest` call.
///
/// Invariant: `suggestions.len() <= count <= query_limit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceResponse {
    pub source: String,
    pub suggestions: Vec<Suggestion>,
    pub count: usize,
    pub query_limit: usize,
    pub result_code: ResultCode,
}

impl SourceResponse {
    /// An empty, `Error`-coded response for a source that failed or timed out.
    pub fn empty_error(source: impl Into<String>) -> Self {
        SourceResponse {
            source: source.into(),
            suggestions: Vec::new(),
            count: 0,
            query_limit: 0,
            result_code: ResultCode::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result_code == ResultCode::Ok
    }
}

/// Decode intent data per spec §6's "Data-id semantics": when `intent_data_id`
/// is present, the effective intent data is `intent_data + "/" + urlencode(intent_data_id)`.
pub fn effective_intent_data(intent_data: &str, intent_data_id: Option<&str>) -> String {
    match intent_data_id {
        Some(id) if !id.is_empty() => format!("{intent_data}/{}", urlencode(id)),
        _ => intent_data.to_string(),
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_decode_null_or_zero_is_none() {
        assert_eq!(Icon::decode(None, "pkg"), None);
        assert_eq!(Icon::decode(Some(""), "pkg"), None);
        assert_eq!(Icon::decode(Some("0"), "pkg"), None);
    }

    #[test]
    fn icon_decode_uri_vs_resource() {
        assert_eq!(
            Icon::decode(Some("https://example.com/x.png"), "pkg"),
            Some(Icon::Uri("https://example.com/x.png".to_string()))
        );
        assert_eq!(
            Icon::decode(Some("12345"), "pkg"),
            Some(Icon::Resource {
                source_package: "pkg".to_string(),
                id: "12345".to_string(),
            })
        );
    }

    #[test]
    fn effective_intent_data_appends_urlencoded_id() {
        assert_eq!(effective_intent_data("http://x", None), "http://x");
        assert_eq!(
            effective_intent_data("http://x", Some("a b")),
            "http://x/a%20b"
        );
    }

    #[test]
    fn response_invariant_holds_for_well_formed_data() {
        let resp = SourceResponse {
            source: "s".into(),
            suggestions: vec![],
            count: 3,
            query_limit: 10,
            result_code: ResultCode::Ok,
        };
        assert!(resp.suggestions.len() <= resp.count);
        assert!(resp.count <= resp.query_limit);
    }
}
