//! Validation of the remote extension config.
//!
//! The document is a JSON object keyed by extension id:
//!
//! ```json
//! {
//!   "<id>": { "external_update_url": "https://…/update.xml", "...": "ignored" }
//! }
//! ```
//!
//! `update_url` is accepted as an alias for `external_update_url`. Parsing
//! never fails as a whole: bad entries are dropped one at a time and reported
//! in [`ParsedConfig::issues`].

use {
    serde_json::{Map, Value},
    tracing::{debug, warn},
    url::Url,
};

use crate::types::{ExtensionConfig, RemoteConfig};

/// Canonical update-source key.
pub const UPDATE_URL_KEY: &str = "external_update_url";
/// Short alias accepted in hand-written configs.
pub const UPDATE_URL_ALIAS: &str = "update_url";

/// Why a config (or one entry of it) was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssue {
    /// The document is not valid JSON.
    Malformed(String),
    /// The document is valid JSON but not an object.
    NotAnObject,
    /// One entry was dropped.
    Entry { id: String, reason: EntryIssue },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryIssue {
    EmptyId,
    NotAnObject,
    MissingUpdateUrl,
    InvalidUpdateUrl(String),
}

impl std::fmt::Display for EntryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "empty extension id"),
            Self::NotAnObject => write!(f, "entry is not an object"),
            Self::MissingUpdateUrl => write!(f, "missing {UPDATE_URL_KEY}"),
            Self::InvalidUpdateUrl(e) => write!(f, "invalid update url: {e}"),
        }
    }
}

/// Parsed config plus everything that was dropped on the way.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    pub config: RemoteConfig,
    pub issues: Vec<ParseIssue>,
}

impl ParsedConfig {
    /// `true` when the document as a whole was unusable (as opposed to
    /// individual entries being dropped).
    pub fn is_malformed(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i, ParseIssue::Malformed(_) | ParseIssue::NotAnObject))
    }

    pub fn dropped_entries(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, ParseIssue::Entry { .. }))
            .count()
    }
}

/// Parse a remote config document. Never fails; see [`ParsedConfig`].
pub fn parse_remote_config(json: &str) -> ParsedConfig {
    let root: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "extension config is not valid JSON");
            return ParsedConfig {
                config: RemoteConfig::default(),
                issues: vec![ParseIssue::Malformed(e.to_string())],
            };
        },
    };

    let Value::Object(map) = root else {
        warn!("extension config root is not an object");
        return ParsedConfig {
            config: RemoteConfig::default(),
            issues: vec![ParseIssue::NotAnObject],
        };
    };

    let mut parsed = ParsedConfig::default();
    for (id, value) in map {
        match parse_entry(&id, value) {
            Ok(entry) => parsed.config.insert(id, entry),
            Err(reason) => {
                debug!(%id, %reason, "dropping extension config entry");
                parsed.issues.push(ParseIssue::Entry { id, reason });
            },
        }
    }

    if parsed.dropped_entries() > 0 {
        warn!(
            kept = parsed.config.len(),
            dropped = parsed.dropped_entries(),
            "extension config had invalid entries"
        );
    }
    parsed
}

fn parse_entry(id: &str, value: Value) -> Result<ExtensionConfig, EntryIssue> {
    if id.trim().is_empty() {
        return Err(EntryIssue::EmptyId);
    }
    let Value::Object(mut fields) = value else {
        return Err(EntryIssue::NotAnObject);
    };

    let update_url = take_update_url(&mut fields)?;
    Url::parse(&update_url).map_err(|e| EntryIssue::InvalidUpdateUrl(e.to_string()))?;

    Ok(ExtensionConfig {
        update_url,
        extra: fields,
    })
}

fn take_update_url(fields: &mut Map<String, Value>) -> Result<String, EntryIssue> {
    for key in [UPDATE_URL_KEY, UPDATE_URL_ALIAS] {
        if let Some(Value::String(url)) = fields.get(key)
            && !url.is_empty()
        {
            let url = url.clone();
            fields.remove(key);
            return Ok(url);
        }
    }
    Err(EntryIssue::MissingUpdateUrl)
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn single_entry_keeps_update_url_verbatim() {
        let parsed =
            parse_remote_config(r#"{"abc123": {"update_url": "https://example.com/update"}}"#);
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.config.len(), 1);
        assert_eq!(
            parsed.config.update_url("abc123"),
            Some("https://example.com/update")
        );
        let prefs = parsed.config.to_prefs();
        assert_eq!(
            prefs["abc123"].update_url.as_deref(),
            Some("https://example.com/update")
        );
    }

    #[test]
    fn canonical_key_wins_and_extras_survive() {
        let parsed = parse_remote_config(
            r#"{
                "ext": {
                    "external_update_url": "https://cdn.example.com/a.xml",
                    "update_url": "https://other.example.com/b.xml",
                    "channel": "beta"
                }
            }"#,
        );
        let entry = parsed.config.get("ext");
        assert_eq!(
            entry.map(|e| e.update_url.as_str()),
            Some("https://cdn.example.com/a.xml")
        );
        assert_eq!(
            entry.and_then(|e| e.extra.get("channel")),
            Some(&Value::String("beta".into()))
        );
    }

    #[test]
    fn bad_entries_are_dropped_individually() {
        let parsed = parse_remote_config(
            r#"{
                "good": {"update_url": "https://example.com/good"},
                "no_url": {"name": "x"},
                "scalar": 42,
                "bad_url": {"update_url": "not a url"},
                "empty_url": {"update_url": ""},
                "": {"update_url": "https://example.com/anon"}
            }"#,
        );
        assert_eq!(parsed.config.ids().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(parsed.dropped_entries(), 5);
        assert!(!parsed.is_malformed());
        assert!(parsed.issues.contains(&ParseIssue::Entry {
            id: "no_url".into(),
            reason: EntryIssue::MissingUpdateUrl,
        }));
        assert!(parsed.issues.contains(&ParseIssue::Entry {
            id: "scalar".into(),
            reason: EntryIssue::NotAnObject,
        }));
    }

    #[rstest]
    #[case("")]
    #[case("{")]
    #[case("null")]
    #[case("[1, 2]")]
    #[case("\"string\"")]
    #[case("{\"a\": ")]
    fn malformed_documents_yield_empty_config(#[case] input: &str) {
        let parsed = parse_remote_config(input);
        assert!(parsed.config.is_empty());
        assert!(parsed.is_malformed());
    }

    #[test]
    fn empty_object_is_valid_and_empty() {
        let parsed = parse_remote_config("{}");
        assert!(parsed.config.is_empty());
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn surviving_ids_are_subset_of_input() {
        let input = serde_json::json!({
            "a": {"update_url": "https://a.example/u"},
            "b": {"update_url": 7},
            "c": {"external_update_url": "https://c.example/u"},
            "d": []
        });
        let parsed = parse_remote_config(&input.to_string());
        let obj = input.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>());
        for id in parsed.config.ids() {
            assert!(obj.as_ref().is_some_and(|keys| keys.contains(id)));
        }
        assert_eq!(parsed.config.len(), 2);
    }
}
