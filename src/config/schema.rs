//! The two KDL files of a workdir: config.kdl holds preferences, state.kdl
//! holds API tokens and is kept private to the owner.

use chrono::{DateTime, Utc};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// How command results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per command
    #[default]
    Json,
    /// Plain text
    Human,
}

impl OutputFormat {
    /// `json` or `human`, any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field to ignore in minimal diffs, e.g. `("cards", "pos")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseField {
    pub category: String,
    pub field: String,
}

/// Preferences read from config.kdl (mode 0644).
///
/// # KDL Schema
///
/// ```kdl
/// board "5887b9767bc90fd832e669f8"
/// trello-url "https://trello.com/1"
/// bugzilla-url "https://bugzilla.mozilla.org"
/// tracker-product "Enterprise Information Security"
/// tracker-component "Rapid Risk Analysis"
/// noise-field "cards" "pos"
/// output-format "human"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrellosaConfig {
    /// Board id to capture
    pub board: Option<String>,

    /// Board API base URL
    pub trello_url: Option<String>,

    /// Tracker base URL
    pub bugzilla_url: Option<String>,

    pub tracker_product: Option<String>,

    pub tracker_component: Option<String>,

    /// Extra noise denylist entries
    pub noise_fields: Vec<NoiseField>,

    /// Used when `--human` is not given
    pub output_format: Option<OutputFormat>,
}

fn first_string(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

fn string_node(name: &str, values: &[&str]) -> KdlNode {
    let mut node = KdlNode::new(name);
    for value in values {
        node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    }
    node
}

impl TrellosaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let noise_fields = doc
            .nodes()
            .iter()
            .filter(|node| node.name().value() == "noise-field")
            .filter_map(|node| {
                let mut values = node.entries().iter().filter_map(|e| e.value().as_string());
                match (values.next(), values.next()) {
                    (Some(category), Some(field)) => Some(NoiseField {
                        category: category.to_string(),
                        field: field.to_string(),
                    }),
                    _ => None,
                }
            })
            .collect();

        Self {
            board: first_string(doc, "board"),
            trello_url: first_string(doc, "trello-url"),
            bugzilla_url: first_string(doc, "bugzilla-url"),
            tracker_product: first_string(doc, "tracker-product"),
            tracker_component: first_string(doc, "tracker-component"),
            noise_fields,
            output_format: first_string(doc, "output-format")
                .as_deref()
                .and_then(OutputFormat::parse),
        }
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        let nodes = doc.nodes_mut();

        let scalars = [
            ("board", &self.board),
            ("trello-url", &self.trello_url),
            ("bugzilla-url", &self.bugzilla_url),
            ("tracker-product", &self.tracker_product),
            ("tracker-component", &self.tracker_component),
        ];
        for (name, value) in scalars {
            if let Some(value) = value {
                nodes.push(string_node(name, &[value]));
            }
        }
        for noise in &self.noise_fields {
            nodes.push(string_node("noise-field", &[&noise.category, &noise.field]));
        }
        if let Some(format) = self.output_format {
            nodes.push(string_node("output-format", &[format.as_str()]));
        }

        doc
    }
}

/// Secrets read from state.kdl, written with mode 0600.
///
/// # KDL Schema
///
/// ```kdl
/// trello-token "0123...abcd"
/// bugzilla-token "AbCd...wxyz"
/// token-validated-at "2021-08-02T09:00:00Z"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrellosaState {
    /// Trello user token
    pub trello_token: Option<String>,

    /// Bugzilla API key
    pub bugzilla_token: Option<String>,

    /// When the tokens were last validated against the services
    pub token_validated_at: Option<DateTime<Utc>>,
}

impl TrellosaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_secrets(&self) -> bool {
        self.trello_token.is_some() || self.bugzilla_token.is_some()
    }

    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            trello_token: first_string(doc, "trello-token"),
            bugzilla_token: first_string(doc, "bugzilla-token"),
            token_validated_at: first_string(doc, "token-validated-at")
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        }
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        let nodes = doc.nodes_mut();

        if let Some(ref token) = self.trello_token {
            nodes.push(string_node("trello-token", &[token]));
        }
        if let Some(ref token) = self.bugzilla_token {
            nodes.push(string_node("bugzilla-token", &[token]));
        }
        if let Some(ref validated_at) = self.token_validated_at {
            nodes.push(string_node("token-validated-at", &[&validated_at.to_rfc3339()]));
        }

        doc
    }

    /// Overlay the values `other` sets.
    pub fn merge(&mut self, other: &TrellosaState) {
        if other.trello_token.is_some() {
            self.trello_token = other.trello_token.clone();
        }
        if other.bugzilla_token.is_some() {
            self.bugzilla_token = other.bugzilla_token.clone();
        }
        if other.token_validated_at.is_some() {
            self.token_validated_at = other.token_validated_at;
        }
    }
}

/// Mask a token for display, keeping the first and last 4 characters.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 || !token.is_ascii() {
        format!("{}...", token.get(..4).unwrap_or(""))
    } else {
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    }
}

/// Mode of state.kdl, tokens must stay private.
#[cfg(unix)]
pub const STATE_FILE_MODE: u32 = 0o600;

/// Mode of config.kdl.
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;

#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("HUMAN"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    // ==================== TrellosaConfig Tests ====================

    #[test]
    fn test_config_from_kdl_empty() {
        let config = TrellosaConfig::from_kdl(&KdlDocument::new());
        assert_eq!(config, TrellosaConfig::default());
    }

    #[test]
    fn test_config_from_kdl_full() {
        let kdl = r#"
            board "abc123"
            bugzilla-url "https://bugzilla-dev.allizom.org"
            tracker-product "Firefox"
            tracker-component "Security"
            noise-field "cards" "pos"
            noise-field "lists" "subscribed"
            noise-field "broken"
            output-format "human"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let config = TrellosaConfig::from_kdl(&doc);

        assert_eq!(config.board.as_deref(), Some("abc123"));
        assert_eq!(config.trello_url, None);
        assert_eq!(
            config.bugzilla_url.as_deref(),
            Some("https://bugzilla-dev.allizom.org")
        );
        assert_eq!(config.tracker_product.as_deref(), Some("Firefox"));
        assert_eq!(config.noise_fields.len(), 2);
        assert_eq!(config.noise_fields[1].field, "subscribed");
        assert_eq!(config.output_format, Some(OutputFormat::Human));
    }

    #[test]
    fn test_config_to_kdl_roundtrip() {
        let config = TrellosaConfig {
            board: Some("abc".to_string()),
            trello_url: Some("http://localhost:8080/1".to_string()),
            noise_fields: vec![NoiseField {
                category: "cards".to_string(),
                field: "pos".to_string(),
            }],
            output_format: Some(OutputFormat::Json),
            ..Default::default()
        };
        let parsed = TrellosaConfig::from_kdl(&config.to_kdl());
        assert_eq!(config, parsed);
    }

    // ==================== TrellosaState Tests ====================

    #[test]
    fn test_state_from_kdl_full() {
        let kdl = r#"
            trello-token "t0k3n"
            bugzilla-token "bzk3y"
            token-validated-at "2021-08-02T09:00:00Z"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let state = TrellosaState::from_kdl(&doc);

        assert_eq!(state.trello_token.as_deref(), Some("t0k3n"));
        assert_eq!(state.bugzilla_token.as_deref(), Some("bzk3y"));
        assert!(state.token_validated_at.is_some());
        assert!(state.has_secrets());
    }

    #[test]
    fn test_state_to_kdl_roundtrip() {
        let state = TrellosaState {
            trello_token: Some("t".repeat(64)),
            bugzilla_token: None,
            token_validated_at: Some("2021-08-02T09:00:00Z".parse().unwrap()),
        };
        assert_eq!(TrellosaState::from_kdl(&state.to_kdl()), state);
    }

    #[test]
    fn test_state_merge() {
        let mut base = TrellosaState {
            trello_token: Some("old".to_string()),
            bugzilla_token: Some("bz".to_string()),
            token_validated_at: None,
        };
        base.merge(&TrellosaState {
            trello_token: Some("new".to_string()),
            ..Default::default()
        });
        assert_eq!(base.trello_token.as_deref(), Some("new"));
        assert_eq!(base.bugzilla_token.as_deref(), Some("bz"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token(&"a".repeat(60)), "aaaa...aaaa");
        assert_eq!(mask_token("short"), "shor...");
        assert_eq!(mask_token("ab"), "...");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_constants() {
        assert_eq!(STATE_FILE_MODE, 0o600);
        assert_eq!(CONFIG_FILE_MODE, 0o644);
    }
}
