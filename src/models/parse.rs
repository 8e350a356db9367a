//! Text grammars shared by the classifier and the reconciliation engine.
//!
//! - List name -> Firefox version: `(firefox|fx)\s*(\d{2,})`, case-insensitive
//! - Security note -> bug id: `bug\s*(\d+)`, case-insensitive
//! - Bug URL -> card short URL: `https://trello.com/c/<id>` plus optional trailing path

use regex::Regex;
use std::sync::OnceLock;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(firefox|fx)\s*(\d{2,})").expect("valid regex"))
}

fn bug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bug\s*(\d+)").expect("valid regex"))
}

fn card_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(https://trello\.com/c/[A-Za-z0-9]+)(/.*)?$").expect("valid regex")
    })
}

/// Firefox version encoded in a list name.
///
/// Best effort: `"Fx91 Beta"` gives `Some("91")`, `"Backlog"` gives `None`.
pub fn parse_firefox_version(list_name: &str) -> Option<String> {
    version_re()
        .captures(list_name)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Tracker bug id referenced by a security note, in the tracker's key form
/// (no leading zeros).
pub fn extract_bug_id(note: &str) -> Option<String> {
    bug_re()
        .captures(note)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|id| id.to_string())
}

/// Whether a security note uses the canonical `bug NNNN` form written by this tool.
pub fn is_canonical_note(note: &str) -> bool {
    note.starts_with("bug ")
}

/// Canonical security note for a bug id.
pub fn security_note_for(bug_id: &str) -> String {
    format!("bug {}", bug_id)
}

/// A card reference parsed from a bug's URL field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardUrl {
    /// `https://trello.com/c/<shortLink>`
    pub base: String,
    /// The URL carried extra path segments (long card URL)
    pub has_trailing_path: bool,
}

/// Extract the card short URL from a bug URL field.
pub fn parse_card_url(url: &str) -> Option<CardUrl> {
    card_url_re().captures(url.trim()).and_then(|caps| {
        caps.get(1).map(|base| CardUrl {
            base: base.as_str().to_string(),
            has_trailing_path: caps.get(2).is_some_and(|m| m.as_str().len() > 1),
        })
    })
}

/// Tag names are alphanumeric, not purely numeric, and contain no whitespace.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.chars().all(|c| c.is_ascii_alphanumeric())
        && !tag.chars().all(|c| c.is_ascii_digit())
}
