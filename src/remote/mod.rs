//! Board and tracker API collaborators.
//!
//! The reconciliation engine only talks to the outside world through the
//! [`BoardApi`] and [`TrackerApi`] traits. The production implementations are
//! blocking HTTP clients:
//! - [`trello::TrelloClient`] for the board
//! - [`bugzilla::BugzillaClient`] for the tracker

pub mod bugzilla;
pub mod trello;

pub use bugzilla::BugzillaClient;
pub use trello::TrelloClient;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Snapshot, TrackerSnapshot};
use crate::reconcile::TrackerVocabulary;

/// Errors returned by the board and tracker APIs.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Token is invalid or expired (401 Unauthorized)
    #[error("Invalid or expired token: {0} returned 401 Unauthorized")]
    Unauthorized(&'static str),

    /// Token lacks required permissions (403 Forbidden)
    #[error("Token lacks required permissions: {0} returned 403 Forbidden")]
    Forbidden(&'static str),

    /// Object does not exist (404 Not Found)
    #[error("{0} returned 404 Not Found for {1}")]
    NotFound(&'static str, String),

    /// Network or other HTTP error
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse response
    #[error("Failed to parse {0} response: {1}")]
    Parse(&'static str, String),
}

impl RemoteError {
    /// Classify a `ureq` error for `service`, requesting `what`.
    pub(crate) fn from_ureq(service: &'static str, what: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(401, _) => RemoteError::Unauthorized(service),
            ureq::Error::Status(403, _) => RemoteError::Forbidden(service),
            ureq::Error::Status(404, _) => RemoteError::NotFound(service, what.to_string()),
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                RemoteError::Http(format!("{} HTTP {}: {}", service, code, body))
            }
            other => RemoteError::Http(other.to_string()),
        }
    }
}

/// Which tracker bugs to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerFilter {
    pub product: String,
    pub component: String,
}

/// Fields of a new tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueFields {
    pub product: String,
    pub component: String,
    pub summary: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub target_milestone: String,
}

/// Partial update of a tracker issue. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_milestone: Option<String>,
}

/// Read and write access to the board.
pub trait BoardApi {
    /// Capture the live board.
    fn fetch_board_snapshot(&self) -> Result<Snapshot, RemoteError>;

    /// Set a text custom field on a card.
    fn set_custom_field_text(
        &self,
        card_id: &str,
        field_id: &str,
        text: &str,
    ) -> Result<(), RemoteError>;

    /// Attach a label to a card.
    fn add_card_label(&self, card_id: &str, label_id: &str) -> Result<(), RemoteError>;

    /// Detach a label from a card.
    fn remove_card_label(&self, card_id: &str, label_id: &str) -> Result<(), RemoteError>;
}

/// Read and write access to the tracker.
pub trait TrackerApi {
    /// Fetch the bugs matching `filter`.
    fn fetch_tracker_snapshot(&self, filter: &TrackerFilter)
    -> Result<TrackerSnapshot, RemoteError>;

    /// Fetch the valid version and milestone values of a product.
    fn fetch_vocabulary(&self, filter: &TrackerFilter) -> Result<TrackerVocabulary, RemoteError>;

    /// File a new issue, returning its id.
    fn create_issue(&self, fields: &IssueFields) -> Result<u64, RemoteError>;

    /// Update fields of an existing issue.
    fn update_issue(&self, id: u64, update: &IssueUpdate) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_update_skips_unset_fields() {
        let update = IssueUpdate {
            url: Some("https://trello.com/c/abc".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"url": "https://trello.com/c/abc"}));
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::NotFound("Bugzilla", "bug 42".to_string());
        assert_eq!(err.to_string(), "Bugzilla returned 404 Not Found for bug 42");
        let err = RemoteError::Unauthorized("Trello");
        assert!(err.to_string().contains("401"));
    }
}
