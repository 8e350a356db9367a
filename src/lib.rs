//! trellosa - A security triage assistant for a Trello board backed by Bugzilla.
//!
//! This library provides the core functionality for the `trellosa` CLI tool:
//! snapshot storage, structural diffs between snapshots, triage classification,
//! and the reconciliation engine keeping board cards and tracker bugs consistent.

pub mod cli;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod storage;
pub mod triage;


/// Library-level error type for trellosa operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Kdl(#[from] kdl::KdlError),

    #[error("Invalid snapshot reference `{0}`")]
    InvalidReference(String),

    #[error("Invalid tag `{0}`: tags are alphanumeric and not purely numeric")]
    InvalidTag(String),

    #[error("Invalid snapshot handle `{0}`")]
    InvalidHandle(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("No {0} access token configured. Use `trellosa setup` or pass it on the command line")]
    MissingToken(&'static str),

    #[error("Board is missing {0}, can't live without it")]
    BoardSchema(String),

    #[error("Tracker vocabulary is missing catch-all value `{0}`")]
    Vocabulary(String),

    #[error(transparent)]
    Remote(#[from] remote::RemoteError),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for trellosa operations.
pub type Result<T> = std::result::Result<T, Error>;
