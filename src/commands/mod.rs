//! Command implementations for the trellosa CLI.
//!
//! Each subcommand lives in its own module and returns a result type
//! implementing [`Output`], so `main` can print it as JSON or human text:
//! - `pull` - Capture the live board into the snapshot database
//! - `log` - List or dump stored snapshots
//! - `tag` - Manage snapshot tags
//! - `diff` - Structural diff or triage report between two snapshots
//! - `triage` - Reconcile board cards with tracker bugs
//! - `stats` - Per-list card and triage-label counts
//! - `query` - Find an entity by id
//! - `bugs` - Dump the tracker bugs belonging to the board
//! - `setup` - Store and check API tokens

pub mod bugs;
pub mod diff;
pub mod log;
pub mod pull;
pub mod query;
pub mod setup;
pub mod stats;
pub mod tag;
pub mod triage;

pub use bugs::{BugsResult, bugs};
pub use diff::{DiffResult, diff};
pub use log::{LogEntry, LogResult, log};
pub use pull::{PullResult, pull};
pub use query::{QueryResult, query};
pub use setup::{SetupResult, setup};
pub use stats::{ListStats, StatsResult, stats};
pub use tag::{TagResult, tag};
pub use triage::{Confirm, StdinConfirm, TriageOptions, TriageResult, triage};

use serde::Serialize;

use crate::Result;
use crate::config::{ResolvedConfig, ResolvedState, TokenOverrides, Workdir, resolve_state};
use crate::models::{Handle, Snapshot};
use crate::remote::{BoardApi, BugzillaClient, TrackerApi, TrelloClient};
use crate::storage::{SnapshotStore, TagStore, resolve_reference};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// JSON rendering shared by all result types.
pub(crate) fn json_of<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Everything a command needs from the environment.
pub struct Context {
    pub workdir: Workdir,
    pub config: ResolvedConfig,
    pub tokens: TokenOverrides,
}

impl Context {
    pub fn new(workdir: Workdir, config: ResolvedConfig, tokens: TokenOverrides) -> Self {
        Self {
            workdir,
            config,
            tokens,
        }
    }

    pub fn store(&self) -> Result<SnapshotStore> {
        SnapshotStore::open(self.workdir.path())
    }

    pub fn tags(&self) -> Result<TagStore> {
        TagStore::open(self.workdir.path())
    }

    pub fn state(&self) -> Result<ResolvedState> {
        resolve_state(&self.workdir, &self.tokens)
    }

    /// Board client for the configured board.
    pub fn trello(&self) -> Result<TrelloClient> {
        let state = self.state()?;
        Ok(TrelloClient::with_base_url(
            &self.config.trello_url.value,
            state.trello_token()?,
            &self.config.board.value,
        ))
    }

    /// Tracker client for the configured instance.
    pub fn bugzilla(&self) -> Result<BugzillaClient> {
        let state = self.state()?;
        Ok(BugzillaClient::new(
            &self.config.bugzilla_url.value,
            state.bugzilla_token()?,
        ))
    }

    /// Capture the live board, with tracker bugs merged in unless `board_only`.
    pub fn fetch_online(&self, board_only: bool) -> Result<Snapshot> {
        tracing::info!("Fetching board `{}`", self.config.board.value);
        let mut snapshot = self.trello()?.fetch_board_snapshot()?;
        if !board_only {
            self.merge_tracker(&mut snapshot)?;
        }
        Ok(snapshot)
    }

    /// Fetch the tracker bugs belonging to the board into `snapshot`.
    pub fn merge_tracker(&self, snapshot: &mut Snapshot) -> Result<()> {
        let filter = self.config.tracker_filter();
        tracing::info!(
            "Fetching bugs in {} :: {}",
            filter.product,
            filter.component
        );
        let tracker = self.bugzilla()?.fetch_tracker_snapshot(&filter)?;
        snapshot.merge_tracker(tracker);
        Ok(())
    }

    /// Resolve a reference and load the snapshot it names.
    pub fn load(
        &self,
        store: &SnapshotStore,
        tags: &TagStore,
        reference: &str,
        board_only: bool,
    ) -> Result<(Handle, Snapshot)> {
        let handle = resolve_reference(store, tags, reference)?;
        let snapshot = match handle {
            Handle::Online => self.fetch_online(board_only)?,
            Handle::Stored(_) => store.read(&handle)?,
        };
        Ok((handle, snapshot))
    }
}
