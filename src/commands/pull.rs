//! `trellosa pull`: capture the live board.

use serde::Serialize;

use super::{Context, Output, json_of};
use crate::Result;
use crate::models::{Handle, Snapshot};

#[derive(Serialize)]
pub struct PullResult {
    pub handle: String,
    /// False for `--dump`
    pub stored: bool,
    pub cards: usize,
    pub lists: usize,
    pub bugs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl PullResult {
    fn new(handle: &Handle, snapshot: &Snapshot, stored: bool) -> Self {
        Self {
            handle: handle.to_string(),
            stored,
            cards: snapshot.cards.len(),
            lists: snapshot.lists.len(),
            bugs: snapshot.bugs.len(),
            snapshot: None,
        }
    }
}

impl Output for PullResult {
    fn to_json(&self) -> String {
        match &self.snapshot {
            Some(snapshot) => json_of(snapshot),
            None => json_of(self),
        }
    }

    fn to_human(&self) -> String {
        if let Some(snapshot) = &self.snapshot {
            return serde_json::to_string_pretty(snapshot).unwrap_or_default();
        }
        format!(
            "Stored snapshot `{}` ({} cards, {} lists, {} bugs)",
            self.handle, self.cards, self.lists, self.bugs
        )
    }
}

/// Capture the live board (and tracker bugs unless `board_only`).
/// With `dump` the capture is returned instead of stored.
pub fn pull(ctx: &Context, dump: bool, board_only: bool) -> Result<PullResult> {
    let snapshot = ctx.fetch_online(board_only)?;
    let handle = snapshot.handle();

    if dump {
        let mut result = PullResult::new(&handle, &snapshot, false);
        result.snapshot = Some(snapshot);
        return Ok(result);
    }

    let store = ctx.store()?;
    tracing::info!("Writing snapshot `{}`", handle);
    let handle = store.write(&snapshot)?;
    Ok(PullResult::new(&handle, &snapshot, true))
}
