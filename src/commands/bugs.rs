//! `trellosa bugs`: dump the tracker bugs belonging to the board.

use serde::Serialize;

use super::{Context, Output, json_of};
use crate::Result;
use crate::models::TrackerSnapshot;
use crate::remote::{TrackerApi, TrackerFilter};

#[derive(Serialize)]
pub struct BugsResult {
    pub filter: TrackerFilter,
    pub tracker: TrackerSnapshot,
}

impl Output for BugsResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{} bugs in {} :: {}",
            self.tracker.bugs.len(),
            self.filter.product,
            self.filter.component
        )];
        let mut bugs: Vec<_> = self.tracker.bugs.values().collect();
        bugs.sort_by_key(|b| b.id);
        for bug in bugs {
            let state = if bug.resolution.is_empty() {
                bug.status.clone()
            } else {
                format!("{} {}", bug.status, bug.resolution)
            };
            lines.push(format!("{} [{}] {}", bug.link(), state, bug.summary));
        }
        lines.join("\n")
    }
}

pub fn bugs(ctx: &Context) -> Result<BugsResult> {
    let filter = ctx.config.tracker_filter();
    let tracker = ctx.bugzilla()?.fetch_tracker_snapshot(&filter)?;
    Ok(BugsResult { filter, tracker })
}
