//! `trellosa stats`: per-list card counts and triage-label coverage.

use serde::Serialize;

use super::{Context, Output, json_of};
use crate::Result;
use crate::diagnostics::{Category, Diagnostics};
use crate::models::{LABEL_ACTION_REQUIRED, LABEL_OK, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListStats {
    pub list_id: String,
    pub name: String,
    pub closed: bool,
    pub active_cards: usize,
    pub inactive_cards: usize,
    pub security_label_ok: usize,
    pub security_label_action: usize,
    pub security_label_missing: usize,
}

#[derive(Serialize)]
pub struct StatsResult {
    pub handle: String,
    pub lists: Vec<ListStats>,
    pub diagnostics: Diagnostics,
}

impl Output for StatsResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Snapshot {}", self.handle)];
        for l in &self.lists {
            lines.push(format!(
                "{}{}: {} active, {} archived | OK {}, action required {}, missing {}",
                l.name,
                if l.closed { " (closed)" } else { "" },
                l.active_cards,
                l.inactive_cards,
                l.security_label_ok,
                l.security_label_action,
                l.security_label_missing
            ));
        }
        lines.join("\n")
    }
}

/// Count cards per list. Closed lists are skipped unless `include_closed`.
pub fn list_stats(
    snapshot: &Snapshot,
    include_closed: bool,
    diag: &mut Diagnostics,
) -> Vec<ListStats> {
    let mut result: Vec<ListStats> = snapshot
        .lists
        .values()
        .filter(|list| include_closed || !list.closed)
        .map(|list| {
            let mut stats = ListStats {
                list_id: list.id.clone(),
                name: list.name.clone(),
                closed: list.closed,
                ..Default::default()
            };
            for card in snapshot.cards.values().filter(|c| c.id_list == list.id) {
                if card.closed {
                    stats.inactive_cards += 1;
                    continue;
                }
                stats.active_cards += 1;
                let mut triaged = false;
                for label in card.labels.iter().filter(|l| l.is_triage_label()) {
                    match label.name.as_str() {
                        LABEL_OK => stats.security_label_ok += 1,
                        LABEL_ACTION_REQUIRED => stats.security_label_action += 1,
                        other => {
                            diag.warn(
                                Category::UnrecognizedValue,
                                format!("Unknown label `{}` on card {}", other, card.short_url),
                            )
                            .with("card", &card.short_url);
                            continue;
                        }
                    }
                    triaged = true;
                }
                if !triaged {
                    stats.security_label_missing += 1;
                }
            }
            stats
        })
        .collect();
    result.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.list_id.cmp(&b.list_id)));
    result
}

pub fn stats(ctx: &Context, snapshot: &str, all: bool) -> Result<StatsResult> {
    let store = ctx.store()?;
    let tags = ctx.tags()?;
    let (handle, content) = ctx.load(&store, &tags, snapshot, true)?;

    let mut diagnostics = Diagnostics::new();
    let lists = list_stats(&content, all, &mut diagnostics);
    diagnostics.emit();

    Ok(StatsResult {
        handle: handle.to_string(),
        lists,
        diagnostics,
    })
}
