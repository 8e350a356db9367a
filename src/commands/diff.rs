//! `trellosa diff`: compare two snapshots.

use serde::Serialize;

use super::{Context, Output, json_of};
use crate::Result;
use crate::diagnostics::Diagnostics;
use crate::diff::{self as differ, ChangeKind, Diff, FilterMode};
use crate::triage::{CardSummary, TriageReport, classify};

#[derive(Serialize)]
pub struct DiffResult {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TriageReport>,
    pub diagnostics: Diagnostics,
}

impl Output for DiffResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Diff {} .. {}", self.from, self.to)];
        if let Some(diff) = &self.diff {
            let changes = diff.changes();
            if changes.is_empty() {
                lines.push("No changes.".to_string());
            }
            for change in changes {
                let path = change.dotted_path();
                lines.push(match change.kind {
                    ChangeKind::Insert(v) => format!("+ {}: {}", path, v),
                    ChangeKind::Delete(v) => format!("- {}: {}", path, v),
                    ChangeKind::Update { old, new } => format!("~ {}: {} -> {}", path, old, new),
                });
            }
        }
        if let Some(report) = &self.report {
            if report.is_empty() {
                lines.push("No card changes.".to_string());
            }
            for (title, cards) in report.sections() {
                if cards.is_empty() {
                    continue;
                }
                lines.push(format!("{} ({}):", title, cards.len()));
                lines.extend(cards.iter().map(|c| format!("  {}", summary_line(c))));
            }
        }
        lines.join("\n")
    }
}

fn summary_line(card: &CardSummary) -> String {
    let mut line = format!("{} {}", card.card_url, card.card_name);
    match (&card.from_list, &card.to_list) {
        (Some(from), Some(to)) => line.push_str(&format!(" [{} -> {}]", from, to)),
        (None, Some(list)) | (Some(list), None) => line.push_str(&format!(" [{}]", list)),
        (None, None) => {}
    }
    if let Some(closed) = card.closed {
        line.push_str(if closed { " (archived)" } else { " (reopened)" });
    }
    if !card.labels.is_empty() {
        line.push_str(&format!(" {{{}}}", card.labels.join(", ")));
    }
    line
}

/// Diff `from` against `to`, either raw or classified into a triage report.
pub fn diff(
    ctx: &Context,
    from: &str,
    to: &str,
    everything: bool,
    raw: bool,
) -> Result<DiffResult> {
    let store = ctx.store()?;
    let tags = ctx.tags()?;
    let (from_handle, a) = ctx.load(&store, &tags, from, true)?;
    let (to_handle, b) = ctx.load(&store, &tags, to, true)?;
    tracing::debug!("Diffing {} and {}", from_handle, to_handle);

    let mode = if everything {
        FilterMode::Everything
    } else {
        FilterMode::Minimal
    };
    let full = differ::diff(&a, &b)?;
    let filtered = ctx.config.noise_filter().apply(&full, mode);

    let mut diagnostics = Diagnostics::new();
    let (diff, report) = if raw {
        (Some(filtered), None)
    } else {
        (None, Some(classify(&a, &b, &filtered, &mut diagnostics)))
    };
    diagnostics.emit();

    Ok(DiffResult {
        from: from_handle.to_string(),
        to: to_handle.to_string(),
        diff,
        report,
        diagnostics,
    })
}
