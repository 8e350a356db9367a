//! Sync of card triage labels from tracker state.

use crate::diagnostics::{Category, Diagnostics};
use crate::models::{Bug, Snapshot, TrackerSnapshot};

use super::{LabelUpdateProposal, TriageLabel, TriageLookup};

const OPEN_STATUSES: &[&str] = &["NEW", "REOPENED", "UNCONFIRMED", "ASSIGNED"];
const DONE_RESOLUTIONS: &[&str] = &["FIXED", "INVALID", "INCOMPLETE", "WONTFIX"];

/// The triage label a card linked to `bug` should carry.
///
/// Duplicates are not reconciled and give `None`. Unknown states default to
/// `Action required` with a warning.
pub fn should_be_label(bug: &Bug, diag: &mut Diagnostics) -> Option<TriageLabel> {
    if bug.resolution == "DUPLICATE" {
        return None;
    }
    let status = bug.status.as_str();
    if OPEN_STATUSES.contains(&status) {
        return Some(TriageLabel::ActionRequired);
    }
    if status != "RESOLVED" {
        diag.warn(
            Category::UnrecognizedValue,
            format!("{} has weird bug status {}", bug.link(), status),
        )
        .with("bug", bug.id.to_string())
        .with("status", status);
        return Some(TriageLabel::ActionRequired);
    }
    let resolution = bug.resolution.as_str();
    if DONE_RESOLUTIONS.contains(&resolution) {
        if resolution == "INCOMPLETE" {
            diag.debug(
                Category::UnrecognizedValue,
                format!("{} has non-standard resolution INCOMPLETE", bug.link()),
            )
            .with("bug", bug.id.to_string());
        }
        return Some(TriageLabel::Ok);
    }
    diag.warn(
        Category::UnrecognizedValue,
        format!("{} has weird bug resolution {}", bug.link(), resolution),
    )
    .with("bug", bug.id.to_string())
    .with("resolution", resolution);
    Some(TriageLabel::ActionRequired)
}

/// Propose label changes for every card whose triage labels disagree with its bug.
pub fn plan_label_sync(
    board: &Snapshot,
    tracker: &TrackerSnapshot,
    lookup: &TriageLookup,
    diag: &mut Diagnostics,
) -> Vec<LabelUpdateProposal> {
    let mut proposals = Vec::new();

    for card in board.cards.values() {
        let Some(bug_id) = lookup.bug_id(card) else {
            continue;
        };
        let Some(bug) = tracker.bugs.get(&bug_id) else {
            diag.warn(
                Category::UnresolvedReference,
                format!(
                    "Card {} references unfetched bug https://bugzil.la/{}",
                    card.short_url, bug_id
                ),
            )
            .with("card", card.id.as_str())
            .with("bug", bug_id.as_str());
            continue;
        };
        let Some(should_be) = should_be_label(bug, diag) else {
            diag.debug(
                Category::Skip,
                format!("Skipping duplicate bug {}", bug.link()),
            )
            .with("bug", bug_id.as_str());
            continue;
        };

        let current = lookup.triage_labels(card);
        if current == [should_be] {
            continue;
        }
        proposals.push(LabelUpdateProposal {
            card_id: card.id.clone(),
            card_name: card.name.clone(),
            card_url: card.short_url.clone(),
            bug_id: bug.id,
            bug_status: bug.status.clone(),
            bug_resolution: bug.resolution.clone(),
            current,
            should_be,
        });
    }

    proposals.sort_by(|a, b| {
        a.card_name
            .cmp(&b.card_name)
            .then_with(|| a.card_id.cmp(&b.card_id))
    });
    proposals
}
