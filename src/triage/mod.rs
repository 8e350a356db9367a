//! Triage classification of a snapshot diff.
//!
//! Turns a structural diff of the `cards` collection into four business
//! categories, always reported in this order:
//! - new cards
//! - moved cards (their `idList` changed)
//! - reopened or archived cards (their `closed` flag changed)
//! - deleted cards
//!
//! Within a category, summaries are sorted by card name, then card id.

use serde::Serialize;

use crate::diagnostics::{Category, Diagnostics};
use crate::diff::{Diff, ObjectDiff};
use crate::models::{Card, Snapshot};

/// One card as shown in a triage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSummary {
    pub card_id: String,
    pub card_name: String,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_list: Option<String>,
    pub card_url: String,
    /// New value of the `closed` flag, for status changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
}

impl CardSummary {
    fn from_card(card: &Card) -> Self {
        Self {
            card_id: card.id.clone(),
            card_name: card.name.clone(),
            labels: card.label_names(),
            from_list: None,
            to_list: None,
            card_url: card.short_url.clone(),
            closed: None,
        }
    }
}

/// Classified changes between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriageReport {
    pub new_cards: Vec<CardSummary>,
    pub moved_cards: Vec<CardSummary>,
    pub reopened_or_closed_cards: Vec<CardSummary>,
    pub deleted_cards: Vec<CardSummary>,
}

impl TriageReport {
    pub fn is_empty(&self) -> bool {
        self.new_cards.is_empty()
            && self.moved_cards.is_empty()
            && self.reopened_or_closed_cards.is_empty()
            && self.deleted_cards.is_empty()
    }

    /// Categories in report order with their display titles.
    pub fn sections(&self) -> [(&'static str, &[CardSummary]); 4] {
        [
            ("New cards", &self.new_cards),
            ("Moved cards", &self.moved_cards),
            ("Reopened or archived cards", &self.reopened_or_closed_cards),
            ("Deleted cards", &self.deleted_cards),
        ]
    }
}

/// Classify the card changes in `diff`, computed from `a` to `b`.
pub fn classify(a: &Snapshot, b: &Snapshot, diff: &Diff, diag: &mut Diagnostics) -> TriageReport {
    let mut report = TriageReport::default();
    let Some(cards) = diff.child("cards") else {
        return report;
    };

    for id in cards.inserted.keys() {
        let Some(card) = b.cards.get(id) else {
            continue;
        };
        let mut summary = CardSummary::from_card(card);
        summary.to_list = list_name(b, &card.id_list, card, diag);
        report.new_cards.push(summary);
    }

    for (id, change) in &cards.changed {
        let Diff::Object(fields) = change else {
            continue;
        };
        let (Some(old), Some(new)) = (a.cards.get(id), b.cards.get(id)) else {
            continue;
        };
        if let Some(summary) = moved(a, b, old, new, fields, diag) {
            report.moved_cards.push(summary);
        }
        if fields.changed.contains_key("closed") {
            let mut summary = CardSummary::from_card(new);
            summary.closed = Some(new.closed);
            summary.to_list = list_name(b, &new.id_list, new, diag);
            report.reopened_or_closed_cards.push(summary);
        }
    }

    for id in cards.deleted.keys() {
        let Some(card) = a.cards.get(id) else {
            continue;
        };
        let mut summary = CardSummary::from_card(card);
        summary.from_list = list_name(a, &card.id_list, card, diag);
        report.deleted_cards.push(summary);
    }

    for section in [
        &mut report.new_cards,
        &mut report.moved_cards,
        &mut report.reopened_or_closed_cards,
        &mut report.deleted_cards,
    ] {
        section.sort_by(|x, y| {
            x.card_name
                .cmp(&y.card_name)
                .then_with(|| x.card_id.cmp(&y.card_id))
        });
    }

    report
}

fn moved(
    a: &Snapshot,
    b: &Snapshot,
    old: &Card,
    new: &Card,
    fields: &ObjectDiff,
    diag: &mut Diagnostics,
) -> Option<CardSummary> {
    if !fields.changed.contains_key("idList") {
        return None;
    }
    let mut summary = CardSummary::from_card(new);
    summary.from_list = list_name(a, &old.id_list, old, diag);
    summary.to_list = list_name(b, &new.id_list, new, diag);
    Some(summary)
}

fn list_name(
    snapshot: &Snapshot,
    list_id: &str,
    card: &Card,
    diag: &mut Diagnostics,
) -> Option<String> {
    match snapshot.lists.get(list_id) {
        Some(list) => Some(list.name.clone()),
        None => {
            diag.warn(
                Category::DroppedList,
                format!("Card {} references list {} which is gone", card.short_url, list_id),
            )
            .with("card", card.id.as_str())
            .with("list", list_id);
            None
        }
    }
}
