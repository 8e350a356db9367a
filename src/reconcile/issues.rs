//! Planning of new tracker issues for cards without a tracker reference.

use crate::diagnostics::{Category, Diagnostics};
use crate::models::parse::{is_canonical_note, parse_firefox_version};
use crate::models::{Card, Snapshot};
use crate::remote::IssueFields;

use super::{IssueCreationProposal, PlanContext};

/// Prefix of every issue summary filed by this tool.
pub const SUMMARY_PREFIX: &str = "Risk Assessment: ";

/// Prefix of the informational lists that never get issues.
pub const ABOUT_LIST_PREFIX: &str = "About";

/// List of cards that are not actionable yet.
pub const BACKLOG_LIST: &str = "Backlog";

/// Propose a tracker issue for every actionable card lacking a reference.
///
/// Cards already present in `prior` are left alone unless `allow_retriage`
/// is set, which also makes backlog cards eligible. Proposals come out
/// sorted by card name, then id.
pub fn plan_new_issues(
    board: &Snapshot,
    prior: Option<&Snapshot>,
    allow_retriage: bool,
    ctx: &PlanContext<'_>,
    diag: &mut Diagnostics,
) -> Vec<IssueCreationProposal> {
    let mut proposals = Vec::new();

    for card in board.cards.values() {
        let note = ctx.lookup.security_note(card);
        if let Some(note) = note.filter(|n| !is_canonical_note(n)) {
            diag.warn(
                Category::NoteFormat,
                format!("Card {} has strange security note format: `{}`", card.short_url, note),
            )
            .with("card", card.id.as_str());
        }

        if ctx.lookup.bug_id(card).is_some() {
            continue;
        }

        if !allow_retriage && prior.is_some_and(|p| p.cards.contains_key(&card.id)) {
            diag.debug(
                Category::Skip,
                format!("Skipping card {} which was already triaged last time", card.short_url),
            )
            .with("card", card.id.as_str());
            continue;
        }

        let Some(list_name) = board.list_name_of(card) else {
            diag.warn(
                Category::DroppedList,
                format!("Card {} references list {} which is gone", card.short_url, card.id_list),
            )
            .with("card", card.id.as_str())
            .with("list", card.id_list.as_str());
            continue;
        };

        if list_name.starts_with(ABOUT_LIST_PREFIX) {
            continue;
        }

        if list_name == BACKLOG_LIST && !allow_retriage {
            diag.debug(Category::Skip, format!("Ignoring backlog card {}", card.short_url))
                .with("card", card.id.as_str());
            continue;
        }

        let firefox_version = parse_firefox_version(list_name);
        if firefox_version.is_none() {
            diag.warn(
                Category::Unversioned,
                format!(
                    "Card {} in list `{}` has no Firefox version, flagged for manual review",
                    card.short_url, list_name
                ),
            )
            .with("card", card.id.as_str())
            .with("list", list_name);
        }

        let target = ctx.vocabulary.target_for(firefox_version.as_deref());
        proposals.push(IssueCreationProposal {
            card_id: card.id.clone(),
            card_name: card.name.clone(),
            card_url: card.short_url.clone(),
            list_name: Some(list_name.to_string()),
            needs_review: firefox_version.is_none(),
            firefox_version,
            current_labels: ctx.lookup.triage_labels(card),
            fields: IssueFields {
                product: ctx.vocabulary.product.clone(),
                component: ctx.vocabulary.component.clone(),
                summary: format!("{}{}", SUMMARY_PREFIX, card.name),
                description: issue_description(card),
                url: card.short_url.clone(),
                version: target.version,
                target_milestone: target.target_milestone,
            },
        });
    }

    proposals.sort_by(|a, b| {
        a.card_name
            .cmp(&b.card_name)
            .then_with(|| a.card_id.cmp(&b.card_id))
    });
    proposals
}

fn issue_description(card: &Card) -> String {
    let desc = card.description.trim();
    if desc.is_empty() {
        card.short_url.clone()
    } else {
        format!("{}\n\n{}", desc, card.short_url)
    }
}
