//! Sync of tracker issue metadata from the board.
//!
//! The board is authoritative for which card a bug belongs to and for the
//! Firefox version it targets.

use std::collections::HashMap;

use crate::diagnostics::{Category, Diagnostics};
use crate::models::parse::{parse_card_url, parse_firefox_version};
use crate::models::{Bug, Card, Snapshot, TrackerSnapshot};

use super::{MetadataUpdateProposal, PlanContext, VersionTarget};

/// Propose URL backfills for orphaned bugs and version updates for linked ones.
///
/// Proposals come out ordered by bug id.
pub fn plan_metadata_sync(
    board: &Snapshot,
    tracker: &TrackerSnapshot,
    ctx: &PlanContext<'_>,
    diag: &mut Diagnostics,
) -> Vec<MetadataUpdateProposal> {
    let by_url: HashMap<&str, &Card> = board
        .cards
        .values()
        .map(|card| (card.short_url.as_str(), card))
        .collect();

    let mut bugs: Vec<&Bug> = tracker.bugs.values().collect();
    bugs.sort_by_key(|bug| bug.id);

    let mut proposals = Vec::new();
    for bug in bugs {
        let card_url = parse_card_url(&bug.url);
        if let Some(url) = card_url.as_ref().filter(|u| u.has_trailing_path) {
            diag.debug(
                Category::LongUrl,
                format!("Bug {} `{}` has long card URL", bug.link(), bug.summary),
            )
            .with("bug", bug.id.to_string())
            .with("card_url", url.base.as_str());
        }

        match card_url.and_then(|u| by_url.get(u.base.as_str()).copied()) {
            Some(card) => {
                if let Some(p) = version_update(board, bug, card, ctx, diag) {
                    proposals.push(p);
                }
            }
            None => {
                if let Some(p) = resolve_orphan(board, bug, ctx, diag) {
                    proposals.push(p);
                }
            }
        }
    }
    proposals
}

fn resolve_orphan(
    board: &Snapshot,
    bug: &Bug,
    ctx: &PlanContext<'_>,
    diag: &mut Diagnostics,
) -> Option<MetadataUpdateProposal> {
    diag.warn(
        Category::Orphan,
        format!("Bug {} `{}` is not associated with a card", bug.link(), bug.summary),
    )
    .with("bug", bug.id.to_string());

    let id = bug.id.to_string();
    let linked: Vec<&Card> = board
        .cards
        .values()
        .filter(|card| ctx.lookup.bug_id(card).as_deref() == Some(id.as_str()))
        .collect();

    match linked.as_slice() {
        [] => None,
        [card] => {
            diag.info(
                Category::Orphan,
                format!(
                    "Card `{}` {} is associated with {}",
                    card.name,
                    card.short_url,
                    bug.link()
                ),
            )
            .with("bug", id.as_str())
            .with("card", card.id.as_str());
            Some(MetadataUpdateProposal::BackfillUrl {
                bug_id: bug.id,
                card_id: card.id.clone(),
                card_name: card.name.clone(),
                card_url: card.short_url.clone(),
            })
        }
        many => {
            let urls: Vec<&str> = many.iter().map(|c| c.short_url.as_str()).collect();
            diag.warn(
                Category::Ambiguity,
                format!(
                    "Multiple cards point to {}: {}, fix manually",
                    bug.link(),
                    urls.join(", ")
                ),
            )
            .with("bug", id.as_str())
            .with("cards", urls.join(","));
            None
        }
    }
}

fn version_update(
    board: &Snapshot,
    bug: &Bug,
    card: &Card,
    ctx: &PlanContext<'_>,
    diag: &mut Diagnostics,
) -> Option<MetadataUpdateProposal> {
    let Some(list_name) = board.list_name_of(card) else {
        diag.warn(
            Category::DroppedList,
            format!("Card {} references list {} which is gone", card.short_url, card.id_list),
        )
        .with("card", card.id.as_str())
        .with("bug", bug.id.to_string());
        return None;
    };

    let firefox_version = parse_firefox_version(list_name);
    let to = ctx.vocabulary.target_for(firefox_version.as_deref());
    let from = VersionTarget {
        version: bug.version.clone(),
        target_milestone: bug.target_milestone.clone(),
    };
    if from == to {
        return None;
    }

    if firefox_version.is_none() {
        diag.warn(
            Category::Unversioned,
            format!(
                "Card {} in list `{}` has no Firefox version, flagged for manual review",
                card.short_url, list_name
            ),
        )
        .with("card", card.id.as_str())
        .with("bug", bug.id.to_string());
    }

    Some(MetadataUpdateProposal::UpdateVersion {
        bug_id: bug.id,
        card_id: card.id.clone(),
        card_url: card.short_url.clone(),
        needs_review: firefox_version.is_none(),
        firefox_version,
        from,
        to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::TriageLookup;
    use crate::reconcile::vocabulary::test_vocabulary;
    use crate::test_utils::{board, bug, card};

    fn run(b: &Snapshot) -> (Vec<MetadataUpdateProposal>, Diagnostics) {
        let lookup = TriageLookup::from_snapshot(b).unwrap();
        let vocabulary = test_vocabulary();
        let ctx = PlanContext {
            lookup: &lookup,
            vocabulary: &vocabulary,
        };
        let mut diag = Diagnostics::new();
        let proposals = plan_metadata_sync(b, &b.tracker(), &ctx, &mut diag);
        (proposals, diag)
    }

    fn versioned(mut b: Bug, version: &str, milestone: &str) -> Bug {
        b.version = version.to_string();
        b.target_milestone = milestone.to_string();
        b
    }

    #[test]
    fn test_matching_bug_needs_nothing() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", Some("bug 1")));
        b.add_bug(versioned(
            bug(1, "NEW", "", "https://trello.com/c/c1"),
            "Firefox 91",
            "Firefox 91",
        ));
        let (proposals, diag) = run(&b);
        assert!(proposals.is_empty());
        assert!(diag.is_empty());
    }

    #[test]
    fn test_moved_card_proposes_version_update() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-92", Some("bug 1")));
        b.add_bug(versioned(
            bug(1, "NEW", "", "https://trello.com/c/c1"),
            "Firefox 91",
            "Firefox 91",
        ));
        let (proposals, _) = run(&b);
        assert_eq!(proposals.len(), 1);
        let MetadataUpdateProposal::UpdateVersion { from, to, needs_review, .. } = &proposals[0]
        else {
            panic!("expected a version update");
        };
        assert_eq!(from.version, "Firefox 91");
        assert_eq!(to.version, "Firefox 92");
        assert_eq!(to.target_milestone, "Future");
        assert!(!needs_review);
    }

    #[test]
    fn test_long_url_is_tolerated() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", Some("bug 1")));
        b.add_bug(versioned(
            bug(1, "NEW", "", "https://trello.com/c/c1/42-shiny-feature"),
            "Firefox 91",
            "Firefox 91",
        ));
        let (proposals, diag) = run(&b);
        assert!(proposals.is_empty());
        assert_eq!(diag.of(Category::LongUrl).count(), 1);
        assert_eq!(diag.of(Category::Orphan).count(), 0);
    }

    #[test]
    fn test_orphan_with_single_linked_card_backfills_url() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", Some("bug 1")));
        b.add_bug(bug(1, "NEW", "", ""));
        let (proposals, diag) = run(&b);
        assert_eq!(
            proposals,
            vec![MetadataUpdateProposal::BackfillUrl {
                bug_id: 1,
                card_id: "c1".to_string(),
                card_name: "Shiny".to_string(),
                card_url: "https://trello.com/c/c1".to_string(),
            }]
        );
        assert!(diag.of(Category::Orphan).count() >= 1);
    }

    #[test]
    fn test_orphan_with_two_linked_cards_is_ambiguous() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", Some("bug 1234")));
        b.add_card(card("c2", "Shiny again", "l-92", Some("Bug 1234")));
        b.add_bug(bug(1234, "NEW", "", ""));
        let (proposals, diag) = run(&b);
        assert!(proposals.is_empty());
        let ambiguity: Vec<_> = diag.of(Category::Ambiguity).collect();
        assert_eq!(ambiguity.len(), 1);
        assert!(ambiguity[0].message.contains("https://trello.com/c/c1"));
        assert!(ambiguity[0].message.contains("https://trello.com/c/c2"));
    }

    #[test]
    fn test_orphan_without_linked_card_is_reported() {
        let mut b = board(0);
        b.add_bug(bug(7, "NEW", "", "https://example.com/elsewhere"));
        let (proposals, diag) = run(&b);
        assert!(proposals.is_empty());
        assert_eq!(diag.of(Category::Orphan).count(), 1);
    }

    #[test]
    fn test_unversioned_list_flags_review() {
        let mut b = board(0);
        b.add_card(card("c1", "Idea", "l-backlog", Some("bug 1")));
        b.add_bug(versioned(
            bug(1, "NEW", "", "https://trello.com/c/c1"),
            "Firefox 91",
            "---",
        ));
        let (proposals, diag) = run(&b);
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].needs_review());
        assert_eq!(diag.of(Category::Unversioned).count(), 1);
    }
}
