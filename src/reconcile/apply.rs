//! Applying operator-approved proposals through the remote APIs.
//!
//! Every proposal is applied on its own. A failing remote call stops that
//! proposal only, and the error names the steps that already went through so
//! the operator can finish by hand.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::models::parse::security_note_for;
use crate::remote::{BoardApi, IssueUpdate, RemoteError, TrackerApi};

use super::{
    IssueCreationProposal, LabelUpdateProposal, MetadataUpdateProposal, Proposal, TriageLabel,
    TriageLookup,
};

/// One remote write that went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum ApplyStep {
    IssueCreated { bug_id: u64 },
    NoteWritten { card_id: String, note: String },
    LabelAdded { card_id: String, label: TriageLabel },
    LabelRemoved { card_id: String, label: TriageLabel },
    IssueUpdated { bug_id: u64 },
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyStep::IssueCreated { bug_id } => write!(f, "created https://bugzil.la/{}", bug_id),
            ApplyStep::NoteWritten { card_id, note } => {
                write!(f, "wrote note `{}` on card {}", note, card_id)
            }
            ApplyStep::LabelAdded { card_id, label } => {
                write!(f, "added `{}` to card {}", label, card_id)
            }
            ApplyStep::LabelRemoved { card_id, label } => {
                write!(f, "removed `{}` from card {}", label, card_id)
            }
            ApplyStep::IssueUpdated { bug_id } => write!(f, "updated https://bugzil.la/{}", bug_id),
        }
    }
}

fn join_steps(steps: &[ApplyStep]) -> String {
    if steps.is_empty() {
        return "nothing".to_string();
    }
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A proposal that failed part way.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The issue exists but the card does not point at it yet.
    #[error(
        "Created https://bugzil.la/{bug_id} but could not link it to card {card_url} ({source}). \
         Completed: {}. Set the security note to `bug {bug_id}` and the triage label manually",
        join_steps(.completed)
    )]
    IssueWithoutBacklink {
        bug_id: u64,
        card_url: String,
        completed: Vec<ApplyStep>,
        #[source]
        source: RemoteError,
    },

    #[error("{action} failed ({source}). Completed: {}", join_steps(.completed))]
    Partial {
        action: String,
        completed: Vec<ApplyStep>,
        #[source]
        source: RemoteError,
    },
}

impl ApplyError {
    pub fn completed(&self) -> &[ApplyStep] {
        match self {
            ApplyError::IssueWithoutBacklink { completed, .. }
            | ApplyError::Partial { completed, .. } => completed,
        }
    }
}

/// A proposal that was fully applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applied {
    pub description: String,
    pub steps: Vec<ApplyStep>,
}

/// A proposal that failed, with what was done before the failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failed {
    pub description: String,
    pub error: String,
    pub completed: Vec<ApplyStep>,
}

/// Outcome of applying a batch of approved proposals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<Applied>,
    pub failed: Vec<Failed>,
    /// Proposals left untouched because the run was interrupted
    pub skipped: usize,
    pub interrupted: bool,
}

/// Remote endpoints plus the board ids the writes refer to.
pub struct Applier<'a> {
    pub board: &'a dyn BoardApi,
    pub tracker: &'a dyn TrackerApi,
    pub lookup: &'a TriageLookup,
}

impl Applier<'_> {
    /// Apply approved proposals in order, stopping early once `interrupted` is set.
    pub fn apply_all(&self, approved: Vec<Proposal>, interrupted: &AtomicBool) -> ApplyReport {
        let mut report = ApplyReport::default();
        let total = approved.len();
        for (i, proposal) in approved.into_iter().enumerate() {
            if interrupted.load(Ordering::SeqCst) {
                report.interrupted = true;
                report.skipped = total - i;
                break;
            }
            let description = proposal.describe();
            match apply_proposal(self, &proposal) {
                Ok(applied) => report.applied.push(applied),
                Err(e) => report.failed.push(Failed {
                    description,
                    error: e.to_string(),
                    completed: e.completed().to_vec(),
                }),
            }
        }
        report
    }
}

/// Apply one approved proposal.
pub fn apply_proposal(applier: &Applier<'_>, proposal: &Proposal) -> Result<Applied, ApplyError> {
    let steps = match proposal {
        Proposal::Issue(p) => apply_issue_creation(applier, p)?,
        Proposal::Metadata(p) => apply_metadata_update(applier, p)?,
        Proposal::Label(p) => apply_label_update(applier, p)?,
    };
    Ok(Applied {
        description: proposal.describe(),
        steps,
    })
}

/// Create the issue, write the backlink note, then flag the card `Action required`.
fn apply_issue_creation(
    applier: &Applier<'_>,
    p: &IssueCreationProposal,
) -> Result<Vec<ApplyStep>, ApplyError> {
    let mut steps = Vec::new();
    let bug_id = applier
        .tracker
        .create_issue(&p.fields)
        .map_err(|source| ApplyError::Partial {
            action: format!("Creating bug for card {}", p.card_url),
            completed: Vec::new(),
            source,
        })?;
    steps.push(ApplyStep::IssueCreated { bug_id });

    let backlink_failed = |steps: &mut Vec<ApplyStep>, source| ApplyError::IssueWithoutBacklink {
        bug_id,
        card_url: p.card_url.clone(),
        completed: std::mem::take(steps),
        source,
    };

    let note = security_note_for(&bug_id.to_string());
    if let Err(source) = applier.board.set_custom_field_text(
        &p.card_id,
        &applier.lookup.security_notes_field,
        &note,
    ) {
        return Err(backlink_failed(&mut steps, source));
    }
    steps.push(ApplyStep::NoteWritten {
        card_id: p.card_id.clone(),
        note,
    });

    if let Err(source) = set_triage_label(
        applier,
        &p.card_id,
        &p.current_labels,
        TriageLabel::ActionRequired,
        &mut steps,
    ) {
        return Err(backlink_failed(&mut steps, source));
    }
    Ok(steps)
}

fn apply_metadata_update(
    applier: &Applier<'_>,
    p: &MetadataUpdateProposal,
) -> Result<Vec<ApplyStep>, ApplyError> {
    let update = match p {
        MetadataUpdateProposal::BackfillUrl { card_url, .. } => IssueUpdate {
            url: Some(card_url.clone()),
            ..Default::default()
        },
        MetadataUpdateProposal::UpdateVersion { to, .. } => IssueUpdate {
            version: Some(to.version.clone()),
            target_milestone: Some(to.target_milestone.clone()),
            ..Default::default()
        },
    };
    let bug_id = p.bug_id();
    applier
        .tracker
        .update_issue(bug_id, &update)
        .map_err(|source| ApplyError::Partial {
            action: format!("Updating https://bugzil.la/{}", bug_id),
            completed: Vec::new(),
            source,
        })?;
    Ok(vec![ApplyStep::IssueUpdated { bug_id }])
}

fn apply_label_update(
    applier: &Applier<'_>,
    p: &LabelUpdateProposal,
) -> Result<Vec<ApplyStep>, ApplyError> {
    let mut steps = Vec::new();
    set_triage_label(applier, &p.card_id, &p.current, p.should_be, &mut steps).map_err(
        |source| ApplyError::Partial {
            action: format!("Setting `{}` on card {}", p.should_be, p.card_url),
            completed: std::mem::take(&mut steps),
            source,
        },
    )?;
    Ok(steps)
}

/// Add `target` unless present, then drop the other triage label if present.
fn set_triage_label(
    applier: &Applier<'_>,
    card_id: &str,
    current: &[TriageLabel],
    target: TriageLabel,
    steps: &mut Vec<ApplyStep>,
) -> Result<(), RemoteError> {
    if !current.contains(&target) {
        applier
            .board
            .add_card_label(card_id, applier.lookup.label_id(target))?;
        steps.push(ApplyStep::LabelAdded {
            card_id: card_id.to_string(),
            label: target,
        });
    }
    let other = target.other();
    if current.contains(&other) {
        applier
            .board
            .remove_card_label(card_id, applier.lookup.label_id(other))?;
        steps.push(ApplyStep::LabelRemoved {
            card_id: card_id.to_string(),
            label: other,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::models::{Snapshot, TrackerSnapshot};
    use crate::reconcile::vocabulary::test_vocabulary;
    use crate::reconcile::{PlanContext, PlanScope, TrackerVocabulary, plan};
    use crate::remote::{IssueFields, TrackerFilter};
    use crate::test_utils::{
        ACTION_LABEL_ID, NOTES_FIELD_ID, OK_LABEL_ID, board, bug, card, with_label,
    };
    use std::cell::RefCell;

    /// Records every call; fails the call whose name matches `fail_on`.
    #[derive(Default)]
    struct FakeRemote {
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
        next_bug_id: u64,
    }

    impl FakeRemote {
        fn failing(call: &'static str) -> Self {
            Self {
                fail_on: Some(call),
                ..Self::default()
            }
        }

        fn record(&self, call: &str, detail: String) -> Result<(), RemoteError> {
            self.calls.borrow_mut().push(format!("{} {}", call, detail));
            if self.fail_on == Some(call) {
                return Err(RemoteError::Http(format!("{} refused", call)));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl BoardApi for FakeRemote {
        fn fetch_board_snapshot(&self) -> Result<Snapshot, RemoteError> {
            Ok(board(0))
        }

        fn set_custom_field_text(
            &self,
            card_id: &str,
            field_id: &str,
            text: &str,
        ) -> Result<(), RemoteError> {
            self.record("note", format!("{} {} {}", card_id, field_id, text))
        }

        fn add_card_label(&self, card_id: &str, label_id: &str) -> Result<(), RemoteError> {
            self.record("add-label", format!("{} {}", card_id, label_id))
        }

        fn remove_card_label(&self, card_id: &str, label_id: &str) -> Result<(), RemoteError> {
            self.record("remove-label", format!("{} {}", card_id, label_id))
        }
    }

    impl TrackerApi for FakeRemote {
        fn fetch_tracker_snapshot(
            &self,
            _filter: &TrackerFilter,
        ) -> Result<TrackerSnapshot, RemoteError> {
            Ok(TrackerSnapshot::new(chrono::Utc::now()))
        }

        fn fetch_vocabulary(
            &self,
            _filter: &TrackerFilter,
        ) -> Result<TrackerVocabulary, RemoteError> {
            Ok(test_vocabulary())
        }

        fn create_issue(&self, fields: &IssueFields) -> Result<u64, RemoteError> {
            self.record("create", fields.summary.clone())?;
            Ok(self.next_bug_id.max(1000))
        }

        fn update_issue(&self, id: u64, update: &IssueUpdate) -> Result<(), RemoteError> {
            let json = serde_json::to_string(update).unwrap_or_default();
            self.record("update", format!("{} {}", id, json))
        }
    }

    fn lookup() -> TriageLookup {
        TriageLookup::from_snapshot(&board(0)).unwrap()
    }

    fn plan_for(b: &Snapshot) -> Vec<Proposal> {
        let lookup = lookup();
        let vocabulary = test_vocabulary();
        let ctx = PlanContext {
            lookup: &lookup,
            vocabulary: &vocabulary,
        };
        let mut diag = Diagnostics::new();
        plan(b, None, false, PlanScope::default(), &ctx, &mut diag).into_proposals()
    }

    #[test]
    fn test_issue_creation_order() {
        let mut b = board(0);
        b.add_card(with_label(card("c1", "Shiny", "l-91", None), OK_LABEL_ID));
        let proposals = plan_for(&b);
        assert_eq!(proposals.len(), 1);

        let remote = FakeRemote::default();
        let lookup = lookup();
        let applier = Applier {
            board: &remote,
            tracker: &remote,
            lookup: &lookup,
        };
        let applied = apply_proposal(&applier, &proposals[0]).unwrap();

        assert_eq!(
            remote.calls(),
            vec![
                "create Risk Assessment: Shiny".to_string(),
                format!("note c1 {} bug 1000", NOTES_FIELD_ID),
                format!("add-label c1 {}", ACTION_LABEL_ID),
                format!("remove-label c1 {}", OK_LABEL_ID),
            ]
        );
        assert_eq!(applied.steps[0], ApplyStep::IssueCreated { bug_id: 1000 });
        assert_eq!(applied.steps.len(), 4);
    }

    #[test]
    fn test_backlink_failure_reports_created_issue() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", None));
        let proposals = plan_for(&b);

        let remote = FakeRemote::failing("note");
        let lookup = lookup();
        let applier = Applier {
            board: &remote,
            tracker: &remote,
            lookup: &lookup,
        };
        let err = apply_proposal(&applier, &proposals[0]).unwrap_err();
        match &err {
            ApplyError::IssueWithoutBacklink {
                bug_id, completed, ..
            } => {
                assert_eq!(*bug_id, 1000);
                assert_eq!(completed, &vec![ApplyStep::IssueCreated { bug_id: 1000 }]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("https://bugzil.la/1000"));
        // no label write after the failed backlink
        assert_eq!(remote.calls().len(), 2);
    }

    #[test]
    fn test_create_failure_has_no_completed_steps() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", None));
        let proposals = plan_for(&b);

        let remote = FakeRemote::failing("create");
        let lookup = lookup();
        let applier = Applier {
            board: &remote,
            tracker: &remote,
            lookup: &lookup,
        };
        let err = apply_proposal(&applier, &proposals[0]).unwrap_err();
        assert!(matches!(err, ApplyError::Partial { .. }));
        assert!(err.completed().is_empty());
    }

    #[test]
    fn test_label_update_only_touches_needed_labels() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", Some("bug 1")));
        b.add_bug(bug(1, "RESOLVED", "FIXED", "https://trello.com/c/c1"));
        let mut v = b.bugs.get("1").cloned().unwrap();
        v.version = "Firefox 91".to_string();
        v.target_milestone = "Firefox 91".to_string();
        b.add_bug(v);

        let proposals = plan_for(&b);
        assert_eq!(proposals.len(), 1);

        let remote = FakeRemote::default();
        let lookup = lookup();
        let applier = Applier {
            board: &remote,
            tracker: &remote,
            lookup: &lookup,
        };
        apply_proposal(&applier, &proposals[0]).unwrap();
        assert_eq!(remote.calls(), vec![format!("add-label c1 {}", OK_LABEL_ID)]);
    }

    #[test]
    fn test_metadata_updates_send_only_changed_fields() {
        let mut b = board(0);
        b.add_card(card("c1", "Shiny", "l-91", Some("bug 1")));
        b.add_bug(bug(1, "NEW", "", ""));
        let proposals: Vec<Proposal> = plan_for(&b)
            .into_iter()
            .filter(|p| matches!(p, Proposal::Metadata(_)))
            .collect();

        let remote = FakeRemote::default();
        let lookup = lookup();
        let applier = Applier {
            board: &remote,
            tracker: &remote,
            lookup: &lookup,
        };
        apply_proposal(&applier, &proposals[0]).unwrap();
        assert_eq!(
            remote.calls(),
            vec![r#"update 1 {"url":"https://trello.com/c/c1"}"#.to_string()]
        );
    }

    #[test]
    fn test_apply_all_continues_after_failure_and_stops_on_interrupt() {
        let mut b = board(0);
        b.add_card(card("c1", "Alpha", "l-91", Some("bug 1")));
        b.add_card(card("c2", "Beta", "l-91", Some("bug 2")));
        b.add_bug(bug(1, "NEW", "", "https://trello.com/c/c1"));
        b.add_bug(bug(2, "NEW", "", "https://trello.com/c/c2"));
        let labels: Vec<Proposal> = plan_for(&b)
            .into_iter()
            .filter(|p| matches!(p, Proposal::Label(_)))
            .collect();
        assert_eq!(labels.len(), 2);

        let remote = FakeRemote::failing("add-label");
        let lookup = lookup();
        let applier = Applier {
            board: &remote,
            tracker: &remote,
            lookup: &lookup,
        };
        let report = applier.apply_all(labels.clone(), &AtomicBool::new(false));
        assert_eq!(report.failed.len(), 2);
        assert!(!report.interrupted);

        let report = applier.apply_all(labels, &AtomicBool::new(true));
        assert!(report.interrupted);
        assert_eq!(report.skipped, 2);
        assert!(report.applied.is_empty());
    }
}
