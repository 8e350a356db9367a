//! Reconciliation engine between board cards and tracker bugs.
//!
//! Planning is pure: the `plan_*` functions inspect snapshots and return
//! proposals, pushing anything noteworthy into a [`Diagnostics`] sink.
//! Applying approved proposals is a separate step (see [`apply`]) that talks
//! to the remote APIs.
//!
//! Three independent proposal kinds exist:
//! - issue creation for cards without a tracker reference (board -> tracker)
//! - metadata sync of bug URL, version and milestone (board is authoritative)
//! - label sync of the card's triage label (tracker is authoritative)
//!
//! Planning never assumes earlier applied writes are reflected in the
//! snapshots it is given, so converging fully may take more than one run.

pub mod apply;
pub mod issues;
pub mod labels;
pub mod metadata;
pub mod vocabulary;

pub use apply::{Applied, Applier, ApplyError, ApplyReport, ApplyStep, Failed, apply_proposal};
pub use issues::plan_new_issues;
pub use labels::{plan_label_sync, should_be_label};
pub use metadata::plan_metadata_sync;
pub use vocabulary::{TrackerVocabulary, VersionTarget};

use serde::Serialize;
use std::fmt;

use crate::diagnostics::Diagnostics;
use crate::models::parse::extract_bug_id;
use crate::models::{Card, LABEL_ACTION_REQUIRED, LABEL_OK, SECURITY_NOTES_FIELD, Snapshot};
use crate::remote::IssueFields;
use crate::{Error, Result};

/// The two well-known triage labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriageLabel {
    Ok,
    ActionRequired,
}

impl TriageLabel {
    /// Board label name.
    pub fn name(self) -> &'static str {
        match self {
            TriageLabel::Ok => LABEL_OK,
            TriageLabel::ActionRequired => LABEL_ACTION_REQUIRED,
        }
    }

    /// The label this one replaces.
    pub fn other(self) -> TriageLabel {
        match self {
            TriageLabel::Ok => TriageLabel::ActionRequired,
            TriageLabel::ActionRequired => TriageLabel::Ok,
        }
    }
}

impl fmt::Display for TriageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Board ids of the well-known field and labels, resolved once per board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageLookup {
    pub security_notes_field: String,
    pub ok_label: String,
    pub action_required_label: String,
}

impl TriageLookup {
    /// Resolve the well-known names in a board snapshot. Names match case-insensitively.
    pub fn from_snapshot(board: &Snapshot) -> Result<Self> {
        let field = board
            .custom_fields
            .values()
            .find(|f| f.name.eq_ignore_ascii_case(SECURITY_NOTES_FIELD))
            .ok_or_else(|| Error::BoardSchema(format!("custom field `{}`", SECURITY_NOTES_FIELD)))?;
        let label = |name: &str| {
            board
                .labels
                .values()
                .find(|l| l.name.eq_ignore_ascii_case(name))
                .map(|l| l.id.clone())
                .ok_or_else(|| Error::BoardSchema(format!("label `{}`", name)))
        };
        Ok(Self {
            security_notes_field: field.id.clone(),
            ok_label: label(LABEL_OK)?,
            action_required_label: label(LABEL_ACTION_REQUIRED)?,
        })
    }

    pub fn label_id(&self, label: TriageLabel) -> &str {
        match label {
            TriageLabel::Ok => &self.ok_label,
            TriageLabel::ActionRequired => &self.action_required_label,
        }
    }

    /// The card's security note text, if any.
    pub fn security_note<'a>(&self, card: &'a Card) -> Option<&'a str> {
        card.custom_text(&self.security_notes_field)
    }

    /// Bug id referenced by the card's security note.
    pub fn bug_id(&self, card: &Card) -> Option<String> {
        self.security_note(card).and_then(extract_bug_id)
    }

    /// Triage labels on the card, in card order.
    pub fn triage_labels(&self, card: &Card) -> Vec<TriageLabel> {
        card.labels
            .iter()
            .filter_map(|l| {
                if l.id == self.action_required_label {
                    Some(TriageLabel::ActionRequired)
                } else if l.id == self.ok_label {
                    Some(TriageLabel::Ok)
                } else {
                    None
                }
            })
            .collect()
    }
}

/// A card that needs a new tracker issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueCreationProposal {
    pub card_id: String,
    pub card_name: String,
    pub card_url: String,
    pub list_name: Option<String>,
    pub firefox_version: Option<String>,
    pub current_labels: Vec<TriageLabel>,
    pub fields: IssueFields,
    /// No Firefox version could be derived; the catch-all values were used
    pub needs_review: bool,
}

/// A tracker issue whose fields disagree with its card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MetadataUpdateProposal {
    /// Orphaned issue linked from exactly one card's security note
    BackfillUrl {
        bug_id: u64,
        card_id: String,
        card_name: String,
        card_url: String,
    },
    /// Version or milestone differs from what the card's list implies
    UpdateVersion {
        bug_id: u64,
        card_id: String,
        card_url: String,
        firefox_version: Option<String>,
        from: VersionTarget,
        to: VersionTarget,
        needs_review: bool,
    },
}

impl MetadataUpdateProposal {
    pub fn bug_id(&self) -> u64 {
        match self {
            MetadataUpdateProposal::BackfillUrl { bug_id, .. }
            | MetadataUpdateProposal::UpdateVersion { bug_id, .. } => *bug_id,
        }
    }

    pub fn needs_review(&self) -> bool {
        match self {
            MetadataUpdateProposal::BackfillUrl { .. } => false,
            MetadataUpdateProposal::UpdateVersion { needs_review, .. } => *needs_review,
        }
    }
}

/// A card whose triage label disagrees with its bug's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelUpdateProposal {
    pub card_id: String,
    pub card_name: String,
    pub card_url: String,
    pub bug_id: u64,
    pub bug_status: String,
    pub bug_resolution: String,
    pub current: Vec<TriageLabel>,
    pub should_be: TriageLabel,
}

/// Any proposal, in the form the apply loop consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "proposal", rename_all = "kebab-case")]
pub enum Proposal {
    Issue(IssueCreationProposal),
    Metadata(MetadataUpdateProposal),
    Label(LabelUpdateProposal),
}

impl Proposal {
    /// Flagged proposals are never accepted without an explicit answer.
    pub fn needs_review(&self) -> bool {
        match self {
            Proposal::Issue(p) => p.needs_review,
            Proposal::Metadata(p) => p.needs_review(),
            Proposal::Label(_) => false,
        }
    }

    /// One-line description for confirmation prompts.
    pub fn describe(&self) -> String {
        match self {
            Proposal::Issue(p) => match &p.firefox_version {
                Some(v) => format!(
                    "Create bug `{}` for card {} (Firefox {})",
                    p.fields.summary, p.card_url, v
                ),
                None => format!(
                    "Create bug `{}` for card {} in list `{}` (no Firefox version, using {} / {})",
                    p.fields.summary,
                    p.card_url,
                    p.list_name.as_deref().unwrap_or("?"),
                    p.fields.version,
                    p.fields.target_milestone
                ),
            },
            Proposal::Metadata(MetadataUpdateProposal::BackfillUrl {
                bug_id, card_url, ..
            }) => format!("Set URL of https://bugzil.la/{} to {}", bug_id, card_url),
            Proposal::Metadata(MetadataUpdateProposal::UpdateVersion {
                bug_id, from, to, ..
            }) => format!(
                "Update https://bugzil.la/{} from `{} / {}` to `{} / {}`",
                bug_id, from.version, from.target_milestone, to.version, to.target_milestone
            ),
            Proposal::Label(p) => {
                let current = if p.current.is_empty() {
                    "no triage label".to_string()
                } else {
                    p.current
                        .iter()
                        .map(|l| format!("`{}`", l))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let state = if p.bug_resolution.is_empty() {
                    p.bug_status.clone()
                } else {
                    format!("{} {}", p.bug_status, p.bug_resolution)
                };
                format!(
                    "Card {} has {}, but should have `{}` (https://bugzil.la/{} is {})",
                    p.card_url, current, p.should_be, p.bug_id, state
                )
            }
        }
    }
}

/// All proposals of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub issues: Vec<IssueCreationProposal>,
    pub metadata: Vec<MetadataUpdateProposal>,
    pub labels: Vec<LabelUpdateProposal>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.metadata.is_empty() && self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len() + self.metadata.len() + self.labels.len()
    }

    /// Flatten into apply order: issues, then metadata, then labels.
    pub fn into_proposals(self) -> Vec<Proposal> {
        self.issues
            .into_iter()
            .map(Proposal::Issue)
            .chain(self.metadata.into_iter().map(Proposal::Metadata))
            .chain(self.labels.into_iter().map(Proposal::Label))
            .collect()
    }
}

/// Inputs shared by all planners.
pub struct PlanContext<'a> {
    pub lookup: &'a TriageLookup,
    pub vocabulary: &'a TrackerVocabulary,
}

/// Which proposal kinds to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanScope {
    pub issues: bool,
    pub metadata: bool,
    pub labels: bool,
}

impl Default for PlanScope {
    fn default() -> Self {
        Self {
            issues: true,
            metadata: true,
            labels: true,
        }
    }
}

/// Run every planner in `scope` against a board snapshot carrying tracker data.
pub fn plan(
    board: &Snapshot,
    prior: Option<&Snapshot>,
    allow_retriage: bool,
    scope: PlanScope,
    ctx: &PlanContext<'_>,
    diag: &mut Diagnostics,
) -> ReconciliationPlan {
    let tracker = board.tracker();
    let mut plan = ReconciliationPlan::default();
    if scope.issues {
        plan.issues = plan_new_issues(board, prior, allow_retriage, ctx, diag);
    }
    if scope.metadata {
        plan.metadata = plan_metadata_sync(board, &tracker, ctx, diag);
    }
    if scope.labels {
        plan.labels = plan_label_sync(board, &tracker, ctx.lookup, diag);
    }
    plan
}
