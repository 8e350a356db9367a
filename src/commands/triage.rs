//! `trellosa triage`: reconcile board cards with tracker bugs.
//!
//! The baseline (`--from`, default tag `triaged`) tells which cards were
//! already looked at. The target (`--to`, default the live board) must carry
//! tracker data; stored board-only snapshots get the current bugs fetched.
//! Every proposal is confirmed one by one unless `--yes`, which still asks
//! for proposals flagged for manual review.

use serde::Serialize;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Context, Output, json_of};
use crate::diagnostics::Diagnostics;
use crate::models::{Handle, Snapshot};
use crate::reconcile::{
    Applier, ApplyReport, PlanContext, PlanScope, Proposal, TriageLookup, plan,
};
use crate::remote::TrackerApi;
use crate::storage::{SnapshotStore, TagStore};
use crate::{Error, Result};

/// Default baseline tag.
pub const TRIAGED_TAG: &str = "triaged";

/// Asks the operator whether to apply a proposal.
pub trait Confirm {
    fn confirm(&mut self, proposal: &Proposal) -> Result<bool>;
}

/// Prompts on stderr and reads the answer from stdin. End of input means no.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, proposal: &Proposal) -> Result<bool> {
        let mut stderr = std::io::stderr();
        writeln!(stderr, "{}", proposal.describe())?;
        if proposal.needs_review() {
            writeln!(stderr, "This proposal needs manual review:")?;
            writeln!(
                stderr,
                "{}",
                serde_json::to_string_pretty(proposal).unwrap_or_default()
            )?;
        }
        write!(stderr, "Apply? (y/N) ")?;
        stderr.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_lowercase().starts_with('y'))
    }
}

#[derive(Debug, Clone)]
pub struct TriageOptions {
    pub from: String,
    pub to: String,
    /// Also consider cards already present in the baseline
    pub all: bool,
    pub yes: bool,
    pub dry_run: bool,
    pub scope: PlanScope,
}

impl Default for TriageOptions {
    fn default() -> Self {
        Self {
            from: TRIAGED_TAG.to_string(),
            to: "0".to_string(),
            all: false,
            yes: false,
            dry_run: false,
            scope: PlanScope::default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlannedProposal {
    pub description: String,
    pub needs_review: bool,
    #[serde(flatten)]
    pub proposal: Proposal,
}

#[derive(Debug, Serialize)]
pub struct TriageResult {
    pub from: String,
    pub to: String,
    pub dry_run: bool,
    pub proposals: Vec<PlannedProposal>,
    pub declined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ApplyReport>,
    pub diagnostics: Diagnostics,
}

impl Output for TriageResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.proposals.is_empty() {
            lines.push(format!("Nothing to do between {} and {}", self.from, self.to));
            return lines.join("\n");
        }
        if self.dry_run {
            lines.push(format!("{} proposals:", self.proposals.len()));
            for p in &self.proposals {
                let review = if p.needs_review { " [needs review]" } else { "" };
                lines.push(format!("  {}{}", p.description, review));
            }
            return lines.join("\n");
        }
        if let Some(report) = &self.report {
            for applied in &report.applied {
                lines.push(format!("Applied: {}", applied.description));
            }
            for failed in &report.failed {
                lines.push(format!("FAILED: {}: {}", failed.description, failed.error));
                for step in &failed.completed {
                    lines.push(format!("  already done: {}", step));
                }
            }
            if report.interrupted {
                lines.push(format!(
                    "Interrupted, {} approved proposals not applied",
                    report.skipped
                ));
            }
        }
        if self.declined > 0 {
            lines.push(format!("Declined {} proposals", self.declined));
        }
        lines.join("\n")
    }
}

/// Split proposals into approved ones and a count of declined ones.
///
/// `--yes` approves everything except proposals flagged for manual review,
/// which always go through `confirm`. Stops asking once `interrupted` is set.
pub fn select_approved(
    proposals: Vec<Proposal>,
    yes: bool,
    confirm: &mut dyn Confirm,
    interrupted: &AtomicBool,
) -> Result<(Vec<Proposal>, usize)> {
    let mut approved = Vec::new();
    let mut declined = 0;
    for proposal in proposals {
        if interrupted.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }
        let accept = if yes && !proposal.needs_review() {
            true
        } else {
            confirm.confirm(&proposal)?
        };
        if accept {
            approved.push(proposal);
        } else {
            tracing::info!("Skipping: {}", proposal.describe());
            declined += 1;
        }
    }
    Ok((approved, declined))
}

fn load_baseline(
    ctx: &Context,
    store: &SnapshotStore,
    tags: &TagStore,
    reference: &str,
) -> Result<(Handle, Snapshot)> {
    match ctx.load(store, tags, reference, true) {
        Err(Error::InvalidReference(r)) if r == TRIAGED_TAG => Err(Error::InvalidInput(format!(
            "No `{}` snapshot yet. Tag the baseline with `trellosa tag --add {}` first",
            TRIAGED_TAG, TRIAGED_TAG
        ))),
        other => other,
    }
}

pub fn triage(
    ctx: &Context,
    opts: &TriageOptions,
    confirm: &mut dyn Confirm,
    interrupted: &AtomicBool,
) -> Result<TriageResult> {
    let store = ctx.store()?;
    let tags = ctx.tags()?;

    let (from_handle, prior) = load_baseline(ctx, &store, &tags, &opts.from)?;
    let (to_handle, mut board) = ctx.load(&store, &tags, &opts.to, false)?;
    if !board.has_tracker_data() {
        tracing::info!("Snapshot {} carries no bugs, fetching them", to_handle);
        ctx.merge_tracker(&mut board)?;
    }

    let bugzilla = ctx.bugzilla()?;
    let vocabulary = bugzilla.fetch_vocabulary(&ctx.config.tracker_filter())?;
    let lookup = TriageLookup::from_snapshot(&board)?;

    let mut diagnostics = Diagnostics::new();
    let plan_ctx = PlanContext {
        lookup: &lookup,
        vocabulary: &vocabulary,
    };
    let proposals = plan(
        &board,
        Some(&prior),
        opts.all,
        opts.scope,
        &plan_ctx,
        &mut diagnostics,
    )
    .into_proposals();
    diagnostics.emit();

    let mut result = TriageResult {
        from: from_handle.to_string(),
        to: to_handle.to_string(),
        dry_run: opts.dry_run,
        proposals: proposals
            .iter()
            .map(|p| PlannedProposal {
                description: p.describe(),
                needs_review: p.needs_review(),
                proposal: p.clone(),
            })
            .collect(),
        declined: 0,
        report: None,
        diagnostics,
    };
    if opts.dry_run || proposals.is_empty() {
        return Ok(result);
    }

    let (approved, declined) = select_approved(proposals, opts.yes, confirm, interrupted)?;
    result.declined = declined;

    let trello = ctx.trello()?;
    let applier = Applier {
        board: &trello,
        tracker: &bugzilla,
        lookup: &lookup,
    };
    let report = applier.apply_all(approved, interrupted);
    for failed in &report.failed {
        tracing::error!("{}: {}", failed.description, failed.error);
    }
    result.report = Some(report);
    Ok(result)
}
