//! CLI argument definitions for trellosa.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::reconcile::PlanScope;

/// Version string with the build commit and timestamp.
const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TSA_GIT_COMMIT"),
    " ",
    env!("TSA_BUILD_TIMESTAMP"),
    ")"
);

/// trellosa - Security triage assistant for the Firefox Trello board.
///
/// Start with `trellosa setup` to configure tokens, then `trellosa pull` to
/// capture the board and `trellosa triage` to reconcile it with Bugzilla.
#[derive(Parser, Debug)]
#[command(name = "trellosa")]
#[command(
    author,
    version = VERSION,
    about = "Snapshot a Trello board and reconcile it with Bugzilla",
    long_about = None
)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Working directory holding snapshots, tags, config and tokens.
    /// Can also be set via TRELLOSA_WORKDIR environment variable.
    #[arg(short = 'w', long = "workdir", global = true)]
    pub workdir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Override the Trello board id
    #[arg(long, global = true)]
    pub board: Option<String>,

    /// Override the Trello token
    #[arg(long = "trello-token", global = true)]
    pub trello_token: Option<String>,

    /// Override the Bugzilla API key
    #[arg(long = "bugzilla-token", global = true)]
    pub bugzilla_token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture the live board into the snapshot database
    Pull {
        /// Print the capture instead of storing it
        #[arg(short, long)]
        dump: bool,

        /// Don't fetch Bugzilla bugs
        #[arg(long)]
        board_only: bool,
    },

    /// List stored snapshots, or dump one
    Log {
        /// Snapshot reference to dump
        #[arg(short, long)]
        show: Option<String>,
    },

    /// Manage snapshot tags (lists tags without --add/--remove)
    Tag {
        /// Tag to add
        #[arg(short, long, conflicts_with = "remove")]
        add: Option<String>,

        /// Tag to remove
        #[arg(short, long)]
        remove: Option<String>,

        /// Snapshot reference (default for --add: 1, latest snapshot)
        #[arg(short, long)]
        snapshot: Option<String>,
    },

    /// Show differences between snapshots
    Diff {
        /// Baseline snapshot reference
        #[arg(short = 'a', long = "from", default_value = "1")]
        from: String,

        /// Snapshot reference to compare against (0 is the live board)
        #[arg(short = 'b', long = "to", default_value = "0")]
        to: String,

        /// Don't filter noise
        #[arg(short, long)]
        everything: bool,

        /// Print the structural diff instead of the triage report
        #[arg(long)]
        raw: bool,
    },

    /// Reconcile board cards with Bugzilla bugs
    Triage {
        /// Baseline snapshot reference
        #[arg(short = 'a', long = "from", default_value = "triaged")]
        from: String,

        /// Snapshot reference to triage (0 is the live board)
        #[arg(short = 'b', long = "to", default_value = "0")]
        to: String,

        /// Also consider cards already present during last triage
        #[arg(long)]
        all: bool,

        /// Apply proposals without asking, except those needing review
        #[arg(short, long)]
        yes: bool,

        /// Only print proposals
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Restrict to some proposal kinds (repeatable)
        #[arg(long, value_enum)]
        only: Vec<ProposalKind>,
    },

    /// Per-list card counts and triage-label coverage
    Stats {
        /// Snapshot reference
        #[arg(short, long, default_value = "1")]
        snapshot: String,

        /// Include closed lists
        #[arg(short, long)]
        all: bool,
    },

    /// Find an entity by id
    Query {
        /// Id to look up
        #[arg(short, long)]
        id: String,

        /// Snapshot reference
        #[arg(short, long, default_value = "1")]
        snapshot: String,
    },

    /// Fetch the Bugzilla bugs belonging to the board
    Bugs,

    /// Store tokens given with --trello-token/--bugzilla-token, or show token status
    Setup {
        /// Store tokens without checking them against the services
        #[arg(long)]
        no_verify: bool,
    },
}

/// Proposal kinds for `triage --only`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    Issues,
    Metadata,
    Labels,
}

/// Scope selected by `--only`. Empty means everything.
pub fn plan_scope(only: &[ProposalKind]) -> PlanScope {
    if only.is_empty() {
        return PlanScope::default();
    }
    PlanScope {
        issues: only.contains(&ProposalKind::Issues),
        metadata: only.contains(&ProposalKind::Metadata),
        labels: only.contains(&ProposalKind::Labels),
    }
}
