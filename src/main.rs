//! trellosa CLI - Security triage assistant for a Trello board backed by Bugzilla.

use clap::Parser;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use trellosa::cli::{Cli, Commands, plan_scope};
use trellosa::commands::{self, Context, Output, StdinConfirm, TriageOptions};
use trellosa::config::{
    ConfigOverrides, OutputFormat, TokenOverrides, Workdir, resolve_config, resolve_workdir,
};

/// Environment variable selecting the log filter.
const LOG_ENV: &str = "TRELLOSA_LOG";
/// Environment variable selecting the log format (`json` or `compact`).
const LOG_FORMAT_ENV: &str = "TRELLOSA_LOG_FORMAT";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let interrupted = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&interrupted));

    let mut human = cli.human_readable;
    let result = build_context(&cli).and_then(|ctx| {
        human |= ctx.config.output_format() == OutputFormat::Human;
        run_command(cli.command, &ctx, human, &interrupted)
    });

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "trellosa=debug,info"
        } else {
            "trellosa=info,warn"
        })
    });

    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// First Ctrl-C asks running work to stop between steps, the second one exits.
fn install_interrupt_handler(flag: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            process::exit(130);
        }
        tracing::warn!("Interrupted, stopping after the current step (Ctrl-C again to quit)");
    });
    if let Err(e) = result {
        tracing::warn!("Cannot install Ctrl-C handler: {}", e);
    }
}

fn build_context(cli: &Cli) -> Result<Context, trellosa::Error> {
    let workdir = resolve_workdir(cli.workdir.as_deref())?;
    tracing::debug!(
        "Using workdir {} (from {})",
        workdir.value.display(),
        workdir.source
    );
    let workdir = Workdir::open(&workdir.value)?;

    let mut overrides = ConfigOverrides::new();
    if let Some(board) = &cli.board {
        overrides = overrides.with_board(board.clone());
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    let config = resolve_config(&workdir, &overrides)?;

    let tokens = TokenOverrides {
        trello_token: cli.trello_token.clone(),
        bugzilla_token: cli.bugzilla_token.clone(),
    };
    Ok(Context::new(workdir, config, tokens))
}

fn run_command(
    command: Commands,
    ctx: &Context,
    human: bool,
    interrupted: &AtomicBool,
) -> Result<(), trellosa::Error> {
    match command {
        Commands::Pull { dump, board_only } => {
            let result = commands::pull(ctx, dump, board_only)?;
            output(&result, human);
        }
        Commands::Log { show } => {
            let result = commands::log(ctx, show.as_deref())?;
            output(&result, human);
        }
        Commands::Tag {
            add,
            remove,
            snapshot,
        } => {
            let result =
                commands::tag(ctx, add.as_deref(), remove.as_deref(), snapshot.as_deref())?;
            output(&result, human);
        }
        Commands::Diff {
            from,
            to,
            everything,
            raw,
        } => {
            let result = commands::diff(ctx, &from, &to, everything, raw)?;
            output(&result, human);
        }
        Commands::Triage {
            from,
            to,
            all,
            yes,
            dry_run,
            only,
        } => {
            let opts = TriageOptions {
                from,
                to,
                all,
                yes,
                dry_run,
                scope: plan_scope(&only),
            };
            let result = commands::triage(ctx, &opts, &mut StdinConfirm, interrupted)?;
            let failed = result.report.as_ref().is_some_and(|r| !r.failed.is_empty());
            output(&result, human);
            if failed {
                return Err(trellosa::Error::Other(
                    "Some proposals failed, see the report above".to_string(),
                ));
            }
        }
        Commands::Stats { snapshot, all } => {
            let result = commands::stats(ctx, &snapshot, all)?;
            output(&result, human);
        }
        Commands::Query { id, snapshot } => {
            let result = commands::query(ctx, &id, &snapshot)?;
            output(&result, human);
        }
        Commands::Bugs => {
            let result = commands::bugs(ctx)?;
            output(&result, human);
        }
        Commands::Setup { no_verify } => {
            let result = commands::setup(ctx, no_verify)?;
            output(&result, human);
        }
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
