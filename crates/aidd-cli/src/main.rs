mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::gate::GateCommand;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "aidd",
    about = "AIDD workflow gates and context guard for Claude Code hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workflow root (default: AIDD_ROOT, CLAUDE_PROJECT_DIR, git top-level, or an aidd/ ancestor)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the active ticket (and slug hint)
    ActivateFeature {
        ticket: String,
        #[arg(long)]
        slug_hint: Option<String>,
    },

    /// Set the active workflow stage
    SetStage {
        stage: String,
        /// Accept a stage outside the standard list
        #[arg(long)]
        allow_custom: bool,
    },

    /// Generate the PRD review report
    PrdReview {
        #[arg(long)]
        ticket: Option<String>,
        /// Print the report instead of writing reports/prd/{ticket}.json
        #[arg(long)]
        stdout: bool,
    },

    /// Print the tail of the ticket's event log
    Events {
        #[arg(long)]
        ticket: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print the working set injected into prompts
    WorkingSet {
        #[arg(long)]
        ticket: Option<String>,
    },

    /// Handle one Claude Code hook event (JSON on stdin, JSON on stdout)
    Hook,

    #[command(flatten)]
    Gate(GateCommand),
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // The hook resolves its own root from the payload and never fails on a
    // missing workflow.
    let result = match cli.command {
        Commands::Hook => Ok(cmd::hook::run()),
        command => root::resolve_root(cli.root.as_deref())
            .and_then(|root| run(&root, command, cli.json)),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(root: &Path, command: Commands, json: bool) -> anyhow::Result<i32> {
    match command {
        Commands::ActivateFeature { ticket, slug_hint } => {
            cmd::feature::activate(root, &ticket, slug_hint.as_deref(), json).map(|()| 0)
        }
        Commands::SetStage {
            stage,
            allow_custom,
        } => cmd::feature::set_stage(root, &stage, allow_custom, json).map(|()| 0),
        Commands::PrdReview { ticket, stdout } => {
            cmd::prd_review::run(root, ticket.as_deref(), stdout, json).map(|()| 0)
        }
        Commands::Events { ticket, limit } => {
            cmd::events::run(root, ticket.as_deref(), limit).map(|()| 0)
        }
        Commands::WorkingSet { ticket } => {
            cmd::working_set::run(root, ticket.as_deref(), json).map(|()| 0)
        }
        Commands::Gate(gate) => cmd::gate::run(root, gate, json),
        Commands::Hook => Ok(cmd::hook::run()),
    }
}
