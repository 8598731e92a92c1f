use crate::output::print_json;
use aidd_core::{
    config::GatesConfig,
    gate::GateDecision,
    gates::{self, analyst::AnalystOverrides, progress::ProgressRun, qa::QaRun, GateContext},
    git, hook,
    reports::PackFormat,
};
use clap::{Args, Subcommand};
use std::path::Path;

#[derive(Args)]
pub struct Target {
    /// Ticket to check (default: docs/.active_ticket)
    #[arg(long)]
    ticket: Option<String>,
    /// Branch for the gate's branch filters (default: current git branch)
    #[arg(long)]
    branch: Option<String>,
}

#[derive(Subcommand)]
pub enum GateCommand {
    /// PRD review gate (exit 0/1)
    PrdReviewGate {
        #[command(flatten)]
        target: Target,
        /// File being edited by the agent
        #[arg(long)]
        file_path: Option<String>,
        /// Skip when the edited file is the PRD itself
        #[arg(long)]
        skip_on_prd_edit: bool,
    },
    /// Plan review gate (exit 0/1)
    PlanReviewGate {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        file_path: Option<String>,
        /// Skip when the edited file is the plan itself
        #[arg(long)]
        skip_on_plan_edit: bool,
    },
    /// Tasklist spec readiness gate (exit 0/2)
    TasklistCheck {
        #[command(flatten)]
        target: Target,
    },
    /// Tasklist progress gate: code changes need new `- [x]` items (exit 0/1)
    #[command(alias = "tasklist-progress")]
    Progress {
        #[command(flatten)]
        target: Target,
        /// Invocation context, matched against tasklist_progress.sources
        #[arg(long, default_value = "manual", value_parser = ["manual", "implement", "qa", "review", "gate"])]
        source: String,
    },
    /// Analyst dialog gate (exit 0/1)
    AnalystCheck {
        #[command(flatten)]
        target: Target,
        /// Accept Status: BLOCKED
        #[arg(long)]
        allow_blocked: bool,
        /// Do not require Status: READY
        #[arg(long)]
        no_ready_required: bool,
        #[arg(long)]
        min_questions: Option<usize>,
    },
    /// QA gate (exit 0/2)
    QaGate {
        #[command(flatten)]
        target: Target,
    },
    /// Dependency allowlist check (advisory, exit 0)
    DepsCheck {
        #[command(flatten)]
        target: Target,
    },
}

impl GateCommand {
    fn target(&self) -> &Target {
        match self {
            GateCommand::PrdReviewGate { target, .. }
            | GateCommand::PlanReviewGate { target, .. }
            | GateCommand::TasklistCheck { target }
            | GateCommand::Progress { target, .. }
            | GateCommand::AnalystCheck { target, .. }
            | GateCommand::QaGate { target }
            | GateCommand::DepsCheck { target } => target,
        }
    }
}

/// Run one gate, record the outcome, and return its exit code.
pub fn run(root: &Path, command: GateCommand, json: bool) -> anyhow::Result<i32> {
    let target = command.target();
    let (ticket, slug) = super::resolve_ticket(root, target.ticket.as_deref())?;
    let branch = target.branch.clone().or_else(|| git::current_branch(root));
    let cfg = GatesConfig::load(root);

    let mut ctx = GateContext {
        root,
        ticket: &ticket,
        slug: &slug,
        branch: branch.as_deref(),
        file_path: None,
    };

    let decision = match &command {
        GateCommand::PrdReviewGate {
            file_path,
            skip_on_prd_edit,
            ..
        } => {
            ctx.file_path = file_path.as_deref();
            let mut settings = cfg.prd_review();
            settings.skip_on_edit |= *skip_on_prd_edit;
            gates::review::prd_review(&ctx, &settings, PackFormat::from_env())
        }
        GateCommand::PlanReviewGate {
            file_path,
            skip_on_plan_edit,
            ..
        } => {
            ctx.file_path = file_path.as_deref();
            let mut settings = cfg.plan_review();
            settings.skip_on_edit |= *skip_on_plan_edit;
            gates::review::plan_review(&ctx, &settings)
        }
        GateCommand::TasklistCheck { .. } => gates::tasklist::tasklist_spec(&ctx, &cfg.tasklist_spec()),
        GateCommand::Progress { source, .. } => {
            let settings = cfg.tasklist_progress();
            let run = ProgressRun::resolve(&settings, source, |name| std::env::var(name).ok());
            gates::progress::tasklist_progress(&ctx, &settings, &run)
        }
        GateCommand::AnalystCheck {
            allow_blocked,
            no_ready_required,
            min_questions,
            ..
        } => {
            let overrides = AnalystOverrides {
                min_questions: *min_questions,
                require_ready: no_ready_required.then_some(false),
                allow_blocked: allow_blocked.then_some(true),
            };
            gates::analyst::analyst(&ctx, &cfg.analyst(), overrides)
        }
        GateCommand::QaGate { .. } => gates::qa::qa(&ctx, &cfg.qa(), QaRun::from_env(true)),
        GateCommand::DepsCheck { .. } => {
            gates::deps::deps_allowlist(&ctx, &cfg.deps_allowlist(), hook::fast_mode_from_env())
        }
    };

    tracing::debug!(gate = %decision.gate, status = decision.status.as_str(), "gate decided");
    gates::record(&ctx, &decision, "cli");
    report(&decision, json)?;
    Ok(decision.exit_code)
}

fn report(decision: &GateDecision, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(decision);
    }
    if decision.is_block() {
        eprintln!("{}", decision.render());
        return Ok(());
    }
    println!("{}", decision.message);
    for warning in &decision.warnings {
        println!("{warning}");
    }
    Ok(())
}
