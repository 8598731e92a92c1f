//! Gate decisions and the closed set of reason codes they carry.

use crate::messages::{self, MessageArgs};
use serde::{Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Gate identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gate {
    PrdReview,
    PlanReview,
    TasklistSpec,
    TasklistProgress,
    Qa,
    Analyst,
    DepsAllowlist,
}

impl Gate {
    pub fn as_str(self) -> &'static str {
        match self {
            Gate::PrdReview => "prd-review",
            Gate::PlanReview => "plan-review",
            Gate::TasklistSpec => "tasklist-spec",
            Gate::TasklistProgress => "tasklist-progress",
            Gate::Qa => "qa",
            Gate::Analyst => "analyst",
            Gate::DepsAllowlist => "deps-allowlist",
        }
    }

    /// Event type recorded in the per-ticket log.
    pub fn event_type(self) -> String {
        format!("gate-{}", self.as_str())
    }

    /// Exit code a standalone CLI invocation uses for a block.
    pub fn block_exit_code(self) -> i32 {
        match self {
            Gate::PrdReview | Gate::PlanReview | Gate::Analyst | Gate::TasklistProgress => 1,
            Gate::TasklistSpec | Gate::Qa | Gate::DepsAllowlist => 2,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Block,
    Skip,
}

impl GateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStatus::Pass => "pass",
            GateStatus::Block => "block",
            GateStatus::Skip => "skip",
        }
    }
}

// ---------------------------------------------------------------------------
// Reason codes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    WorkflowNotFound,
    TicketMissing,
    MissingPrd,
    ArtifactMissing,
    MissingSection,
    BlockingStatus,
    NotApproved,
    OpenActions,
    MissingReport,
    ReportCorrupted,
    BlockingFinding,
    DraftDialog,
    TasklistSpecNotReady,
    TasklistBlockerQuestion,
    TasklistNext3Incomplete,
    TasklistInterviewIncomplete,
    TasklistShellChainSingleEntry,
    TasklistNonCommandEntry,
    TasklistProgressMissing,
    AnalystMissingDialog,
    AnalystMinQuestions,
    AnalystNumberingGap,
    AnalystOrphanAnswer,
    AnalystMissingAnswer,
    AnalystStatusInvalid,
    AnalystStatusBlocked,
    AnalystStatusPending,
    AnalystOpenQuestions,
    ReportMissing,
    QaFindings,
    HandoffTasklist,
    DangerousBash,
    ReadTooLarge,
    TranscriptHardLimit,
    GateInternalError,
    // skip reasons
    GateDisabled,
    BranchFiltered,
    SelfEdit,
    StageMismatch,
    EnvBypass,
    Debounced,
    SourceFiltered,
    NoGit,
    NoCodeChanges,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::WorkflowNotFound => "workflow_not_found",
            ReasonCode::TicketMissing => "ticket_missing",
            ReasonCode::MissingPrd => "missing_prd",
            ReasonCode::ArtifactMissing => "artifact_missing",
            ReasonCode::MissingSection => "missing_section",
            ReasonCode::BlockingStatus => "blocking_status",
            ReasonCode::NotApproved => "not_approved",
            ReasonCode::OpenActions => "open_actions",
            ReasonCode::MissingReport => "missing_report",
            ReasonCode::ReportCorrupted => "report_corrupted",
            ReasonCode::BlockingFinding => "blocking_finding",
            ReasonCode::DraftDialog => "draft_dialog",
            ReasonCode::TasklistSpecNotReady => "tasklist_spec_not_ready",
            ReasonCode::TasklistBlockerQuestion => "tasklist_blocker_question",
            ReasonCode::TasklistNext3Incomplete => "tasklist_next3_incomplete",
            ReasonCode::TasklistInterviewIncomplete => "tasklist_interview_incomplete",
            ReasonCode::TasklistShellChainSingleEntry => "tasklist_shell_chain_single_entry",
            ReasonCode::TasklistNonCommandEntry => "tasklist_non_command_entry",
            ReasonCode::TasklistProgressMissing => "tasklist_progress_missing",
            ReasonCode::AnalystMissingDialog => "analyst_missing_dialog",
            ReasonCode::AnalystMinQuestions => "analyst_min_questions",
            ReasonCode::AnalystNumberingGap => "analyst_numbering_gap",
            ReasonCode::AnalystOrphanAnswer => "analyst_orphan_answer",
            ReasonCode::AnalystMissingAnswer => "analyst_missing_answer",
            ReasonCode::AnalystStatusInvalid => "analyst_status_invalid",
            ReasonCode::AnalystStatusBlocked => "analyst_status_blocked",
            ReasonCode::AnalystStatusPending => "analyst_status_pending",
            ReasonCode::AnalystOpenQuestions => "analyst_open_questions",
            ReasonCode::ReportMissing => "report_missing",
            ReasonCode::QaFindings => "qa_findings",
            ReasonCode::HandoffTasklist => "handoff_tasklist",
            ReasonCode::DangerousBash => "dangerous_bash",
            ReasonCode::ReadTooLarge => "read_too_large",
            ReasonCode::TranscriptHardLimit => "transcript_hard_limit",
            ReasonCode::GateInternalError => "gate_internal_error",
            ReasonCode::GateDisabled => "disabled",
            ReasonCode::BranchFiltered => "branch_filtered",
            ReasonCode::SelfEdit => "self_edit",
            ReasonCode::StageMismatch => "stage_mismatch",
            ReasonCode::EnvBypass => "env_bypass",
            ReasonCode::Debounced => "debounced",
            ReasonCode::SourceFiltered => "source_filtered",
            ReasonCode::NoGit => "no_git",
            ReasonCode::NoCodeChanges => "no_code_changes",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub gate: Gate,
    pub status: GateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub exit_code: i32,
}

impl GateDecision {
    pub fn pass(gate: Gate) -> Self {
        GateDecision {
            gate,
            status: GateStatus::Pass,
            reason_code: None,
            message: format!("{gate}: ok"),
            details: Vec::new(),
            warnings: Vec::new(),
            exit_code: 0,
        }
    }

    pub fn skip(gate: Gate, code: ReasonCode, args: &MessageArgs) -> Self {
        GateDecision {
            gate,
            status: GateStatus::Skip,
            reason_code: Some(code),
            message: messages::skip(gate, code, args),
            details: Vec::new(),
            warnings: Vec::new(),
            exit_code: 0,
        }
    }

    pub fn block(gate: Gate, code: ReasonCode, args: &MessageArgs) -> Self {
        GateDecision {
            gate,
            status: GateStatus::Block,
            reason_code: Some(code),
            message: messages::block(code, args),
            details: Vec::new(),
            warnings: Vec::new(),
            exit_code: gate.block_exit_code(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_block(&self) -> bool {
        self.status == GateStatus::Block
    }

    pub fn is_skip(&self) -> bool {
        self.status == GateStatus::Skip
    }

    /// Full text for stderr: message, then details and warnings one per line.
    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for d in &self.details {
            out.push_str("\n  - ");
            out.push_str(d);
        }
        for w in &self.warnings {
            out.push('\n');
            out.push_str(w);
        }
        out
    }
}
