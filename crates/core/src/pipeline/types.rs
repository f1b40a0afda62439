//! Pipeline run state, steps, and the persisted payload.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bokpilot_shared::types::{CompanyId, DocumentId, JournalEntryId, PipelineRunId, UserId};

use crate::engine::PostingProposal;
use crate::gate::ClarifyQuestion;
use crate::inputs::{ExtractionRecord, IntentRecord, SlotValue};
use crate::policy::Policy;

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created, waiting for a worker claim.
    Pending,
    /// Claimed and progressing.
    Running,
    /// Held on one clarifying question; resumable with a slot update.
    AwaitingClarification,
    /// Parked for manual review.
    Parked,
    /// Booked and finished.
    Completed,
    /// Terminally failed.
    Failed,
}

impl RunState {
    /// Returns the string representation of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::AwaitingClarification => "AWAITING_CLARIFICATION",
            Self::Parked => "PARKED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a state from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "AWAITING_CLARIFICATION" => Some(Self::AwaitingClarification),
            "PARKED" => Some(Self::Parked),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// True for states no worker will progress further.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Parked | Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The ordered pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStep {
    /// Verify the input references are present.
    Load,
    /// Validate the extraction record.
    ExtractConsume,
    /// Validate the intent record.
    IntentConsume,
    /// Select the applicable policy.
    PolicySelect,
    /// Migrate the policy to the date's catalog version, when needed.
    Migrate,
    /// Run the rule engine.
    Propose,
    /// Apply the stoplight decision.
    Gate,
    /// Book the journal entry.
    Book,
    /// Terminal marker.
    Complete,
}

impl PipelineStep {
    /// Returns the string representation of the step.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "LOAD",
            Self::ExtractConsume => "EXTRACT_CONSUME",
            Self::IntentConsume => "INTENT_CONSUME",
            Self::PolicySelect => "POLICY_SELECT",
            Self::Migrate => "MIGRATE",
            Self::Propose => "PROPOSE",
            Self::Gate => "GATE",
            Self::Book => "BOOK",
            Self::Complete => "COMPLETE",
        }
    }

    /// Parses a step from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOAD" => Some(Self::Load),
            "EXTRACT_CONSUME" => Some(Self::ExtractConsume),
            "INTENT_CONSUME" => Some(Self::IntentConsume),
            "POLICY_SELECT" => Some(Self::PolicySelect),
            "MIGRATE" => Some(Self::Migrate),
            "PROPOSE" => Some(Self::Propose),
            "GATE" => Some(Self::Gate),
            "BOOK" => Some(Self::Book),
            "COMPLETE" => Some(Self::Complete),
            _ => None,
        }
    }

    /// The step after this one, if any.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Load => Some(Self::ExtractConsume),
            Self::ExtractConsume => Some(Self::IntentConsume),
            Self::IntentConsume => Some(Self::PolicySelect),
            Self::PolicySelect => Some(Self::Migrate),
            Self::Migrate => Some(Self::Propose),
            Self::Propose => Some(Self::Gate),
            Self::Gate => Some(Self::Book),
            Self::Book => Some(Self::Complete),
            Self::Complete => None,
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed error taxonomy for terminal run errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed extraction or intent record.
    InputInvalid,
    /// No policy matches the input.
    PolicyNotApplicable,
    /// Policy fails schema checks or references unknown accounts.
    PolicyInvalid,
    /// No catalog for the country and date.
    CatalogMissing,
    /// Policy cannot be moved to the target catalog.
    MigrationBlocked,
    /// VAT inputs are inconsistent.
    VatComputation,
    /// The engine cannot balance within the rounding tolerance.
    ProposalUnbalanced,
    /// A template references an account absent from the active catalog.
    UnknownAccount,
    /// Repository or I/O failure after retries.
    Infrastructure,
    /// Run exceeded its soft deadline.
    Timeout,
    /// Run was cancelled from the control plane.
    Cancelled,
    /// Defense-in-depth balance failure at booking time.
    NotBalancedOnBook,
}

impl ErrorKind {
    /// Returns the taxonomy tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InputInvalid => "INPUT_INVALID",
            Self::PolicyNotApplicable => "POLICY_NOT_APPLICABLE",
            Self::PolicyInvalid => "POLICY_INVALID",
            Self::CatalogMissing => "CATALOG_MISSING",
            Self::MigrationBlocked => "MIGRATION_BLOCKED",
            Self::VatComputation => "VAT_COMPUTATION",
            Self::ProposalUnbalanced => "PROPOSAL_UNBALANCED",
            Self::UnknownAccount => "UNKNOWN_ACCOUNT",
            Self::Infrastructure => "INFRASTRUCTURE",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::NotBalancedOnBook => "NOT_BALANCED_ON_BOOK",
        }
    }

    /// The failure class reported alongside the tag.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::InputInvalid => "INPUT_ERROR",
            Self::PolicyNotApplicable => "NOT_APPLICABLE",
            Self::PolicyInvalid
            | Self::CatalogMissing
            | Self::MigrationBlocked
            | Self::UnknownAccount => "CONFIG_ERROR",
            Self::VatComputation | Self::ProposalUnbalanced => "ENGINE_REJECTION",
            Self::Infrastructure => "INFRASTRUCTURE",
            Self::Timeout | Self::Cancelled => "LIFECYCLE",
            Self::NotBalancedOnBook => "BOOKING_ERROR",
        }
    }

    /// The terminal state this kind routes the run to.
    #[must_use]
    pub const fn terminal_state(&self) -> RunState {
        match self {
            Self::PolicyNotApplicable | Self::VatComputation | Self::ProposalUnbalanced => {
                RunState::Parked
            }
            _ => RunState::Failed,
        }
    }
}

/// A terminal error recorded on a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Taxonomy tag.
    pub kind: ErrorKind,
    /// The step that failed.
    pub step: PipelineStep,
    /// Short human-readable message.
    pub message: String,
}

/// The step-keyed payload persisted with a run.
///
/// Each step writes only its own slot, so re-running a step with the same
/// inputs rewrites the slot with identical content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunPayload {
    /// The extraction record consumed by the run.
    #[serde(default)]
    pub extraction: Option<ExtractionRecord>,
    /// The intent record consumed by the run.
    #[serde(default)]
    pub intent: Option<IntentRecord>,
    /// Clarification answers; merged over the intent slots on read.
    #[serde(default)]
    pub slot_updates: BTreeMap<String, SlotValue>,
    /// The selected (possibly migrated) policy document.
    #[serde(default)]
    pub policy: Option<Policy>,
    /// The computed proposal.
    #[serde(default)]
    pub proposal: Option<PostingProposal>,
}

/// The persistent record of one end-to-end processing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique identifier.
    pub id: PipelineRunId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Country driving policy and catalog selection.
    pub country: String,
    /// Business date of the transaction.
    pub transaction_date: NaiveDate,
    /// Journal series for booking.
    pub series: String,
    /// The actor driving the run.
    pub actor: UserId,
    /// Reference to the source extraction document, when known.
    #[serde(default)]
    pub extraction_ref: Option<DocumentId>,
    /// Reference to the source intent document, when known.
    #[serde(default)]
    pub intent_ref: Option<DocumentId>,
    /// Lifecycle state.
    pub state: RunState,
    /// The step the run is at.
    pub current_step: PipelineStep,
    /// Step-keyed payload.
    pub payload: RunPayload,
    /// Terminal error, if any.
    #[serde(default)]
    pub error: Option<RunError>,
    /// Pending clarification question, when awaiting one.
    #[serde(default)]
    pub question: Option<ClarifyQuestion>,
    /// The booked entry, once completed.
    #[serde(default)]
    pub journal_entry_id: Option<JournalEntryId>,
    /// Worker currently holding the claim.
    #[serde(default)]
    pub claimed_by: Option<String>,
    /// When the claim lease expires.
    #[serde(default)]
    pub claim_expires_at: Option<DateTime<Utc>>,
    /// Cooperative cancellation flag, checked between steps.
    #[serde(default)]
    pub cancel_requested: bool,
    /// When processing first started.
    pub started_at: DateTime<Utc>,
    /// Last persistence time.
    pub updated_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// The intent with clarification answers merged in.
    #[must_use]
    pub fn effective_intent(&self) -> Option<IntentRecord> {
        self.payload
            .intent
            .as_ref()
            .map(|intent| intent.with_slot_updates(&self.payload.slot_updates))
    }

    /// The pending clarification question, when awaiting one.
    #[must_use]
    pub fn pending_question(&self) -> Option<&ClarifyQuestion> {
        if self.state == RunState::AwaitingClarification {
            self.question.as_ref()
        } else {
            None
        }
    }

    /// Records a terminal error and moves the run to its terminal state.
    pub fn fail(&mut self, kind: ErrorKind, step: PipelineStep, message: impl Into<String>) {
        self.error = Some(RunError {
            kind,
            step,
            message: message.into(),
        });
        self.state = kind.terminal_state();
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order() {
        let mut step = PipelineStep::Load;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            seen.push(next);
            step = next;
        }
        assert_eq!(
            seen,
            vec![
                PipelineStep::Load,
                PipelineStep::ExtractConsume,
                PipelineStep::IntentConsume,
                PipelineStep::PolicySelect,
                PipelineStep::Migrate,
                PipelineStep::Propose,
                PipelineStep::Gate,
                PipelineStep::Book,
                PipelineStep::Complete,
            ]
        );
    }

    #[test]
    fn test_state_parse_roundtrip() {
        for state in [
            RunState::Pending,
            RunState::Running,
            RunState::AwaitingClarification,
            RunState::Parked,
            RunState::Completed,
            RunState::Failed,
        ] {
            assert_eq!(RunState::parse(state.as_str()), Some(state));
        }
        assert_eq!(RunState::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Parked.is_terminal());
        assert!(!RunState::Pending.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::AwaitingClarification.is_terminal());
    }

    #[test]
    fn test_error_kind_routing() {
        assert_eq!(
            ErrorKind::PolicyNotApplicable.terminal_state(),
            RunState::Parked
        );
        assert_eq!(
            ErrorKind::ProposalUnbalanced.terminal_state(),
            RunState::Parked
        );
        assert_eq!(ErrorKind::VatComputation.terminal_state(), RunState::Parked);
        assert_eq!(
            ErrorKind::MigrationBlocked.terminal_state(),
            RunState::Failed
        );
        assert_eq!(ErrorKind::UnknownAccount.terminal_state(), RunState::Failed);
        assert_eq!(ErrorKind::Timeout.terminal_state(), RunState::Failed);

        assert_eq!(ErrorKind::MigrationBlocked.class(), "CONFIG_ERROR");
        assert_eq!(ErrorKind::ProposalUnbalanced.class(), "ENGINE_REJECTION");
        assert_eq!(ErrorKind::Infrastructure.class(), "INFRASTRUCTURE");
    }
}
