//! The step machine driving runs end to end.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bokpilot_shared::config::PipelineConfig;
use bokpilot_shared::types::{CompanyId, DocumentId, PageRequest, PageResponse, PipelineRunId, UserId};

use crate::audit::{payload_digest, AuditRecord};
use crate::booking::{BookingError, BookingService};
use crate::catalog::CatalogStore;
use crate::engine::{EngineError, RuleEngine};
use crate::gate::{self, GateDecision};
use crate::inputs::{ExtractionRecord, IntentRecord, SlotValue};
use crate::migration::{MigrationError, MigrationService};
use crate::policy::PolicyStore;
use crate::repository::{RepoResult, Repository, RepositoryError};

use super::error::PipelineError;
use super::types::{ErrorKind, PipelineRun, PipelineStep, RunPayload, RunState};

/// Everything needed to start a run.
#[derive(Debug, Clone)]
pub struct StartRunInput {
    /// Owning company.
    pub company_id: CompanyId,
    /// The actor driving the run.
    pub actor: UserId,
    /// Country for policy and catalog selection.
    pub country: String,
    /// Business date of the transaction.
    pub transaction_date: NaiveDate,
    /// Journal series for booking.
    pub series: String,
    /// The extraction record to consume.
    pub extraction: ExtractionRecord,
    /// The intent record to consume.
    pub intent: IntentRecord,
    /// Reference to the source extraction document.
    pub extraction_ref: Option<DocumentId>,
    /// Reference to the source intent document.
    pub intent_ref: Option<DocumentId>,
}

/// What a single executed step asks the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// Move to the next step.
    Advance,
    /// Stop processing but keep the run resumable (awaiting clarification).
    Suspend,
    /// The run reached a terminal state.
    Terminal,
}

/// A step-level failure to be recorded on the run.
#[derive(Debug)]
pub(crate) struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&EngineError> for ErrorKind {
    fn from(error: &EngineError) -> Self {
        match error {
            EngineError::PolicyNotApplicable { .. } => Self::PolicyNotApplicable,
            EngineError::VatComputation { .. } => Self::VatComputation,
            EngineError::UnknownAccount { .. } => Self::UnknownAccount,
            EngineError::ProposalUnbalanced { .. } => Self::ProposalUnbalanced,
        }
    }
}

impl From<&MigrationError> for ErrorKind {
    fn from(error: &MigrationError) -> Self {
        match error {
            MigrationError::NoRuleForPair { .. } | MigrationError::Blocked { .. } => {
                Self::MigrationBlocked
            }
            MigrationError::UnknownAccount { .. } => Self::UnknownAccount,
            MigrationError::InvalidVersion(_) => Self::PolicyInvalid,
        }
    }
}

/// Drives pipeline runs through the fixed step order, persisting after
/// every step and appending one audit record per executed step.
///
/// Catalogs, policies, and migration rules are immutable and shared;
/// the repository is the only mutable collaborator.
pub struct Orchestrator {
    repo: Arc<dyn Repository>,
    catalogs: Arc<CatalogStore>,
    policies: Arc<PolicyStore>,
    migrations: Arc<MigrationService>,
    booking: BookingService,
    config: PipelineConfig,
    worker_id: String,
}

impl Orchestrator {
    /// Creates an orchestrator with an auto-generated worker id.
    #[must_use]
    pub fn new(
        repo: Arc<dyn Repository>,
        catalogs: Arc<CatalogStore>,
        policies: Arc<PolicyStore>,
        migrations: Arc<MigrationService>,
        config: PipelineConfig,
    ) -> Self {
        let booking = BookingService::new(Arc::clone(&repo));
        Self {
            repo,
            catalogs,
            policies,
            migrations,
            booking,
            config,
            worker_id: format!("worker-{}", Uuid::now_v7()),
        }
    }

    /// Creates and persists a new run in `PENDING` state.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Repository` when the run cannot be saved.
    pub async fn start_run(&self, input: StartRunInput) -> Result<PipelineRunId, PipelineError> {
        let now = Utc::now();
        let run = PipelineRun {
            id: PipelineRunId::new(),
            company_id: input.company_id,
            country: input.country,
            transaction_date: input.transaction_date,
            series: input.series,
            actor: input.actor,
            extraction_ref: input.extraction_ref,
            intent_ref: input.intent_ref,
            state: RunState::Pending,
            current_step: PipelineStep::Load,
            payload: RunPayload {
                extraction: Some(input.extraction),
                intent: Some(input.intent),
                slot_updates: BTreeMap::new(),
                policy: None,
                proposal: None,
            },
            error: None,
            question: None,
            journal_entry_id: None,
            claimed_by: None,
            claim_expires_at: None,
            cancel_requested: false,
            started_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.with_retry(|| self.repo.save_run(&run)).await?;
        info!(run = %run.id, company = %run.company_id, "pipeline run created");
        Ok(run.id)
    }

    /// Loads a run.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` for unknown ids.
    pub async fn get_run(&self, run_id: PipelineRunId) -> Result<PipelineRun, PipelineError> {
        self.repo
            .load_run(run_id)
            .await?
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    /// Lists runs for a company, most recent first. Without an explicit
    /// page the configured default page size applies.
    ///
    /// # Errors
    ///
    /// Returns repository failures.
    pub async fn list_runs(
        &self,
        company_id: CompanyId,
        page: Option<&PageRequest>,
    ) -> Result<PageResponse<PipelineRun>, PipelineError> {
        let default_page = PageRequest::new(1, self.config.page_size);
        let page = page.unwrap_or(&default_page);
        Ok(self.repo.list_runs(company_id, page).await?)
    }

    /// Requests cooperative cancellation; the run fails with `CANCELLED`
    /// at the next step boundary.
    ///
    /// # Errors
    ///
    /// Returns repository failures.
    pub async fn cancel_run(&self, run_id: PipelineRunId) -> Result<(), PipelineError> {
        Ok(self.repo.request_cancel(run_id).await?)
    }

    /// Answers the pending clarification question.
    ///
    /// Slot updates are merged into the run payload, the run returns to
    /// `PENDING`, and processing resumes from `POLICY_SELECT` — extraction
    /// is immutable and never recomputed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the run is awaiting clarification.
    pub async fn provide_clarification(
        &self,
        run_id: PipelineRunId,
        slot_updates: BTreeMap<String, SlotValue>,
    ) -> Result<PipelineRun, PipelineError> {
        let mut run = self.get_run(run_id).await?;
        if run.state != RunState::AwaitingClarification {
            return Err(PipelineError::InvalidState {
                run: run_id,
                state: run.state,
                expected: "AWAITING_CLARIFICATION",
            });
        }

        run.payload.slot_updates.extend(slot_updates);
        run.question = None;
        run.state = RunState::Pending;
        run.current_step = PipelineStep::PolicySelect;
        run.updated_at = Utc::now();

        self.with_retry(|| self.repo.save_run(&run)).await?;
        info!(run = %run.id, "clarification received, run resumable");
        Ok(run)
    }

    /// Claims and processes a run until it suspends or terminates.
    ///
    /// # Errors
    ///
    /// Returns `NotClaimable` when another worker holds a live claim and
    /// `Repository` when persistence fails beyond retries.
    pub async fn process(&self, run_id: PipelineRunId) -> Result<PipelineRun, PipelineError> {
        let ttl = chrono::Duration::seconds(i64::try_from(self.config.claim_ttl_secs).unwrap_or(60));
        let claimed = self
            .with_retry(|| self.repo.claim_run(run_id, &self.worker_id, ttl))
            .await?;
        if !claimed {
            return Err(PipelineError::NotClaimable(run_id));
        }

        let mut run = self.get_run(run_id).await?;
        let deadline = Instant::now() + std::time::Duration::from_secs(self.config.run_budget_secs);

        loop {
            // Cancellation and deadline are checked between steps only.
            if let Some(latest) = self.repo.load_run(run_id).await? {
                run.cancel_requested = latest.cancel_requested;
            }
            if run.cancel_requested {
                run.fail(
                    ErrorKind::Cancelled,
                    run.current_step,
                    "cancelled by control plane",
                );
                break;
            }
            if Instant::now() >= deadline {
                run.fail(ErrorKind::Timeout, run.current_step, "run budget exceeded");
                break;
            }

            let step = run.current_step;
            debug!(run = %run.id, step = %step, "executing step");

            match self.execute_step(&mut run).await {
                Ok(StepOutcome::Advance) => {
                    if let Some(next) = step.next() {
                        run.current_step = next;
                    }
                    run.updated_at = Utc::now();
                    self.persist_step(&run, step).await?;
                }
                Ok(StepOutcome::Suspend) => {
                    run.updated_at = Utc::now();
                    self.persist_step(&run, step).await?;
                    self.release_claim(&mut run).await?;
                    info!(run = %run.id, "run awaiting clarification");
                    return Ok(run);
                }
                Ok(StepOutcome::Terminal) => {
                    run.updated_at = Utc::now();
                    self.persist_step(&run, step).await?;
                    self.release_claim(&mut run).await?;
                    if run.state == RunState::Completed && step == PipelineStep::Book {
                        self.persist_step(&run, PipelineStep::Complete).await?;
                    }
                    info!(run = %run.id, state = %run.state, "run reached terminal state");
                    return Ok(run);
                }
                Err(failure) => {
                    warn!(
                        run = %run.id,
                        step = %step,
                        kind = failure.kind.as_str(),
                        message = %failure.message,
                        "step failed"
                    );
                    run.fail(failure.kind, step, failure.message);
                    break;
                }
            }
        }

        // Terminal via failure, timeout, or cancellation.
        run.updated_at = Utc::now();
        self.with_retry(|| self.repo.save_run(&run)).await?;
        self.release_claim(&mut run).await?;
        if let Some(error) = run.error.clone() {
            let digest = payload_digest(&error)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            let record = AuditRecord::new(run.id, error.step, run.actor, digest);
            self.with_retry(|| self.repo.append_audit(&record)).await?;
        }
        info!(run = %run.id, state = %run.state, "run finished");
        Ok(run)
    }

    /// Executes the run's current step.
    pub(crate) async fn execute_step(
        &self,
        run: &mut PipelineRun,
    ) -> Result<StepOutcome, StepFailure> {
        match run.current_step {
            PipelineStep::Load => {
                if run.payload.extraction.is_none() || run.payload.intent.is_none() {
                    return Err(StepFailure::new(
                        ErrorKind::InputInvalid,
                        "run is missing its extraction or intent input",
                    ));
                }
                Ok(StepOutcome::Advance)
            }

            PipelineStep::ExtractConsume => {
                let extraction = self.extraction(run)?;
                extraction
                    .validate()
                    .map_err(|e| StepFailure::new(ErrorKind::InputInvalid, e.to_string()))?;
                Ok(StepOutcome::Advance)
            }

            PipelineStep::IntentConsume => {
                let intent = self.intent(run)?;
                intent
                    .validate()
                    .map_err(|e| StepFailure::new(ErrorKind::InputInvalid, e.to_string()))?;
                Ok(StepOutcome::Advance)
            }

            PipelineStep::PolicySelect => {
                let intent = self.intent(run)?;
                let selected =
                    self.policies
                        .select(&run.country, &intent.name, run.transaction_date);
                let Some(policy) = selected.first() else {
                    return Err(StepFailure::new(
                        ErrorKind::PolicyNotApplicable,
                        format!(
                            "no policy for intent '{}' in {} on {}",
                            intent.name, run.country, run.transaction_date
                        ),
                    ));
                };
                run.payload.policy = Some((*policy).clone());
                Ok(StepOutcome::Advance)
            }

            PipelineStep::Migrate => {
                let policy = self.policy(run)?;
                let target = self
                    .catalogs
                    .resolve_for_date(&run.country, run.transaction_date)
                    .map_err(|e| StepFailure::new(ErrorKind::CatalogMissing, e.to_string()))?;

                if policy.catalog_version != target.version {
                    let migrated = self
                        .migrations
                        .migrate(&policy, &target.version, &self.catalogs)
                        .map_err(|e| StepFailure::new(ErrorKind::from(&e), e.to_string()))?;
                    run.payload.policy = Some(migrated);
                }
                Ok(StepOutcome::Advance)
            }

            PipelineStep::Propose => {
                let extraction = self.extraction(run)?;
                let intent = self.intent(run)?;
                let policy = self.policy(run)?;
                let catalog = self
                    .catalogs
                    .get(&policy.catalog_version)
                    .map_err(|e| StepFailure::new(ErrorKind::CatalogMissing, e.to_string()))?;

                let proposal = RuleEngine::propose(&extraction, &intent, &policy, catalog)
                    .map_err(|e| StepFailure::new(ErrorKind::from(&e), e.to_string()))?;
                run.payload.proposal = Some(proposal);
                Ok(StepOutcome::Advance)
            }

            PipelineStep::Gate => {
                let Some(proposal) = run.payload.proposal.clone() else {
                    return Err(StepFailure::new(
                        ErrorKind::InputInvalid,
                        "gate reached without a proposal",
                    ));
                };
                match proposal.gate {
                    GateDecision::Auto => {
                        run.question = None;
                        Ok(StepOutcome::Advance)
                    }
                    GateDecision::Clarify => {
                        let intent = self.intent(run)?;
                        run.question =
                            Some(gate::question_for(&proposal.missing_required, &intent.name));
                        run.state = RunState::AwaitingClarification;
                        Ok(StepOutcome::Suspend)
                    }
                    GateDecision::Park => {
                        run.state = RunState::Parked;
                        run.completed_at = Some(Utc::now());
                        Ok(StepOutcome::Terminal)
                    }
                }
            }

            PipelineStep::Book => {
                let Some(proposal) = run.payload.proposal.clone() else {
                    return Err(StepFailure::new(
                        ErrorKind::InputInvalid,
                        "booking reached without a proposal",
                    ));
                };

                let entry = BookingService::build_entry(
                    &proposal,
                    run.company_id,
                    run.transaction_date,
                    &run.series,
                    run.actor,
                    run.id,
                )
                .map_err(|e| StepFailure::new(ErrorKind::NotBalancedOnBook, e.to_string()))?;

                // The entry insert and the final run state share one
                // repository transaction.
                run.journal_entry_id = Some(entry.id);
                run.state = RunState::Completed;
                run.current_step = PipelineStep::Complete;
                run.completed_at = Some(Utc::now());
                run.claimed_by = None;
                run.claim_expires_at = None;
                run.updated_at = Utc::now();

                let run_snapshot = run.clone();
                self.with_retry(|| self.booking_attempt(&entry, &run_snapshot))
                    .await
                    .map_err(|e| StepFailure::new(ErrorKind::Infrastructure, e.to_string()))?;

                Ok(StepOutcome::Terminal)
            }

            PipelineStep::Complete => Ok(StepOutcome::Terminal),
        }
    }

    /// One booking attempt, shaped for the retry helper.
    async fn booking_attempt(
        &self,
        entry: &crate::booking::NewJournalEntry,
        run: &PipelineRun,
    ) -> RepoResult<()> {
        match self.booking.create(entry.clone(), run).await {
            Ok(_) => Ok(()),
            Err(BookingError::Repository(e)) => Err(e),
            Err(other) => Err(RepositoryError::Conflict(other.to_string())),
        }
    }

    /// Releases this worker's claim and mirrors the release locally.
    async fn release_claim(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        self.with_retry(|| self.repo.release_run(run.id, &self.worker_id))
            .await?;
        run.claimed_by = None;
        run.claim_expires_at = None;
        Ok(())
    }

    /// Persists the run and appends the step's audit record, with retries.
    async fn persist_step(
        &self,
        run: &PipelineRun,
        step: PipelineStep,
    ) -> Result<(), PipelineError> {
        self.with_retry(|| self.repo.save_run(run)).await?;

        let output = Self::step_output(run, step);
        let digest =
            payload_digest(&output).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let record = AuditRecord::new(run.id, step, run.actor, digest);
        self.with_retry(|| self.repo.append_audit(&record)).await?;
        Ok(())
    }

    /// The step-keyed slice of the payload a step is responsible for.
    fn step_output(run: &PipelineRun, step: PipelineStep) -> serde_json::Value {
        match step {
            PipelineStep::Load => serde_json::json!({
                "extraction_ref": run.extraction_ref,
                "intent_ref": run.intent_ref,
            }),
            PipelineStep::ExtractConsume => {
                serde_json::to_value(&run.payload.extraction).unwrap_or_default()
            }
            PipelineStep::IntentConsume => serde_json::json!({
                "intent": run.payload.intent,
                "slot_updates": run.payload.slot_updates,
            }),
            PipelineStep::PolicySelect | PipelineStep::Migrate => {
                serde_json::to_value(&run.payload.policy).unwrap_or_default()
            }
            PipelineStep::Propose => {
                serde_json::to_value(&run.payload.proposal).unwrap_or_default()
            }
            PipelineStep::Gate => serde_json::json!({
                "gate": run.payload.proposal.as_ref().map(|p| p.gate),
                "question": run.question,
            }),
            PipelineStep::Book | PipelineStep::Complete => serde_json::json!({
                "journal_entry_id": run.journal_entry_id,
                "state": run.state,
            }),
        }
    }

    fn extraction(&self, run: &PipelineRun) -> Result<ExtractionRecord, StepFailure> {
        run.payload.extraction.clone().ok_or_else(|| {
            StepFailure::new(ErrorKind::InputInvalid, "extraction record missing")
        })
    }

    fn intent(&self, run: &PipelineRun) -> Result<IntentRecord, StepFailure> {
        run.effective_intent()
            .ok_or_else(|| StepFailure::new(ErrorKind::InputInvalid, "intent record missing"))
    }

    fn policy(&self, run: &PipelineRun) -> Result<crate::policy::Policy, StepFailure> {
        run.payload.policy.clone().ok_or_else(|| {
            StepFailure::new(ErrorKind::PolicyInvalid, "no policy selected for run")
        })
    }

    /// Retries a repository operation with bounded exponential backoff.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> RepoResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepoResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_step_attempts => {
                    let delay = self.config.retry_base_delay_ms.saturating_mul(1 << attempt);
                    debug!(attempt, delay_ms = delay, "retrying repository operation");
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
