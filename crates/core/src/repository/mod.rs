//! The persistence port.
//!
//! All shared mutable state lives behind this trait; catalogs and
//! policies are immutable once loaded and need no locking. Implementations
//! must make each method transactional on its own, and [`Repository::insert_entry`]
//! must persist the entry, allocate its series number, and store the final
//! run state in a single transaction.

pub mod memory;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use thiserror::Error;

use bokpilot_shared::types::{CompanyId, JournalEntryId, PageRequest, PageResponse, PipelineRunId};

use crate::audit::AuditRecord;
use crate::booking::{JournalEntry, NewJournalEntry};
use crate::catalog::{AccountCatalog, CatalogStore};
use crate::pipeline::PipelineRun;
use crate::policy::{Policy, PolicyStore};

pub use memory::MemoryRepository;

/// Result type alias for repository operations.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Row not found where one was required.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or state conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying storage failure; retryable.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Row could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// True if the orchestrator may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Transactional persistence used by the pipeline, booking service, and
/// the policy/catalog loaders.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persists a run (insert or update).
    async fn save_run(&self, run: &PipelineRun) -> RepoResult<()>;

    /// Loads a run by id.
    async fn load_run(&self, id: PipelineRunId) -> RepoResult<Option<PipelineRun>>;

    /// Lists runs for a company, most recent first.
    async fn list_runs(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> RepoResult<PageResponse<PipelineRun>>;

    /// Atomically claims a run for a worker.
    ///
    /// Succeeds for `PENDING` runs and for `RUNNING` runs whose claim
    /// lease has expired (crashed-worker recovery). On success the run is
    /// `RUNNING` with `claimed_by` and `claim_expires_at` set.
    async fn claim_run(&self, id: PipelineRunId, worker: &str, ttl: Duration) -> RepoResult<bool>;

    /// Releases a worker's claim; a no-op if the worker no longer holds it.
    async fn release_run(&self, id: PipelineRunId, worker: &str) -> RepoResult<()>;

    /// Sets the cooperative cancellation flag on a run.
    async fn request_cancel(&self, id: PipelineRunId) -> RepoResult<()>;

    /// Appends an audit record. Audit storage is append-only.
    async fn append_audit(&self, record: &AuditRecord) -> RepoResult<()>;

    /// Returns the audit records for a run in append order.
    async fn audit_for_run(&self, run_id: PipelineRunId) -> RepoResult<Vec<AuditRecord>>;

    /// Books a journal entry.
    ///
    /// Allocates the next gap-free `(company, series)` number, inserts the
    /// entry with its lines, and — when `run` is given — persists the final
    /// run state, all in one transaction.
    async fn insert_entry(
        &self,
        entry: NewJournalEntry,
        run: Option<&PipelineRun>,
    ) -> RepoResult<JournalEntry>;

    /// Loads an entry by id.
    async fn load_entry(&self, id: JournalEntryId) -> RepoResult<Option<JournalEntry>>;

    /// Lists entries for a company ordered by (series, number).
    async fn list_entries(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> RepoResult<PageResponse<JournalEntry>>;

    /// Returns the entry booked by a pipeline run, if any.
    async fn entry_by_run(&self, run_id: PipelineRunId) -> RepoResult<Option<JournalEntry>>;

    /// Loads a policy document row by id.
    async fn get_policy(&self, id: &str) -> RepoResult<Option<Policy>>;

    /// Lists policy rows effective for a country on a date.
    async fn list_policies(&self, country: &str, date: NaiveDate) -> RepoResult<Vec<Policy>>;

    /// Lists every stored policy row (startup loading).
    async fn all_policies(&self) -> RepoResult<Vec<Policy>>;

    /// Persists a policy row.
    async fn save_policy(&self, policy: &Policy) -> RepoResult<()>;

    /// Loads a catalog row by version.
    async fn get_catalog(&self, version: &str) -> RepoResult<Option<AccountCatalog>>;

    /// Lists every stored catalog row (startup loading).
    async fn list_catalogs(&self) -> RepoResult<Vec<AccountCatalog>>;

    /// Persists a catalog row.
    async fn save_catalog(&self, catalog: &AccountCatalog) -> RepoResult<()>;
}

/// Builds the immutable catalog store from repository rows at startup.
///
/// # Errors
///
/// Returns repository failures, or a serialization error when the rows
/// fail catalog validation (duplicate versions or numbers are fatal).
pub async fn load_catalog_store(repo: &dyn Repository) -> RepoResult<CatalogStore> {
    let rows = repo.list_catalogs().await?;
    CatalogStore::new(rows).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Builds the immutable policy store from repository rows at startup.
///
/// # Errors
///
/// Returns repository failures, or a serialization error when a row
/// violates the policy DSL schema.
pub async fn load_policy_store(
    repo: &dyn Repository,
    catalogs: &CatalogStore,
) -> RepoResult<PolicyStore> {
    let rows = repo.all_policies().await?;
    PolicyStore::new(rows, catalogs).map_err(|e| RepositoryError::Serialization(e.to_string()))
}
