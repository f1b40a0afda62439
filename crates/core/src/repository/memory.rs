//! In-memory repository.
//!
//! Backs tests and embedded deployments. A single mutex around the whole
//! store stands in for database transactions: every trait method locks,
//! mutates, and unlocks atomically, which preserves the gap-free numbering
//! and compare-and-swap claim semantics of the port.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use tokio::sync::Mutex;

use bokpilot_shared::types::{CompanyId, JournalEntryId, PageRequest, PageResponse, PipelineRunId};

use crate::audit::AuditRecord;
use crate::booking::{JournalEntry, NewJournalEntry};
use crate::catalog::AccountCatalog;
use crate::pipeline::{PipelineRun, RunState};
use crate::policy::Policy;

use super::{RepoResult, Repository, RepositoryError};

#[derive(Debug, Default)]
struct Store {
    runs: HashMap<PipelineRunId, PipelineRun>,
    audits: Vec<AuditRecord>,
    entries: Vec<JournalEntry>,
    counters: BTreeMap<(CompanyId, String), i64>,
    policies: BTreeMap<String, Policy>,
    catalogs: BTreeMap<String, AccountCatalog>,
}

/// In-memory implementation of the repository port.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save_run(&self, run: &PipelineRun) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        store.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn load_run(&self, id: PipelineRunId) -> RepoResult<Option<PipelineRun>> {
        let store = self.store.lock().await;
        Ok(store.runs.get(&id).cloned())
    }

    async fn list_runs(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> RepoResult<PageResponse<PipelineRun>> {
        let store = self.store.lock().await;
        let mut runs: Vec<PipelineRun> = store
            .runs
            .values()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = runs.len() as u64;
        let data = runs
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(PageResponse::new(data, page, total))
    }

    async fn claim_run(&self, id: PipelineRunId, worker: &str, ttl: Duration) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        let run = store
            .runs
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("run {id}")))?;

        let now = Utc::now();
        let claimable = match run.state {
            RunState::Pending => true,
            RunState::Running => run.claim_expires_at.is_none_or(|expires| expires <= now),
            _ => false,
        };
        if !claimable {
            return Ok(false);
        }

        run.state = RunState::Running;
        run.claimed_by = Some(worker.to_string());
        run.claim_expires_at = Some(now + ttl);
        run.updated_at = now;
        Ok(true)
    }

    async fn release_run(&self, id: PipelineRunId, worker: &str) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        if let Some(run) = store.runs.get_mut(&id) {
            if run.claimed_by.as_deref() == Some(worker) {
                run.claimed_by = None;
                run.claim_expires_at = None;
                run.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn request_cancel(&self, id: PipelineRunId) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        let run = store
            .runs
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("run {id}")))?;
        run.cancel_requested = true;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn append_audit(&self, record: &AuditRecord) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        if store.audits.iter().any(|a| a.id == record.id) {
            return Err(RepositoryError::Conflict(format!(
                "audit record {} already exists",
                record.id
            )));
        }
        store.audits.push(record.clone());
        Ok(())
    }

    async fn audit_for_run(&self, run_id: PipelineRunId) -> RepoResult<Vec<AuditRecord>> {
        let store = self.store.lock().await;
        Ok(store
            .audits
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn insert_entry(
        &self,
        entry: NewJournalEntry,
        run: Option<&PipelineRun>,
    ) -> RepoResult<JournalEntry> {
        let mut store = self.store.lock().await;

        if store.entries.iter().any(|e| e.id == entry.id) {
            return Err(RepositoryError::Conflict(format!(
                "entry {} already exists",
                entry.id
            )));
        }

        let key = (entry.company_id, entry.series.clone());
        let number = store.counters.get(&key).copied().unwrap_or(0) + 1;
        store.counters.insert(key, number);

        let entry = entry.into_entry(number, Utc::now());
        store.entries.push(entry.clone());

        if let Some(run) = run {
            store.runs.insert(run.id, run.clone());
        }

        Ok(entry)
    }

    async fn load_entry(&self, id: JournalEntryId) -> RepoResult<Option<JournalEntry>> {
        let store = self.store.lock().await;
        Ok(store.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn list_entries(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> RepoResult<PageResponse<JournalEntry>> {
        let store = self.store.lock().await;
        let mut entries: Vec<JournalEntry> = store
            .entries
            .iter()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.series.cmp(&b.series).then(a.number.cmp(&b.number)));

        let total = entries.len() as u64;
        let data = entries
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(PageResponse::new(data, page, total))
    }

    async fn entry_by_run(&self, run_id: PipelineRunId) -> RepoResult<Option<JournalEntry>> {
        let store = self.store.lock().await;
        Ok(store
            .entries
            .iter()
            .find(|e| e.source_pipeline_run == run_id)
            .cloned())
    }

    async fn get_policy(&self, id: &str) -> RepoResult<Option<Policy>> {
        let store = self.store.lock().await;
        Ok(store.policies.get(id).cloned())
    }

    async fn list_policies(&self, country: &str, date: NaiveDate) -> RepoResult<Vec<Policy>> {
        let store = self.store.lock().await;
        Ok(store
            .policies
            .values()
            .filter(|p| p.country == country && p.is_effective(date))
            .cloned()
            .collect())
    }

    async fn all_policies(&self) -> RepoResult<Vec<Policy>> {
        let store = self.store.lock().await;
        Ok(store.policies.values().cloned().collect())
    }

    async fn save_policy(&self, policy: &Policy) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        store.policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn get_catalog(&self, version: &str) -> RepoResult<Option<AccountCatalog>> {
        let store = self.store.lock().await;
        Ok(store.catalogs.get(version).cloned())
    }

    async fn list_catalogs(&self) -> RepoResult<Vec<AccountCatalog>> {
        let store = self.store.lock().await;
        Ok(store.catalogs.values().cloned().collect())
    }

    async fn save_catalog(&self, catalog: &AccountCatalog) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        store
            .catalogs
            .insert(catalog.version.clone(), catalog.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::NewJournalLine;
    use crate::policy::Side;
    use bokpilot_shared::types::UserId;
    use rust_decimal_macros::dec;

    fn new_entry(company_id: CompanyId, series: &str) -> NewJournalEntry {
        NewJournalEntry {
            id: JournalEntryId::new(),
            company_id,
            entry_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            series: series.to_string(),
            notes: None,
            created_by: UserId::new(),
            source_pipeline_run: PipelineRunId::new(),
            lines: vec![
                NewJournalLine {
                    account: "6110".to_string(),
                    side: Side::D,
                    amount: dec!(100.00),
                    description: None,
                    dimensions: BTreeMap::new(),
                },
                NewJournalLine {
                    account: "1930".to_string(),
                    side: Side::K,
                    amount: dec!(100.00),
                    description: None,
                    dimensions: BTreeMap::new(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_numbers_are_contiguous_per_series() {
        let repo = MemoryRepository::new();
        let company = CompanyId::new();

        let first = repo.insert_entry(new_entry(company, "A"), None).await.unwrap();
        let second = repo.insert_entry(new_entry(company, "A"), None).await.unwrap();
        let other_series = repo.insert_entry(new_entry(company, "B"), None).await.unwrap();
        let other_company = repo
            .insert_entry(new_entry(CompanyId::new(), "A"), None)
            .await
            .unwrap();

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(other_series.number, 1);
        assert_eq!(other_company.number, 1);
    }

    #[tokio::test]
    async fn test_entry_lines_keep_order() {
        let repo = MemoryRepository::new();
        let entry = repo
            .insert_entry(new_entry(CompanyId::new(), "A"), None)
            .await
            .unwrap();
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(entry.lines[0].ordinal, 0);
        assert_eq!(entry.lines[1].ordinal, 1);
        assert!(entry.is_balanced());
    }

    #[tokio::test]
    async fn test_audit_append_only() {
        let repo = MemoryRepository::new();
        let record = AuditRecord::new(
            PipelineRunId::new(),
            crate::pipeline::PipelineStep::Load,
            UserId::new(),
            "ab".repeat(32),
        );
        repo.append_audit(&record).await.unwrap();
        assert!(matches!(
            repo.append_audit(&record).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_load_entry_by_id() {
        let repo = MemoryRepository::new();
        let entry = repo
            .insert_entry(new_entry(CompanyId::new(), "A"), None)
            .await
            .unwrap();

        let loaded = repo.load_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert!(repo.load_entry(JournalEntryId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_policy_and_catalog_rows_bootstrap_stores() {
        use crate::catalog::{bas_2025_v1, bas_2025_v2};
        use crate::policy::builtin_policies;
        use crate::repository::{load_catalog_store, load_policy_store};

        let repo = MemoryRepository::new();
        repo.save_catalog(&bas_2025_v1()).await.unwrap();
        repo.save_catalog(&bas_2025_v2()).await.unwrap();
        for policy in builtin_policies().unwrap() {
            repo.save_policy(&policy).await.unwrap();
        }

        let fetched = repo.get_catalog("2025_v1.0").await.unwrap().unwrap();
        assert_eq!(fetched.version, "2025_v1.0");
        let fetched = repo.get_policy("SE_REPR_MEAL_V1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "SE_REPR_MEAL_V1");

        let effective = repo
            .list_policies("SE", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(effective.len(), 3);
        assert!(repo
            .list_policies("NO", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
            .await
            .unwrap()
            .is_empty());

        let catalogs = load_catalog_store(&repo).await.unwrap();
        assert_eq!(catalogs.versions(), vec!["2025_v1.0", "2025_v2.0"]);
        let policies = load_policy_store(&repo, &catalogs).await.unwrap();
        assert_eq!(policies.policies().len(), 3);
        assert!(policies.rejected().is_empty());
    }

    #[tokio::test]
    async fn test_list_entries_pagination() {
        let repo = MemoryRepository::new();
        let company = CompanyId::new();
        for _ in 0..5 {
            repo.insert_entry(new_entry(company, "A"), None).await.unwrap();
        }

        let page = repo
            .list_entries(company, &PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.meta.total, 5);
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.data[0].number, 1);

        let page = repo
            .list_entries(company, &PageRequest::new(3, 2))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].number, 5);
    }
}
