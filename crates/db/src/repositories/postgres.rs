//! Postgres implementation of the core repository port.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    TransactionTrait,
};

use bokpilot_core::audit::AuditRecord;
use bokpilot_core::booking::{JournalEntry, NewJournalEntry};
use bokpilot_core::catalog::AccountCatalog;
use bokpilot_core::pipeline::{PipelineRun, RunState};
use bokpilot_core::policy::Policy;
use bokpilot_core::repository::{RepoResult, Repository, RepositoryError};
use bokpilot_shared::types::{CompanyId, JournalEntryId, PageRequest, PageResponse, PipelineRunId};

use crate::entities::{
    account_catalogs, audit_log, journal_entries, journal_lines, pipeline_runs, policies,
};

use super::convert;

fn storage(e: DbErr) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

/// Postgres-backed repository.
///
/// Series numbers are allocated under a transaction-scoped advisory lock,
/// which keeps `(company, series, number)` gap-free under contention.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    db: DatabaseConnection,
}

impl PostgresRepository {
    /// Creates a new repository over an established connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts or updates a run on the given connection.
    async fn upsert_run<C: ConnectionTrait>(conn: &C, run: &PipelineRun) -> RepoResult<()> {
        let exists = pipeline_runs::Entity::find_by_id(run.id.into_inner())
            .one(conn)
            .await
            .map_err(storage)?
            .is_some();

        let active = convert::run_to_active(run)?;
        if exists {
            active.update(conn).await.map_err(storage)?;
        } else {
            active.insert(conn).await.map_err(storage)?;
        }
        Ok(())
    }

    /// Loads the ordinal-sorted lines for a set of entry rows.
    async fn load_lines(
        &self,
        entries: Vec<journal_entries::Model>,
    ) -> RepoResult<Vec<JournalEntry>> {
        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let lines = journal_lines::Entity::find()
                .filter(journal_lines::Column::EntryId.eq(entry.id))
                .order_by_asc(journal_lines::Column::Ordinal)
                .all(&self.db)
                .await
                .map_err(storage)?;
            result.push(convert::entry_from_models(entry, lines)?);
        }
        Ok(result)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn save_run(&self, run: &PipelineRun) -> RepoResult<()> {
        Self::upsert_run(&self.db, run).await
    }

    async fn load_run(&self, id: PipelineRunId) -> RepoResult<Option<PipelineRun>> {
        pipeline_runs::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(convert::run_from_model)
            .transpose()
    }

    async fn list_runs(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> RepoResult<PageResponse<PipelineRun>> {
        let query = pipeline_runs::Entity::find()
            .filter(pipeline_runs::Column::CompanyId.eq(company_id.into_inner()));

        let total = query.clone().count(&self.db).await.map_err(storage)?;
        let models = query
            .order_by_desc(pipeline_runs::Column::StartedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(storage)?;

        let data = models
            .into_iter()
            .map(convert::run_from_model)
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(PageResponse::new(data, page, total))
    }

    async fn claim_run(
        &self,
        id: PipelineRunId,
        worker: &str,
        ttl: chrono::Duration,
    ) -> RepoResult<bool> {
        let now = Utc::now();
        let result = pipeline_runs::Entity::update_many()
            .col_expr(
                pipeline_runs::Column::State,
                Expr::value(RunState::Running.as_str()),
            )
            .col_expr(pipeline_runs::Column::ClaimedBy, Expr::value(worker))
            .col_expr(
                pipeline_runs::Column::ClaimExpiresAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(now + ttl)),
            )
            .col_expr(
                pipeline_runs::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(now)),
            )
            .filter(pipeline_runs::Column::Id.eq(id.into_inner()))
            .filter(
                Condition::any()
                    .add(pipeline_runs::Column::State.eq(RunState::Pending.as_str()))
                    .add(
                        Condition::all()
                            .add(pipeline_runs::Column::State.eq(RunState::Running.as_str()))
                            .add(
                                pipeline_runs::Column::ClaimExpiresAt
                                    .lte(sea_orm::prelude::DateTimeWithTimeZone::from(now)),
                            ),
                    ),
            )
            .exec(&self.db)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected > 0)
    }

    async fn release_run(&self, id: PipelineRunId, worker: &str) -> RepoResult<()> {
        pipeline_runs::Entity::update_many()
            .col_expr(
                pipeline_runs::Column::ClaimedBy,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                pipeline_runs::Column::ClaimExpiresAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .filter(pipeline_runs::Column::Id.eq(id.into_inner()))
            .filter(pipeline_runs::Column::ClaimedBy.eq(worker))
            .exec(&self.db)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn request_cancel(&self, id: PipelineRunId) -> RepoResult<()> {
        let result = pipeline_runs::Entity::update_many()
            .col_expr(pipeline_runs::Column::CancelRequested, Expr::value(true))
            .filter(pipeline_runs::Column::Id.eq(id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(storage)?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("run {id}")));
        }
        Ok(())
    }

    async fn append_audit(&self, record: &AuditRecord) -> RepoResult<()> {
        convert::audit_to_active(record)
            .insert(&self.db)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn audit_for_run(&self, run_id: PipelineRunId) -> RepoResult<Vec<AuditRecord>> {
        let models = audit_log::Entity::find()
            .filter(audit_log::Column::RunId.eq(run_id.into_inner()))
            .order_by_asc(audit_log::Column::Ts)
            .order_by_asc(audit_log::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;

        models.into_iter().map(convert::audit_from_model).collect()
    }

    async fn insert_entry(
        &self,
        entry: NewJournalEntry,
        run: Option<&PipelineRun>,
    ) -> RepoResult<JournalEntry> {
        let txn = self.db.begin().await.map_err(storage)?;

        // Serialize number allocation per (company, series).
        let lock_key = format!("{}:{}", entry.company_id, entry.series);
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            [lock_key.into()],
        ))
        .await
        .map_err(storage)?;

        let latest = journal_entries::Entity::find()
            .filter(journal_entries::Column::CompanyId.eq(entry.company_id.into_inner()))
            .filter(journal_entries::Column::Series.eq(entry.series.clone()))
            .order_by_desc(journal_entries::Column::Number)
            .limit(1)
            .one(&txn)
            .await
            .map_err(storage)?;
        let number = latest.map_or(0, |e| e.number) + 1;

        let entry = entry.into_entry(number, Utc::now());
        let (header, lines) = convert::entry_to_active(&entry)?;
        header.insert(&txn).await.map_err(storage)?;
        for line in lines {
            line.insert(&txn).await.map_err(storage)?;
        }

        if let Some(run) = run {
            Self::upsert_run(&txn, run).await?;
        }

        txn.commit().await.map_err(storage)?;
        Ok(entry)
    }

    async fn load_entry(&self, id: JournalEntryId) -> RepoResult<Option<JournalEntry>> {
        let Some(model) = journal_entries::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };
        Ok(self.load_lines(vec![model]).await?.pop())
    }

    async fn list_entries(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> RepoResult<PageResponse<JournalEntry>> {
        let query = journal_entries::Entity::find()
            .filter(journal_entries::Column::CompanyId.eq(company_id.into_inner()));

        let total = query.clone().count(&self.db).await.map_err(storage)?;
        let models = query
            .order_by_asc(journal_entries::Column::Series)
            .order_by_asc(journal_entries::Column::Number)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(storage)?;

        let data = self.load_lines(models).await?;
        Ok(PageResponse::new(data, page, total))
    }

    async fn entry_by_run(&self, run_id: PipelineRunId) -> RepoResult<Option<JournalEntry>> {
        let Some(model) = journal_entries::Entity::find()
            .filter(journal_entries::Column::SourcePipelineRun.eq(run_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };
        Ok(self.load_lines(vec![model]).await?.pop())
    }

    async fn get_policy(&self, id: &str) -> RepoResult<Option<Policy>> {
        policies::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(convert::policy_from_model)
            .transpose()
    }

    async fn list_policies(&self, country: &str, date: NaiveDate) -> RepoResult<Vec<Policy>> {
        let models = policies::Entity::find()
            .filter(policies::Column::Country.eq(country))
            .filter(policies::Column::EffectiveFrom.lte(date))
            .filter(
                Condition::any()
                    .add(policies::Column::EffectiveTo.is_null())
                    .add(policies::Column::EffectiveTo.gte(date)),
            )
            .all(&self.db)
            .await
            .map_err(storage)?;

        models.into_iter().map(convert::policy_from_model).collect()
    }

    async fn all_policies(&self) -> RepoResult<Vec<Policy>> {
        let models = policies::Entity::find()
            .all(&self.db)
            .await
            .map_err(storage)?;
        models.into_iter().map(convert::policy_from_model).collect()
    }

    async fn save_policy(&self, policy: &Policy) -> RepoResult<()> {
        let exists = policies::Entity::find_by_id(&policy.id)
            .one(&self.db)
            .await
            .map_err(storage)?
            .is_some();

        let active = convert::policy_to_active(policy)?;
        if exists {
            active.update(&self.db).await.map_err(storage)?;
        } else {
            active.insert(&self.db).await.map_err(storage)?;
        }
        Ok(())
    }

    async fn get_catalog(&self, version: &str) -> RepoResult<Option<AccountCatalog>> {
        account_catalogs::Entity::find_by_id(version)
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(convert::catalog_from_model)
            .transpose()
    }

    async fn list_catalogs(&self) -> RepoResult<Vec<AccountCatalog>> {
        let models = account_catalogs::Entity::find()
            .all(&self.db)
            .await
            .map_err(storage)?;
        models.into_iter().map(convert::catalog_from_model).collect()
    }

    async fn save_catalog(&self, catalog: &AccountCatalog) -> RepoResult<()> {
        let exists = account_catalogs::Entity::find_by_id(&catalog.version)
            .one(&self.db)
            .await
            .map_err(storage)?
            .is_some();

        let active = convert::catalog_to_active(catalog)?;
        if exists {
            active.update(&self.db).await.map_err(storage)?;
        } else {
            active.insert(&self.db).await.map_err(storage)?;
        }
        Ok(())
    }
}
