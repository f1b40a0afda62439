//! Initial database migration.
//!
//! Creates the run, journal, audit, policy, and catalog tables, the
//! gap-free numbering index, and the audit append-only guard.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(PIPELINE_RUNS_SQL).await?;
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_LINES_SQL).await?;
        db.execute_unprepared(AUDIT_SQL).await?;
        db.execute_unprepared(POLICIES_SQL).await?;
        db.execute_unprepared(ACCOUNT_CATALOGS_SQL).await?;
        db.execute_unprepared(AUDIT_GUARD_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const PIPELINE_RUNS_SQL: &str = r"
CREATE TABLE pipeline_runs (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    country VARCHAR(2) NOT NULL,
    transaction_date DATE NOT NULL,
    series VARCHAR(10) NOT NULL,
    actor UUID NOT NULL,
    extraction_ref UUID,
    intent_ref UUID,
    state VARCHAR(30) NOT NULL DEFAULT 'PENDING',
    current_step VARCHAR(30) NOT NULL DEFAULT 'LOAD',
    payload JSONB NOT NULL DEFAULT '{}',
    error JSONB,
    question JSONB,
    journal_entry_id UUID,
    claimed_by VARCHAR(100),
    claim_expires_at TIMESTAMPTZ,
    cancel_requested BOOLEAN NOT NULL DEFAULT false,
    started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    completed_at TIMESTAMPTZ
);

CREATE INDEX idx_pipeline_runs_company ON pipeline_runs(company_id, started_at DESC);
CREATE INDEX idx_pipeline_runs_claimable ON pipeline_runs(state, claim_expires_at);
";

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    entry_date DATE NOT NULL,
    series VARCHAR(10) NOT NULL,
    number BIGINT NOT NULL,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by UUID NOT NULL,
    source_pipeline_run UUID NOT NULL,
    CONSTRAINT uq_journal_entries_series_number UNIQUE (company_id, series, number)
);

CREATE INDEX idx_journal_entries_source_run ON journal_entries(source_pipeline_run);
";

const JOURNAL_LINES_SQL: &str = r"
CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    entry_id UUID NOT NULL REFERENCES journal_entries(id) ON DELETE CASCADE,
    ordinal INTEGER NOT NULL,
    account VARCHAR(20) NOT NULL,
    side VARCHAR(1) NOT NULL CHECK (side IN ('D', 'K')),
    amount NUMERIC(15, 2) NOT NULL CHECK (amount > 0),
    description TEXT,
    dimensions JSONB,
    CONSTRAINT uq_journal_lines_ordinal UNIQUE (entry_id, ordinal)
);
";

const AUDIT_SQL: &str = r"
CREATE TABLE audit (
    id UUID PRIMARY KEY,
    run_id UUID NOT NULL,
    step VARCHAR(30) NOT NULL,
    ts TIMESTAMPTZ NOT NULL DEFAULT now(),
    actor UUID NOT NULL,
    digest VARCHAR(64) NOT NULL
);

CREATE INDEX idx_audit_run ON audit(run_id, ts);
";

const POLICIES_SQL: &str = r"
CREATE TABLE policies (
    id VARCHAR(50) PRIMARY KEY,
    version VARCHAR(20) NOT NULL,
    country VARCHAR(2) NOT NULL,
    effective_from DATE NOT NULL,
    effective_to DATE,
    catalog_version VARCHAR(20) NOT NULL,
    document JSONB NOT NULL
);

CREATE INDEX idx_policies_country_dates ON policies(country, effective_from, effective_to);
";

const ACCOUNT_CATALOGS_SQL: &str = r"
CREATE TABLE account_catalogs (
    version VARCHAR(20) PRIMARY KEY,
    effective_from DATE NOT NULL,
    effective_to DATE,
    regions JSONB NOT NULL DEFAULT '[]',
    accounts JSONB NOT NULL DEFAULT '[]'
);
";

const AUDIT_GUARD_SQL: &str = r"
-- Audit rows are append-only.
CREATE OR REPLACE FUNCTION forbid_audit_mutation() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'audit records are append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_audit_no_update
    BEFORE UPDATE OR DELETE ON audit
    FOR EACH ROW EXECUTE FUNCTION forbid_audit_mutation();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS journal_lines CASCADE;
DROP TABLE IF EXISTS journal_entries CASCADE;
DROP TABLE IF EXISTS audit CASCADE;
DROP TABLE IF EXISTS pipeline_runs CASCADE;
DROP TABLE IF EXISTS policies CASCADE;
DROP TABLE IF EXISTS account_catalogs CASCADE;
DROP FUNCTION IF EXISTS forbid_audit_mutation CASCADE;
";
