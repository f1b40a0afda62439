//! Conversions between domain types and `SeaORM` models.

use chrono::Utc;
use sea_orm::Set;

use bokpilot_core::audit::AuditRecord;
use bokpilot_core::booking::{JournalEntry, JournalLine};
use bokpilot_core::catalog::AccountCatalog;
use bokpilot_core::pipeline::{PipelineRun, PipelineStep, RunState};
use bokpilot_core::policy::{Policy, Side};
use bokpilot_core::repository::RepositoryError;
use bokpilot_shared::types::{
    AuditRecordId, CompanyId, DocumentId, JournalEntryId, JournalLineId, PipelineRunId, UserId,
};

use crate::entities::{account_catalogs, audit_log, journal_entries, journal_lines, pipeline_runs, policies};

fn serialization(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Serialization(e.to_string())
}

/// Encodes a posting side as its column value.
#[must_use]
pub fn side_to_str(side: Side) -> &'static str {
    match side {
        Side::D => "D",
        Side::K => "K",
    }
}

/// Decodes a posting side column value.
///
/// # Errors
///
/// Returns a serialization error for anything but `D` or `K`.
pub fn parse_side(s: &str) -> Result<Side, RepositoryError> {
    match s {
        "D" => Ok(Side::D),
        "K" => Ok(Side::K),
        other => Err(serialization(format!("invalid side '{other}'"))),
    }
}

/// Builds the active model for persisting a run.
///
/// # Errors
///
/// Returns a serialization error if a payload section cannot be encoded.
pub fn run_to_active(run: &PipelineRun) -> Result<pipeline_runs::ActiveModel, RepositoryError> {
    Ok(pipeline_runs::ActiveModel {
        id: Set(run.id.into_inner()),
        company_id: Set(run.company_id.into_inner()),
        country: Set(run.country.clone()),
        transaction_date: Set(run.transaction_date),
        series: Set(run.series.clone()),
        actor: Set(run.actor.into_inner()),
        extraction_ref: Set(run.extraction_ref.map(DocumentId::into_inner)),
        intent_ref: Set(run.intent_ref.map(DocumentId::into_inner)),
        state: Set(run.state.as_str().to_string()),
        current_step: Set(run.current_step.as_str().to_string()),
        payload: Set(serde_json::to_value(&run.payload).map_err(serialization)?),
        error: Set(run
            .error
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(serialization)?),
        question: Set(run
            .question
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(serialization)?),
        journal_entry_id: Set(run.journal_entry_id.map(JournalEntryId::into_inner)),
        claimed_by: Set(run.claimed_by.clone()),
        claim_expires_at: Set(run.claim_expires_at.map(Into::into)),
        cancel_requested: Set(run.cancel_requested),
        started_at: Set(run.started_at.into()),
        updated_at: Set(run.updated_at.into()),
        completed_at: Set(run.completed_at.map(Into::into)),
    })
}

/// Rebuilds a run from its row.
///
/// # Errors
///
/// Returns a serialization error for unknown states, steps, or payloads.
pub fn run_from_model(model: pipeline_runs::Model) -> Result<PipelineRun, RepositoryError> {
    let state = RunState::parse(&model.state)
        .ok_or_else(|| serialization(format!("unknown run state '{}'", model.state)))?;
    let current_step = PipelineStep::parse(&model.current_step)
        .ok_or_else(|| serialization(format!("unknown step '{}'", model.current_step)))?;

    Ok(PipelineRun {
        id: PipelineRunId::from_uuid(model.id),
        company_id: CompanyId::from_uuid(model.company_id),
        country: model.country,
        transaction_date: model.transaction_date,
        series: model.series,
        actor: UserId::from_uuid(model.actor),
        extraction_ref: model.extraction_ref.map(DocumentId::from_uuid),
        intent_ref: model.intent_ref.map(DocumentId::from_uuid),
        state,
        current_step,
        payload: serde_json::from_value(model.payload).map_err(serialization)?,
        error: model
            .error
            .map(serde_json::from_value)
            .transpose()
            .map_err(serialization)?,
        question: model
            .question
            .map(serde_json::from_value)
            .transpose()
            .map_err(serialization)?,
        journal_entry_id: model.journal_entry_id.map(JournalEntryId::from_uuid),
        claimed_by: model.claimed_by,
        claim_expires_at: model.claim_expires_at.map(|t| t.with_timezone(&Utc)),
        cancel_requested: model.cancel_requested,
        started_at: model.started_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
        completed_at: model.completed_at.map(|t| t.with_timezone(&Utc)),
    })
}

/// Builds the active models for persisting an entry and its lines.
///
/// # Errors
///
/// Returns a serialization error if line dimensions cannot be encoded.
pub fn entry_to_active(
    entry: &JournalEntry,
) -> Result<
    (
        journal_entries::ActiveModel,
        Vec<journal_lines::ActiveModel>,
    ),
    RepositoryError,
> {
    let header = journal_entries::ActiveModel {
        id: Set(entry.id.into_inner()),
        company_id: Set(entry.company_id.into_inner()),
        entry_date: Set(entry.entry_date),
        series: Set(entry.series.clone()),
        number: Set(entry.number),
        notes: Set(entry.notes.clone()),
        created_at: Set(entry.created_at.into()),
        created_by: Set(entry.created_by.into_inner()),
        source_pipeline_run: Set(entry.source_pipeline_run.into_inner()),
    };

    let mut lines = Vec::with_capacity(entry.lines.len());
    for line in &entry.lines {
        let dimensions = if line.dimensions.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&line.dimensions).map_err(serialization)?)
        };
        lines.push(journal_lines::ActiveModel {
            id: Set(line.id.into_inner()),
            entry_id: Set(line.entry_id.into_inner()),
            ordinal: Set(line.ordinal),
            account: Set(line.account.clone()),
            side: Set(side_to_str(line.side).to_string()),
            amount: Set(line.amount),
            description: Set(line.description.clone()),
            dimensions: Set(dimensions),
        });
    }

    Ok((header, lines))
}

/// Rebuilds an entry from its rows; lines must already be ordinal-sorted.
///
/// # Errors
///
/// Returns a serialization error for invalid sides or dimension payloads.
pub fn entry_from_models(
    entry: journal_entries::Model,
    lines: Vec<journal_lines::Model>,
) -> Result<JournalEntry, RepositoryError> {
    let lines = lines
        .into_iter()
        .map(|line| {
            Ok(JournalLine {
                id: JournalLineId::from_uuid(line.id),
                entry_id: JournalEntryId::from_uuid(line.entry_id),
                ordinal: line.ordinal,
                account: line.account,
                side: parse_side(&line.side)?,
                amount: line.amount,
                description: line.description,
                dimensions: line
                    .dimensions
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(serialization)?
                    .unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

    Ok(JournalEntry {
        id: JournalEntryId::from_uuid(entry.id),
        company_id: CompanyId::from_uuid(entry.company_id),
        entry_date: entry.entry_date,
        series: entry.series,
        number: entry.number,
        notes: entry.notes,
        created_at: entry.created_at.with_timezone(&Utc),
        created_by: UserId::from_uuid(entry.created_by),
        source_pipeline_run: PipelineRunId::from_uuid(entry.source_pipeline_run),
        lines,
    })
}

/// Builds the active model for an audit record.
#[must_use]
pub fn audit_to_active(record: &AuditRecord) -> audit_log::ActiveModel {
    audit_log::ActiveModel {
        id: Set(record.id.into_inner()),
        run_id: Set(record.run_id.into_inner()),
        step: Set(record.step.as_str().to_string()),
        ts: Set(record.ts.into()),
        actor: Set(record.actor.into_inner()),
        digest: Set(record.payload_digest.clone()),
    }
}

/// Rebuilds an audit record from its row.
///
/// # Errors
///
/// Returns a serialization error for unknown steps.
pub fn audit_from_model(model: audit_log::Model) -> Result<AuditRecord, RepositoryError> {
    let step = PipelineStep::parse(&model.step)
        .ok_or_else(|| serialization(format!("unknown step '{}'", model.step)))?;
    Ok(AuditRecord {
        id: AuditRecordId::from_uuid(model.id),
        run_id: PipelineRunId::from_uuid(model.run_id),
        step,
        ts: model.ts.with_timezone(&Utc),
        actor: UserId::from_uuid(model.actor),
        payload_digest: model.digest,
    })
}

/// Builds the active model for a policy row.
///
/// # Errors
///
/// Returns a serialization error if the document cannot be encoded.
pub fn policy_to_active(policy: &Policy) -> Result<policies::ActiveModel, RepositoryError> {
    Ok(policies::ActiveModel {
        id: Set(policy.id.clone()),
        version: Set(policy.version.clone()),
        country: Set(policy.country.clone()),
        effective_from: Set(policy.effective_from),
        effective_to: Set(policy.effective_to),
        catalog_version: Set(policy.catalog_version.clone()),
        document: Set(serde_json::to_value(policy).map_err(serialization)?),
    })
}

/// Rebuilds a policy from its row.
///
/// # Errors
///
/// Returns a serialization error for a malformed document column.
pub fn policy_from_model(model: policies::Model) -> Result<Policy, RepositoryError> {
    serde_json::from_value(model.document).map_err(serialization)
}

/// Builds the active model for a catalog row.
///
/// # Errors
///
/// Returns a serialization error if the accounts cannot be encoded.
pub fn catalog_to_active(
    catalog: &AccountCatalog,
) -> Result<account_catalogs::ActiveModel, RepositoryError> {
    Ok(account_catalogs::ActiveModel {
        version: Set(catalog.version.clone()),
        effective_from: Set(catalog.effective_from),
        effective_to: Set(catalog.effective_to),
        regions: Set(serde_json::to_value(&catalog.regions).map_err(serialization)?),
        accounts: Set(serde_json::to_value(&catalog.accounts).map_err(serialization)?),
    })
}

/// Rebuilds a catalog from its row.
///
/// # Errors
///
/// Returns a serialization error for malformed JSON columns.
pub fn catalog_from_model(
    model: account_catalogs::Model,
) -> Result<AccountCatalog, RepositoryError> {
    Ok(AccountCatalog {
        version: model.version,
        effective_from: model.effective_from,
        effective_to: model.effective_to,
        regions: serde_json::from_value(model.regions).map_err(serialization)?,
        accounts: serde_json::from_value(model.accounts).map_err(serialization)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use sea_orm::ActiveValue;
    use std::collections::BTreeMap;

    use bokpilot_core::booking::NewJournalEntry;
    use bokpilot_core::catalog::bas_2025_v1;
    use bokpilot_core::pipeline::RunPayload;
    use bokpilot_core::policy::builtin_policies;

    fn unwrap_set<T: Clone + Into<sea_orm::Value>>(value: &ActiveValue<T>) -> T {
        match value {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => v.clone(),
            ActiveValue::NotSet => panic!("value not set"),
        }
    }

    fn sample_run() -> PipelineRun {
        let now = Utc::now();
        PipelineRun {
            id: PipelineRunId::new(),
            company_id: CompanyId::new(),
            country: "SE".to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            series: "A".to_string(),
            actor: UserId::new(),
            extraction_ref: Some(DocumentId::new()),
            intent_ref: None,
            state: RunState::Pending,
            current_step: PipelineStep::Load,
            payload: RunPayload::default(),
            error: None,
            question: None,
            journal_entry_id: None,
            claimed_by: Some("worker-1".to_string()),
            claim_expires_at: Some(now),
            cancel_requested: false,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_run_round_trip() {
        let run = sample_run();
        let active = run_to_active(&run).unwrap();

        let model = pipeline_runs::Model {
            id: unwrap_set(&active.id),
            company_id: unwrap_set(&active.company_id),
            country: unwrap_set(&active.country),
            transaction_date: unwrap_set(&active.transaction_date),
            series: unwrap_set(&active.series),
            actor: unwrap_set(&active.actor),
            extraction_ref: unwrap_set(&active.extraction_ref),
            intent_ref: unwrap_set(&active.intent_ref),
            state: unwrap_set(&active.state),
            current_step: unwrap_set(&active.current_step),
            payload: unwrap_set(&active.payload),
            error: unwrap_set(&active.error),
            question: unwrap_set(&active.question),
            journal_entry_id: unwrap_set(&active.journal_entry_id),
            claimed_by: unwrap_set(&active.claimed_by),
            claim_expires_at: unwrap_set(&active.claim_expires_at),
            cancel_requested: unwrap_set(&active.cancel_requested),
            started_at: unwrap_set(&active.started_at),
            updated_at: unwrap_set(&active.updated_at),
            completed_at: unwrap_set(&active.completed_at),
        };

        let back = run_from_model(model).unwrap();
        assert_eq!(back.id, run.id);
        assert_eq!(back.state, run.state);
        assert_eq!(back.current_step, run.current_step);
        assert_eq!(back.claimed_by, run.claimed_by);
        assert_eq!(back.payload, run.payload);
    }

    #[test]
    fn test_side_round_trip() {
        assert_eq!(parse_side(side_to_str(Side::D)).unwrap(), Side::D);
        assert_eq!(parse_side(side_to_str(Side::K)).unwrap(), Side::K);
        assert!(parse_side("X").is_err());
    }

    #[test]
    fn test_entry_round_trip() {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("cost_center".to_string(), "CC-100".to_string());

        let new_entry = NewJournalEntry {
            id: JournalEntryId::new(),
            company_id: CompanyId::new(),
            entry_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            series: "A".to_string(),
            notes: Some("policy:SE_TEST_V1".to_string()),
            created_by: UserId::new(),
            source_pipeline_run: PipelineRunId::new(),
            lines: vec![
                bokpilot_core::booking::NewJournalLine {
                    account: "6110".to_string(),
                    side: Side::D,
                    amount: dec!(100.00),
                    description: Some("supplies".to_string()),
                    dimensions,
                },
                bokpilot_core::booking::NewJournalLine {
                    account: "1930".to_string(),
                    side: Side::K,
                    amount: dec!(100.00),
                    description: None,
                    dimensions: BTreeMap::new(),
                },
            ],
        };
        let entry = new_entry.into_entry(7, Utc::now());

        let (header, line_models) = entry_to_active(&entry).unwrap();
        let header_model = journal_entries::Model {
            id: unwrap_set(&header.id),
            company_id: unwrap_set(&header.company_id),
            entry_date: unwrap_set(&header.entry_date),
            series: unwrap_set(&header.series),
            number: unwrap_set(&header.number),
            notes: unwrap_set(&header.notes),
            created_at: unwrap_set(&header.created_at),
            created_by: unwrap_set(&header.created_by),
            source_pipeline_run: unwrap_set(&header.source_pipeline_run),
        };
        let line_rows = line_models
            .iter()
            .map(|l| journal_lines::Model {
                id: unwrap_set(&l.id),
                entry_id: unwrap_set(&l.entry_id),
                ordinal: unwrap_set(&l.ordinal),
                account: unwrap_set(&l.account),
                side: unwrap_set(&l.side),
                amount: unwrap_set(&l.amount),
                description: unwrap_set(&l.description),
                dimensions: unwrap_set(&l.dimensions),
            })
            .collect();

        let back = entry_from_models(header_model, line_rows).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.number, 7);
        assert!(back.is_balanced());
    }

    #[test]
    fn test_policy_round_trip() {
        let policy = builtin_policies().unwrap().remove(0);
        let active = policy_to_active(&policy).unwrap();
        let model = policies::Model {
            id: unwrap_set(&active.id),
            version: unwrap_set(&active.version),
            country: unwrap_set(&active.country),
            effective_from: unwrap_set(&active.effective_from),
            effective_to: unwrap_set(&active.effective_to),
            catalog_version: unwrap_set(&active.catalog_version),
            document: unwrap_set(&active.document),
        };
        let back = policy_from_model(model).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_catalog_round_trip() {
        let catalog = bas_2025_v1();
        let active = catalog_to_active(&catalog).unwrap();
        let model = account_catalogs::Model {
            version: unwrap_set(&active.version),
            effective_from: unwrap_set(&active.effective_from),
            effective_to: unwrap_set(&active.effective_to),
            regions: unwrap_set(&active.regions),
            accounts: unwrap_set(&active.accounts),
        };
        let back = catalog_from_model(model).unwrap();
        assert_eq!(back, catalog);
    }
}
