//! Journal entry domain types.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bokpilot_shared::types::{CompanyId, JournalEntryId, JournalLineId, PipelineRunId, UserId};

use crate::policy::Side;

/// One persisted journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Unique identifier.
    pub id: JournalLineId,
    /// The entry this line belongs to.
    pub entry_id: JournalEntryId,
    /// Position within the entry; preserves template order.
    pub ordinal: i32,
    /// Account number.
    pub account: String,
    /// Debit or credit.
    pub side: Side,
    /// Line amount, always positive.
    pub amount: Decimal,
    /// Line description.
    #[serde(default)]
    pub description: Option<String>,
    /// Dimension values (project, cost_center, ...).
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

/// An immutable, balanced journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier.
    pub id: JournalEntryId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Posting date.
    pub entry_date: NaiveDate,
    /// Journal series (e.g. "A").
    pub series: String,
    /// Sequence number, monotonic and gap-free within (company, series).
    pub number: i64,
    /// Entry notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Who created the entry.
    pub created_by: UserId,
    /// The pipeline run the entry originates from.
    pub source_pipeline_run: PipelineRunId,
    /// The lines, in ordinal order.
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Sum of debit line amounts.
    #[must_use]
    pub fn debit_total(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.side == Side::D)
            .map(|l| l.amount)
            .sum()
    }

    /// Sum of credit line amounts.
    #[must_use]
    pub fn credit_total(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.side == Side::K)
            .map(|l| l.amount)
            .sum()
    }

    /// True if debits equal credits exactly.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.debit_total() == self.credit_total()
    }
}

/// One line of an entry about to be booked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournalLine {
    /// Account number.
    pub account: String,
    /// Debit or credit.
    pub side: Side,
    /// Line amount, always positive.
    pub amount: Decimal,
    /// Line description.
    #[serde(default)]
    pub description: Option<String>,
    /// Dimension values.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

/// An entry about to be booked; the repository assigns the series number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    /// Pre-allocated entry id.
    pub id: JournalEntryId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Posting date.
    pub entry_date: NaiveDate,
    /// Journal series.
    pub series: String,
    /// Entry notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Who creates the entry.
    pub created_by: UserId,
    /// The originating pipeline run.
    pub source_pipeline_run: PipelineRunId,
    /// The lines, in output order.
    pub lines: Vec<NewJournalLine>,
}

impl NewJournalEntry {
    /// Materializes the persisted entry once a number is allocated.
    #[must_use]
    pub fn into_entry(self, number: i64, created_at: DateTime<Utc>) -> JournalEntry {
        let id = self.id;
        let lines = self
            .lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| JournalLine {
                id: JournalLineId::new(),
                entry_id: id,
                ordinal: i32::try_from(i).unwrap_or(i32::MAX),
                account: line.account,
                side: line.side,
                amount: line.amount,
                description: line.description,
                dimensions: line.dimensions,
            })
            .collect();

        JournalEntry {
            id,
            company_id: self.company_id,
            entry_date: self.entry_date,
            series: self.series,
            number,
            notes: self.notes,
            created_at,
            created_by: self.created_by,
            source_pipeline_run: self.source_pipeline_run,
            lines,
        }
    }
}
