//! Booking service: turns proposals into immutable journal entries.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use bokpilot_shared::types::{
    CompanyId, JournalEntryId, PageRequest, PageResponse, PipelineRunId, UserId,
};

use crate::engine::PostingProposal;
use crate::pipeline::PipelineRun;
use crate::repository::Repository;

use super::error::BookingError;
use super::types::{JournalEntry, NewJournalEntry, NewJournalLine};

/// Creates and looks up journal entries through the repository port.
#[derive(Clone)]
pub struct BookingService {
    repo: Arc<dyn Repository>,
}

impl BookingService {
    /// Creates a new booking service.
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Builds the bookable entry for a proposal.
    ///
    /// # Errors
    ///
    /// Returns `NotBalanced` when debits and credits differ (defense in
    /// depth) and `EmptyEntry` for a proposal without lines.
    pub fn build_entry(
        proposal: &PostingProposal,
        company_id: CompanyId,
        entry_date: NaiveDate,
        series: &str,
        created_by: UserId,
        source_pipeline_run: PipelineRunId,
    ) -> Result<NewJournalEntry, BookingError> {
        if proposal.lines.is_empty() {
            return Err(BookingError::EmptyEntry);
        }
        if !proposal.is_balanced() {
            return Err(BookingError::NotBalanced {
                debit: proposal.debit_total(),
                credit: proposal.credit_total(),
            });
        }

        let lines = proposal
            .lines
            .iter()
            .map(|line| NewJournalLine {
                account: line.account.clone(),
                side: line.side,
                amount: line.amount,
                description: line.description.clone(),
                dimensions: line.dimensions.clone(),
            })
            .collect();

        Ok(NewJournalEntry {
            id: JournalEntryId::new(),
            company_id,
            entry_date,
            series: series.to_string(),
            notes: Some(proposal.reason_codes.join("; ")),
            created_by,
            source_pipeline_run,
            lines,
        })
    }

    /// Books a proposal and persists the completed run in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `BookingError` for balance violations or repository
    /// failures.
    pub async fn create(
        &self,
        entry: NewJournalEntry,
        run: &PipelineRun,
    ) -> Result<JournalEntry, BookingError> {
        let entry = self.repo.insert_entry(entry, Some(run)).await?;
        info!(
            entry = %entry.id,
            series = %entry.series,
            number = entry.number,
            "journal entry booked"
        );
        Ok(entry)
    }

    /// Books a correction: a new balanced entry whose notes reference the
    /// original. The original is never mutated.
    ///
    /// # Errors
    ///
    /// Returns `BookingError` for balance violations or repository
    /// failures.
    pub async fn correct(
        &self,
        original: &JournalEntry,
        proposal: &PostingProposal,
        created_by: UserId,
    ) -> Result<JournalEntry, BookingError> {
        let mut entry = Self::build_entry(
            proposal,
            original.company_id,
            original.entry_date,
            &original.series,
            created_by,
            original.source_pipeline_run,
        )?;
        entry.notes = Some(format!("Correction of entry {}", original.id));

        let entry = self.repo.insert_entry(entry, None).await?;
        Ok(entry)
    }

    /// Returns the entry booked by a pipeline run.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundForRun` when the run booked nothing.
    pub async fn by_pipeline(&self, run_id: PipelineRunId) -> Result<JournalEntry, BookingError> {
        self.repo
            .entry_by_run(run_id)
            .await?
            .ok_or(BookingError::NotFoundForRun(run_id))
    }

    /// Lists entries for a company, ordered by (series, number).
    ///
    /// # Errors
    ///
    /// Returns repository failures.
    pub async fn list(
        &self,
        company_id: CompanyId,
        page: &PageRequest,
    ) -> Result<PageResponse<JournalEntry>, BookingError> {
        Ok(self.repo.list_entries(company_id, page).await?)
    }
}
