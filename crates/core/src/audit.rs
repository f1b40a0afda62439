//! Append-only audit records.
//!
//! Every pipeline step appends one record carrying a content-addressed
//! digest of the step output. Records are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use bokpilot_shared::types::{AuditRecordId, PipelineRunId, UserId};

use crate::pipeline::PipelineStep;

/// One audit record for one executed pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier.
    pub id: AuditRecordId,
    /// The run the step belongs to.
    pub run_id: PipelineRunId,
    /// The executed step.
    pub step: PipelineStep,
    /// When the step completed.
    pub ts: DateTime<Utc>,
    /// Who drove the run.
    pub actor: UserId,
    /// Hex SHA-256 of the canonical JSON of the step output.
    pub payload_digest: String,
}

impl AuditRecord {
    /// Creates a record for a completed step.
    #[must_use]
    pub fn new(
        run_id: PipelineRunId,
        step: PipelineStep,
        actor: UserId,
        payload_digest: String,
    ) -> Self {
        Self {
            id: AuditRecordId::new(),
            run_id,
            step,
            ts: Utc::now(),
            actor,
            payload_digest,
        }
    }
}

/// Computes the hex SHA-256 digest of a serializable step output.
///
/// # Errors
///
/// Returns a serialization error if the value cannot be encoded as JSON.
pub fn payload_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
