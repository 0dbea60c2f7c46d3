/*!
Checkpoint metadata and the persisted checkpoint document.
*/

use crate::state::StateStore;
use crate::{BatonError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Current checkpoint format version for compatibility tracking
pub const CHECKPOINT_FORMAT_VERSION: u8 = 1;

/// Traceability and integrity information stored next to every checkpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMetadata {
    /// Index of the epoch that will resume from this checkpoint (1, 2, ...)
    pub epoch: u64,

    /// ISO 8601 timestamp when the checkpoint was taken
    pub timestamp: DateTime<Utc>,

    /// SHA-256 hash of the serialized state for integrity verification
    pub content_hash: String,

    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Unique identifier for this specific checkpoint
    pub checkpoint_id: String,
}

impl CheckpointMetadata {
    /// Create metadata for the given epoch, hashing `state_bytes`
    pub fn new(epoch: u64, state_bytes: &[u8]) -> Self {
        Self {
            epoch,
            timestamp: Utc::now(),
            content_hash: Self::compute_hash(state_bytes),
            format_version: CHECKPOINT_FORMAT_VERSION,
            checkpoint_id: Uuid::new_v4().to_string(),
        }
    }

    /// Compute the hex SHA-256 hash of `data`
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Verify `state_bytes` against the stored hash
    pub fn verify_integrity(&self, state_bytes: &[u8]) -> Result<()> {
        let computed_hash = Self::compute_hash(state_bytes);
        if computed_hash == self.content_hash {
            Ok(())
        } else {
            Err(BatonError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual: computed_hash,
            })
        }
    }

    /// Check if this metadata is compatible with the current format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= CHECKPOINT_FORMAT_VERSION
    }
}

/// A state store together with the epoch it hands over to
///
/// This is what a [`crate::storage::StateBackend`] loads and flushes.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub epoch: u64,
    pub state: StateStore,
}

impl Checkpoint {
    pub fn new(epoch: u64, state: StateStore) -> Self {
        Self { epoch, state }
    }

    /// Seal the checkpoint into its serializable document form
    pub fn seal(&self) -> Result<CheckpointDocument> {
        let state_bytes = serde_json::to_vec(&self.state)?;
        Ok(CheckpointDocument {
            metadata: CheckpointMetadata::new(self.epoch, &state_bytes),
            state: self.state.clone(),
        })
    }
}

/// Serialized form of a checkpoint: metadata plus state
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckpointDocument {
    pub metadata: CheckpointMetadata,
    pub state: StateStore,
}

impl CheckpointDocument {
    /// Check format compatibility and content hash, then unwrap the checkpoint
    pub fn open(self) -> Result<Checkpoint> {
        if !self.metadata.is_compatible() {
            return Err(BatonError::invalid_format(format!(
                "Incompatible checkpoint format version: {} (current: {})",
                self.metadata.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }

        let state_bytes = serde_json::to_vec(&self.state)?;
        self.metadata.verify_integrity(&state_bytes)?;

        Ok(Checkpoint::new(self.metadata.epoch, self.state))
    }
}
