use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{AttemptOutcome, Batch};

/// Artifact whose remote hand-off failed and still has to be shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// No remote sink configured.
    Skipped,
    Uploaded { key: String },
    Failed { key: String, error: String },
}

/// What the checkpointer reports back for one flushed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointReport {
    Written {
        artifact: PathBuf,
        records: usize,
        upload: UploadStatus,
    },
    /// The local write failed; the batch is handed back untouched.
    LocalFailed { batch: Batch, error: String },
}

/// Counters and artifacts of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub attempted: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub transient: u64,
    pub fatal: u64,
    pub checkpoints: u64,
    pub checkpointed_records: u64,
    pub upload_failures: u64,
    pub unflushed: u64,
    pub cancelled: bool,
    pub artifacts: Vec<PathBuf>,
    pub pending_uploads: Vec<PendingUpload>,
}

impl RunSummary {
    /// Identifiers that ended in a transient or fatal fault.
    pub fn failed(&self) -> u64 {
        self.transient + self.fatal
    }

    pub(crate) fn count_outcome(&mut self, outcome: &AttemptOutcome) {
        self.attempted += 1;
        match outcome {
            AttemptOutcome::Success(_) => self.succeeded += 1,
            AttemptOutcome::NotFound(_) => self.not_found += 1,
            AttemptOutcome::Transient(..) => self.transient += 1,
            AttemptOutcome::Fatal(..) => self.fatal += 1,
        }
    }

    pub(crate) fn record_written(&mut self, artifact: PathBuf, records: usize, upload: UploadStatus) {
        self.checkpoints += 1;
        self.checkpointed_records += records as u64;

        match upload {
            UploadStatus::Skipped => {}
            UploadStatus::Uploaded { key } => {
                // An appended artifact is uploaded whole, so a later success
                // supersedes earlier failures for the same key.
                self.pending_uploads.retain(|p| p.key != key);
            }
            UploadStatus::Failed { key, .. } => {
                self.upload_failures += 1;
                self.pending_uploads.retain(|p| p.key != key);
                self.pending_uploads.push(PendingUpload {
                    path: artifact.clone(),
                    key,
                });
            }
        }

        if !self.artifacts.contains(&artifact) {
            self.artifacts.push(artifact);
        }
    }
}
