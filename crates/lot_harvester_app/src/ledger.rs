//! Uploads that failed during a run, kept next to the artifacts so a later
//! `reupload` can retry them.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use harvest_logging::{harvest_info, harvest_warn};
use lot_harvester_core::PendingUpload;
use lot_harvester_engine::{ensure_output_dir, AtomicFileWriter, PersistError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const LEDGER_FILENAME: &str = ".lot_harvester_uploads.ron";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cannot read upload ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse upload ledger {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("cannot serialize upload ledger: {0}")]
    Serialize(String),
    #[error(transparent)]
    Write(#[from] PersistError),
    #[error("cannot hash {path}: {source}")]
    Digest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub path: PathBuf,
    pub key: String,
    /// Hex SHA-256 of the artifact when the upload failed.
    pub sha256: String,
    pub size: u64,
    pub failed_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLedger {
    pub entries: Vec<LedgerEntry>,
}

impl UploadLedger {
    /// A missing ledger is an empty one.
    pub fn load(output_dir: &Path) -> Result<Self, LedgerError> {
        let path = output_dir.join(LEDGER_FILENAME);
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(LedgerError::Read { path, source }),
        };
        let ledger: Self = ron::from_str(&content).map_err(|err| LedgerError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        harvest_info!(
            "loaded {} pending upload(s) from {:?}",
            ledger.entries.len(),
            path
        );
        Ok(ledger)
    }

    pub fn save(&self, output_dir: &Path) -> Result<PathBuf, LedgerError> {
        ensure_output_dir(output_dir)?;
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .map_err(|err| LedgerError::Serialize(err.to_string()))?;
        let writer = AtomicFileWriter::new(output_dir.to_path_buf());
        Ok(writer.write(LEDGER_FILENAME, content.as_bytes())?)
    }

    /// Adds the run's failed uploads. A key already in the ledger is replaced
    /// by the newer failure. Artifacts that vanished are logged and skipped.
    pub fn record_failures(&mut self, pending: &[PendingUpload]) -> usize {
        let failed_at = Local::now().to_rfc3339();
        let mut recorded = 0;
        for upload in pending {
            let (sha256, size) = match digest_file(&upload.path) {
                Ok(digest) => digest,
                Err(err) => {
                    harvest_warn!("not recording upload of {:?}: {}", upload.path, err);
                    continue;
                }
            };
            self.entries.retain(|entry| entry.key != upload.key);
            self.entries.push(LedgerEntry {
                path: upload.path.clone(),
                key: upload.key.clone(),
                sha256,
                size,
                failed_at: failed_at.clone(),
            });
            recorded += 1;
        }
        recorded
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex SHA-256 and byte length of a file.
pub fn digest_file(path: &Path) -> Result<(String, u64), LedgerError> {
    let bytes = fs::read(path).map_err(|source| LedgerError::Digest {
        path: path.to_path_buf(),
        source,
    })?;
    let hash = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(hash.len() * 2);
    for byte in hash {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok((hex, bytes.len() as u64))
}
