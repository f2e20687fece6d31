use std::path::{Path, PathBuf};

use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use lot_harvester_core::{Batch, CheckpointReport, FieldSchema, UploadStatus, DEFAULT_ID_WIDTH};

use crate::filename::artifact_filename;
use crate::persist::{append_rows, render_csv, AtomicFileWriter, PersistError};
use crate::sink::RemoteSink;

/// Where flushed batches land on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPolicy {
    /// One growing file; the header is written once.
    Append { file_name: String },
    /// A fresh file per batch, named after the run and its identifier bounds.
    PerBatch { stem: String },
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        ArtifactPolicy::Append {
            file_name: "lots.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointSettings {
    pub output_dir: PathBuf,
    pub policy: ArtifactPolicy,
    pub run_label: String,
    /// Prefix of remote object keys, without trailing slash. Empty means
    /// keys are the bare file names.
    pub key_prefix: String,
    pub id_width: usize,
}

impl CheckpointSettings {
    pub fn new(output_dir: impl Into<PathBuf>, run_label: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            policy: ArtifactPolicy::default(),
            run_label: run_label.into(),
            key_prefix: String::new(),
            id_width: DEFAULT_ID_WIDTH,
        }
    }
}

/// Serializes batches to CSV and ships each written artifact to the sink.
pub struct Checkpointer {
    settings: CheckpointSettings,
    schema: FieldSchema,
    sink: Option<Box<dyn RemoteSink>>,
}

impl Checkpointer {
    pub fn new(
        settings: CheckpointSettings,
        schema: FieldSchema,
        sink: Option<Box<dyn RemoteSink>>,
    ) -> Self {
        Self {
            settings,
            schema,
            sink,
        }
    }

    /// Remote key for a local artifact: `{key_prefix}/{file name}`.
    pub fn destination_key(&self, artifact: &Path) -> String {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = self.settings.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        }
    }

    /// Never fails: a local write error hands the batch back, a remote error
    /// is reported alongside the intact artifact.
    pub async fn flush(&self, index: u64, batch: Batch) -> CheckpointReport {
        let records = batch.len();
        let artifact = match self.write_local(&batch) {
            Ok(path) => path,
            Err(err) => {
                harvest_error!("checkpoint {} could not be written: {}", index, err);
                return CheckpointReport::LocalFailed {
                    batch,
                    error: err.to_string(),
                };
            }
        };
        harvest_info!(
            "checkpoint {}: {} records -> {}",
            index,
            records,
            artifact.display()
        );

        let upload = match &self.sink {
            None => UploadStatus::Skipped,
            Some(sink) => {
                let key = self.destination_key(&artifact);
                match sink.put(&artifact, &key).await {
                    Ok(()) => {
                        harvest_info!("uploaded {} to {}", key, sink.describe());
                        UploadStatus::Uploaded { key }
                    }
                    Err(err) => {
                        harvest_warn!(
                            "upload of {} failed, local artifact kept: {}",
                            artifact.display(),
                            err
                        );
                        UploadStatus::Failed {
                            key,
                            error: err.to_string(),
                        }
                    }
                }
            }
        };

        CheckpointReport::Written {
            artifact,
            records,
            upload,
        }
    }

    fn write_local(&self, batch: &Batch) -> Result<PathBuf, PersistError> {
        let width = self.settings.id_width;
        let rows: Vec<Vec<String>> = batch.records().iter().map(|r| r.to_row(width)).collect();
        let header = self.schema.header();

        match &self.settings.policy {
            ArtifactPolicy::Append { file_name } => {
                let path = self.settings.output_dir.join(file_name);
                append_rows(&path, &header, &rows)?;
                Ok(path)
            }
            ArtifactPolicy::PerBatch { stem } => {
                let (Some(first), Some(last)) = (batch.first_identifier(), batch.last_identifier())
                else {
                    return Err(PersistError::Empty);
                };
                let name = artifact_filename(stem, &self.settings.run_label, first, last, width);
                let content = render_csv(Some(&header), &rows)?;
                AtomicFileWriter::new(self.settings.output_dir.clone()).write_new(&name, &content)
            }
        }
    }
}
