use std::path::{Path, PathBuf};

use lot_harvester_core::RunSummary;
use serde::{Deserialize, Serialize};

use crate::filename::sanitize_component;
use crate::harvest::HarvestRequest;
use crate::persist::{AtomicFileWriter, PersistError};

/// JSON summary of one run, written next to the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_label: String,
    pub started_at: String,
    pub finished_at: String,
    pub request: RequestEcho,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEcho {
    pub start: u64,
    pub end: u64,
    pub batch_size: usize,
    pub inter_request_delay_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff_factor: f64,
}

impl From<&HarvestRequest> for RequestEcho {
    fn from(request: &HarvestRequest) -> Self {
        Self {
            start: request.start,
            end: request.end,
            batch_size: request.batch_size,
            inter_request_delay_ms: request.inter_request_delay.as_millis() as u64,
            max_attempts: request.retry.max_attempts,
            retry_delay_ms: request.retry.retry_delay.as_millis() as u64,
            backoff_factor: request.retry.backoff_factor,
        }
    }
}

/// Writes `{dir}/run-{run_label}.json`, replacing a report of the same label.
pub fn write_run_report(dir: &Path, report: &RunReport) -> Result<PathBuf, PersistError> {
    let name = format!("run-{}.json", sanitize_component(&report.run_label, "run"));
    let mut json = serde_json::to_vec_pretty(report)?;
    json.push(b'\n');
    AtomicFileWriter::new(dir.to_path_buf()).write(&name, &json)
}
