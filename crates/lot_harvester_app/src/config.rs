use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lot_harvester_core::{FieldSchema, DEFAULT_ID_WIDTH};
use lot_harvester_engine::{
    ArtifactPolicy, ClientSettings, FetchSettings, HarvestRequest, NavigationMode, RetryPolicy,
    TargetSite,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::cli::{PolicyArg, ReuploadArgs, RunArgs, SinkArgs};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("start {start} is after end {end}")]
    InvertedRange { start: u64, end: u64 },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("invalid {what} url {value:?}: {reason}")]
    Url {
        what: &'static str,
        value: String,
        reason: String,
    },
    #[error("id width {0} outside 1..=20")]
    IdWidth(usize),
    #[error("backoff factor {0} must be finite and at least 1")]
    BackoffFactor(f64),
    #[error("field list is empty")]
    EmptySchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Artifacts {
    Append { file_name: String },
    PerBatch { stem: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sink {
    None,
    Http { url: String },
    Directory { path: PathBuf },
}

/// Everything a run needs. Missing fields take their defaults, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub endpoint: String,
    pub navigation: NavigationMode,
    pub id_width: usize,
    pub start: u64,
    pub end: u64,
    pub batch_size: usize,
    pub delay_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff_factor: f64,
    pub ready_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub strategy_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub artifacts: Artifacts,
    pub sink: Sink,
    /// Skipped when serializing so a written config never leaks it.
    #[serde(skip_serializing)]
    pub sink_token: Option<String>,
    pub key_prefix: String,
    pub fields: Vec<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://dofe.gov.np/".to_string(),
            navigation: NavigationMode::Form {
                field_id: "lytA_ctl23_Stickertext".to_string(),
                trigger_id: Some("lytA_ctl23_passportSearch".to_string()),
            },
            id_width: DEFAULT_ID_WIDTH,
            start: 48363817,
            end: 48363820,
            batch_size: 5,
            delay_ms: 5_000,
            max_attempts: 3,
            retry_delay_ms: 5_000,
            backoff_factor: 1.0,
            ready_timeout_secs: 20,
            settle_delay_ms: 0,
            strategy_timeout_ms: 2_000,
            request_timeout_secs: 30,
            output_dir: PathBuf::from("output"),
            artifacts: Artifacts::Append {
                file_name: "final_permission_scraped.csv".to_string(),
            },
            sink: Sink::None,
            sink_token: None,
            key_prefix: "lot_harvester".to_string(),
            fields: FieldSchema::permit_details().labels().to_vec(),
        }
    }
}

impl HarvestConfig {
    /// Defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if let Some(start) = args.start {
            self.start = start;
        }
        if let Some(end) = args.end {
            self.end = end;
        }
        if let Some(batch_size) = args.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(delay_ms) = args.delay_ms {
            self.delay_ms = delay_ms;
        }
        if let Some(max_attempts) = args.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(retry_delay_ms) = args.retry_delay_ms {
            self.retry_delay_ms = retry_delay_ms;
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(policy) = args.artifact_policy {
            self.artifacts = match policy {
                PolicyArg::Append => Artifacts::Append {
                    file_name: self.artifact_stem() + ".csv",
                },
                PolicyArg::PerBatch => Artifacts::PerBatch {
                    stem: self.artifact_stem(),
                },
            };
        }
        self.apply_sink_args(&args.sink);
    }

    pub fn apply_reupload_args(&mut self, args: &ReuploadArgs) {
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
        self.apply_sink_args(&args.sink);
    }

    fn apply_sink_args(&mut self, args: &SinkArgs) {
        if let Some(url) = &args.sink_url {
            self.sink = Sink::Http { url: url.clone() };
        }
        if let Some(dir) = &args.sink_dir {
            self.sink = Sink::Directory { path: dir.clone() };
        }
        if args.sink_token.is_some() {
            self.sink_token = args.sink_token.clone();
        }
    }

    fn artifact_stem(&self) -> String {
        match &self.artifacts {
            Artifacts::Append { file_name } => Path::new(file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "lots".to_string()),
            Artifacts::PerBatch { stem } => stem.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start > self.end {
            return Err(ConfigError::InvertedRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if !(1..=20).contains(&self.id_width) {
            return Err(ConfigError::IdWidth(self.id_width));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        if self.fields.is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        self.endpoint_url()?;
        if let Sink::Http { url } = &self.sink {
            parse_http_url("sink", url)?;
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("endpoint", &self.endpoint)
    }

    pub fn sink_url(&self) -> Result<Option<Url>, ConfigError> {
        match &self.sink {
            Sink::Http { url } => parse_http_url("sink", url).map(Some),
            _ => Ok(None),
        }
    }

    pub fn request(&self) -> HarvestRequest {
        HarvestRequest {
            start: self.start,
            end: self.end,
            batch_size: self.batch_size,
            inter_request_delay: Duration::from_millis(self.delay_ms),
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.retry_delay_ms),
                self.backoff_factor,
            ),
        }
    }

    pub fn target_site(&self) -> Result<TargetSite, ConfigError> {
        Ok(TargetSite {
            endpoint: self.endpoint_url()?,
            mode: self.navigation.clone(),
            id_width: self.id_width,
        })
    }

    pub fn schema(&self) -> FieldSchema {
        FieldSchema::new(self.fields.iter().cloned())
    }

    pub fn artifact_policy(&self) -> ArtifactPolicy {
        match &self.artifacts {
            Artifacts::Append { file_name } => ArtifactPolicy::Append {
                file_name: file_name.clone(),
            },
            Artifacts::PerBatch { stem } => ArtifactPolicy::PerBatch { stem: stem.clone() },
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..ClientSettings::default()
        }
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_http_url(what: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Url {
        what,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}
