use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use harvest_logging::harvest_debug;
use thiserror::Error;
use url::Url;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("cannot read artifact {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("remote answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("write failed: {0}")]
    Write(#[from] PersistError),
}

/// Remote object storage for finished artifacts. A `put` either stores the
/// whole file under `key` or fails; partial objects are never left behind
/// by the implementations here.
#[async_trait::async_trait]
pub trait RemoteSink: Send + Sync {
    async fn put(&self, local: &Path, key: &str) -> Result<(), SinkError>;

    /// Short human-readable destination for logs.
    fn describe(&self) -> String;
}

/// Stores artifacts with `PUT {base_url}/{key}`.
pub struct HttpPutSink {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpPutSink {
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            token,
        })
    }

    pub fn object_url(&self, key: &str) -> Result<Url, SinkError> {
        validate_key(key)?;
        self.base_url.join(key).map_err(|_| SinkError::InvalidKey {
            key: key.to_string(),
            reason: "not a relative url path",
        })
    }
}

#[async_trait::async_trait]
impl RemoteSink for HttpPutSink {
    async fn put(&self, local: &Path, key: &str) -> Result<(), SinkError> {
        let url = self.object_url(key)?;
        let body = tokio::fs::read(local)
            .await
            .map_err(|source| SinkError::ReadArtifact {
                path: local.to_path_buf(),
                source,
            })?;
        let size = body.len();

        let mut request = self.http.put(url.clone()).body(bytes::Bytes::from(body));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        harvest_debug!("PUT {} ({} bytes) -> {}", url, size, status);
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

/// Copies artifacts below a local root, typically a mounted bucket.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl RemoteSink for DirectorySink {
    async fn put(&self, local: &Path, key: &str) -> Result<(), SinkError> {
        validate_key(key)?;
        let content = tokio::fs::read(local)
            .await
            .map_err(|source| SinkError::ReadArtifact {
                path: local.to_path_buf(),
                source,
            })?;

        let target = self.root.join(key);
        let (dir, file_name) = match (target.parent(), target.file_name()) {
            (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_string_lossy().into_owned()),
            _ => {
                return Err(SinkError::InvalidKey {
                    key: key.to_string(),
                    reason: "no file name",
                })
            }
        };
        AtomicFileWriter::new(dir).write(&file_name, &content)?;
        harvest_debug!("copied {} to {}", local.display(), target.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Keys are relative `/`-separated paths without `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), SinkError> {
    let invalid = |reason| SinkError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("empty"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(invalid("must be a relative path"));
    }
    if key.split('/').any(|segment| segment.is_empty()) {
        return Err(invalid("empty path segment"));
    }
    let all_normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal || key.split('/').any(|s| s == "." || s == "..") {
        return Err(invalid("dot segments are not allowed"));
    }
    Ok(())
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
