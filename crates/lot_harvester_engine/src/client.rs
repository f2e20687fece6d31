use std::time::Duration;

use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_warn};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;

use crate::document::{decode_html, fragment_rows, fragment_text, FormMethod};
use crate::{ClientError, ClientErrorKind, Document, Locator, NodeHandle};

/// Browser-like page client the harvest loop drives.
///
/// Implementations own a single "current document". Every navigation or
/// submission replaces it and invalidates the node handles handed out for
/// the previous one.
#[async_trait::async_trait]
pub trait RenderingClient: Send + Sync {
    async fn navigate(&mut self, url: &str) -> Result<(), ClientError>;

    /// Resolves once the current document is ready to be queried.
    async fn wait_ready(&mut self) -> Result<(), ClientError>;

    async fn locate(&mut self, locator: &Locator) -> Result<Option<NodeHandle>, ClientError>;

    async fn read_text(&self, node: NodeHandle) -> Result<String, ClientError>;

    /// Cell texts of the table rows under `node`.
    async fn read_rows(&self, node: NodeHandle) -> Result<Vec<Vec<String>>, ClientError>;

    /// Type `value` into the input `field_id` and submit its form, pressing
    /// `trigger_id` when given.
    async fn submit(
        &mut self,
        field_id: &str,
        value: &str,
        trigger_id: Option<&str>,
    ) -> Result<(), ClientError>;

    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Acquires the client for one run.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderingClient>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            user_agent: concat!("lot_harvester/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Plain HTTP implementation: pages are fetched with reqwest and queried
/// with scraper. Cookies persist for the lifetime of the client so form
/// sessions survive between requests.
pub struct HttpRenderingClient {
    settings: ClientSettings,
    http: reqwest::Client,
    current: Option<Document>,
    generation: u64,
    nodes: Vec<String>,
    closed: bool,
}

impl HttpRenderingClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .cookie_store(true)
            .build()
            .map_err(|err| ClientError::new(ClientErrorKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            http,
            current: None,
            generation: 0,
            nodes: Vec::new(),
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::new(ClientErrorKind::Closed, "client already closed"));
        }
        Ok(())
    }

    fn document(&self) -> Result<&Document, ClientError> {
        self.current
            .as_ref()
            .ok_or_else(|| ClientError::new(ClientErrorKind::NoDocument, "navigate first"))
    }

    fn node(&self, node: NodeHandle) -> Result<&str, ClientError> {
        if self.closed || node.generation() != self.generation {
            return Err(ClientError::new(
                ClientErrorKind::StaleReference,
                format!(
                    "node from document {} read after document {} loaded",
                    node.generation(),
                    self.generation
                ),
            ));
        }
        self.nodes
            .get(node.index())
            .map(String::as_str)
            .ok_or_else(|| ClientError::new(ClientErrorKind::StaleReference, "unknown node"))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn load(&mut self, request: reqwest::RequestBuilder) -> Result<(), ClientError> {
        let response = request
            .header(USER_AGENT, &self.settings.user_agent)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let kind = if is_unavailable(status) {
                ClientErrorKind::Unavailable
            } else {
                ClientErrorKind::HttpStatus(status.as_u16())
            };
            return Err(ClientError::new(kind, status.to_string()));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(too_large(max_bytes, len));
            }
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(ClientError::new(
                    ClientErrorKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    format!("{final_url} is not an html page"),
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_html(&bytes, content_type.as_deref());
        if decoded.lossy {
            harvest_warn!(
                "{} contained bytes invalid for {}; decoded lossily",
                final_url,
                decoded.encoding_label
            );
        }
        harvest_debug!(
            "loaded {} ({} bytes, {})",
            final_url,
            bytes.len(),
            decoded.encoding_label
        );

        self.generation += 1;
        self.nodes.clear();
        self.current = Some(Document::new(final_url, decoded.html));
        Ok(())
    }
}

#[async_trait::async_trait]
impl RenderingClient for HttpRenderingClient {
    async fn navigate(&mut self, url: &str) -> Result<(), ClientError> {
        self.ensure_open()?;
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| ClientError::new(ClientErrorKind::InvalidUrl, format!("{url}: {err}")))?;
        let request = self.http.get(parsed);
        self.load(request).await
    }

    async fn wait_ready(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        // The body is fully read before `load` returns, so a loaded document
        // is a ready one.
        self.document().map(|_| ())
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<NodeHandle>, ClientError> {
        self.ensure_open()?;
        let found = self.document()?.locate(locator)?;
        Ok(found.map(|outer_html| {
            self.nodes.push(outer_html);
            NodeHandle::new(self.generation, self.nodes.len() - 1)
        }))
    }

    async fn read_text(&self, node: NodeHandle) -> Result<String, ClientError> {
        self.node(node).map(fragment_text)
    }

    async fn read_rows(&self, node: NodeHandle) -> Result<Vec<Vec<String>>, ClientError> {
        self.node(node).map(fragment_rows)
    }

    async fn submit(
        &mut self,
        field_id: &str,
        value: &str,
        trigger_id: Option<&str>,
    ) -> Result<(), ClientError> {
        self.ensure_open()?;
        let form = self.document()?.form_submission(field_id, value, trigger_id)?;
        let request = match form.method {
            FormMethod::Get => {
                let mut url = form.action;
                url.query_pairs_mut().extend_pairs(form.fields.iter());
                self.http.get(url)
            }
            FormMethod::Post => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(form.fields.iter())
                    .finish();
                self.http
                    .post(form.action)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
            }
        };
        self.load(request).await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.closed = true;
        self.current = None;
        self.nodes.clear();
        Ok(())
    }
}

/// Opens a fresh [`HttpRenderingClient`] per run.
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    settings: ClientSettings,
}

impl HttpClientFactory {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl ClientFactory for HttpClientFactory {
    async fn open(&self) -> Result<Box<dyn RenderingClient>, ClientError> {
        let client = HttpRenderingClient::new(self.settings.clone())?;
        Ok(Box::new(client))
    }
}

fn is_unavailable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn too_large(max_bytes: u64, actual: u64) -> ClientError {
    ClientError::new(
        ClientErrorKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::new(ClientErrorKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return ClientError::new(ClientErrorKind::RedirectLimitExceeded, err.to_string());
    }
    if err.is_connect() {
        return ClientError::new(ClientErrorKind::Unavailable, err.to_string());
    }
    ClientError::new(ClientErrorKind::Network, err.to_string())
}
