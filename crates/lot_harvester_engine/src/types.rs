use std::fmt;

/// How an element is looked up on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Element whose `id` attribute equals the value.
    Id(String),
    /// First element matching a CSS selector.
    Css(String),
    /// First element matching `css` whose text contains `text` (ASCII
    /// case-insensitive).
    ContainsText { css: String, text: String },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "id={id}"),
            Locator::Css(css) => write!(f, "css={css}"),
            Locator::ContainsText { css, text } => write!(f, "css={css} containing {text:?}"),
        }
    }
}

/// Reference to a located element. Only valid for the document it was
/// located in; the next navigation makes it stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    generation: u64,
    index: usize,
}

impl NodeHandle {
    pub fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Faults worth another attempt at the same identifier.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientErrorKind {
    InvalidUrl,
    InvalidSelector,
    HttpStatus(u16),
    /// Navigation or readiness wait ran out of time.
    Timeout,
    /// A node handle outlived the document it came from.
    StaleReference,
    /// The target answered 429/5xx or refused the connection.
    Unavailable,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    /// Nothing has been navigated to yet.
    NoDocument,
    FieldNotFound { field_id: String },
    Closed,
    Network,
}

impl ClientErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientErrorKind::Timeout | ClientErrorKind::StaleReference | ClientErrorKind::Unavailable
        )
    }
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErrorKind::InvalidUrl => write!(f, "invalid url"),
            ClientErrorKind::InvalidSelector => write!(f, "invalid selector"),
            ClientErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            ClientErrorKind::Timeout => write!(f, "timeout"),
            ClientErrorKind::StaleReference => write!(f, "stale element reference"),
            ClientErrorKind::Unavailable => write!(f, "target unavailable"),
            ClientErrorKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            ClientErrorKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            ClientErrorKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            ClientErrorKind::NoDocument => write!(f, "no document loaded"),
            ClientErrorKind::FieldNotFound { field_id } => {
                write!(f, "form field {field_id} not found")
            }
            ClientErrorKind::Closed => write!(f, "client closed"),
            ClientErrorKind::Network => write!(f, "network error"),
        }
    }
}
