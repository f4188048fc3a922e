// THEORY:
// One error taxonomy for the whole engine. The pixel pipeline only ever produces
// `Input` and `GeometryInvariant`; everything that talks to the collaborator can
// additionally produce the three `Service*` kinds. The retry policy never looks at
// message text: it asks `transient_kind()`, and only `ServiceTransient` answers.

use thiserror::Error;

/// Classification of a failure that is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientKind {
    /// HTTP 429, quota or resource-exhausted signals.
    RateLimit,
    /// 5xx responses, overload signals, dropped connections and timeouts.
    ServerFault,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate-limit"),
            Self::ServerFault => write!(f, "server-fault"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Bad image dimensions or thresholds. Never retried.
    #[error("invalid input: {0}")]
    Input(String),

    /// The collaborator is temporarily unavailable.
    #[error("collaborator {kind} failure: {message}")]
    ServiceTransient { kind: TransientKind, message: String },

    /// Every attempt allowed by the retry policy failed transiently.
    #[error("collaborator unavailable after {attempts} attempts: {last}")]
    ServiceUnavailable { attempts: u32, last: String },

    /// The collaborator answered, but the content is unusable.
    #[error("unusable collaborator response: {reason}")]
    ServiceResponse { reason: String, raw: String },

    /// A computed box broke the ordering or range invariant.
    #[error("geometry invariant violated: {0}")]
    GeometryInvariant(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("font error: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
}

impl Error {
    pub fn response(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ServiceResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::ServiceTransient {
            kind,
            message: message.into(),
        }
    }

    /// The retry class of this error, if it has one.
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            Self::ServiceTransient { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.transient_kind().is_some()
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::Input(format!("invalid collaborator client setup: {err}"));
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::transient(TransientKind::ServerFault, err.to_string());
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return Self::transient(TransientKind::RateLimit, err.to_string());
            }
            if status.is_server_error() {
                return Self::transient(TransientKind::ServerFault, err.to_string());
            }
        }
        Self::response(format!("transport error: {err}"), String::new())
    }
}

/// Result type alias for the whole crate.
pub type Result<T> = std::result::Result<T, Error>;
