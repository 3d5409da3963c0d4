//! # Client Errors
//!
//! Typed error hierarchy for every facade operation.
//!
//! ```text
//! ClientError
//!  ├─ Database:  Connection, Query, NotFound, Duplicate, Validation, Database
//!  ├─ Auth:      Authentication, Authorization
//!  ├─ Storage:   StorageAuth, StoragePermission, StorageQuota,
//!  │             StorageNotFound, StorageValidation, Storage
//!  └─ AiService: AiService
//! ```
//!
//! A `ClientError` is built once (by the classifier or by input validation)
//! and never mutated. The low-level cause stays attached as `source`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type for facade operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Middle layer of the error hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorFamily {
    Database,
    Auth,
    Storage,
    AiService,
}

/// Leaf error kinds callers match on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // ==================
    // Database family
    // ==================
    /// Client construction or initialization failed
    Connection,
    /// A select/insert/update/delete failed
    Query,
    /// A single required record was not found
    NotFound,
    /// Unique constraint violation
    Duplicate,
    /// Bad input shape, unsupported operator, constraint violation
    Validation,
    /// Generic database failure (e.g. undefined table)
    Database,

    // ==================
    // Auth family
    // ==================
    /// Login, signup, reset, logout or session failure
    Authentication,
    /// Domain scoping or permission RPC failure
    Authorization,

    // ==================
    // Storage family
    // ==================
    StorageAuth,
    StoragePermission,
    StorageQuota,
    StorageNotFound,
    StorageValidation,
    /// Storage failure that matched no specific rule
    Storage,

    // ==================
    // AI service family
    // ==================
    AiService,
}

impl ErrorKind {
    /// The family this kind belongs to
    pub fn family(&self) -> ErrorFamily {
        match self {
            ErrorKind::Connection
            | ErrorKind::Query
            | ErrorKind::NotFound
            | ErrorKind::Duplicate
            | ErrorKind::Validation
            | ErrorKind::Database => ErrorFamily::Database,
            ErrorKind::Authentication | ErrorKind::Authorization => ErrorFamily::Auth,
            ErrorKind::StorageAuth
            | ErrorKind::StoragePermission
            | ErrorKind::StorageQuota
            | ErrorKind::StorageNotFound
            | ErrorKind::StorageValidation
            | ErrorKind::Storage => ErrorFamily::Storage,
            ErrorKind::AiService => ErrorFamily::AiService,
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "AERO_CLIENT_CONNECTION_ERROR",
            ErrorKind::Query => "AERO_CLIENT_QUERY_ERROR",
            ErrorKind::NotFound => "AERO_CLIENT_NOT_FOUND",
            ErrorKind::Duplicate => "AERO_CLIENT_DUPLICATE",
            ErrorKind::Validation => "AERO_CLIENT_VALIDATION_ERROR",
            ErrorKind::Database => "AERO_CLIENT_DATABASE_ERROR",
            ErrorKind::Authentication => "AERO_CLIENT_AUTHENTICATION_ERROR",
            ErrorKind::Authorization => "AERO_CLIENT_AUTHORIZATION_ERROR",
            ErrorKind::StorageAuth => "AERO_CLIENT_STORAGE_AUTH_ERROR",
            ErrorKind::StoragePermission => "AERO_CLIENT_STORAGE_PERMISSION_ERROR",
            ErrorKind::StorageQuota => "AERO_CLIENT_STORAGE_QUOTA_ERROR",
            ErrorKind::StorageNotFound => "AERO_CLIENT_STORAGE_NOT_FOUND",
            ErrorKind::StorageValidation => "AERO_CLIENT_STORAGE_VALIDATION_ERROR",
            ErrorKind::Storage => "AERO_CLIENT_STORAGE_ERROR",
            ErrorKind::AiService => "AERO_CLIENT_AI_SERVICE_ERROR",
        }
    }

    /// Short lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Query => "query",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Validation => "validation",
            ErrorKind::Database => "database",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::StorageAuth => "storage_auth",
            ErrorKind::StoragePermission => "storage_permission",
            ErrorKind::StorageQuota => "storage_quota",
            ErrorKind::StorageNotFound => "storage_not_found",
            ErrorKind::StorageValidation => "storage_validation",
            ErrorKind::Storage => "storage",
            ErrorKind::AiService => "ai_service",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed error returned by every facade operation
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Arc<TransportError>>,
}

impl ClientError {
    /// Create an error without an underlying cause
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error that chains a transport-level cause
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: TransportError) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Input validation failure
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    /// Client construction failure
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, msg)
    }

    /// Authentication failure
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, msg)
    }

    /// Authorization failure
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, msg)
    }

    /// Storage input validation failure
    pub fn storage_validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageValidation, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn family(&self) -> ErrorFamily {
        self.kind.family()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The chained low-level cause, if any
    pub fn transport(&self) -> Option<&TransportError> {
        self.source.as_deref()
    }

    pub fn is_database(&self) -> bool {
        self.family() == ErrorFamily::Database
    }

    pub fn is_auth(&self) -> bool {
        self.family() == ErrorFamily::Auth
    }

    pub fn is_storage(&self) -> bool {
        self.family() == ErrorFamily::Storage
    }
}

/// Low-level failures produced by the HTTP and WebSocket layers
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP transport failure: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("{0}")]
    Api(ApiError),

    /// Realtime socket failure
    #[error("WebSocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Response body was not the expected JSON
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Backend replied with something the protocol does not allow
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// No reply within the allowed time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Structured error code carried by the backend, if any
    pub fn api_code(&self) -> Option<&str> {
        match self {
            TransportError::Api(api) => api.code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the failed call, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api(api) => Some(api.status),
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Http(e) => e.is_timeout(),
            TransportError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<ApiError> for TransportError {
    fn from(err: ApiError) -> Self {
        TransportError::Api(err)
    }
}

/// Error body returned by the rows, auth or storage API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    /// Postgres/PostgREST code (`23505`, `PGRST116`) or auth error code
    pub code: Option<String>,
    /// Short error tag (storage `error` field, auth `error` field)
    pub error: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl ApiError {
    /// Parse whichever error body shape the backend returned
    ///
    /// Rows: `{code, message, details, hint}`; auth: `{error_code, msg}` or
    /// `{error, error_description}`; storage: `{statusCode, error, message}`.
    /// Non-JSON bodies become the message verbatim.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body).trim().to_string();
        let json = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Self {
                    status,
                    code: None,
                    error: None,
                    message: if text.is_empty() {
                        format!("empty response body (status {})", status)
                    } else {
                        text
                    },
                    details: None,
                    hint: None,
                }
            }
        };

        let field = |key: &str| -> Option<String> {
            match json.get(key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(v @ Value::Object(_)) | Some(v @ Value::Array(_)) => Some(v.to_string()),
                _ => None,
            }
        };

        let code = field("code").or_else(|| field("error_code"));
        let error = field("error");
        let message = field("message")
            .or_else(|| field("msg"))
            .or_else(|| field("error_description"))
            .or_else(|| error.clone())
            .unwrap_or(text);

        Self {
            status,
            code,
            error,
            message,
            details: field("details"),
            hint: field("hint"),
        }
    }

    /// Error tag and message joined, used for substring classification
    pub fn full_text(&self) -> String {
        match &self.error {
            Some(error) if error != &self.message => format!("{}: {}", error, self.message),
            _ => self.message.clone(),
        }
    }
}
