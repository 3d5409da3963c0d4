//! # Error Classifier
//!
//! Maps any failure raised while executing an operation into exactly one
//! `ClientError`. Pure and deterministic: the same failure and operation
//! always yield the same kind.
//!
//! Rules, first match wins:
//! 1. Already typed errors pass through unchanged.
//! 2. Storage operations: case-insensitive substring match on the message.
//! 3. Row operations with a structured backend code: fixed code table.
//! 4. Otherwise the operation's domain decides.

use crate::errors::{ClientError, ErrorKind, TransportError};
use crate::operation::{Domain, Operation};

/// Postgres / PostgREST codes with a dedicated kind
const DATABASE_CODES: &[(&str, ErrorKind)] = &[
    ("23505", ErrorKind::Duplicate),  // unique_violation
    ("23503", ErrorKind::Validation), // foreign_key_violation
    ("23502", ErrorKind::Validation), // not_null_violation
    ("22P02", ErrorKind::Validation), // invalid_text_representation
    ("42P01", ErrorKind::Database),   // undefined_table
    ("PGRST116", ErrorKind::NotFound),
];

/// Ordered storage message fragments
const STORAGE_RULES: &[(&str, ErrorKind)] = &[
    ("authentication", ErrorKind::StorageAuth),
    ("permission", ErrorKind::StoragePermission),
    ("quota", ErrorKind::StorageQuota),
    ("not found", ErrorKind::StorageNotFound),
    ("validation", ErrorKind::StorageValidation),
];

/// Input to the classifier
#[derive(Debug)]
pub enum Failure {
    Typed(ClientError),
    Transport(TransportError),
}

impl From<ClientError> for Failure {
    fn from(err: ClientError) -> Self {
        Failure::Typed(err)
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        Failure::Transport(err)
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        Failure::Transport(TransportError::Http(err))
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::Transport(TransportError::Decode(err))
    }
}

/// Classify a failure raised by `op`
pub fn classify(failure: impl Into<Failure>, op: Operation) -> ClientError {
    let transport = match failure.into() {
        Failure::Typed(err) => return err,
        Failure::Transport(transport) => transport,
    };

    let kind = match op.domain() {
        Domain::Storage => storage_kind(&transport),
        Domain::Query => database_kind(&transport).unwrap_or(ErrorKind::Query),
        Domain::Auth => ErrorKind::Authentication,
        Domain::Authorization => ErrorKind::Authorization,
        Domain::Connection | Domain::Realtime => ErrorKind::Connection,
    };

    let message = match kind {
        ErrorKind::NotFound => format!("No matching record during {}", op.name()),
        _ => format!("Failed to {}: {}", op.action(), transport),
    };

    ClientError::with_source(kind, message, transport)
}

/// Kind for a storage failure, by the backend's error message.
///
/// Only API error bodies are matched. Transport failures carry the request
/// URL, which names the bucket and object.
pub fn storage_kind(transport: &TransportError) -> ErrorKind {
    let text = match transport {
        TransportError::Api(api) => api.full_text().to_lowercase(),
        _ => return ErrorKind::Storage,
    };

    STORAGE_RULES
        .iter()
        .find(|(fragment, _)| text.contains(fragment))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Storage)
}

/// Kind for a row failure carrying a backend code, if the code is known
pub fn database_kind(transport: &TransportError) -> Option<ErrorKind> {
    let code = transport.api_code()?;
    DATABASE_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, kind)| *kind)
}
