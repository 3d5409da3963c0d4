//! # Execution Core
//!
//! The async facade. One `Client` owns one connection handle and session;
//! clones share both. Every public operation:
//!
//! 1. runs inside the call observer (begin/complete/failed records)
//! 2. validates its input locally, before any request
//! 3. routes transport failures through the error classifier
//!
//! Operations are grouped by concern: rows (`crud`), auth (`auth`),
//! RPC and authorization (`rpc`), objects and buckets (`storage`), and
//! change subscriptions (`realtime`).

mod auth;
mod crud;
mod realtime;
mod rpc;
mod storage;

pub use auth::{OAuthRedirect, SignupOutcome};
pub use realtime::{ChangeCallback, ChangeEvent, ChangePayload, Subscription};
pub use storage::{Bucket, BucketOptions, FileObject};

use std::sync::Arc;

use crate::classify::classify;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::errors::{ClientResult, TransportError};
use crate::observability::{observer_for, CallArgs, CallObserver, Summarize};
use crate::operation::Operation;
use crate::session::Session;

/// Async facade over rows, auth, storage, RPC and realtime
#[derive(Debug, Clone)]
pub struct Client {
    conn: Arc<Connection>,
    observer: CallObserver,
}

impl Client {
    /// Build a client; logging follows the config
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let observer = observer_for(&config);
        Self::with_observer(config, observer)
    }

    /// Build a client with an explicit call observer
    pub fn with_observer(config: ClientConfig, observer: CallObserver) -> ClientResult<Self> {
        let args = CallArgs::new()
            .with("url", &config.url)
            .with("schema", &config.schema)
            .secret("api_key");

        observer.clone().observe_sync(Operation::Connect, args, move || {
            let conn = Connection::open(config)?;
            Ok(Self {
                conn: Arc::new(conn),
                observer,
            })
        })
    }

    /// Build a client from `AERODB_URL` / `AERODB_API_KEY`
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        self.conn.config()
    }

    /// The active session, if any
    pub fn session(&self) -> Option<Arc<Session>> {
        self.conn.session().get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.conn.session().is_active()
    }

    pub fn observer(&self) -> &CallObserver {
        &self.observer
    }
}

impl Summarize for Client {
    fn summarize(&self) -> String {
        format!("client for {}", self.conn.base_url())
    }
}

/// Classifier bound to one operation, for `map_err`
pub(crate) fn failed(op: Operation) -> impl Fn(TransportError) -> crate::errors::ClientError {
    move |err| classify(err, op)
}
