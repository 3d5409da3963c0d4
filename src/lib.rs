//! aerodb_client - Unified data-access facade for an AeroDB service
//!
//! Rows, auth, object storage, realtime change feeds and RPC behind one
//! async `Client`, with a blocking twin and a classified error taxonomy.

pub mod blocking;
pub mod classify;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod errors;
pub mod observability;
pub mod operation;
pub mod query;
pub mod session;

pub use blocking::{run_blocking, BlockingClient, SyncBridge};
pub use client::{
    Bucket, BucketOptions, ChangeCallback, ChangeEvent, ChangePayload, Client, FileObject,
    OAuthRedirect, SignupOutcome, Subscription,
};
pub use config::ClientConfig;
pub use errors::{ApiError, ClientError, ClientResult, ErrorFamily, ErrorKind, TransportError};
pub use operation::{Domain, Operation};
pub use query::{Fields, Filter, FilterOperator, Row};
pub use session::{Session, User};
