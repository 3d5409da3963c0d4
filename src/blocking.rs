//! # Sync Bridge
//!
//! Blocking twins of every async facade operation.
//!
//! `run_blocking` is the one generic helper: with no runtime on the calling
//! thread it drives the future on a fresh current-thread runtime; inside a
//! runtime it hands the future to a scoped worker thread with its own
//! runtime and blocks on the join. Results and errors come back unchanged;
//! a panic on the worker is resumed on the caller.
//!
//! `BlockingClient` owns a long-lived multi-thread runtime instead. Pooled
//! connections and realtime reader tasks live on it between calls, and every
//! call goes through the same nesting-aware `SyncBridge::block_on`.

use std::future::Future;
use std::io;
use std::panic::resume_unwind;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};
use uuid::Uuid;

use crate::client::{
    Bucket, BucketOptions, ChangeCallback, ChangeEvent, Client, FileObject, OAuthRedirect,
    SignupOutcome, Subscription,
};
use crate::config::ClientConfig;
use crate::errors::{ClientError, ClientResult};
use crate::query::{Fields, Filter, Row};
use crate::session::{Session, User};

/// Worker threads for the bridge runtime
const BRIDGE_WORKER_THREADS: usize = 2;

/// Run a future to completion from synchronous code
pub fn run_blocking<F>(future: F) -> io::Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    if Handle::try_current().is_ok() {
        std::thread::scope(|s| {
            let worker = s.spawn(|| current_thread_runtime().map(|rt| rt.block_on(future)));
            match worker.join() {
                Ok(output) => output,
                Err(panic) => resume_unwind(panic),
            }
        })
    } else {
        Ok(current_thread_runtime()?.block_on(future))
    }
}

fn current_thread_runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// A runtime that can be blocked on from sync code or from inside another runtime
pub struct SyncBridge {
    runtime: Option<Runtime>,
}

impl SyncBridge {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(BRIDGE_WORKER_THREADS)
            .thread_name("aerodb-client-bridge")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Drive `future` on the bridge runtime and wait for it
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            unreachable!("bridge runtime is only taken on drop");
        };

        if Handle::try_current().is_ok() {
            std::thread::scope(|s| {
                let worker = s.spawn(|| runtime.block_on(future));
                match worker.join() {
                    Ok(output) => output,
                    Err(panic) => resume_unwind(panic),
                }
            })
        } else {
            runtime.block_on(future)
        }
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                drop(runtime);
            }
        }
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge").finish_non_exhaustive()
    }
}

/// Blocking facade; every method mirrors the async `Client` method of the same name
#[derive(Debug, Clone)]
pub struct BlockingClient {
    inner: Client,
    bridge: Arc<SyncBridge>,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::from_client(Client::new(config)?)
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::from_client(Client::from_env()?)
    }

    /// Wrap an existing async client; both share one session
    pub fn from_client(inner: Client) -> ClientResult<Self> {
        let bridge = SyncBridge::new().map_err(|e| {
            ClientError::connection(format!("Failed to initialize client: cannot start runtime: {}", e))
        })?;
        Ok(Self {
            inner,
            bridge: Arc::new(bridge),
        })
    }

    /// The async client behind this facade
    pub fn async_client(&self) -> &Client {
        &self.inner
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    // ==================
    // Rows
    // ==================

    pub fn select(&self, table: &str, fields: &Fields, filters: &[Filter]) -> ClientResult<Option<Vec<Row>>> {
        self.bridge.block_on(self.inner.select(table, fields, filters))
    }

    pub fn select_one(&self, table: &str, fields: &Fields, filters: &[Filter]) -> ClientResult<Row> {
        self.bridge.block_on(self.inner.select_one(table, fields, filters))
    }

    pub fn insert(&self, table: &str, payload: Value, upsert: bool) -> ClientResult<Option<Row>> {
        self.bridge.block_on(self.inner.insert(table, payload, upsert))
    }

    pub fn update(&self, table: &str, changes: Value, filters: &[Filter]) -> ClientResult<Option<Row>> {
        self.bridge.block_on(self.inner.update(table, changes, filters))
    }

    pub fn delete(&self, table: &str, filters: &[Filter]) -> ClientResult<bool> {
        self.bridge.block_on(self.inner.delete(table, filters))
    }

    pub fn rpc(&self, function: &str, params: Value) -> ClientResult<Value> {
        self.bridge.block_on(self.inner.rpc(function, params))
    }

    // ==================
    // Auth
    // ==================

    pub fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        self.bridge.block_on(self.inner.login(email, password))
    }

    pub fn login_with_provider(&self, provider: &str, redirect_to: Option<&str>) -> ClientResult<OAuthRedirect> {
        self.inner.login_with_provider(provider, redirect_to)
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.bridge.block_on(self.inner.logout())
    }

    pub fn signup(&self, email: &str, password: &str, metadata: Option<Value>) -> ClientResult<SignupOutcome> {
        self.bridge.block_on(self.inner.signup(email, password, metadata))
    }

    pub fn reset_password(&self, email: &str) -> ClientResult<()> {
        self.bridge.block_on(self.inner.reset_password(email))
    }

    pub fn get_user(&self) -> ClientResult<Option<User>> {
        self.bridge.block_on(self.inner.get_user())
    }

    pub fn refresh_session(&self) -> ClientResult<Session> {
        self.bridge.block_on(self.inner.refresh_session())
    }

    pub fn update_user(&self, attributes: Value) -> ClientResult<User> {
        self.bridge.block_on(self.inner.update_user(attributes))
    }

    pub fn set_session(&self, access_token: &str, refresh_token: &str) -> ClientResult<Session> {
        self.bridge.block_on(self.inner.set_session(access_token, refresh_token))
    }

    pub fn verify_otp(&self, email: &str, token: &str) -> ClientResult<Session> {
        self.bridge.block_on(self.inner.verify_otp(email, token))
    }

    // ==================
    // Authorization
    // ==================

    pub fn set_current_domain(&self, domain_id: Option<&str>) -> ClientResult<()> {
        self.bridge.block_on(self.inner.set_current_domain(domain_id))
    }

    pub fn get_user_roles(&self, user_id: Option<Uuid>) -> ClientResult<Vec<String>> {
        self.bridge.block_on(self.inner.get_user_roles(user_id))
    }

    pub fn check_permission(&self, permission: &str) -> ClientResult<bool> {
        self.bridge.block_on(self.inner.check_permission(permission))
    }

    // ==================
    // Storage
    // ==================

    pub fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
        upsert: bool,
    ) -> ClientResult<String> {
        let data: Bytes = data.into();
        self.bridge
            .block_on(self.inner.upload_file(bucket, path, data, content_type, upsert))
    }

    pub fn download_file(&self, bucket: &str, path: &str) -> ClientResult<Bytes> {
        self.bridge.block_on(self.inner.download_file(bucket, path))
    }

    pub fn delete_files(&self, bucket: &str, paths: &[&str]) -> ClientResult<bool> {
        self.bridge.block_on(self.inner.delete_files(bucket, paths))
    }

    pub fn list_files(&self, bucket: &str, prefix: Option<&str>) -> ClientResult<Vec<FileObject>> {
        self.bridge.block_on(self.inner.list_files(bucket, prefix))
    }

    pub fn get_public_url(&self, bucket: &str, path: &str) -> ClientResult<String> {
        self.inner.get_public_url(bucket, path)
    }

    pub fn create_bucket(&self, id: &str, options: BucketOptions) -> ClientResult<String> {
        self.bridge.block_on(self.inner.create_bucket(id, options))
    }

    pub fn get_bucket(&self, id: &str) -> ClientResult<Bucket> {
        self.bridge.block_on(self.inner.get_bucket(id))
    }

    pub fn list_buckets(&self) -> ClientResult<Vec<Bucket>> {
        self.bridge.block_on(self.inner.list_buckets())
    }

    pub fn delete_bucket(&self, id: &str) -> ClientResult<()> {
        self.bridge.block_on(self.inner.delete_bucket(id))
    }

    pub fn empty_bucket(&self, id: &str) -> ClientResult<()> {
        self.bridge.block_on(self.inner.empty_bucket(id))
    }

    // ==================
    // Realtime
    // ==================

    /// Subscribe; the reader task runs on the bridge runtime
    pub fn subscribe_to_table(
        &self,
        table: &str,
        callback: ChangeCallback,
        event: ChangeEvent,
        filter: Option<&str>,
    ) -> ClientResult<Subscription> {
        self.bridge
            .block_on(self.inner.subscribe_to_table(table, callback, event, filter))
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> ClientResult<()> {
        self.bridge.block_on(subscription.unsubscribe())
    }
}
