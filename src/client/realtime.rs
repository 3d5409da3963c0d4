//! # Realtime Subscriptions
//!
//! Row-change notifications over the backend's Phoenix channel socket.
//!
//! One subscription = one socket + one channel topic + one reader task.
//! The reader task sends heartbeats, dispatches `postgres_changes` frames
//! to the callback, and leaves the channel on `unsubscribe`.
//!
//! ## Invariants
//! - A subscription is returned only after the join was acknowledged
//! - The callback only sees events of the requested type and topic
//! - Dropping a handle stops its reader task

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::{failed, Client};
use crate::errors::{ClientError, ClientResult, TransportError};
use crate::observability::{CallArgs, CallObserver, Logger, Summarize};
use crate::operation::Operation;
use crate::query::compile::check_table;
use crate::query::Row;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketStream = SplitStream<Socket>;

/// Callback invoked for each matching change
pub type ChangeCallback = Arc<dyn Fn(ChangePayload) + Send + Sync>;

const JOIN_REF: &str = "1";
const PHOENIX_TOPIC: &str = "phoenix";
const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Operators allowed in a realtime filter (`column=op.value`)
const FILTER_OPERATORS: &[&str] = &["eq", "neq", "lt", "lte", "gt", "gte", "in"];

/// Which row changes to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChangeEvent {
    #[default]
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl ChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvent::All => "*",
            ChangeEvent::Insert => "INSERT",
            ChangeEvent::Update => "UPDATE",
            ChangeEvent::Delete => "DELETE",
        }
    }

    /// Whether an event of type `actual` is wanted
    pub fn accepts(&self, actual: ChangeEvent) -> bool {
        *self == ChangeEvent::All || *self == actual
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeEvent {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "*" | "ALL" => Ok(ChangeEvent::All),
            "INSERT" => Ok(ChangeEvent::Insert),
            "UPDATE" => Ok(ChangeEvent::Update),
            "DELETE" => Ok(ChangeEvent::Delete),
            _ => Err(ClientError::validation(format!("Unsupported change event: {}", s))),
        }
    }
}

/// One row change
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePayload {
    pub schema: String,
    pub table: String,
    pub event: ChangeEvent,
    pub commit_timestamp: Option<String>,
    /// New row (INSERT/UPDATE)
    pub record: Option<Row>,
    /// Previous row (UPDATE/DELETE)
    pub old_record: Option<Row>,
}

impl ChangePayload {
    /// Parse the change body of a `postgres_changes` frame
    ///
    /// Accepts both `{type, record, old_record}` and `{event, new, old}`.
    pub fn from_wire(data: &Value) -> Option<Self> {
        let event = data
            .get("type")
            .or_else(|| data.get("eventType"))
            .or_else(|| data.get("event"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .filter(|e| *e != ChangeEvent::All)?;

        let row = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|k| data.get(*k))
                .and_then(Value::as_object)
                .filter(|m| !m.is_empty())
                .cloned()
        };

        Some(Self {
            schema: data
                .get("schema")
                .and_then(Value::as_str)
                .unwrap_or("public")
                .to_string(),
            table: data.get("table").and_then(Value::as_str)?.to_string(),
            event,
            commit_timestamp: data
                .get("commit_timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
            record: row(["record", "new"]),
            old_record: row(["old_record", "old"]),
        })
    }
}

/// Reject malformed `column=op.value` filters before connecting
pub fn validate_filter(filter: &str) -> ClientResult<()> {
    let invalid = |reason: &str| {
        ClientError::validation(format!("Invalid realtime filter '{}': {}", filter, reason))
    };

    let (column, rest) = filter.split_once('=').ok_or_else(|| invalid("expected column=op.value"))?;
    if column.trim().is_empty() {
        return Err(invalid("missing column"));
    }
    let (op, value) = rest.split_once('.').ok_or_else(|| invalid("expected op.value"))?;
    if !FILTER_OPERATORS.contains(&op) {
        return Err(invalid(&format!("unsupported operator '{}'", op)));
    }
    if value.is_empty() {
        return Err(invalid("missing value"));
    }
    Ok(())
}

/// Phoenix channel frame
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
            join_ref: None,
        }
    }

    fn into_message(self) -> Result<Message, TransportError> {
        Ok(Message::Text(serde_json::to_string(&self)?))
    }
}

/// Handle for an active subscription
pub struct Subscription {
    id: Uuid,
    topic: String,
    table: String,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    observer: CallObserver,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel topic, `realtime:<schema>:<table>`
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the reader task is still running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Leave the channel and stop the reader task
    pub async fn unsubscribe(mut self) -> ClientResult<()> {
        let observer = self.observer.clone();
        let args = CallArgs::new()
            .with("topic", self.topic.as_str())
            .with("subscription", self.id);

        observer
            .observe(Operation::Unsubscribe, args, async move {
                if let Some(stop) = self.stop.take() {
                    let _ = stop.send(());
                }
                if let Some(mut task) = self.task.take() {
                    if tokio::time::timeout(LEAVE_TIMEOUT, &mut task).await.is_err() {
                        task.abort();
                    }
                }
                Ok(())
            })
            .await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Summarize for Subscription {
    fn summarize(&self) -> String {
        format!("subscription {} on {}", self.id, self.topic)
    }
}

impl Client {
    /// Call `callback` for each `event` change on `table`
    ///
    /// `filter` narrows rows server-side, e.g. `status=eq.active`.
    pub async fn subscribe_to_table(
        &self,
        table: &str,
        callback: ChangeCallback,
        event: ChangeEvent,
        filter: Option<&str>,
    ) -> ClientResult<Subscription> {
        let op = Operation::SubscribeToTable;
        let args = CallArgs::new()
            .with("table", table)
            .with("event", event)
            .with("filter", filter.unwrap_or("none"));

        self.observer
            .observe(op, args, async {
                check_table(table)?;
                if let Some(filter) = filter {
                    validate_filter(filter)?;
                }

                let url = self.conn.realtime_url()?;
                let join_timeout = self.config().realtime_join_timeout();
                let (socket, _) = tokio::time::timeout(join_timeout, connect_async(url.as_str()))
                    .await
                    .map_err(|_| failed(op)(TransportError::Timeout(join_timeout)))?
                    .map_err(|e| failed(op)(e.into()))?;
                let (mut sink, mut stream) = socket.split();

                let schema = self.config().schema.clone();
                let topic = format!("realtime:{}:{}", schema, table);

                let mut change = json!({"event": event.as_str(), "schema": schema, "table": table});
                if let Some(filter) = filter {
                    change["filter"] = json!(filter);
                }
                let mut join = Frame::new(
                    &topic,
                    "phx_join",
                    json!({
                        "config": {
                            "broadcast": {"self": false},
                            "presence": {"key": ""},
                            "postgres_changes": [change],
                        },
                        "access_token": self.conn.bearer(),
                    }),
                    JOIN_REF.to_string(),
                );
                join.join_ref = Some(JOIN_REF.to_string());

                let joined = async {
                    sink.send(join.into_message()?).await?;
                    await_join_reply(&mut stream, &topic).await
                };
                tokio::time::timeout(join_timeout, joined)
                    .await
                    .map_err(|_| failed(op)(TransportError::Timeout(join_timeout)))?
                    .map_err(failed(op))?;

                let (stop_tx, stop_rx) = oneshot::channel();
                let reader = ChannelReader {
                    topic: topic.clone(),
                    event,
                    callback,
                    heartbeat: self.config().realtime_heartbeat(),
                    logger: self.observer.logger().clone(),
                };
                let task = tokio::spawn(reader.run(sink, stream, stop_rx));

                Ok(Subscription {
                    id: Uuid::new_v4(),
                    topic,
                    table: table.to_string(),
                    stop: Some(stop_tx),
                    task: Some(task),
                    observer: self.observer.clone(),
                })
            })
            .await
    }
}

/// Wait for the `phx_reply` to our join
async fn await_join_reply(stream: &mut SocketStream, topic: &str) -> Result<(), TransportError> {
    while let Some(message) = stream.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame: Frame = serde_json::from_str(&text)?;
        if frame.topic != topic
            || frame.event != "phx_reply"
            || frame.reference.as_deref() != Some(JOIN_REF)
        {
            continue;
        }

        return match frame.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            _ => Err(TransportError::Protocol(format!(
                "join rejected: {}",
                frame.payload.get("response").unwrap_or(&Value::Null)
            ))),
        };
    }
    Err(TransportError::Protocol(
        "socket closed before join reply".to_string(),
    ))
}

/// State owned by the reader task
struct ChannelReader {
    topic: String,
    event: ChangeEvent,
    callback: ChangeCallback,
    heartbeat: Duration,
    logger: Arc<Logger>,
}

impl ChannelReader {
    async fn run(self, mut sink: SocketSink, mut stream: SocketStream, mut stop: oneshot::Receiver<()>) {
        let start = tokio::time::Instant::now() + self.heartbeat;
        let mut heartbeat = tokio::time::interval_at(start, self.heartbeat);
        let mut next_ref: u64 = 1;

        loop {
            tokio::select! {
                _ = &mut stop => {
                    next_ref += 1;
                    let leave = Frame::new(&self.topic, "phx_leave", json!({}), next_ref.to_string());
                    if let Ok(message) = leave.into_message() {
                        let _ = sink.send(message).await;
                    }
                    let _ = sink.close().await;
                    self.logger.debug("REALTIME_LEFT", &[("topic", self.topic.as_str())]);
                    break;
                }
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    let beat = Frame::new(PHOENIX_TOPIC, "heartbeat", json!({}), next_ref.to_string());
                    let sent = match beat.into_message() {
                        Ok(message) => sink.send(message).await.is_ok(),
                        Err(_) => false,
                    };
                    if !sent {
                        self.logger.warn("REALTIME_DISCONNECTED", &[("topic", self.topic.as_str()), ("reason", "heartbeat failed")]);
                        break;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        self.logger.warn("REALTIME_DISCONNECTED", &[("topic", self.topic.as_str()), ("reason", "socket closed")]);
                        break;
                    }
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        self.logger.warn("REALTIME_DISCONNECTED", &[("topic", self.topic.as_str()), ("reason", reason.as_str())]);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let Ok(frame) = serde_json::from_str::<Frame>(text) else {
            self.logger.debug("REALTIME_FRAME_IGNORED", &[("topic", self.topic.as_str())]);
            return;
        };
        if frame.topic != self.topic || frame.event != "postgres_changes" {
            return;
        }

        let data = frame.payload.get("data").unwrap_or(&frame.payload);
        let Some(change) = ChangePayload::from_wire(data) else {
            self.logger.debug("REALTIME_FRAME_IGNORED", &[("topic", self.topic.as_str())]);
            return;
        };
        if !self.event.accepts(change.event) {
            return;
        }

        let callback: &(dyn Fn(ChangePayload) + Send + Sync) = self.callback.as_ref();
        if catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
            self.logger.warn("REALTIME_CALLBACK_PANICKED", &[("topic", self.topic.as_str())]);
        }
    }
}
