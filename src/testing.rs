//! Testing utilities: scripted collaborators and payload builders
//!
//! Available with the `testing` feature (and to the crate's own tests).
//! [`MockHttpClient`] scripts REST outcomes and records every request so
//! tests can assert both the exact body that went out and that no request
//! went out at all. [`MockSignalingTransport`] lets tests inject frames
//! and connection loss into the signaling channel.

use crate::error::{Result, TaskRouterError};
use crate::request::{HttpClient, RequestParams};
use crate::routes::ApiVersion;
use crate::signaling::{Frame, SignalingTransport, TransportEvent};
use crate::task::TaskStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Generates a unique sid with the given prefix, e.g. `WT<uuid>`.
pub fn random_sid(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

/// One request observed by [`MockHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub params: RequestParams,
    pub version: ApiVersion,
}

enum ScriptedResponse {
    Ok(Value),
    Err { name: String, message: String },
}

/// HTTP collaborator with a scripted response queue.
#[derive(Default)]
pub struct MockHttpClient {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    /// Creates a client with an empty script; unscripted calls fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next call to succeed with the given body.
    pub fn enqueue_ok(&self, body: Value) {
        self.script.lock().push_back(ScriptedResponse::Ok(body));
    }

    /// Scripts the next call to be rejected by the backend.
    pub fn enqueue_error(&self, name: &str, message: &str) {
        self.script.lock().push_back(ScriptedResponse::Err {
            name: name.to_string(),
            message: message.to_string(),
        });
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests issued so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> Result<Value> {
        match self.script.lock().pop_front() {
            Some(ScriptedResponse::Ok(body)) => Ok(body),
            Some(ScriptedResponse::Err { name, message }) => {
                Err(TaskRouterError::remote_named(name, message))
            }
            None => Err(TaskRouterError::remote("no scripted response")),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn post(&self, url: &str, params: RequestParams, version: ApiVersion) -> Result<Value> {
        self.requests.lock().push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            params,
            version,
        });
        self.next_response()
    }

    async fn get(&self, url: &str, version: ApiVersion) -> Result<Value> {
        self.requests.lock().push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            params: RequestParams::new(),
            version,
        });
        self.next_response()
    }
}

/// Signaling collaborator driven by the test.
pub struct MockSignalingTransport {
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    open_calls: AtomicU32,
    fail_opens: AtomicU32,
    close_calls: AtomicU32,
    snapshot_requests: AtomicU32,
    token_updates: Mutex<Vec<String>>,
}

impl Default for MockSignalingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSignalingTransport {
    /// Creates a transport with an open inbound queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            open_calls: AtomicU32::new(0),
            fail_opens: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            snapshot_requests: AtomicU32::new(0),
            token_updates: Mutex::new(Vec::new()),
        }
    }

    /// Injects an inbound frame.
    pub fn push_frame(&self, frame: Frame) {
        let _ = self.tx.send(TransportEvent::Frame(frame));
    }

    /// Injects an unexpected connection loss.
    pub fn push_closed(&self, reason: &str) {
        let _ = self.tx.send(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }

    /// Makes the next `n` open attempts fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Number of successful opens.
    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Number of close calls.
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Number of snapshot requests.
    pub fn snapshot_requests(&self) -> u32 {
        self.snapshot_requests.load(Ordering::SeqCst)
    }

    /// Tokens propagated to the live connection, in order.
    pub fn token_updates(&self) -> Vec<String> {
        self.token_updates.lock().clone()
    }
}

#[async_trait]
impl SignalingTransport for MockSignalingTransport {
    async fn open(&self, _url: &str, _token: &str) -> Result<()> {
        let remaining = self.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(TaskRouterError::Transport("connection refused".to_string()));
        }
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_token(&self, token: &str) -> Result<()> {
        self.token_updates.lock().push(token.to_string());
        Ok(())
    }

    async fn request_snapshot(&self) -> Result<()> {
        self.snapshot_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.rx.lock().await.recv().await
    }
}

/// Builder for raw task payloads in the server's wire shape: snake_case
/// keys, epoch-second timestamps, attributes as a JSON string.
#[derive(Debug, Clone)]
pub struct TaskPayloadBuilder {
    sid: String,
    status: TaskStatus,
    attributes: Value,
    reason: Option<String>,
    priority: i64,
    age: i64,
    timeout: i64,
    date_created: i64,
    date_updated: i64,
    reservation_sid: Option<String>,
}

impl TaskPayloadBuilder {
    /// Starts a payload for the given task sid; assigned by default.
    pub fn new(sid: &str) -> Self {
        Self {
            sid: sid.to_string(),
            status: TaskStatus::Assigned,
            attributes: json!({}),
            reason: None,
            priority: 0,
            age: 25,
            timeout: 120,
            date_created: 1_518_809_969,
            date_updated: 1_518_809_969,
            reservation_sid: None,
        }
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn age(mut self, age: i64) -> Self {
        self.age = age;
        self
    }

    pub fn timeout(mut self, timeout: i64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn date_updated(mut self, epoch_secs: i64) -> Self {
        self.date_updated = epoch_secs;
        self
    }

    pub fn reservation_sid(mut self, reservation_sid: &str) -> Self {
        self.reservation_sid = Some(reservation_sid.to_string());
        self
    }

    /// Produces the raw payload.
    pub fn build(self) -> Value {
        let mut payload = json!({
            "sid": self.sid,
            "assignment_status": self.status.as_str(),
            "attributes": self.attributes.to_string(),
            "date_created": self.date_created,
            "date_updated": self.date_updated,
            "priority": self.priority,
            "age": self.age,
            "reason": self.reason,
            "timeout": self.timeout,
            "queue_sid": "WQxx1",
            "queue_name": "English",
            "workflow_sid": "WWxx1",
            "workflow_name": "Default Fifo",
            "task_channel_sid": "TCxx1",
            "task_channel_unique_name": "voice",
        });
        if let Some(reservation_sid) = self.reservation_sid {
            payload["reservation_sid"] = json!(reservation_sid);
        }
        payload
    }
}

/// Raw `reservation.created` payload wrapping a task payload.
pub fn reservation_payload(reservation_sid: &str, worker_sid: &str, task: Value) -> Value {
    json!({
        "sid": reservation_sid,
        "worker_sid": worker_sid,
        "reservation_status": "pending",
        "task": task,
    })
}

/// Raw worker payload.
pub fn worker_payload(sid: &str, activity_sid: &str, available: bool, attributes: Value) -> Value {
    json!({
        "sid": sid,
        "friendly_name": "Alice",
        "activity_sid": activity_sid,
        "activity_name": if available { "Idle" } else { "Offline" },
        "available": available,
        "attributes": attributes.to_string(),
        "date_status_changed": 1_518_809_969,
    })
}

/// Raw transfer payload.
pub fn transfer_payload(sid: &str, reservation_sid: &str, mode: &str) -> Value {
    json!({
        "sid": sid,
        "transfer_mode": mode,
        "to": "alice",
        "initiating_reservation_sid": reservation_sid,
        "attributes": {},
        "priority": 0,
    })
}
