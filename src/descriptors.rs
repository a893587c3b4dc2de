//! Descriptor layer: typed snapshots of raw server payloads
//!
//! Raw payloads arrive with snake_case keys, epoch-second timestamps, and
//! the attribute bag encoded as a JSON string. Descriptors normalize all
//! of that into typed snapshots and do nothing else; behavior lives in the
//! entity state machines.

use crate::error::{Result, TaskRouterError};
use crate::reservation::ReservationStatus;
use crate::task::TaskStatus;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::transfer::TransferMode;

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| TaskRouterError::Payload(format!("{field} is not a valid timestamp")))
}

/// Normalizes an attribute bag that may arrive as a JSON string or as an
/// already-decoded object.
fn parse_attributes(value: &Value) -> Result<Value> {
    let decoded = match value {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|e| TaskRouterError::Payload(format!("attributes is not valid JSON: {e}")))?,
        other => other.clone(),
    };
    if !decoded.is_object() {
        return Err(TaskRouterError::Payload(
            "attributes must decode to a JSON object".to_string(),
        ));
    }
    Ok(decoded)
}

#[derive(Deserialize)]
struct RawTask {
    sid: String,
    assignment_status: TaskStatus,
    attributes: Value,
    date_created: i64,
    date_updated: i64,
    priority: i64,
    age: i64,
    #[serde(default)]
    reason: Option<String>,
    timeout: i64,
    queue_sid: String,
    queue_name: String,
    workflow_sid: String,
    workflow_name: String,
    task_channel_sid: String,
    task_channel_unique_name: String,
    #[serde(default)]
    reservation_sid: Option<String>,
}

/// Typed snapshot of a Task payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub sid: String,
    pub status: TaskStatus,
    pub attributes: Value,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub priority: i64,
    pub age: i64,
    pub reason: Option<String>,
    pub timeout: i64,
    pub queue_sid: String,
    pub queue_name: String,
    pub workflow_sid: String,
    pub workflow_name: String,
    pub task_channel_sid: String,
    pub task_channel_unique_name: String,
    /// Present on push frames so an unknown task can be anchored to its
    /// reservation when materialized fresh.
    pub reservation_sid: Option<String>,
}

impl TaskDescriptor {
    /// Parses a raw task payload.
    pub fn from_value(payload: &Value) -> Result<Self> {
        let raw: RawTask = serde_json::from_value(payload.clone())?;
        Ok(Self {
            attributes: parse_attributes(&raw.attributes)?,
            date_created: timestamp(raw.date_created, "date_created")?,
            date_updated: timestamp(raw.date_updated, "date_updated")?,
            sid: raw.sid,
            status: raw.assignment_status,
            priority: raw.priority,
            age: raw.age,
            reason: raw.reason,
            timeout: raw.timeout,
            queue_sid: raw.queue_sid,
            queue_name: raw.queue_name,
            workflow_sid: raw.workflow_sid,
            workflow_name: raw.workflow_name,
            task_channel_sid: raw.task_channel_sid,
            task_channel_unique_name: raw.task_channel_unique_name,
            reservation_sid: raw.reservation_sid,
        })
    }
}

#[derive(Deserialize)]
struct RawReservation {
    sid: String,
    worker_sid: String,
    reservation_status: ReservationStatus,
    task: Value,
}

/// Typed snapshot of a Reservation payload, including its Task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationDescriptor {
    pub sid: String,
    pub worker_sid: String,
    pub status: ReservationStatus,
    pub task: TaskDescriptor,
}

impl ReservationDescriptor {
    /// Parses a raw reservation payload.
    pub fn from_value(payload: &Value) -> Result<Self> {
        let raw: RawReservation = serde_json::from_value(payload.clone())?;
        Ok(Self {
            task: TaskDescriptor::from_value(&raw.task)?,
            sid: raw.sid,
            worker_sid: raw.worker_sid,
            status: raw.reservation_status,
        })
    }
}

#[derive(Deserialize)]
struct RawWorker {
    sid: String,
    #[serde(default)]
    friendly_name: Option<String>,
    activity_sid: String,
    activity_name: String,
    available: bool,
    attributes: Value,
    #[serde(default)]
    date_status_changed: Option<i64>,
}

/// Typed snapshot of a Worker payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerDescriptor {
    pub sid: String,
    pub friendly_name: Option<String>,
    pub activity_sid: String,
    pub activity_name: String,
    pub available: bool,
    pub attributes: Value,
    pub date_status_changed: Option<DateTime<Utc>>,
}

impl WorkerDescriptor {
    /// Parses a raw worker payload.
    pub fn from_value(payload: &Value) -> Result<Self> {
        let raw: RawWorker = serde_json::from_value(payload.clone())?;
        Ok(Self {
            attributes: parse_attributes(&raw.attributes)?,
            date_status_changed: raw
                .date_status_changed
                .map(|secs| timestamp(secs, "date_status_changed"))
                .transpose()?,
            sid: raw.sid,
            friendly_name: raw.friendly_name,
            activity_sid: raw.activity_sid,
            activity_name: raw.activity_name,
            available: raw.available,
        })
    }
}

#[derive(Deserialize)]
struct RawTransfer {
    sid: String,
    #[serde(rename = "transfer_mode")]
    mode: TransferMode,
    to: String,
    initiating_reservation_sid: String,
    #[serde(default)]
    attributes: Option<Value>,
    #[serde(default)]
    priority: Option<i64>,
}

/// Typed snapshot of a Transfer payload.
///
/// Transfers are ephemeral; a descriptor exists only for the duration of a
/// transfer request/response cycle and the events it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferDescriptor {
    pub sid: String,
    pub mode: TransferMode,
    pub to: String,
    pub initiating_reservation_sid: String,
    pub attributes: Value,
    pub priority: Option<i64>,
}

impl TransferDescriptor {
    /// Parses a raw transfer payload.
    pub fn from_value(payload: &Value) -> Result<Self> {
        let raw: RawTransfer = serde_json::from_value(payload.clone())?;
        let attributes = match &raw.attributes {
            Some(value) => parse_attributes(value)?,
            None => Value::Object(serde_json::Map::new()),
        };
        Ok(Self {
            attributes,
            sid: raw.sid,
            mode: raw.mode,
            to: raw.to,
            initiating_reservation_sid: raw.initiating_reservation_sid,
            priority: raw.priority,
        })
    }
}
