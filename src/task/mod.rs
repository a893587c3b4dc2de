//! Task entity state machine
//!
//! A [`Task`] is the primary routed entity. Its lifecycle is driven from
//! two directions: caller-invoked mutations (complete, wrap-up, attribute
//! updates, participant hold, transfers) that go through the request
//! coordinator, and inbound push frames applied by the Worker's frame
//! router. Both directions converge on the same field-replacement path,
//! so observers always see a consistent snapshot.
//!
//! Every mutating operation issues exactly one request and applies at
//! most one outcome: on success all server-derived fields are replaced
//! from the response, on rejection nothing changes and the typed error
//! propagates. Concurrent mutations are not coalesced; whichever response
//! resolves last wins, which matches the backend's own per-entity
//! serialization.

use crate::descriptors::{TaskDescriptor, TransferDescriptor};
use crate::error::{Result, TaskRouterError};
use crate::events::{BusEvent, EventBus, SubscriptionId};
use crate::request::{Request, RequestParams};
use crate::routes::{ApiVersion, Routes};
use crate::transfer::TransferOptions;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Reason applied when a wrap-up request does not supply one.
pub const DEFAULT_WRAPUP_REASON: &str = "Task is wrapping.";

/// Assignment status of a Task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Reserved,
    Assigned,
    Wrapping,
    Completed,
    Canceled,
}

impl TaskStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reserved => "reserved",
            Self::Assigned => "assigned",
            Self::Wrapping => "wrapping",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    /// True once no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Whether `next` is reachable from this status along the lifecycle
    /// graph. Non-terminal statuses may re-enter themselves (attribute
    /// updates keep the status in place).
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        match self {
            Self::Pending => matches!(next, Self::Reserved | Self::Canceled),
            Self::Reserved => matches!(next, Self::Assigned | Self::Canceled),
            Self::Assigned => matches!(next, Self::Wrapping | Self::Completed | Self::Canceled),
            Self::Wrapping => matches!(next, Self::Completed | Self::Canceled),
            Self::Completed | Self::Canceled => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable fields of a Task.
///
/// Replaced wholesale from server responses and push frames; callers get
/// clones, never references into the live entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
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
}

impl From<TaskDescriptor> for TaskFields {
    fn from(descriptor: TaskDescriptor) -> Self {
        Self {
            sid: descriptor.sid,
            status: descriptor.status,
            attributes: descriptor.attributes,
            date_created: descriptor.date_created,
            date_updated: descriptor.date_updated,
            priority: descriptor.priority,
            age: descriptor.age,
            reason: descriptor.reason,
            timeout: descriptor.timeout,
            queue_sid: descriptor.queue_sid,
            queue_name: descriptor.queue_name,
            workflow_sid: descriptor.workflow_sid,
            workflow_name: descriptor.workflow_name,
            task_channel_sid: descriptor.task_channel_sid,
            task_channel_unique_name: descriptor.task_channel_unique_name,
        }
    }
}

/// Closed set of task event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    Canceled,
    Completed,
    Updated,
    Wrapup,
    TransferInitiated,
    TransferCompleted,
    TransferAttemptFailed,
    TransferFailed,
}

impl TaskEventKind {
    /// Subscription-facing name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Completed => "completed",
            Self::Updated => "updated",
            Self::Wrapup => "wrapup",
            Self::TransferInitiated => "transferInitiated",
            Self::TransferCompleted => "transferCompleted",
            Self::TransferAttemptFailed => "transferAttemptFailed",
            Self::TransferFailed => "transferFailed",
        }
    }
}

/// Events observable on a Task instance.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Canceled { task: TaskFields },
    Completed { task: TaskFields },
    Updated { task: TaskFields },
    Wrapup { task: TaskFields },
    TransferInitiated { transfer: TransferDescriptor },
    TransferCompleted { transfer: TransferDescriptor },
    TransferAttemptFailed { transfer: TransferDescriptor },
    TransferFailed { transfer: TransferDescriptor },
}

impl BusEvent for TaskEvent {
    type Kind = TaskEventKind;

    fn kind(&self) -> TaskEventKind {
        match self {
            Self::Canceled { .. } => TaskEventKind::Canceled,
            Self::Completed { .. } => TaskEventKind::Completed,
            Self::Updated { .. } => TaskEventKind::Updated,
            Self::Wrapup { .. } => TaskEventKind::Wrapup,
            Self::TransferInitiated { .. } => TaskEventKind::TransferInitiated,
            Self::TransferCompleted { .. } => TaskEventKind::TransferCompleted,
            Self::TransferAttemptFailed { .. } => TaskEventKind::TransferAttemptFailed,
            Self::TransferFailed { .. } => TaskEventKind::TransferFailed,
        }
    }
}

/// Recognized options for [`Task::wrap_up`].
#[derive(Debug, Clone, Default)]
pub struct WrapUpOptions {
    /// Wrap-up reason; defaults to [`DEFAULT_WRAPUP_REASON`].
    pub reason: Option<String>,
}

/// A unit of work being routed, owned by exactly one Reservation.
pub struct Task {
    reservation_sid: String,
    routes: Routes,
    request: Request,
    bus: EventBus<TaskEvent>,
    fields: RwLock<TaskFields>,
}

impl Task {
    /// Builds a Task from a descriptor snapshot, anchored to the
    /// reservation that delivered it.
    pub fn new(
        descriptor: TaskDescriptor,
        reservation_sid: &str,
        routes: Routes,
        request: Request,
    ) -> Result<Self> {
        if reservation_sid.is_empty() {
            return Err(TaskRouterError::MissingParameter {
                name: "reservationSid",
            });
        }
        Ok(Self {
            reservation_sid: reservation_sid.to_string(),
            routes,
            request,
            bus: EventBus::new(),
            fields: RwLock::new(descriptor.into()),
        })
    }

    /// Task sid.
    pub fn sid(&self) -> String {
        self.fields.read().sid.clone()
    }

    /// Sid of the owning reservation.
    pub fn reservation_sid(&self) -> &str {
        &self.reservation_sid
    }

    /// Current assignment status.
    pub fn status(&self) -> TaskStatus {
        self.fields.read().status
    }

    /// Current attribute bag.
    pub fn attributes(&self) -> Value {
        self.fields.read().attributes.clone()
    }

    /// Most recent reason, if any.
    pub fn reason(&self) -> Option<String> {
        self.fields.read().reason.clone()
    }

    /// Snapshot of every observable field.
    pub fn fields(&self) -> TaskFields {
        self.fields.read().clone()
    }

    /// Subscribes to one event kind. Returns a handle for [`Task::off`].
    pub fn on<F>(&self, kind: TaskEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, callback)
    }

    /// Removes one subscription.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.bus.off(subscription)
    }

    /// Removes every subscription on this task.
    pub fn remove_all_listeners(&self) {
        self.bus.remove_all_listeners()
    }

    /// Completes the task.
    ///
    /// `reason` is mandatory; its absence is a usage error raised before
    /// any network attempt.
    pub async fn complete(&self, reason: &str) -> Result<TaskFields> {
        if reason.is_empty() {
            return Err(TaskRouterError::MissingParameter { name: "reason" });
        }
        self.update_assignment_status(TaskStatus::Completed, reason)
            .await
    }

    /// Moves the task into wrap-up.
    pub async fn wrap_up(&self, options: WrapUpOptions) -> Result<TaskFields> {
        let reason = match options.reason {
            Some(reason) if reason.is_empty() => {
                return Err(TaskRouterError::MissingParameter { name: "reason" });
            }
            Some(reason) => reason,
            None => DEFAULT_WRAPUP_REASON.to_string(),
        };
        self.update_assignment_status(TaskStatus::Wrapping, &reason)
            .await
    }

    async fn update_assignment_status(
        &self,
        status: TaskStatus,
        reason: &str,
    ) -> Result<TaskFields> {
        let mut params = RequestParams::new();
        params.insert("AssignmentStatus".to_string(), json!(status.as_str()));
        params.insert("Reason".to_string(), json!(reason));

        let url = self.routes.task(&self.sid());
        let response = self.request.post(&url, params, ApiVersion::V1).await?;
        self.apply_full_update(&response)
    }

    /// Replaces the attribute bag server-side.
    ///
    /// Attributes are replaced wholesale, never merged client-side.
    pub async fn set_attributes(&self, attributes: &Value) -> Result<TaskFields> {
        if attributes.is_null() {
            return Err(TaskRouterError::MissingParameter { name: "attributes" });
        }
        if !attributes.is_object() {
            return Err(TaskRouterError::InvalidParameter {
                name: "attributes",
                reason: "expected a JSON object".to_string(),
            });
        }

        let mut params = RequestParams::new();
        params.insert("Attributes".to_string(), attributes.clone());

        let url = self.routes.task(&self.sid());
        let response = self.request.post(&url, params, ApiVersion::V1).await?;
        self.apply_full_update(&response)
    }

    /// Places the task's customer participant on hold.
    pub async fn hold(&self) -> Result<TaskFields> {
        self.send_participant_update(true).await
    }

    /// Removes the hold from the task's customer participant.
    pub async fn unhold(&self) -> Result<TaskFields> {
        self.send_participant_update(false).await
    }

    /// Generalized participant update.
    ///
    /// `options` is a JSON object; `hold` is the only recognized key and
    /// must be a boolean — anything else is a usage error raised before
    /// any network call. Unrecognized keys are dropped.
    pub async fn update_participant(&self, options: &Value) -> Result<TaskFields> {
        let hold = options
            .get("hold")
            .ok_or(TaskRouterError::MissingParameter { name: "hold" })?;
        let hold = hold
            .as_bool()
            .ok_or_else(|| TaskRouterError::InvalidParameter {
                name: "hold",
                reason: "expected a boolean".to_string(),
            })?;
        self.send_participant_update(hold).await
    }

    async fn send_participant_update(&self, hold: bool) -> Result<TaskFields> {
        let mut params = RequestParams::new();
        params.insert("Hold".to_string(), json!(hold));
        params.insert("TaskSid".to_string(), json!(self.sid()));

        let url = self.routes.customer_participant();
        let response = self.request.post(&url, params, ApiVersion::V2).await?;
        // Participant updates return a confirmation, not a task snapshot;
        // only fields actually present in the response are applied.
        self.apply_partial_update(&response)
    }

    /// Transfers the task's current reservation to another worker or
    /// queue. Mode defaults to cold. On success the task refreshes its
    /// fields through the same replacement path as other mutations.
    pub async fn transfer(&self, to: &str, options: TransferOptions) -> Result<TaskFields> {
        if to.is_empty() {
            return Err(TaskRouterError::MissingParameter { name: "to" });
        }
        if let Some(attributes) = &options.attributes {
            if !attributes.is_object() {
                return Err(TaskRouterError::InvalidParameter {
                    name: "attributes",
                    reason: "expected a JSON object".to_string(),
                });
            }
        }

        let mode = options.mode.unwrap_or_default();
        let mut params = RequestParams::new();
        params.insert("To".to_string(), json!(to));
        params.insert("Mode".to_string(), json!(mode.as_str()));
        if let Some(attributes) = options.attributes {
            params.insert("Attributes".to_string(), attributes);
        }
        if let Some(priority) = options.priority {
            params.insert("Priority".to_string(), json!(priority));
        }
        params.insert(
            "ReservationSid".to_string(),
            json!(self.reservation_sid.clone()),
        );

        let url = self.routes.task_transfers(&self.sid());
        self.request.post(&url, params, ApiVersion::V1).await?;
        debug!(task_sid = %self.sid(), to = %to, mode = %mode.as_str(), "Transfer created");
        self.refresh().await
    }

    /// Re-fetches the task and replaces every server-derived field.
    pub async fn refresh(&self) -> Result<TaskFields> {
        let url = self.routes.task(&self.sid());
        let response = self.request.get(&url, ApiVersion::V1).await?;
        self.apply_full_update(&response)
    }

    /// Single entry point through which a payload becomes observable:
    /// normalizes it into the public fields for the given kind, then
    /// notifies exactly that kind's subscribers.
    pub fn emit_event(&self, kind: TaskEventKind, payload: &Value) -> Result<()> {
        let event = match kind {
            TaskEventKind::Canceled => TaskEvent::Canceled {
                task: self.apply_full_update(payload)?,
            },
            TaskEventKind::Completed => TaskEvent::Completed {
                task: self.apply_full_update(payload)?,
            },
            TaskEventKind::Updated => TaskEvent::Updated {
                task: self.apply_full_update(payload)?,
            },
            TaskEventKind::Wrapup => TaskEvent::Wrapup {
                task: self.apply_full_update(payload)?,
            },
            TaskEventKind::TransferInitiated => TaskEvent::TransferInitiated {
                transfer: TransferDescriptor::from_value(payload)?,
            },
            TaskEventKind::TransferCompleted => TaskEvent::TransferCompleted {
                transfer: TransferDescriptor::from_value(payload)?,
            },
            TaskEventKind::TransferAttemptFailed => TaskEvent::TransferAttemptFailed {
                transfer: TransferDescriptor::from_value(payload)?,
            },
            TaskEventKind::TransferFailed => TaskEvent::TransferFailed {
                transfer: TransferDescriptor::from_value(payload)?,
            },
        };
        self.bus.emit(&event);
        Ok(())
    }

    /// Parses the payload as a full task snapshot, then replaces every
    /// field in one swap. Parsing happens before any mutation, so a
    /// malformed payload leaves the task untouched.
    fn apply_full_update(&self, payload: &Value) -> Result<TaskFields> {
        let descriptor = TaskDescriptor::from_value(payload)?;
        let fields: TaskFields = descriptor.into();
        *self.fields.write() = fields.clone();
        Ok(fields)
    }

    /// Applies only the fields present in a partial response. Everything
    /// is parsed up front so a malformed payload changes nothing.
    fn apply_partial_update(&self, payload: &Value) -> Result<TaskFields> {
        let object = payload.as_object();

        let status = object
            .and_then(|o| o.get("assignment_status"))
            .map(|v| serde_json::from_value::<TaskStatus>(v.clone()))
            .transpose()?;
        let reason = object
            .and_then(|o| o.get("reason"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let date_updated = object
            .and_then(|o| o.get("date_updated"))
            .and_then(|v| v.as_i64())
            .map(|secs| {
                chrono::TimeZone::timestamp_opt(&Utc, secs, 0)
                    .single()
                    .ok_or_else(|| {
                        TaskRouterError::Payload("date_updated is not a valid timestamp".to_string())
                    })
            })
            .transpose()?;

        let mut fields = self.fields.write();
        if let Some(status) = status {
            fields.status = status;
        }
        if let Some(reason) = reason {
            fields.reason = Some(reason);
        }
        if let Some(date_updated) = date_updated {
            fields.date_updated = date_updated;
        }
        Ok(fields.clone())
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self.fields.read();
        f.debug_struct("Task")
            .field("sid", &fields.sid)
            .field("status", &fields.status)
            .field("reservation_sid", &self.reservation_sid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(TaskStatus::Assigned.as_str(), "assigned");
        assert_eq!(TaskStatus::Wrapping.as_str(), "wrapping");
        let status: TaskStatus = serde_json::from_value(json!("reserved")).unwrap();
        assert_eq!(status, TaskStatus::Reserved);
    }

    #[test]
    fn test_status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Wrapping.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_lifecycle_graph() {
        use TaskStatus::*;

        assert!(Pending.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Wrapping));
        assert!(Assigned.can_transition_to(Completed));
        assert!(Wrapping.can_transition_to(Completed));

        // Cancellation is reachable from every non-terminal status.
        for status in [Pending, Reserved, Assigned, Wrapping] {
            assert!(status.can_transition_to(Canceled));
        }

        // Self-loops model attribute updates that keep the status.
        assert!(Assigned.can_transition_to(Assigned));

        // No transition leaves a terminal status, and none goes backwards.
        assert!(!Completed.can_transition_to(Assigned));
        assert!(!Canceled.can_transition_to(Canceled));
        assert!(!Assigned.can_transition_to(Reserved));
        assert!(!Wrapping.can_transition_to(Assigned));
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(TaskEventKind::Canceled.as_str(), "canceled");
        assert_eq!(TaskEventKind::Wrapup.as_str(), "wrapup");
        assert_eq!(
            TaskEventKind::TransferAttemptFailed.as_str(),
            "transferAttemptFailed"
        );
    }

    #[test]
    fn test_wrap_up_options_default() {
        assert!(WrapUpOptions::default().reason.is_none());
    }
}
