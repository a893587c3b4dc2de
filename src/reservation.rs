//! Reservation entity state machine
//!
//! A Reservation is the offer of a Task to this worker. It is created
//! when the channel delivers a `reservation.created` frame and leaves the
//! worker's active set once it reaches a terminal status. The
//! back-reference to the Worker is the worker's sid only; the entity is
//! resolved through the Worker's map, never through an owning pointer.

use crate::descriptors::ReservationDescriptor;
use crate::error::{Result, TaskRouterError};
use crate::events::{BusEvent, EventBus, SubscriptionId};
use crate::request::{Request, RequestParams};
use crate::routes::{ApiVersion, Routes};
use crate::task::Task;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Outcome-tracking status of a Reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Accepted,
    Rejected,
    Timeout,
    Canceled,
    Wrapping,
    Completed,
}

impl ReservationStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::Wrapping => "wrapping",
            Self::Completed => "completed",
        }
    }

    /// True once the reservation leaves the worker's active set.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Timeout | Self::Canceled | Self::Completed
        )
    }
}

/// Closed set of reservation event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationEventKind {
    Accepted,
    Rejected,
    TimedOut,
    Canceled,
    Wrapup,
    Completed,
}

/// Events observable on a Reservation instance.
#[derive(Debug, Clone)]
pub enum ReservationEvent {
    Accepted { reservation_sid: String },
    Rejected { reservation_sid: String },
    TimedOut { reservation_sid: String },
    Canceled { reservation_sid: String },
    Wrapup { reservation_sid: String },
    Completed { reservation_sid: String },
}

impl BusEvent for ReservationEvent {
    type Kind = ReservationEventKind;

    fn kind(&self) -> ReservationEventKind {
        match self {
            Self::Accepted { .. } => ReservationEventKind::Accepted,
            Self::Rejected { .. } => ReservationEventKind::Rejected,
            Self::TimedOut { .. } => ReservationEventKind::TimedOut,
            Self::Canceled { .. } => ReservationEventKind::Canceled,
            Self::Wrapup { .. } => ReservationEventKind::Wrapup,
            Self::Completed { .. } => ReservationEventKind::Completed,
        }
    }
}

fn event_for_status(status: ReservationStatus, sid: &str) -> Option<ReservationEvent> {
    let reservation_sid = sid.to_string();
    match status {
        ReservationStatus::Pending => None,
        ReservationStatus::Accepted => Some(ReservationEvent::Accepted { reservation_sid }),
        ReservationStatus::Rejected => Some(ReservationEvent::Rejected { reservation_sid }),
        ReservationStatus::Timeout => Some(ReservationEvent::TimedOut { reservation_sid }),
        ReservationStatus::Canceled => Some(ReservationEvent::Canceled { reservation_sid }),
        ReservationStatus::Wrapping => Some(ReservationEvent::Wrapup { reservation_sid }),
        ReservationStatus::Completed => Some(ReservationEvent::Completed { reservation_sid }),
    }
}

/// The offer of a Task to this worker.
pub struct Reservation {
    sid: String,
    worker_sid: String,
    task: Arc<Task>,
    status: RwLock<ReservationStatus>,
    routes: Routes,
    request: Request,
    bus: EventBus<ReservationEvent>,
}

impl Reservation {
    /// Builds a Reservation around its Task.
    pub(crate) fn new(
        descriptor: &ReservationDescriptor,
        task: Arc<Task>,
        routes: Routes,
        request: Request,
    ) -> Self {
        Self {
            sid: descriptor.sid.clone(),
            worker_sid: descriptor.worker_sid.clone(),
            task,
            status: RwLock::new(descriptor.status),
            routes,
            request,
            bus: EventBus::new(),
        }
    }

    /// Reservation sid.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Sid of the worker this reservation was offered to.
    pub fn worker_sid(&self) -> &str {
        &self.worker_sid
    }

    /// The reserved Task.
    pub fn task(&self) -> Arc<Task> {
        self.task.clone()
    }

    /// Current status.
    pub fn status(&self) -> ReservationStatus {
        *self.status.read()
    }

    /// True once this reservation should leave the active set.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Subscribes to one event kind.
    pub fn on<F>(&self, kind: ReservationEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ReservationEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, callback)
    }

    /// Removes one subscription.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.bus.off(subscription)
    }

    /// Removes every subscription on this reservation.
    pub fn remove_all_listeners(&self) {
        self.bus.remove_all_listeners()
    }

    /// Accepts the offered task.
    pub async fn accept(&self) -> Result<ReservationStatus> {
        self.update_status_remote(ReservationStatus::Accepted).await
    }

    /// Rejects the offered task.
    pub async fn reject(&self) -> Result<ReservationStatus> {
        self.update_status_remote(ReservationStatus::Rejected).await
    }

    async fn update_status_remote(&self, target: ReservationStatus) -> Result<ReservationStatus> {
        let mut params = RequestParams::new();
        params.insert("ReservationStatus".to_string(), json!(target.as_str()));

        let url = self.routes.reservation(&self.task.sid(), &self.sid);
        let response = self.request.post(&url, params, ApiVersion::V1).await?;

        let confirmed = response
            .get("reservation_status")
            .cloned()
            .ok_or_else(|| {
                TaskRouterError::Payload("reservation_status missing from response".to_string())
            })
            .and_then(|v| {
                serde_json::from_value::<ReservationStatus>(v).map_err(TaskRouterError::from)
            })?;
        self.apply_status(confirmed);
        Ok(confirmed)
    }

    /// Applies an authoritative status, emitting the matching event when
    /// the status actually changes.
    pub(crate) fn apply_status(&self, status: ReservationStatus) {
        let changed = {
            let mut current = self.status.write();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            debug!(reservation_sid = %self.sid, status = %status.as_str(), "Reservation status applied");
            if let Some(event) = event_for_status(status, &self.sid) {
                self.bus.emit(&event);
            }
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("sid", &self.sid)
            .field("worker_sid", &self.worker_sid)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
