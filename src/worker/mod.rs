//! Worker aggregate
//!
//! The [`Worker`] owns everything: the session [`Configuration`] (the one
//! place the credential lives), the signaling channel, and the map of
//! active Reservations. No Task or Reservation is reachable except
//! through this map, which is what keeps reconnect-driven
//! resynchronization from leaving orphaned state behind.
//!
//! Inbound frames from the channel are routed here by entity kind and
//! sid; frames referencing unknown sids materialize the entity fresh from
//! the frame payload.

use crate::config::{Configuration, ConfigurationOptions};
use crate::descriptors::{ReservationDescriptor, TaskDescriptor, WorkerDescriptor};
use crate::error::{Result, TaskRouterError};
use crate::events::{BusEvent, EventBus, SubscriptionId};
use crate::request::{HttpClient, Request, RequestParams};
use crate::reservation::{Reservation, ReservationStatus};
use crate::routes::{ApiVersion, Routes};
use crate::signaling::{
    ChannelEvent, EventBridgeSignaling, Frame, FrameKind, FrameSink, ReconnectionStrategy,
    SignalingTransport, SDK_DISCONNECT_REASON,
};
use crate::task::{Task, TaskEventKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Closed set of worker event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerEventKind {
    Ready,
    TokenUpdated,
    TokenAboutToExpire,
    Disconnected,
    Error,
    ActivityUpdated,
    AttributesUpdated,
    ReservationCreated,
}

/// Events observable on a Worker instance.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// First successful channel handshake finished.
    Ready,
    /// The session credential was replaced.
    TokenUpdated,
    /// The backend signaled imminent credential expiry.
    TokenAboutToExpire,
    /// The channel is terminally down.
    Disconnected { reason: String },
    /// An inbound frame could not be applied.
    Error { message: String },
    /// The worker's activity changed.
    ActivityUpdated {
        activity_sid: String,
        activity_name: String,
        available: bool,
    },
    /// The worker's attribute bag was replaced.
    AttributesUpdated { attributes: Value },
    /// A new reservation entered the active set.
    ReservationCreated { reservation_sid: String },
}

impl BusEvent for WorkerEvent {
    type Kind = WorkerEventKind;

    fn kind(&self) -> WorkerEventKind {
        match self {
            Self::Ready => WorkerEventKind::Ready,
            Self::TokenUpdated => WorkerEventKind::TokenUpdated,
            Self::TokenAboutToExpire => WorkerEventKind::TokenAboutToExpire,
            Self::Disconnected { .. } => WorkerEventKind::Disconnected,
            Self::Error { .. } => WorkerEventKind::Error,
            Self::ActivityUpdated { .. } => WorkerEventKind::ActivityUpdated,
            Self::AttributesUpdated { .. } => WorkerEventKind::AttributesUpdated,
            Self::ReservationCreated { .. } => WorkerEventKind::ReservationCreated,
        }
    }
}

/// Options accepted by [`Worker::new`].
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Workspace the worker belongs to.
    pub workspace_sid: String,
    /// The worker's own sid.
    pub worker_sid: String,
    /// Signaling endpoint override.
    pub ws_server: Option<String>,
    /// Event-bridge REST endpoint override.
    pub eb_server: Option<String>,
    /// Reconnection backoff policy.
    pub reconnection: Option<ReconnectionStrategy>,
}

#[derive(Debug, Clone)]
struct WorkerState {
    friendly_name: Option<String>,
    activity_sid: String,
    activity_name: String,
    available: bool,
    attributes: Value,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            friendly_name: None,
            activity_sid: String::new(),
            activity_name: String::new(),
            available: false,
            attributes: Value::Object(serde_json::Map::new()),
        }
    }
}

/// The local identity connected to the routing backend.
pub struct Worker {
    config: Arc<Configuration>,
    routes: Routes,
    request: Request,
    signaling: Arc<EventBridgeSignaling>,
    bus: EventBus<WorkerEvent>,
    state: RwLock<WorkerState>,
    reservations: RwLock<HashMap<String, Arc<Reservation>>>,
    ready_emitted: AtomicBool,
}

impl Worker {
    /// Builds a Worker over its two external collaborators.
    pub fn new(
        token: &str,
        options: WorkerOptions,
        http: Arc<dyn HttpClient>,
        transport: Arc<dyn SignalingTransport>,
    ) -> Result<Self> {
        let mut config_options = ConfigurationOptions {
            workspace_sid: options.workspace_sid,
            worker_sid: options.worker_sid,
            ..Default::default()
        };
        if let Some(ws_server) = options.ws_server {
            config_options.ws_server = ws_server;
        }
        if let Some(eb_server) = options.eb_server {
            config_options.eb_server = eb_server;
        }

        let config = Arc::new(Configuration::new(token, config_options)?);
        let routes = Routes::new(config.workspace_sid(), config.worker_sid());
        let request = Request::new(http);
        let signaling = Arc::new(EventBridgeSignaling::new(
            config.clone(),
            transport,
            options.reconnection.unwrap_or_default(),
        ));

        Ok(Self {
            config,
            routes,
            request,
            signaling,
            bus: EventBus::new(),
            state: RwLock::new(WorkerState::default()),
            reservations: RwLock::new(HashMap::new()),
            ready_emitted: AtomicBool::new(false),
        })
    }

    /// This worker's sid.
    pub fn sid(&self) -> &str {
        self.config.worker_sid()
    }

    /// The session configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The signaling channel.
    pub fn signaling(&self) -> &EventBridgeSignaling {
        &self.signaling
    }

    /// Current attribute bag.
    pub fn attributes(&self) -> Value {
        self.state.read().attributes.clone()
    }

    /// Current activity sid.
    pub fn activity_sid(&self) -> String {
        self.state.read().activity_sid.clone()
    }

    /// Current activity name.
    pub fn activity_name(&self) -> String {
        self.state.read().activity_name.clone()
    }

    /// Whether the worker is currently available for new offers.
    pub fn available(&self) -> bool {
        self.state.read().available
    }

    /// Active (non-terminal) reservations, reachable only through this
    /// worker.
    pub fn reservations(&self) -> Vec<Arc<Reservation>> {
        self.reservations
            .read()
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect()
    }

    /// Looks up one reservation by sid.
    pub fn reservation(&self, reservation_sid: &str) -> Option<Arc<Reservation>> {
        self.reservations.read().get(reservation_sid).cloned()
    }

    /// Subscribes to one event kind.
    pub fn on<F>(&self, kind: WorkerEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, callback)
    }

    /// Removes one subscription.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.bus.off(subscription)
    }

    /// Removes every subscription on this worker.
    pub fn remove_all_listeners(&self) {
        self.bus.remove_all_listeners()
    }

    /// Starts the signaling channel and drives it until it closes.
    ///
    /// Returns the handle of the background channel loop; dropping it
    /// does not stop the channel, [`Worker::disconnect`] does.
    pub fn connect(self: &Arc<Self>) -> JoinHandle<()> {
        let channel = self.signaling.clone();
        let sink: Arc<dyn FrameSink> = self.clone();
        info!(worker_sid = %self.sid(), "Connecting signaling channel");
        tokio::spawn(async move { channel.run(sink).await })
    }

    /// Replaces the session credential.
    ///
    /// The whole token is swapped atomically, exactly one `TokenUpdated`
    /// notification fires, and the channel's reconnect path is flagged.
    /// Propagation failures to a live connection are absorbed by the
    /// channel's own recovery; they never reject this call.
    pub async fn update_token(&self, new_token: &str) -> Result<()> {
        self.config.update_token(new_token)?;
        if let Err(e) = self.signaling.update_token().await {
            warn!(error = %e, "Token propagation failed; reconnect will pick it up");
        }
        self.bus.emit(&WorkerEvent::TokenUpdated);
        Ok(())
    }

    /// Replaces the worker's attribute bag server-side.
    pub async fn set_attributes(&self, attributes: &Value) -> Result<Value> {
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
        let response = self
            .request
            .post(&self.routes.worker(), params, ApiVersion::V1)
            .await?;

        let descriptor = WorkerDescriptor::from_value(&response)?;
        let applied = descriptor.attributes.clone();
        self.apply_worker_descriptor(descriptor);
        self.bus.emit(&WorkerEvent::AttributesUpdated {
            attributes: applied.clone(),
        });
        Ok(applied)
    }

    /// Moves the worker to another activity.
    pub async fn update_activity(&self, activity_sid: &str) -> Result<String> {
        if activity_sid.is_empty() {
            return Err(TaskRouterError::MissingParameter {
                name: "activitySid",
            });
        }

        let mut params = RequestParams::new();
        params.insert("ActivitySid".to_string(), json!(activity_sid));
        let response = self
            .request
            .post(&self.routes.worker(), params, ApiVersion::V1)
            .await?;

        let descriptor = WorkerDescriptor::from_value(&response)?;
        let (activity_sid, activity_name, available) = (
            descriptor.activity_sid.clone(),
            descriptor.activity_name.clone(),
            descriptor.available,
        );
        self.apply_worker_descriptor(descriptor);
        self.bus.emit(&WorkerEvent::ActivityUpdated {
            activity_sid: activity_sid.clone(),
            activity_name,
            available,
        });
        Ok(activity_sid)
    }

    /// Terminally disconnects the worker.
    ///
    /// Emits exactly one `Disconnected` notification carrying the SDK
    /// disconnect reason; no reconnection happens afterwards. In-flight
    /// REST calls are not aborted — mutations they already applied stand.
    pub async fn disconnect(&self) {
        if self.signaling.state().is_closed() {
            return;
        }
        self.signaling.disconnect(SDK_DISCONNECT_REASON).await;
        self.bus.emit(&WorkerEvent::Disconnected {
            reason: SDK_DISCONNECT_REASON.to_string(),
        });
    }

    /// Applies a worker snapshot, returning what changed.
    fn apply_worker_descriptor(&self, descriptor: WorkerDescriptor) -> (bool, bool) {
        let mut state = self.state.write();
        let activity_changed = state.activity_sid != descriptor.activity_sid;
        let attributes_changed = state.attributes != descriptor.attributes;
        state.friendly_name = descriptor.friendly_name;
        state.activity_sid = descriptor.activity_sid;
        state.activity_name = descriptor.activity_name;
        state.available = descriptor.available;
        state.attributes = descriptor.attributes;
        (activity_changed, attributes_changed)
    }

    /// Applies one inbound frame to the entity model.
    ///
    /// Normally driven by the signaling channel; exposed for transports
    /// and tests that deliver frames directly. Frames are demultiplexed
    /// by entity kind and sid; unknown sids materialize the entity fresh
    /// from the frame payload.
    pub fn route_frame(&self, frame: &Frame) -> Result<()> {
        let Some(kind) = frame.kind() else {
            debug!(event_type = %frame.event_type, "Ignoring unknown frame type");
            return Ok(());
        };

        match kind {
            FrameKind::ReservationCreated => {
                let descriptor = ReservationDescriptor::from_value(&frame.payload)?;
                self.materialize_reservation(descriptor)?;
            }
            FrameKind::TaskUpdated => self.route_task_frame(frame, TaskEventKind::Updated, None)?,
            FrameKind::TaskCanceled => self.route_task_frame(
                frame,
                TaskEventKind::Canceled,
                Some(ReservationStatus::Canceled),
            )?,
            FrameKind::TaskCompleted => self.route_task_frame(
                frame,
                TaskEventKind::Completed,
                Some(ReservationStatus::Completed),
            )?,
            FrameKind::TaskWrapup => self.route_task_frame(
                frame,
                TaskEventKind::Wrapup,
                Some(ReservationStatus::Wrapping),
            )?,
            FrameKind::TransferInitiated => {
                self.route_transfer_frame(frame, TaskEventKind::TransferInitiated)?
            }
            FrameKind::TransferCompleted => {
                self.route_transfer_frame(frame, TaskEventKind::TransferCompleted)?
            }
            FrameKind::TransferAttemptFailed => {
                self.route_transfer_frame(frame, TaskEventKind::TransferAttemptFailed)?
            }
            FrameKind::TransferFailed => {
                self.route_transfer_frame(frame, TaskEventKind::TransferFailed)?
            }
            FrameKind::TokenExpiring => {
                self.bus.emit(&WorkerEvent::TokenAboutToExpire);
            }
            FrameKind::WorkerUpdated => {
                let descriptor = WorkerDescriptor::from_value(&frame.payload)?;
                let snapshot = (
                    descriptor.activity_sid.clone(),
                    descriptor.activity_name.clone(),
                    descriptor.available,
                    descriptor.attributes.clone(),
                );
                let (activity_changed, attributes_changed) =
                    self.apply_worker_descriptor(descriptor);
                if activity_changed {
                    self.bus.emit(&WorkerEvent::ActivityUpdated {
                        activity_sid: snapshot.0,
                        activity_name: snapshot.1,
                        available: snapshot.2,
                    });
                }
                if attributes_changed {
                    self.bus.emit(&WorkerEvent::AttributesUpdated {
                        attributes: snapshot.3,
                    });
                }
            }
        }
        Ok(())
    }

    fn materialize_reservation(&self, descriptor: ReservationDescriptor) -> Result<Arc<Reservation>> {
        let task = Arc::new(Task::new(
            descriptor.task.clone(),
            &descriptor.sid,
            self.routes.clone(),
            self.request.clone(),
        )?);
        let reservation = Arc::new(Reservation::new(
            &descriptor,
            task,
            self.routes.clone(),
            self.request.clone(),
        ));
        self.reservations
            .write()
            .insert(descriptor.sid.clone(), reservation.clone());
        debug!(reservation_sid = %descriptor.sid, task_sid = %descriptor.task.sid, "Reservation materialized");
        self.bus.emit(&WorkerEvent::ReservationCreated {
            reservation_sid: descriptor.sid,
        });
        Ok(reservation)
    }

    fn route_task_frame(
        &self,
        frame: &Frame,
        event_kind: TaskEventKind,
        reservation_status: Option<ReservationStatus>,
    ) -> Result<()> {
        let descriptor = TaskDescriptor::from_value(&frame.payload)?;
        let reservation = match self.find_by_task_sid(&descriptor.sid) {
            Some(reservation) => reservation,
            None => self.materialize_from_task(&descriptor)?,
        };

        reservation.task().emit_event(event_kind, &frame.payload)?;
        if let Some(status) = reservation_status {
            reservation.apply_status(status);
        }
        self.prune_terminal();
        Ok(())
    }

    fn route_transfer_frame(&self, frame: &Frame, event_kind: TaskEventKind) -> Result<()> {
        let descriptor = crate::descriptors::TransferDescriptor::from_value(&frame.payload)?;
        let Some(reservation) = self.reservation(&descriptor.initiating_reservation_sid) else {
            warn!(
                reservation_sid = %descriptor.initiating_reservation_sid,
                "Transfer frame references unknown reservation"
            );
            return Ok(());
        };
        reservation.task().emit_event(event_kind, &frame.payload)
    }

    fn find_by_task_sid(&self, task_sid: &str) -> Option<Arc<Reservation>> {
        self.reservations
            .read()
            .values()
            .find(|r| r.task().sid() == task_sid)
            .cloned()
    }

    /// Materializes a fresh Reservation+Task pair for a task frame whose
    /// sid is unknown locally; the frame payload anchors it.
    fn materialize_from_task(&self, descriptor: &TaskDescriptor) -> Result<Arc<Reservation>> {
        let reservation_sid = descriptor.reservation_sid.clone().ok_or_else(|| {
            TaskRouterError::Payload(format!(
                "task frame for unknown task {} carries no reservation_sid",
                descriptor.sid
            ))
        })?;
        debug!(task_sid = %descriptor.sid, reservation_sid = %reservation_sid, "Materializing task from frame");
        let synthetic = ReservationDescriptor {
            sid: reservation_sid,
            worker_sid: self.sid().to_string(),
            status: ReservationStatus::Pending,
            task: descriptor.clone(),
        };
        self.materialize_reservation(synthetic)
    }

    fn prune_terminal(&self) {
        self.reservations.write().retain(|_, r| !r.is_terminal());
    }
}

#[async_trait]
impl FrameSink for Worker {
    async fn on_frame(&self, frame: Frame) {
        if let Err(e) = self.route_frame(&frame) {
            warn!(event_type = %frame.event_type, error = %e, "Failed to apply inbound frame");
            self.bus.emit(&WorkerEvent::Error {
                message: e.to_string(),
            });
        }
    }

    async fn on_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected { reconnected } => {
                if reconnected {
                    debug!("Channel reconnected; entity state resynchronizing from snapshot");
                }
                if !self.ready_emitted.swap(true, Ordering::SeqCst) {
                    self.bus.emit(&WorkerEvent::Ready);
                }
            }
            ChannelEvent::Reconnecting { attempt } => {
                debug!(attempt, "Channel reconnecting");
            }
            ChannelEvent::Disconnected { reason, terminal } => {
                if terminal {
                    self.bus.emit(&WorkerEvent::Disconnected { reason });
                } else {
                    // Absorbed: the channel retries within its budget.
                    debug!(reason = %reason, "Transient channel loss");
                }
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("sid", &self.sid())
            .field("reservations", &self.reservations.read().len())
            .finish_non_exhaustive()
    }
}
