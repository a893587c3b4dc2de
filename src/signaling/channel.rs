//! Event-bridge signaling channel state machine

use super::frames::Frame;
use super::reconnection::ReconnectionStrategy;
use crate::config::Configuration;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Reason attached to a caller-driven disconnect.
pub const SDK_DISCONNECT_REASON: &str = "SDK Disconnect";

/// Idle window after which the connection is treated as lost.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection lifecycle state of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No connection attempt has been made yet.
    #[default]
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The channel is live and delivering frames.
    Connected,
    /// Connection lost; the channel is retrying within its budget.
    Reconnecting {
        /// Current reconnection attempt number.
        attempt: u32,
    },
    /// Terminal: no further reconnection will happen.
    Closed {
        /// Human-readable reason.
        reason: String,
    },
}

impl ChannelState {
    /// Returns true once the channel is terminally closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Returns true while the channel is live.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Events produced by the transport collaborator.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound push frame.
    Frame(Frame),
    /// The underlying connection closed.
    Closed {
        /// Transport-provided reason.
        reason: String,
    },
}

/// External socket collaborator.
///
/// The SDK never touches the wire directly; implementations own framing,
/// TLS, and the socket lifecycle. `next_event` yields inbound traffic and
/// returns `None` when the transport is finished for good.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Opens a connection to the signaling endpoint.
    async fn open(&self, url: &str, token: &str) -> Result<()>;

    /// Propagates a replaced token to the live connection without
    /// resetting other session state.
    async fn update_token(&self, token: &str) -> Result<()>;

    /// Requests a fresh entity-state snapshot, re-delivered as frames.
    async fn request_snapshot(&self) -> Result<()>;

    /// Closes the connection.
    async fn close(&self);

    /// Waits for the next inbound event.
    async fn next_event(&self) -> Option<TransportEvent>;
}

/// Channel lifecycle notifications delivered to the frame sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel came up; `reconnected` is false on the first session.
    Connected { reconnected: bool },
    /// A reconnection attempt is being scheduled.
    Reconnecting { attempt: u32 },
    /// The connection dropped. `terminal` is true when no further
    /// reconnection will be attempted.
    Disconnected { reason: String, terminal: bool },
}

/// Receiver of demultiplexed frames and channel lifecycle events.
///
/// The Worker aggregate implements this to route frames to its entity
/// state machines.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Called for every inbound frame, in arrival order.
    async fn on_frame(&self, frame: Frame);

    /// Called on channel lifecycle changes.
    async fn on_channel_event(&self, event: ChannelEvent);
}

/// The signaling channel state machine.
///
/// Owns connect, liveness, bounded reconnect-with-backoff, token renewal,
/// and terminal disconnect. All inbound frames flow through [`Self::run`]
/// to the sink in arrival order.
pub struct EventBridgeSignaling {
    config: Arc<Configuration>,
    transport: Arc<dyn SignalingTransport>,
    strategy: ReconnectionStrategy,
    liveness_timeout: Duration,
    state: RwLock<ChannelState>,
    reconnect_required: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EventBridgeSignaling {
    /// Creates a channel over the given transport.
    pub fn new(
        config: Arc<Configuration>,
        transport: Arc<dyn SignalingTransport>,
        strategy: ReconnectionStrategy,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            transport,
            strategy,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            state: RwLock::new(ChannelState::Idle),
            reconnect_required: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Overrides the liveness window.
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        self.state.read().clone()
    }

    /// True after a token replacement requested a reconnect cycle.
    /// Cleared on the next successful connect.
    pub fn reconnect_required(&self) -> bool {
        self.reconnect_required.load(Ordering::SeqCst)
    }

    /// Pushes the (already swapped) session token to the live connection
    /// and flags the reconnect path. When no connection exists the token
    /// is simply held for the next connect attempt, which always reads it
    /// from the session configuration.
    pub async fn update_token(&self) -> Result<()> {
        self.reconnect_required.store(true, Ordering::SeqCst);
        if self.state().is_connected() {
            let token = self.config.token();
            self.transport.update_token(&token).await?;
            debug!("Propagated replaced token to live connection");
        }
        Ok(())
    }

    /// Terminally closes the channel. Safe to call more than once; only
    /// the first reason sticks.
    pub async fn disconnect(&self, reason: &str) {
        {
            let mut state = self.state.write();
            if state.is_closed() {
                return;
            }
            *state = ChannelState::Closed {
                reason: reason.to_string(),
            };
        }
        info!(reason = %reason, "Signaling channel disconnecting");
        let _ = self.shutdown_tx.send(true);
        self.transport.close().await;
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write() = state;
    }

    fn is_closed(&self) -> bool {
        self.state.read().is_closed()
    }

    /// Drives the channel until it is terminally closed.
    ///
    /// Connects, pumps frames to the sink, and on unexpected loss retries
    /// within the reconnection budget. Each successful reconnect requests
    /// a fresh snapshot since push events delivered during the gap are not
    /// replayed.
    pub async fn run(&self, sink: Arc<dyn FrameSink>) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut attempt: u32 = 0;
        let mut had_session = false;

        loop {
            if self.is_closed() || *shutdown_rx.borrow() {
                break;
            }
            self.set_state(ChannelState::Connecting);

            let token = self.config.token();
            match self.transport.open(self.config.ws_server(), &token).await {
                Ok(()) => {
                    let reconnected = had_session;
                    had_session = true;
                    attempt = 0;
                    self.reconnect_required.store(false, Ordering::SeqCst);
                    self.set_state(ChannelState::Connected);

                    if reconnected {
                        if let Err(e) = self.transport.request_snapshot().await {
                            warn!(error = %e, "Snapshot request failed after reconnect");
                        }
                    }
                    sink.on_channel_event(ChannelEvent::Connected { reconnected })
                        .await;

                    match self.pump(&sink, &mut shutdown_rx).await {
                        None => break,
                        Some(reason) => {
                            warn!(reason = %reason, "Signaling connection lost");
                            sink.on_channel_event(ChannelEvent::Disconnected {
                                reason,
                                terminal: false,
                            })
                            .await;
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Signaling connect attempt failed");
                }
            }

            if self.is_closed() || *shutdown_rx.borrow() {
                break;
            }

            match self.strategy.calculate_delay(attempt) {
                Some(delay) => {
                    attempt += 1;
                    self.set_state(ChannelState::Reconnecting { attempt });
                    sink.on_channel_event(ChannelEvent::Reconnecting { attempt })
                        .await;
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
                None => {
                    let reason = "Reconnection attempts exhausted".to_string();
                    error!(attempts = attempt, "Reconnection budget exhausted");
                    self.set_state(ChannelState::Closed {
                        reason: reason.clone(),
                    });
                    sink.on_channel_event(ChannelEvent::Disconnected {
                        reason,
                        terminal: true,
                    })
                    .await;
                    break;
                }
            }
        }
    }

    /// Pumps inbound events until the connection drops or the channel is
    /// shut down. Returns the loss reason, or `None` on deliberate
    /// shutdown.
    async fn pump(
        &self,
        sink: &Arc<dyn FrameSink>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<String> {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return None,
                event = self.transport.next_event() => match event {
                    Some(TransportEvent::Frame(frame)) => {
                        debug!(event_type = %frame.event_type, "Inbound frame");
                        sink.on_frame(frame).await;
                    }
                    Some(TransportEvent::Closed { reason }) => {
                        if self.is_closed() {
                            return None;
                        }
                        return Some(reason);
                    }
                    None => {
                        if self.is_closed() {
                            return None;
                        }
                        return Some("transport stream ended".to_string());
                    }
                },
                _ = tokio::time::sleep(self.liveness_timeout) => {
                    return Some("liveness timeout".to_string());
                }
            }
        }
    }
}
