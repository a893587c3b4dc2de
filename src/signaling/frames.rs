//! Inbound frame shapes and demux keys

use serde::Deserialize;
use serde_json::Value;

/// A typed inbound frame from the signaling transport.
///
/// Frames carry a partial-or-full snapshot of the entity they reference;
/// the payload shape per kind is handled by the descriptor layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    /// Dotted event-type key, e.g. `task.canceled`.
    pub event_type: String,
    /// Raw entity payload.
    pub payload: Value,
}

impl Frame {
    /// Builds a frame from its parts.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Resolves the demux key, if this frame type is known.
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::parse(&self.event_type)
    }
}

/// Closed set of frame types the channel routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    ReservationCreated,
    TaskUpdated,
    TaskCanceled,
    TaskCompleted,
    TaskWrapup,
    TransferInitiated,
    TransferCompleted,
    TransferAttemptFailed,
    TransferFailed,
    TokenExpiring,
    WorkerUpdated,
}

impl FrameKind {
    /// Parses the wire event-type key.
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "reservation.created" => Some(Self::ReservationCreated),
            "task.updated" => Some(Self::TaskUpdated),
            "task.canceled" => Some(Self::TaskCanceled),
            "task.completed" => Some(Self::TaskCompleted),
            "task.wrapup" => Some(Self::TaskWrapup),
            "task.transfer-initiated" => Some(Self::TransferInitiated),
            "task.transfer-completed" => Some(Self::TransferCompleted),
            "task.transfer-attempt-failed" => Some(Self::TransferAttemptFailed),
            "task.transfer-failed" => Some(Self::TransferFailed),
            "token.expiring" => Some(Self::TokenExpiring),
            "worker.updated" => Some(Self::WorkerUpdated),
            _ => None,
        }
    }
}
