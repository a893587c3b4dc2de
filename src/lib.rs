//! TaskRouter Worker SDK for Rust
//!
//! This SDK lets a worker process participate in a server-managed
//! task-routing system: it keeps a live signaling connection to the
//! routing backend, reconciles locally cached Task/Reservation state
//! against push events and REST responses, and exposes the Task lifecycle
//! (accept, complete, wrap-up, hold, transfer) as typed async operations.
//!
//! Transport-level sockets and HTTP plumbing are external collaborators
//! behind the [`signaling::SignalingTransport`] and [`request::HttpClient`]
//! traits.

pub mod config;
pub mod descriptors;
pub mod error;
pub mod events;
pub mod request;
pub mod reservation;
pub mod routes;
pub mod signaling;
pub mod task;
pub mod transfer;
pub mod worker;

/// Testing utilities: scripted collaborators and payload builders.
/// Available only with the `testing` feature enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::{Configuration, ConfigurationOptions};
pub use error::{Result, TaskRouterError, TASKROUTER_ERROR};
pub use events::{BusEvent, EventBus, SubscriptionId};
pub use request::{HttpClient, Request, RequestParams};
pub use reservation::{Reservation, ReservationEvent, ReservationEventKind, ReservationStatus};
pub use routes::{ApiVersion, Routes};
pub use signaling::{
    ChannelEvent, ChannelState, EventBridgeSignaling, Frame, FrameKind, FrameSink,
    ReconnectionStrategy, SignalingTransport, TransportEvent, SDK_DISCONNECT_REASON,
};
pub use task::{
    Task, TaskEvent, TaskEventKind, TaskFields, TaskStatus, WrapUpOptions, DEFAULT_WRAPUP_REASON,
};
pub use transfer::{TransferMode, TransferOptions};
pub use worker::{Worker, WorkerEvent, WorkerEventKind, WorkerOptions};

// Re-export descriptor types
pub use descriptors::{
    ReservationDescriptor, TaskDescriptor, TransferDescriptor, WorkerDescriptor,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Configuration, ConfigurationOptions};
    pub use crate::descriptors::{
        ReservationDescriptor, TaskDescriptor, TransferDescriptor, WorkerDescriptor,
    };
    pub use crate::error::{Result, TaskRouterError};
    pub use crate::events::{BusEvent, EventBus, SubscriptionId};
    pub use crate::request::{HttpClient, Request, RequestParams};
    pub use crate::reservation::{
        Reservation, ReservationEvent, ReservationEventKind, ReservationStatus,
    };
    pub use crate::routes::{ApiVersion, Routes};
    pub use crate::signaling::{
        ChannelEvent, ChannelState, EventBridgeSignaling, Frame, FrameKind, FrameSink,
        ReconnectionStrategy, SignalingTransport, TransportEvent,
    };
    pub use crate::task::{Task, TaskEvent, TaskEventKind, TaskFields, TaskStatus, WrapUpOptions};
    pub use crate::transfer::{TransferMode, TransferOptions};
    pub use crate::worker::{Worker, WorkerEvent, WorkerEventKind, WorkerOptions};
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Map, Value};
}
