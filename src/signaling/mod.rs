//! Signaling channel: persistent connection lifecycle and frame demux
//!
//! Owns connect/reconnect/token-renewal and the demultiplexing of inbound
//! push frames toward the entity state machines. The socket itself is a
//! black-box collaborator behind [`SignalingTransport`].

mod channel;
mod frames;
mod reconnection;

pub use channel::{
    ChannelEvent, ChannelState, EventBridgeSignaling, FrameSink, SignalingTransport,
    TransportEvent, DEFAULT_LIVENESS_TIMEOUT, SDK_DISCONNECT_REASON,
};
pub use frames::{Frame, FrameKind};
pub use reconnection::ReconnectionStrategy;
