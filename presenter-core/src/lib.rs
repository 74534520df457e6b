//! # presenter-core
//!
//! Client side of the presenter channel: an agent-to-server TCP link that
//! carries typed messages and large binary payloads, and repairs itself
//! when the server goes away.
//!
//! This crate contains:
//! - **Message model**: `WireMessage`, `Tlv`, `PartialMessageWithTlvs`
//! - **Codec**: `MessageCodec` for length-prefixed frames with a TLV trailer
//! - **Network**: `Transport` seam, `TcpTransport`, and `Connection` with
//!   serialized sends and bounded receives
//! - **Channel**: `Channel` with a usable flag, handshake, and a keep-alive
//!   supervisor that reopens broken connections
//! - **Protocol**: presenter-service payloads (`PresenterMessage`)
//! - **Presenter**: `open_channel` / `present_image` convenience API
//! - **Error**: `PresenterError`, classified by `ErrorKind`

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod network;
pub mod presenter;
pub mod protocol;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channel::{
    Channel, ChannelBuilder, ChannelConfig, DEFAULT_HEARTBEAT_INTERVAL, InitChannelHandler,
};
pub use codec::{DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE, MessageCodec, TLV_HEADER_SIZE};
pub use error::{AppError, ErrorKind, PresenterError};
pub use message::{PartialMessageWithTlvs, Tlv, WireMessage};
pub use network::{
    Connection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, StreamTransport, TcpTransport,
    TcpTransportFactory, Transport, TransportFactory,
};
pub use presenter::{
    ImageFrame, OpenChannelParam, PresentChannelInitHandler, check_present_image_response,
    create_channel, open_channel, present_image, send_message,
};
pub use protocol::{
    ContentType, DetectionResult, HeartbeatMessage, ImageFormat, OpenChannelErrorCode,
    OpenChannelRequest, OpenChannelResponse, PRESENT_IMAGE_DATA_TAG, Point, PresentDataErrorCode,
    PresentImageRequest, PresentImageResponse, PresenterMessage,
};
