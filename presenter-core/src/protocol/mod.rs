//! High-level protocol payload definitions for the presenter service.
//!
//! Payloads are serialized with `serde` + `bincode` by
//! [`MessageCodec`] and carried inside length-prefixed frames.
//!
//! [`MessageCodec`]: crate::codec::MessageCodec

pub mod presenter;

pub use presenter::{
    ContentType, DetectionResult, HeartbeatMessage, ImageFormat, OpenChannelErrorCode,
    OpenChannelRequest, OpenChannelResponse, PRESENT_IMAGE_DATA_TAG, Point,
    PresentDataErrorCode, PresentImageRequest, PresentImageResponse, PresenterMessage,
};
