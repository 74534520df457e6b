//! Presenter service messages.
//!
//! # Wire Protocol
//!
//! ## Channel open (handshake)
//! ```text
//! Agent  ──[OpenChannelRequest]──────────────► Server
//! Server ──[OpenChannelResponse]─────────────► Agent
//! ```
//!
//! ## Image presentation
//! ```text
//! Agent  ──[PresentImageRequest + TLV(image)]► Server
//!   TLV tag: PRESENT_IMAGE_DATA_TAG, value: encoded image bytes
//! Server ──[PresentImageResponse]────────────► Agent
//! ```
//!
//! ## Keep-alive
//! ```text
//! Agent  ──[HeartbeatMessage]────────────────► Server   (every interval)
//! ```

use serde::{Deserialize, Serialize};

use crate::message::WireMessage;

/// TLV tag carrying the image bytes of a [`PresentImageRequest`].
pub const PRESENT_IMAGE_DATA_TAG: u32 = 4;

// ── PresenterMessage ──────────────────────────────────────────────

/// Every message exchanged with the presenter server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PresenterMessage {
    OpenChannelRequest(OpenChannelRequest),
    OpenChannelResponse(OpenChannelResponse),
    PresentImageRequest(PresentImageRequest),
    PresentImageResponse(PresentImageResponse),
    Heartbeat(HeartbeatMessage),
}

impl WireMessage for PresenterMessage {
    fn name(&self) -> &'static str {
        match self {
            Self::OpenChannelRequest(_) => "OpenChannelRequest",
            Self::OpenChannelResponse(_) => "OpenChannelResponse",
            Self::PresentImageRequest(_) => "PresentImageRequest",
            Self::PresentImageResponse(_) => "PresentImageResponse",
            Self::Heartbeat(_) => "HeartbeatMessage",
        }
    }

    fn heartbeat() -> Self {
        Self::Heartbeat(HeartbeatMessage)
    }
}

impl From<OpenChannelRequest> for PresenterMessage {
    fn from(m: OpenChannelRequest) -> Self {
        Self::OpenChannelRequest(m)
    }
}

impl From<OpenChannelResponse> for PresenterMessage {
    fn from(m: OpenChannelResponse) -> Self {
        Self::OpenChannelResponse(m)
    }
}

impl From<PresentImageRequest> for PresenterMessage {
    fn from(m: PresentImageRequest) -> Self {
        Self::PresentImageRequest(m)
    }
}

impl From<PresentImageResponse> for PresenterMessage {
    fn from(m: PresentImageResponse) -> Self {
        Self::PresentImageResponse(m)
    }
}

// ── Open Channel ──────────────────────────────────────────────────

/// What a channel will carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Image,
    Video,
}

/// Handshake request naming the server-side channel to attach to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenChannelRequest {
    pub channel_name: String,
    pub content_type: ContentType,
}

impl OpenChannelRequest {
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            content_type: ContentType::default(),
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Server verdict on an [`OpenChannelRequest`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OpenChannelErrorCode {
    #[default]
    None,
    NoSuchChannel,
    ChannelAlreadyOpened,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OpenChannelResponse {
    pub error_code: OpenChannelErrorCode,
    pub error_message: String,
}

impl OpenChannelResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(error_code: OpenChannelErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: message.into(),
        }
    }
}

// ── Present Image ─────────────────────────────────────────────────

/// Encoding of the image bytes carried in the TLV.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// One inference result drawn over the image: a box and its label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionResult {
    /// Top-left corner.
    pub lt: Point,
    /// Bottom-right corner.
    pub rb: Point,
    pub result_text: String,
}

/// Image metadata; the image bytes follow as a TLV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentImageRequest {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub rectangles: Vec<DetectionResult>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PresentDataErrorCode {
    #[default]
    None,
    UnsupportedType,
    UnsupportedFormat,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PresentImageResponse {
    pub error_code: PresentDataErrorCode,
    pub error_message: String,
}

impl PresentImageResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(error_code: PresentDataErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: message.into(),
        }
    }
}

// ── Heartbeat ─────────────────────────────────────────────────────

/// Empty keep-alive message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HeartbeatMessage;

// ── Tests ────────────────────────────────────────────────────────
