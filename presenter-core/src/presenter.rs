//! Agent-facing presenter API.
//!
//! Wraps a [`Channel<PresenterMessage>`] with the open-channel handshake
//! and image presentation:
//!
//! ```text
//! open_channel(param) ──► OpenChannelRequest / OpenChannelResponse
//! present_image(ch, img) ──► PresentImageRequest + TLV(img.data)
//!                        ◄── PresentImageResponse
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info};

use crate::channel::{Channel, ChannelConfig, InitChannelHandler};
use crate::error::{AppError, PresenterError};
use crate::message::{PartialMessageWithTlvs, Tlv, WireMessage};
use crate::protocol::{
    ContentType, DetectionResult, ImageFormat, OpenChannelErrorCode, OpenChannelRequest,
    PRESENT_IMAGE_DATA_TAG, PresentDataErrorCode, PresentImageRequest, PresenterMessage,
};

// ── OpenChannelParam ─────────────────────────────────────────────

/// Where to connect and which server-side channel to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannelParam {
    pub host_ip: String,
    pub port: u16,
    pub channel_name: String,
    pub content_type: ContentType,
}

impl fmt::Display for OpenChannelParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PresenterChannel {{server: {}:{}, channel: {}, content_type: {:?}}}",
            self.host_ip, self.port, self.channel_name, self.content_type
        )
    }
}

// ── PresentChannelInitHandler ────────────────────────────────────

/// Handshake for presenter channels: asks for a named channel and
/// remembers why the server refused it.
#[derive(Debug)]
pub struct PresentChannelInitHandler {
    channel_name: String,
    content_type: ContentType,
    rejection: Mutex<Option<AppError>>,
}

impl PresentChannelInitHandler {
    pub fn new(param: &OpenChannelParam) -> Self {
        Self {
            channel_name: param.channel_name.clone(),
            content_type: param.content_type,
            rejection: Mutex::new(None),
        }
    }

    fn set_rejection(&self, rejection: Option<AppError>) {
        *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = rejection;
    }
}

impl InitChannelHandler<PresenterMessage> for PresentChannelInitHandler {
    fn create_init_request(&self) -> Option<PresenterMessage> {
        if self.channel_name.is_empty() {
            return None;
        }
        Some(
            OpenChannelRequest::new(self.channel_name.clone())
                .with_content_type(self.content_type)
                .into(),
        )
    }

    fn check_init_response(&self, response: &PresenterMessage) -> bool {
        let rejection = match response {
            PresenterMessage::OpenChannelResponse(resp) => match resp.error_code {
                OpenChannelErrorCode::None => None,
                OpenChannelErrorCode::NoSuchChannel => Some(AppError::NoSuchChannel),
                OpenChannelErrorCode::ChannelAlreadyOpened => Some(AppError::ChannelAlreadyOpened),
                OpenChannelErrorCode::Other => {
                    Some(AppError::ServerReturnedError(resp.error_message.clone()))
                }
            },
            other => Some(AppError::UnexpectedResponse(other.name())),
        };
        let accepted = rejection.is_none();
        self.set_rejection(rejection);
        accepted
    }

    fn error_detail(&self) -> Option<AppError> {
        self.rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ── Channel lifecycle ────────────────────────────────────────────

/// Build a TCP presenter channel for `param`. Performs no I/O.
pub fn create_channel(param: &OpenChannelParam, config: ChannelConfig) -> Channel<PresenterMessage> {
    Channel::builder(param.host_ip.clone(), param.port)
        .with_description(param.to_string())
        .with_config(config)
        .with_handler(Arc::new(PresentChannelInitHandler::new(param)))
        .build()
}

/// Create and open a presenter channel.
///
/// A refused handshake comes back as [`PresenterError::AppDefined`] with
/// the server's reason attached.
pub async fn open_channel(
    param: &OpenChannelParam,
    config: ChannelConfig,
) -> Result<Channel<PresenterMessage>, PresenterError> {
    let channel = create_channel(param, config);
    info!(channel = %channel.description(), "to open channel");

    if let Err(e) = channel.open().await {
        error!(channel = %channel.description(), error = %e, "open channel failed");
        return Err(e);
    }

    info!(channel = %channel.description(), "channel opened");
    Ok(channel)
}

// ── Image presentation ───────────────────────────────────────────

/// One encoded image plus the inference results to overlay on it.
#[derive(Debug, Clone)]
pub struct ImageFrame<'a> {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
    pub rectangles: Vec<DetectionResult>,
}

impl<'a> ImageFrame<'a> {
    pub fn jpeg(width: u32, height: u32, data: &'a [u8]) -> Self {
        Self {
            format: ImageFormat::Jpeg,
            width,
            height,
            data,
            rectangles: Vec::new(),
        }
    }

    pub fn with_rectangles(mut self, rectangles: Vec<DetectionResult>) -> Self {
        self.rectangles = rectangles;
        self
    }

    fn validate(&self) -> Result<(), PresenterError> {
        if self.width == 0 || self.height == 0 {
            return Err(PresenterError::InvalidParam("image width and height must be non-zero"));
        }
        if self.data.is_empty() {
            return Err(PresenterError::InvalidParam("image data is empty"));
        }
        Ok(())
    }

    fn to_request(&self) -> PresentImageRequest {
        PresentImageRequest {
            format: self.format,
            width: self.width,
            height: self.height,
            rectangles: self.rectangles.clone(),
        }
    }
}

/// Send `image` and wait for the server to acknowledge it.
pub async fn present_image(
    channel: &Channel<PresenterMessage>,
    image: &ImageFrame<'_>,
) -> Result<(), PresenterError> {
    image.validate()?;

    let request: PresenterMessage = image.to_request().into();
    let message = PartialMessageWithTlvs::new(&request)
        .with_tlv(Tlv::new(PRESENT_IMAGE_DATA_TAG, image.data)?);

    let response = channel
        .send_with_tlvs_and_wait(&message)
        .await
        .map_err(|e| {
            error!(channel = %channel.description(), error = %e, "failed to present image");
            e
        })?;
    check_present_image_response(&response)
}

/// Send any presenter message and check the reply as a present-data
/// response.
pub async fn send_message(
    channel: &Channel<PresenterMessage>,
    message: &PresenterMessage,
) -> Result<(), PresenterError> {
    let response = channel.send_and_wait(message).await.map_err(|e| {
        error!(channel = %channel.description(), message = message.name(), error = %e, "failed to send message");
        e
    })?;
    check_present_image_response(&response)
}

/// Translate the server's [`PresentImageResponse`] into a result.
///
/// [`PresentImageResponse`]: crate::protocol::PresentImageResponse
pub fn check_present_image_response(response: &PresenterMessage) -> Result<(), PresenterError> {
    match response {
        PresenterMessage::PresentImageResponse(resp) => match resp.error_code {
            PresentDataErrorCode::None => Ok(()),
            code => {
                error!(?code, message = %resp.error_message, "server rejected data");
                Err(AppError::ServerReturnedError(format!("{code:?}: {}", resp.error_message)).into())
            }
        },
        other => Err(AppError::UnexpectedResponse(other.name()).into()),
    }
}

// ── Tests ────────────────────────────────────────────────────────
