//! Domain-specific error types for the presenter channel.
//!
//! All fallible operations return `Result<T, PresenterError>`.
//! Transport, codec and connection failures surface as values; nothing in
//! the send/receive path panics on bad input or a broken peer.

use std::time::Duration;
use thiserror::Error;

// ── ErrorKind ────────────────────────────────────────────────────

/// Coarse classification of a [`PresenterError`].
///
/// The channel decides whether to clear its usable flag from the kind
/// alone, so every variant maps onto exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller input.
    InvalidParam,
    /// A buffer could not be allocated.
    BadAlloc,
    /// Transport-level failure, including a detected disconnect.
    Connection,
    /// The header read deadline passed; the connection is presumed alive.
    SocketTimeout,
    /// Malformed or oversized frame, or a serialization failure.
    Codec,
    /// Rejected by the handshake collaborator or by the server.
    AppDefined,
}

// ── PresenterError ───────────────────────────────────────────────

/// The canonical error type for the presenter channel.
#[derive(Debug, Error)]
pub enum PresenterError {
    // ── Parameter Errors ─────────────────────────────────────────
    /// Caller supplied input that cannot be sent.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// A receive buffer of the given size could not be reserved.
    #[error("failed to allocate {0} bytes")]
    BadAlloc(usize),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The channel is closed; no I/O was attempted.
    #[error("channel is not open")]
    ChannelNotOpen,

    /// The serialization layer panicked mid-operation.
    #[error("serializer panicked: {0}")]
    SerializerPanic(String),

    /// Reading the frame header exceeded its deadline.
    #[error("socket timeout after {0:?}")]
    SocketTimeout(Duration),

    // ── Codec Errors ─────────────────────────────────────────────
    /// Encoding or decoding of a message body failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The length prefix announced an impossible frame.
    #[error("malformed frame: size field = {total_size}")]
    MalformedFrame { total_size: u32 },

    /// Frame size exceeded the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Application Errors ───────────────────────────────────────
    /// The handshake collaborator or the server refused the request.
    #[error("application error: {0}")]
    AppDefined(AppError),
}

impl PresenterError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParam(_) => ErrorKind::InvalidParam,
            Self::BadAlloc(_) => ErrorKind::BadAlloc,
            Self::Connection(_) | Self::ChannelNotOpen | Self::SerializerPanic(_) => {
                ErrorKind::Connection
            }
            Self::SocketTimeout(_) => ErrorKind::SocketTimeout,
            Self::Encoding(_) | Self::MalformedFrame { .. } | Self::FrameTooLarge { .. } => {
                ErrorKind::Codec
            }
            Self::AppDefined(_) => ErrorKind::AppDefined,
        }
    }

    /// The application detail, if this is an application-defined error.
    pub fn app_error(&self) -> Option<&AppError> {
        match self {
            Self::AppDefined(detail) => Some(detail),
            _ => None,
        }
    }
}

// ── AppError ─────────────────────────────────────────────────────

/// Detail carried by [`PresenterError::AppDefined`].
///
/// Returned alongside the error so callers never have to recover the
/// handshake collaborator to learn why an open was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// The handshake collaborator could not build an init request.
    #[error("init request could not be created")]
    InitRequestUnavailable,

    /// The init response was rejected without a more specific reason.
    #[error("init response rejected")]
    InitRejected,

    /// The server has no channel with the requested name.
    #[error("no such channel")]
    NoSuchChannel,

    /// Another agent already holds the requested channel.
    #[error("channel already opened")]
    ChannelAlreadyOpened,

    /// The server reported an error.
    #[error("server returned error: {0}")]
    ServerReturnedError(String),

    /// The server answered with a message of an unexpected type.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
}

impl From<AppError> for PresenterError {
    fn from(e: AppError) -> Self {
        PresenterError::AppDefined(e)
    }
}

impl From<Box<bincode::ErrorKind>> for PresenterError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        PresenterError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PresenterError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = PresenterError::MalformedFrame { total_size: 4 };
        assert!(e.to_string().contains("size field = 4"));
    }

    #[test]
    fn kinds() {
        assert_eq!(PresenterError::ChannelNotOpen.kind(), ErrorKind::Connection);
        assert_eq!(
            PresenterError::SerializerPanic("boom".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            PresenterError::SocketTimeout(Duration::from_millis(10)).kind(),
            ErrorKind::SocketTimeout
        );
        assert_eq!(
            PresenterError::MalformedFrame { total_size: 0 }.kind(),
            ErrorKind::Codec
        );
        assert_eq!(PresenterError::BadAlloc(8).kind(), ErrorKind::BadAlloc);
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: PresenterError = io_err.into();
        assert!(matches!(e, PresenterError::Connection(_)));
        assert_eq!(e.kind(), ErrorKind::Connection);
    }

    #[test]
    fn app_detail_is_reachable() {
        let e: PresenterError = AppError::ChannelAlreadyOpened.into();
        assert_eq!(e.kind(), ErrorKind::AppDefined);
        assert_eq!(e.app_error(), Some(&AppError::ChannelAlreadyOpened));
        assert!(PresenterError::ChannelNotOpen.app_error().is_none());
    }
}
