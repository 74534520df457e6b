use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::codec::{LENGTH_PREFIX_SIZE, MessageCodec};
use crate::error::{ErrorKind, PresenterError};
use crate::message::{PartialMessageWithTlvs, Tlv, WireMessage};
use crate::network::Transport;

/// Bodies up to this size are read into an inline buffer; larger ones get
/// a heap buffer that lives only for the duration of the receive.
pub const INLINE_RECEIVE_BUFFER: usize = 1024;

/// Default deadline for the frame header read.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// One framed connection to the presenter server.
///
/// Sends are serialized: the frame and all of its TLVs leave the socket
/// before any other send on this connection starts. Receives are not
/// serialized and assume a single reader.
pub struct Connection<M> {
    transport: Box<dyn Transport>,
    codec: MessageCodec<M>,
    send_lock: Mutex<()>,
    receive_timeout: Duration,
}

impl<M: WireMessage> Connection<M> {
    pub fn new(
        transport: Box<dyn Transport>,
        codec: MessageCodec<M>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            codec,
            send_lock: Mutex::new(()),
            receive_timeout,
        }
    }

    /// Send a single message with no TLVs.
    pub async fn send(&self, message: &M) -> Result<(), PresenterError> {
        self.send_message(&PartialMessageWithTlvs::new(message)).await
    }

    /// Send a message followed by its TLV records as one unit.
    pub async fn send_message(
        &self,
        message: &PartialMessageWithTlvs<'_, M>,
    ) -> Result<(), PresenterError> {
        let name = message.message().name();
        let _guard = self.send_lock.lock().await;

        let frame = self.codec.encode_message(message.message()).map_err(|e| {
            error!(message = name, error = %e, "failed to encode message");
            e
        })?;

        if let Err(e) = self.transport.send(&frame).await {
            error!(message = name, error = %e, "failed to send message");
            return Err(e);
        }

        self.send_tlvs(message.tlvs()).await
    }

    async fn send_tlvs(&self, tlvs: &[Tlv<'_>]) -> Result<(), PresenterError> {
        for tlv in tlvs {
            let header = self.codec.encode_tlv_header(tlv);
            if let Err(e) = self.transport.send(&header).await {
                error!(tag = tlv.tag(), error = %e, "failed to send TLV tag and length");
                return Err(e);
            }

            if let Err(e) = self.transport.send(tlv.value()).await {
                error!(tag = tlv.tag(), error = %e, "failed to send TLV value");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Read exactly one frame and decode its message.
    pub async fn receive_message(&self) -> Result<M, PresenterError> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        match self.transport.receive(&mut prefix, self.receive_timeout).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::SocketTimeout => {
                info!("read message header timeout");
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "failed to read message header");
                return Err(e);
            }
        }

        let total_size = u32::from_be_bytes(prefix);
        let remaining = self.codec.frame_remaining(total_size).map_err(|e| {
            error!(total_size, "received malformed message");
            e
        })?;

        let mut inline = [0u8; INLINE_RECEIVE_BUFFER];
        let mut heap = Vec::new();
        let body: &mut [u8] = if remaining <= INLINE_RECEIVE_BUFFER {
            &mut inline[..remaining]
        } else {
            heap.try_reserve_exact(remaining)
                .map_err(|_| PresenterError::BadAlloc(remaining))?;
            heap.resize(remaining, 0);
            &mut heap[..]
        };

        if let Err(e) = self.transport.receive(body, self.receive_timeout).await {
            error!(error = %e, remaining, "failed to read whole message");
            return Err(into_connection_error(e));
        }

        let message = self.codec.decode_message(body)?;
        debug!(message = message.name(), "message received");
        Ok(message)
    }
}

/// A short body read means the stream is out of sync; whatever the
/// transport said, the connection is no longer usable.
fn into_connection_error(e: PresenterError) -> PresenterError {
    match e {
        PresenterError::Connection(_) => e,
        other => PresenterError::Connection(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TLV_HEADER_SIZE;
    use crate::network::mock::MockTransport;
    use crate::protocol::{
        OpenChannelErrorCode, OpenChannelResponse, PRESENT_IMAGE_DATA_TAG, PresentImageRequest,
        PresenterMessage, ImageFormat,
    };
    use std::sync::Arc;

    fn connection(mock: &MockTransport) -> Connection<PresenterMessage> {
        Connection::new(
            Box::new(mock.clone()),
            MessageCodec::default(),
            Duration::from_millis(50),
        )
    }

    fn image_request() -> PresenterMessage {
        PresentImageRequest {
            format: ImageFormat::Jpeg,
            width: 8,
            height: 8,
            rectangles: Vec::new(),
        }
        .into()
    }

    #[tokio::test]
    async fn frame_then_tlv_header_then_raw_value() {
        let mock = MockTransport::default();
        let conn = connection(&mock);
        let request = image_request();
        let image = [0xABu8; 100];
        let partial = PartialMessageWithTlvs::new(&request)
            .with_tlv(Tlv::new(PRESENT_IMAGE_DATA_TAG, &image).unwrap());

        conn.send_message(&partial).await.unwrap();

        let codec = MessageCodec::<PresenterMessage>::default();
        let mut expected = codec.encode_message(&request).unwrap().to_vec();
        expected.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 100]);
        expected.extend_from_slice(&image);
        assert_eq!(mock.sent_bytes(), expected);
        // frame, tlv header, tlv value: three separate writes
        assert_eq!(mock.send_calls(), 3);
    }

    #[tokio::test]
    async fn tlv_failure_stops_remaining_tlvs() {
        let mock = MockTransport::default();
        mock.fail_send_call(3);
        let conn = connection(&mock);
        let request = image_request();
        let a = [1u8; 10];
        let b = [2u8; 10];
        let partial = PartialMessageWithTlvs::new(&request)
            .with_tlv(Tlv::new(1, &a).unwrap())
            .with_tlv(Tlv::new(2, &b).unwrap());

        let err = conn.send_message(&partial).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        // frame, tlv#1 header, failing tlv#1 value, nothing more
        assert_eq!(mock.send_calls(), 3);
        let frame_len = codec_len(&request);
        assert_eq!(mock.sent_bytes().len(), frame_len + TLV_HEADER_SIZE);
    }

    fn codec_len(m: &PresenterMessage) -> usize {
        MessageCodec::<PresenterMessage>::default()
            .encode_message(m)
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn encode_failure_sends_nothing() {
        let mock = MockTransport::default();
        let conn = Connection::new(
            Box::new(mock.clone()),
            MessageCodec::<PresenterMessage>::with_max_frame_size(8),
            Duration::from_millis(50),
        );
        let err = conn.send(&image_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert_eq!(mock.send_calls(), 0);
    }

    #[tokio::test]
    async fn receives_small_and_large_frames() {
        let mock = MockTransport::default();
        let small: PresenterMessage = OpenChannelResponse::ok().into();
        let large: PresenterMessage =
            OpenChannelResponse::error(OpenChannelErrorCode::Other, "e".repeat(4096)).into();
        mock.push_message(&small);
        mock.push_message(&large);

        let conn = connection(&mock);
        assert_eq!(conn.receive_message().await.unwrap(), small);
        assert_eq!(conn.receive_message().await.unwrap(), large);
    }

    #[tokio::test]
    async fn header_timeout_is_distinct() {
        let mock = MockTransport::default();
        let conn = connection(&mock);
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketTimeout);
    }

    #[tokio::test]
    async fn header_cut_by_deadline_is_connection_error() {
        use crate::network::StreamTransport;
        use tokio::io::AsyncWriteExt;

        let (ours, mut theirs) = tokio::io::duplex(256);
        let conn = Connection::<PresenterMessage>::new(
            Box::new(StreamTransport::new(ours, "duplex")),
            MessageCodec::default(),
            Duration::from_millis(50),
        );
        let frame = MessageCodec::<PresenterMessage>::default()
            .encode_message(&OpenChannelResponse::ok().into())
            .unwrap();

        // Half a header, then silence past the deadline.
        theirs.write_all(&frame[..2]).await.unwrap();
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);

        // A quiet period with nothing read leaves the stream in sync.
        let (ours, mut theirs) = tokio::io::duplex(256);
        let conn = Connection::<PresenterMessage>::new(
            Box::new(StreamTransport::new(ours, "duplex")),
            MessageCodec::default(),
            Duration::from_millis(50),
        );
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketTimeout);
        theirs.write_all(&frame).await.unwrap();
        assert_eq!(
            conn.receive_message().await.unwrap(),
            PresenterMessage::from(OpenChannelResponse::ok())
        );
    }

    #[tokio::test]
    async fn zero_and_oversized_lengths_are_codec_errors() {
        let mock = MockTransport::default();
        let conn = connection(&mock);

        mock.push_inbound(&4u32.to_be_bytes());
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);

        let oversized = (crate::codec::DEFAULT_MAX_FRAME_SIZE + LENGTH_PREFIX_SIZE + 1) as u32;
        mock.push_inbound(&oversized.to_be_bytes());
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
        // Only the two headers were consumed.
        assert_eq!(mock.receive_calls(), 2);
    }

    #[tokio::test]
    async fn short_body_is_connection_error() {
        let mock = MockTransport::default();
        mock.push_inbound(&20u32.to_be_bytes());
        mock.push_inbound(&[0u8; 3]);
        let conn = connection(&mock);
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn undecodable_body_is_codec_error() {
        let mock = MockTransport::default();
        mock.push_inbound(&12u32.to_be_bytes());
        mock.push_inbound(&[3, b'F', b'o', b'o', 0xFF, 0xFF, 0xFF, 0xFF]);
        let conn = connection(&mock);
        let err = conn.receive_message().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[tokio::test]
    async fn concurrent_sends_do_not_interleave() {
        let mock = MockTransport::default();
        mock.set_yield_on_send(true);
        let conn = Arc::new(connection(&mock));
        let request = image_request();
        let frame = MessageCodec::<PresenterMessage>::default()
            .encode_message(&request)
            .unwrap()
            .to_vec();

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let conn = Arc::clone(&conn);
            let request = request.clone();
            tasks.push(tokio::spawn(async move {
                let value = [i; 32];
                let partial = PartialMessageWithTlvs::new(&request)
                    .with_tlv(Tlv::new(i as u32, &value).unwrap());
                conn.send_message(&partial).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        // Every unit is frame || header(i, 32) || [i; 32], back to back.
        let sent = mock.sent_bytes();
        let unit = frame.len() + TLV_HEADER_SIZE + 32;
        assert_eq!(sent.len(), unit * 8);
        let mut seen = Vec::new();
        for chunk in sent.chunks(unit) {
            assert_eq!(&chunk[..frame.len()], &frame[..]);
            let tag = u32::from_be_bytes(chunk[frame.len()..frame.len() + 4].try_into().unwrap());
            let value = &chunk[frame.len() + TLV_HEADER_SIZE..];
            assert!(value.iter().all(|b| *b as u32 == tag));
            seen.push(tag);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<u32>>());
    }
}
