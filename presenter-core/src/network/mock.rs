//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::codec::MessageCodec;
use crate::error::PresenterError;
use crate::message::WireMessage;
use crate::network::{Transport, TransportFactory};

#[derive(Default)]
struct MockState {
    chunks: Mutex<Vec<Vec<u8>>>,
    inbound: Mutex<VecDeque<u8>>,
    send_calls: AtomicUsize,
    receive_calls: AtomicUsize,
    connects: AtomicUsize,
    fail_on_send_call: AtomicUsize,
    fail_sends: AtomicBool,
    fail_connect: AtomicBool,
    yield_on_send: AtomicBool,
}

/// Records every successful send as one chunk and replays queued inbound
/// bytes. An empty inbound queue behaves like a silent peer (timeout).
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent_chunks().concat()
    }

    pub fn sent_chunks(&self) -> Vec<Vec<u8>> {
        self.state.chunks.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.state.chunks.lock().unwrap().clear();
    }

    pub fn send_calls(&self) -> usize {
        self.state.send_calls.load(Ordering::SeqCst)
    }

    pub fn receive_calls(&self) -> usize {
        self.state.receive_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Fail the `n`th send call (1-based, counted across the mock's life).
    pub fn fail_send_call(&self, n: usize) {
        self.state.fail_on_send_call.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_yield_on_send(&self, yield_now: bool) {
        self.state.yield_on_send.store(yield_now, Ordering::SeqCst);
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn push_message<M: WireMessage>(&self, message: &M) {
        let frame = MessageCodec::<M>::default().encode_message(message).unwrap();
        self.push_inbound(&frame);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<(), PresenterError> {
        let call = self.state.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.yield_on_send.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.state.fail_sends.load(Ordering::SeqCst)
            || self.state.fail_on_send_call.load(Ordering::SeqCst) == call
        {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock send failure").into());
        }
        self.state.chunks.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<(), PresenterError> {
        self.state.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut inbound = self.state.inbound.lock().unwrap();
        if inbound.is_empty() {
            return Err(PresenterError::SocketTimeout(timeout));
        }
        if inbound.len() < buf.len() {
            inbound.clear();
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let n = buf.len();
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }
}

#[async_trait]
impl TransportFactory for MockTransport {
    async fn connect(&self, _host: &str, _port: u16) -> Result<Box<dyn Transport>, PresenterError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into(),
            );
        }
        Ok(Box::new(self.clone()))
    }
}
