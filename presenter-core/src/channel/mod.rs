//! Self-healing channel to a presenter server.
//!
//! ```text
//!            open() ok                     connection / codec error
//!  Closed ───────────────► Open ─────────────────────────────► Closed
//!    ▲                       │                                   │
//!    │                       │ close() / drop                    │ heartbeat: open()
//!    │                       ▼                                   ▼
//!    └──────────────────── Disposed                     (retried every interval)
//! ```
//!
//! Callers never wait for a reconnect: once the channel is Closed every
//! send/receive fails fast with a connection error until the keep-alive
//! supervisor manages to reopen it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{DEFAULT_MAX_FRAME_SIZE, MessageCodec};
use crate::error::{AppError, ErrorKind, PresenterError};
use crate::message::{PartialMessageWithTlvs, WireMessage};
use crate::network::{
    Connection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, TcpTransportFactory,
    TransportFactory,
};

mod supervisor;

/// Default keep-alive period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1500);

// ── InitChannelHandler ───────────────────────────────────────────

/// Supplies the handshake request and judges the handshake response.
pub trait InitChannelHandler<M>: Send + Sync {
    /// Build the init request, or `None` if one cannot be produced.
    fn create_init_request(&self) -> Option<M>;

    /// Accept or reject the server's answer to the init request.
    fn check_init_response(&self, response: &M) -> bool;

    /// Why the last response was rejected.
    fn error_detail(&self) -> Option<AppError> {
        None
    }
}

// ── ChannelConfig ────────────────────────────────────────────────

/// Channel tuning. Fixed once the channel is built.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Period of the keep-alive supervisor.
    pub heartbeat_interval: Duration,
    /// Largest frame body accepted on receive.
    pub max_frame_size: usize,
    /// Deadline for reading a frame header (and its body).
    pub receive_timeout: Duration,
    /// Deadline for the TCP connect when the default factory is used.
    pub connect_timeout: Duration,
    /// Heartbeat cycles the supervisor sits out after a rejected
    /// handshake. Zero retries on the very next cycle.
    pub rejected_handshake_backoff: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rejected_handshake_backoff: 0,
        }
    }
}

// ── ChannelBuilder ───────────────────────────────────────────────

/// Binds endpoint, handshake and transport; performs no I/O.
pub struct ChannelBuilder<M> {
    host: String,
    port: u16,
    description: Option<String>,
    config: ChannelConfig,
    factory: Option<Arc<dyn TransportFactory>>,
    handler: Option<Arc<dyn InitChannelHandler<M>>>,
}

impl<M: WireMessage> ChannelBuilder<M> {
    /// Human-readable label used in logs.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default TCP transport factory.
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn InitChannelHandler<M>>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Channel<M> {
        let description = self
            .description
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port));
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(TcpTransportFactory::new(self.config.connect_timeout)));

        Channel {
            inner: Arc::new(ChannelInner {
                codec: MessageCodec::with_max_frame_size(self.config.max_frame_size),
                host: self.host,
                port: self.port,
                description,
                config: self.config,
                factory,
                handler: self.handler,
                connection: ArcSwapOption::empty(),
                open: AtomicBool::new(false),
                open_lock: Mutex::new(()),
                shutdown: CancellationToken::new(),
                supervisor: Mutex::new(None),
            }),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// A logical connection to one presenter endpoint.
///
/// Dropping the channel stops its supervisor; [`Channel::close`] also
/// waits for the supervisor to finish.
pub struct Channel<M: WireMessage> {
    inner: Arc<ChannelInner<M>>,
}

struct ChannelInner<M: WireMessage> {
    host: String,
    port: u16,
    description: String,
    config: ChannelConfig,
    codec: MessageCodec<M>,
    factory: Arc<dyn TransportFactory>,
    handler: Option<Arc<dyn InitChannelHandler<M>>>,
    /// Replaced wholesale on every open; in-flight I/O keeps its own `Arc`.
    connection: ArcSwapOption<Connection<M>>,
    /// The usable flag.
    open: AtomicBool,
    open_lock: Mutex<()>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<M: WireMessage> Channel<M> {
    pub fn builder(host: impl Into<String>, port: u16) -> ChannelBuilder<M> {
        ChannelBuilder {
            host: host.into(),
            port,
            description: None,
            config: ChannelConfig::default(),
            factory: None,
            handler: None,
        }
    }

    /// Build a TCP channel with default settings and open it.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        handler: Option<Arc<dyn InitChannelHandler<M>>>,
    ) -> Result<Self, PresenterError> {
        let mut builder = Self::builder(host, port);
        if let Some(handler) = handler {
            builder = builder.with_handler(handler);
        }
        let channel = builder.build();
        channel.open().await?;
        Ok(channel)
    }

    /// Connect, run the handshake and mark the channel usable.
    ///
    /// Starts the keep-alive supervisor on first success.
    pub async fn open(&self) -> Result<(), PresenterError> {
        self.inner.open_connection().await?;
        self.inner.ensure_supervisor().await;
        Ok(())
    }

    /// Whether the current connection may be used without reopening.
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn handler(&self) -> Option<&Arc<dyn InitChannelHandler<M>>> {
        self.inner.handler.as_ref()
    }

    pub async fn send(&self, message: &M) -> Result<(), PresenterError> {
        debug!(channel = %self.inner.description, message = message.name(), "to send message");
        self.inner.send(&PartialMessageWithTlvs::new(message)).await
    }

    pub async fn send_with_tlvs(
        &self,
        message: &PartialMessageWithTlvs<'_, M>,
    ) -> Result<(), PresenterError> {
        debug!(
            channel = %self.inner.description,
            message = message.message().name(),
            tlvs = message.tlvs().len(),
            tlv_bytes = message.tlv_payload_len(),
            "to send message"
        );
        self.inner.send(message).await
    }

    /// Send, then receive one response if the send succeeded.
    pub async fn send_and_wait(&self, message: &M) -> Result<M, PresenterError> {
        self.send(message).await?;
        self.receive().await
    }

    pub async fn send_with_tlvs_and_wait(
        &self,
        message: &PartialMessageWithTlvs<'_, M>,
    ) -> Result<M, PresenterError> {
        self.send_with_tlvs(message).await?;
        self.receive().await
    }

    pub async fn receive(&self) -> Result<M, PresenterError> {
        debug!(channel = %self.inner.description, "to receive message");
        self.inner.receive().await
    }

    /// Stop the supervisor, wait for it to exit, then drop the connection.
    pub async fn close(self) {
        info!(channel = %self.inner.description, "closing channel");
        self.inner.shutdown.cancel();

        let handle = self.inner.supervisor.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(channel = %self.inner.description, error = %e, "heartbeat task failed");
            }
        }

        self.inner.open.store(false, Ordering::SeqCst);
        self.inner.connection.store(None);
    }
}

impl<M: WireMessage> Drop for Channel<M> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl<M: WireMessage> ChannelInner<M> {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open_connection(&self) -> Result<(), PresenterError> {
        if self.shutdown.is_cancelled() {
            return Err(PresenterError::ChannelNotOpen);
        }
        let _guard = self.open_lock.lock().await;

        // Check request generation before connecting.
        let init = match &self.handler {
            Some(handler) => match handler.create_init_request() {
                Some(request) => Some((handler, request)),
                None => {
                    error!(channel = %self.description, "failed to create init request");
                    return Err(AppError::InitRequestUnavailable.into());
                }
            },
            None => None,
        };

        let transport = self
            .factory
            .connect(&self.host, self.port)
            .await
            .map_err(|e| {
                error!(channel = %self.description, error = %e, "failed to create transport");
                e
            })?;
        if self.shutdown.is_cancelled() {
            debug!(channel = %self.description, "disposed while connecting");
            return Err(PresenterError::ChannelNotOpen);
        }

        let connection = Arc::new(Connection::new(
            transport,
            self.codec.clone(),
            self.config.receive_timeout,
        ));
        self.open.store(false, Ordering::SeqCst);
        self.connection.store(Some(Arc::clone(&connection)));

        if let Some((handler, request)) = init {
            if let Err(e) = self.handshake(&connection, handler.as_ref(), &request).await {
                self.connection.store(None);
                return Err(e);
            }
        }
        if self.shutdown.is_cancelled() {
            debug!(channel = %self.description, "disposed during handshake");
            self.connection.store(None);
            return Err(PresenterError::ChannelNotOpen);
        }

        self.open.store(true, Ordering::SeqCst);
        info!(channel = %self.description, "channel opened");
        Ok(())
    }

    async fn handshake(
        &self,
        connection: &Connection<M>,
        handler: &dyn InitChannelHandler<M>,
        request: &M,
    ) -> Result<(), PresenterError> {
        guarded(connection.send(request)).await.map_err(|e| {
            error!(channel = %self.description, error = %e, "failed to send init request");
            e
        })?;

        let response = guarded(connection.receive_message()).await.map_err(|e| {
            error!(channel = %self.description, error = %e, "failed to receive init response");
            e
        })?;

        if !handler.check_init_response(&response) {
            let detail = handler.error_detail().unwrap_or(AppError::InitRejected);
            error!(channel = %self.description, %detail, "init response rejected");
            return Err(detail.into());
        }
        Ok(())
    }

    async fn ensure_supervisor(self: &Arc<Self>) {
        let mut slot = self.supervisor.lock().await;
        if slot.is_none() && !self.shutdown.is_cancelled() {
            *slot = Some(tokio::spawn(supervisor::keep_alive(Arc::clone(self))));
        }
    }

    fn usable_connection(&self) -> Result<Arc<Connection<M>>, PresenterError> {
        if !self.is_open() {
            debug!(channel = %self.description, "channel is not open");
            return Err(PresenterError::ChannelNotOpen);
        }
        self.connection
            .load_full()
            .ok_or(PresenterError::ChannelNotOpen)
    }

    /// Clear the usable flag, unless `connection` has already been
    /// replaced by a newer one.
    fn mark_broken(&self, connection: &Arc<Connection<M>>, cause: &PresenterError) {
        let current = self.connection.load_full();
        let is_current = current.is_some_and(|c| Arc::ptr_eq(&c, connection));
        if is_current && self.open.swap(false, Ordering::SeqCst) {
            warn!(channel = %self.description, error = %cause, "channel closed after I/O failure");
        }
    }

    async fn send(&self, message: &PartialMessageWithTlvs<'_, M>) -> Result<(), PresenterError> {
        let connection = self.usable_connection()?;
        let result = guarded(connection.send_message(message)).await;
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Connection {
                self.mark_broken(&connection, e);
            }
        }
        result
    }

    async fn receive(&self) -> Result<M, PresenterError> {
        let connection = self.usable_connection()?;
        let result = guarded(connection.receive_message()).await;
        if let Err(e) = &result {
            if matches!(e.kind(), ErrorKind::Connection | ErrorKind::Codec) {
                self.mark_broken(&connection, e);
            }
        }
        result
    }
}

/// Run `operation`, turning a panic from the serialization layer into a
/// connection error.
async fn guarded<T, F>(operation: F) -> Result<T, PresenterError>
where
    F: Future<Output = Result<T, PresenterError>>,
{
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(%reason, "serialization layer panicked");
            Err(PresenterError::SerializerPanic(reason))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
