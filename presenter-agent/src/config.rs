//! Configuration for the presenter agent.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use presenter_core::{ChannelConfig, ContentType, OpenChannelParam};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Presenter server endpoint.
    pub server: ServerConfig,
    /// Channel identity and keep-alive tuning.
    pub channel: ChannelSettings,
    /// Frame streaming settings.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Presenter server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// TCP connect deadline in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Channel identity and keep-alive tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Server-side channel to attach to.
    pub name: String,
    pub content_type: ContentType,
    /// Keep-alive period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Response read deadline in milliseconds.
    pub receive_timeout_ms: u64,
    /// Largest accepted response frame, in megabytes.
    pub max_frame_size_mb: usize,
    /// Heartbeat cycles to sit out after the server refuses the channel.
    pub rejected_handshake_backoff: u32,
}

/// Frame streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames presented per second.
    pub fps: u8,
    /// Width reported for every frame.
    pub width: u32,
    /// Height reported for every frame.
    pub height: u32,
    /// Start over after the last file.
    pub loop_images: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7006,
            connect_timeout_ms: 3000,
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            name: "image".into(),
            content_type: ContentType::Image,
            heartbeat_interval_ms: 1500,
            receive_timeout_ms: 5000,
            max_frame_size_mb: 10,
            rejected_handshake_backoff: 0,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: 5,
            width: 1280,
            height: 720,
            loop_images: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Channel tuning with out-of-range values pulled back into bounds.
    pub fn to_channel_config(&self) -> ChannelConfig {
        let ch = &self.channel;
        ChannelConfig {
            heartbeat_interval: Duration::from_millis(ch.heartbeat_interval_ms.clamp(100, 60_000)),
            max_frame_size: ch.max_frame_size_mb.clamp(1, 64) * 1024 * 1024,
            receive_timeout: Duration::from_millis(ch.receive_timeout_ms.clamp(100, 60_000)),
            connect_timeout: Duration::from_millis(
                self.server.connect_timeout_ms.clamp(100, 60_000),
            ),
            rejected_handshake_backoff: ch.rejected_handshake_backoff.min(100),
        }
    }

    pub fn to_open_param(&self) -> OpenChannelParam {
        OpenChannelParam {
            host_ip: self.server.host.clone(),
            port: self.server.port,
            channel_name: self.channel.name.clone(),
            content_type: self.channel.content_type,
        }
    }

    /// Delay between two presented frames.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / u32::from(self.stream.fps.clamp(1, 60))
    }
}

// ── Tests ────────────────────────────────────────────────────────
