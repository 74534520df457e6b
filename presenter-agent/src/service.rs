//! Agent service core logic.
//!
//! Opens the presenter channel, then presents image files one per frame
//! period until stopped. Presentation failures are logged and skipped;
//! the channel's supervisor takes care of reconnecting.

use std::path::{Path, PathBuf};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use presenter_core::{Channel, ImageFrame, PresenterMessage, open_channel, present_image};

use crate::config::AgentConfig;

// ── Playlist ─────────────────────────────────────────────────────

/// Cycles through the image files, once or forever.
#[derive(Debug)]
pub struct Playlist {
    files: Vec<PathBuf>,
    next: usize,
    repeat: bool,
}

impl Playlist {
    pub fn new(files: Vec<PathBuf>, repeat: bool) -> Self {
        Self {
            files,
            next: 0,
            repeat,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The next file to present, or `None` once a non-repeating list is
    /// exhausted.
    pub fn next_file(&mut self) -> Option<&Path> {
        if self.files.is_empty() {
            return None;
        }
        if self.next == self.files.len() {
            if !self.repeat {
                return None;
            }
            self.next = 0;
        }
        let file = &self.files[self.next];
        self.next += 1;
        Some(file)
    }
}

// ── AgentService ─────────────────────────────────────────────────

pub struct AgentService {
    config: AgentConfig,
    images: Vec<PathBuf>,
    shutdown: CancellationToken,
}

impl AgentService {
    pub fn new(config: AgentConfig, images: Vec<PathBuf>) -> Self {
        Self {
            config,
            images,
            shutdown: CancellationToken::new(),
        }
    }

    /// Obtain a handle that stops the service from another task when
    /// cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the service until stopped or the playlist runs out.
    ///
    /// Only the initial open is fatal; after that the channel is closed
    /// cleanly however the loop ends.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let param = self.config.to_open_param();
        let channel = open_channel(&param, self.config.to_channel_config()).await?;

        let mut playlist = Playlist::new(self.images.clone(), self.config.stream.loop_images);
        if playlist.is_empty() {
            info!("no images given; holding channel open");
        }

        let mut ticker = tokio::time::interval(self.config.frame_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut presented = 0u64;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if playlist.is_empty() {
                continue;
            }
            let Some(file) = playlist.next_file() else {
                info!("all images presented");
                break;
            };
            if self.present_file(&channel, file).await {
                presented += 1;
            }
        }

        channel.close().await;
        info!(presented, "presenter agent stopped");
        Ok(())
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn present_file(&self, channel: &Channel<PresenterMessage>, file: &Path) -> bool {
        let data = match tokio::fs::read(file).await {
            Ok(data) => data,
            Err(e) => {
                warn!("cannot read {}: {e}", file.display());
                return false;
            }
        };

        let frame = ImageFrame::jpeg(self.config.stream.width, self.config.stream.height, &data);
        match present_image(channel, &frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!("present {} failed: {e}", file.display());
                false
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
