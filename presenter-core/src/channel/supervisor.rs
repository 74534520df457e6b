//! Keep-alive supervisor.
//!
//! One task per channel. Every cycle it reopens the channel if the usable
//! flag is down, then pushes a heartbeat through the normal send path,
//! then waits for the next interval or for disposal.

use std::sync::Arc;

use tracing::{debug, info};

use super::ChannelInner;
use crate::error::ErrorKind;
use crate::message::{PartialMessageWithTlvs, WireMessage};

pub(super) async fn keep_alive<M: WireMessage>(channel: Arc<ChannelInner<M>>) {
    let interval = channel.config.heartbeat_interval;
    let heartbeat = M::heartbeat();
    let mut skip_cycles = 0u32;
    info!(channel = %channel.description, ?interval, "heartbeat task started");

    while !channel.shutdown.is_cancelled() {
        if skip_cycles > 0 {
            skip_cycles -= 1;
            debug!(channel = %channel.description, skip_cycles, "reopen deferred");
        } else {
            skip_cycles = heartbeat_cycle(&channel, &heartbeat).await;
        }

        tokio::select! {
            _ = channel.shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(channel = %channel.description, "heartbeat task ended");
}

/// One supervisor cycle. Returns how many following cycles to skip.
pub(super) async fn heartbeat_cycle<M: WireMessage>(channel: &ChannelInner<M>, heartbeat: &M) -> u32 {
    if !channel.is_open() {
        match channel.open_connection().await {
            Ok(()) => info!(channel = %channel.description, "channel reopened"),
            Err(e) if e.kind() == ErrorKind::AppDefined => {
                debug!(channel = %channel.description, error = %e, "reopen rejected");
                return channel.config.rejected_handshake_backoff;
            }
            Err(e) => {
                debug!(channel = %channel.description, error = %e, "reopen failed");
                return 0;
            }
        }
    }

    if let Err(e) = channel.send(&PartialMessageWithTlvs::new(heartbeat)).await {
        debug!(channel = %channel.description, error = %e, "heartbeat not sent");
    }
    0
}
