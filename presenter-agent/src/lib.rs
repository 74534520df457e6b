//! # presenter-agent
//!
//! Opens a presenter channel and streams JPEG files through it at a fixed
//! frame rate. The channel reconnects on its own, so a server restart
//! only costs the frames presented while it was down.
//!
//! ## Modes
//!
//! - **Stream**: present the given image files, once or in a loop.
//! - **Idle**: with no files, hold the channel open on heartbeats alone.

pub mod config;
pub mod service;
