//! Presenter agent entry point.
//!
//! ```text
//! presenter-agent a.jpg b.jpg          Stream files to the configured channel
//! presenter-agent --channel video ...  Override the channel name
//! presenter-agent --config <path>      Load a custom config TOML
//! presenter-agent --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use presenter_agent::config::AgentConfig;
use presenter_agent::service::AgentService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "presenter-agent", about = "Stream JPEG frames to a presenter server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "presenter-agent.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Channel name, overriding the config file.
    #[arg(long)]
    channel: Option<String>,

    /// JPEG files to present, in order.
    images: Vec<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&AgentConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = AgentConfig::load(&cli.config);
    if let Some(channel) = cli.channel {
        config.channel.name = channel;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("presenter-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}:{}", config.server.host, config.server.port);
    info!("channel: {} ({:?})", config.channel.name, config.channel.content_type);
    info!("images: {}, fps: {}", cli.images.len(), config.stream.fps);

    let service = AgentService::new(config, cli.images);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await?;

    Ok(())
}
