//! spimirror entry point.
//!
//! ```text
//! spimirror                  Mirror the desktop (foreground)
//! spimirror --config <path>  Load a custom config TOML
//! spimirror --gen-config     Write default config to stdout
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spimirror::config::MirrorConfig;
use spimirror::service::MirrorService;
use spimirror_core::MirrorError;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "spimirror", about = "Mirror the desktop onto an SPI display")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "spimirror.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&MirrorConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then init tracing with its level before reporting
    // any problem with the file.
    let (config, problem) = MirrorConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match problem {
        Some(MirrorError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            info!("no config at {}; using defaults", cli.config.display());
        }
        Some(MirrorError::Io(e)) => {
            warn!("cannot read config {}: {e}; using defaults", cli.config.display());
        }
        Some(e) => warn!("{e}; using defaults"),
        None => info!("loaded config from {}", cli.config.display()),
    }

    info!("spimirror v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "display: {}x{} on {}",
        config.display.width, config.display.height, config.spi.device
    );
    info!("capture backend: {:?}", config.capture.backend);

    let service = MirrorService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, finishing current frame");
        stop.cancel();
    });

    service.run().await?;

    Ok(())
}
