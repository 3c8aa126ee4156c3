//! bleshark entry point.
//!
//! ```text
//! bleshark                       Stream stdin feed into the capture pipe
//! bleshark --config <path>       Load a custom config TOML
//! bleshark --gen-config          Write default config to stdout
//! bleshark --print-path          Print the resolved pipe path and exit
//! ```
//!
//! Then point Wireshark at the printed path, e.g.
//! `wireshark -k -i logs/ble.pipe`.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bleshark::config::HostConfig;
use bleshark::service::CaptureService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bleshark", about = "Stream sniffed BLE packets to Wireshark")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "bleshark.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Print the resolved capture pipe path and exit.
    #[arg(long)]
    print_path: bool,

    /// Override the pipe name (e.g. `ble.pipe`).
    #[arg(long)]
    pipe_name: Option<String>,

    /// Override the directory holding the FIFO.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Seconds to wait for Wireshark to attach.
    #[arg(short, long)]
    timeout: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut HostConfig) {
        if let Some(name) = &self.pipe_name {
            config.stream.pipe_name = name.clone();
        }
        if let Some(dir) = &self.base_dir {
            config.stream.base_dir = dir.clone();
        }
        if let Some(secs) = self.timeout {
            config.stream.connect_timeout_ms = secs.saturating_mul(1000);
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = HostConfig::load(&cli.config);
    cli.apply(&mut config);

    // --print-path: for launchers that start Wireshark themselves.
    if cli.print_path {
        println!("{}", config.stream.pipe_path().display());
        return Ok(());
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("bleshark v{}", env!("CARGO_PKG_VERSION"));
    info!("link type: {}", u32::from(config.stream.link_type));

    let service = CaptureService::new(config);
    let input = BufReader::new(tokio::io::stdin());
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
    };

    let stats = service.run(input, shutdown).await?;
    info!(
        "done: {} packets written, {} dropped, {} bytes",
        stats.packets_written, stats.packets_dropped, stats.bytes_written
    );

    Ok(())
}
