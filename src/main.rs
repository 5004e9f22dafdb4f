use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rtb2004_control::config::{DEFAULT_IP, PanelConfig};
use rtb2004_control::{LanTransport, Panel};
use tokio::io::BufReader;
use tracing::Level;

/// Console control panel for an RTB2004 oscilloscope.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// LAN address of the scope; pass an empty string to use scanned resources
    #[arg(long, default_value = DEFAULT_IP)]
    ip: String,

    /// Resource string to list on every scan (repeatable)
    #[arg(long = "resource")]
    resources: Vec<String>,

    /// Read/write timeout of the instrument session
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// How long a scan waits for VXI-11 discovery replies
    #[arg(long, default_value_t = 1000)]
    discovery_ms: u64,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> PanelConfig {
        PanelConfig {
            ip: self.ip.clone(),
            io_timeout: Duration::from_millis(self.timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            discovery_window: Duration::from_millis(self.discovery_ms),
            static_resources: self.resources.clone(),
            ..PanelConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();
    let transport = Arc::new(LanTransport::new(&config));
    let mut panel = Panel::new(&config, transport, std::io::stdout());
    panel.run(BufReader::new(tokio::io::stdin())).await
}
