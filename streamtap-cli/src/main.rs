//! ## streamtap-cli
//! **Operational entrypoint**
//!
//! Captures TCP traffic from an interface, a ring buffer or a pcap file,
//! reassembles every connection and publishes one summary event per
//! connection.

use clap::Parser;
use streamtap_telemetry::logging::EventLogger;

mod commands;
mod summary;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    EventLogger::init(&config.telemetry.log_level);
    commands::run(config, &cli.filter).await
}
