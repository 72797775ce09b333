//! Relink - resilient framed TCP client
//!
//! Command-line front end for exercising connections against a backend.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relink::config::{self, Config};
use relink::network::{ConnectionRegistry, NetEvent};
use relink::protocol::{self, Packet};

/// Relink - resilient framed TCP client
#[derive(Parser)]
#[command(name = "relink")]
#[command(author = "Relink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Maintain framed TCP connections with automatic reconnect", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a server and print inbound frames
    Connect {
        /// Server host name or address
        #[arg(long)]
        host: String,

        /// Server port
        #[arg(short, long)]
        port: u16,

        /// Channel id for the connection slot
        #[arg(long, default_value_t = 0)]
        channel: i32,

        /// Reconnect automatically when the link drops
        #[arg(long)]
        retry: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Connect {
            host,
            port,
            channel,
            retry,
        } => {
            run_connect(config, host, port, channel, retry).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Keep one registry connection alive and print everything it reports.
///
/// Reconnection on error is a policy of this front end, not a guarantee
/// of the connection itself; the `--retry` flag controls it.
async fn run_connect(
    config: Config,
    host: String,
    port: u16,
    channel: i32,
    retry: bool,
) -> anyhow::Result<()> {
    tracing::info!("connecting to {}:{} on channel {}", host, port, channel);

    let registry = ConnectionRegistry::new(config.network.clone());
    let conn = registry.connect_to(channel, host, port).await;
    let mut events = conn
        .take_event_receiver()
        .await
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                match event {
                    NetEvent::Connected => {
                        println!("+ connected to {}:{}", conn.host(), conn.port());
                    }
                    NetEvent::Reconnected => {
                        println!("+ reconnected to {}:{}", conn.host(), conn.port());
                    }
                    NetEvent::Disconnected => {
                        println!("- disconnected");
                        break;
                    }
                    NetEvent::Message { id, body } => {
                        println!("msg {}: {} bytes", id, body.len());
                    }
                    NetEvent::Error { message } => {
                        tracing::error!("connection error: {}", message);
                        if retry {
                            conn.reconnect().await;
                        } else {
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                registry.disconnect_all().await;
                break;
            }
        }
    }

    Ok(())
}

/// Print protocol information
fn print_protocol_info() {
    println!("Relink Protocol Information");
    println!("===========================\n");

    println!("Protocol version: {}", protocol::PROTOCOL_VERSION);
    println!("Header length: {} bytes", protocol::HEAD_LENGTH);
    println!(
        "Magic bytes: {}, {}",
        protocol::MAGIC_BYTES[0],
        protocol::MAGIC_BYTES[1]
    );
    println!(
        "Empty frame: {} bytes on the wire",
        Packet::new(0, bytes::Bytes::new()).wire_len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["relink", "info"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_connect_args() {
        let cli = Cli::try_parse_from([
            "relink", "connect", "--host", "localhost", "--port", "7001", "--retry",
        ]);
        assert!(cli.is_ok());
    }
}
