//! Proxima CLI
//!
//! Discover nearby peers and chat with one of them over the LAN radio.

mod chat;
mod config;

use clap::{Parser, Subcommand};
use console::style;
use proxima_core::{ConnectionMode, ConnectionRequest, LinkError, Session, SessionEvent};
use proxima_transport::TcpRadio;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use chat::ChatEnd;
use config::Config;

/// Proxima - nearby peer discovery and text messaging
#[derive(Parser)]
#[command(name = "proxima")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the advertised display name
    #[arg(short, long)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List peers from the discovery table that answer
    Discover,

    /// Become discoverable and chat with whoever connects
    Advertise {
        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Connect to a discovered peer by display name and chat
    Connect {
        /// Display name of the peer
        #[arg(required = true)]
        name: String,

        /// Connect by host address instead of through the peer handshake
        #[arg(long)]
        device: bool,

        /// First message to send once connected
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show adapter state and configuration
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = if cli.config.is_some() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default(&config_path)?
    };
    if let Some(name) = cli.name {
        config.node.display_name = name;
    }
    if let Commands::Advertise { bind: Some(bind) } = &cli.command {
        config.network.listen_addr = bind.clone();
    }

    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let radio = TcpRadio::new(config.radio_config()?)?;
    let session = Session::with_config(Arc::new(radio), config.session_config())?;

    match cli.command {
        Commands::Discover => discover(&session).await?,
        Commands::Advertise { .. } => advertise(&session, &config).await?,
        Commands::Connect {
            name,
            device,
            message,
        } => connect(&session, name, device, message).await?,
        Commands::Status => show_status(&session, &config, &config_path).await,
    }

    Ok(())
}

/// Run discovery and print the result
async fn discover(session: &Session) -> anyhow::Result<()> {
    match session.discover().await {
        Ok(peers) => {
            println!("{:<24} {}", style("NAME").bold(), style("ADDRESS").bold());
            for peer in peers {
                println!("{:<24} {}", peer.display_name, peer.host_address);
            }
            Ok(())
        }
        Err(LinkError::NoDevicesFound) => {
            println!("{}", style("No devices were found").yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Advertise and chat with each inbound peer in turn
async fn advertise(session: &Session, config: &Config) -> anyhow::Result<()> {
    let mut events = session.subscribe();
    session.start_advertising().await?;

    println!(
        "Advertising as {} on {}",
        style(session.display_name()).bold(),
        config.network.listen_addr
    );
    println!("Press Ctrl+C to stop");

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => break,
        };

        match event {
            Ok(SessionEvent::InboundConnected { peer }) => {
                tracing::info!("Inbound connection from {}", peer.display_name);
                let end = chat::run(session, BufReader::new(tokio::io::stdin())).await?;

                // Keep advertising for the next peer
                session.disconnect(true).await?;
                if end == ChatEnd::Interrupted {
                    break;
                }
                println!("Waiting for the next peer...");
            }
            Ok(SessionEvent::InboundFailed { peer, error }) => {
                println!(
                    "{} {}: {}",
                    style("Inbound request failed from").red(),
                    peer.display_name,
                    error
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} session events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    println!("\nShutting down...");
    session.close().await?;
    Ok(())
}

/// Connect to `name` and chat until either side leaves
async fn connect(
    session: &Session,
    name: String,
    device: bool,
    message: Option<String>,
) -> anyhow::Result<()> {
    session.discover().await?;

    let mode = if device {
        ConnectionMode::PhoneToDevice
    } else {
        ConnectionMode::PhoneToPhone
    };
    let mut request = ConnectionRequest::new(name).with_mode(mode);
    if let Some(message) = message {
        request = request.with_payload(message);
    }

    session.connect(request).await?;
    chat::run(session, BufReader::new(tokio::io::stdin())).await?;
    session.disconnect(false).await?;

    let stats = session.stats();
    println!(
        "Sent {} message(s), received {}",
        stats.messages_sent, stats.messages_received
    );
    Ok(())
}

/// Show adapter state and configuration
async fn show_status(session: &Session, config: &Config, config_path: &std::path::Path) {
    println!("Proxima Status");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Adapter: {}", session.adapter_state().await);
    println!("State: {}", session.state().await);
    println!();

    println!("Configuration ({}):", config_path.display());
    println!("  Display name: {}", config.node.display_name);
    println!("  Listen: {}", config.network.listen_addr);
    println!("  Max message size: {} bytes", config.session.max_message_size);
    println!("  Connect timeout: {}s", config.session.connect_timeout_secs);
    println!();

    println!("Discovery table:");
    if config.peers.is_empty() {
        println!("  (empty)");
    }
    for peer in &config.peers {
        println!("  {:<24} {}", peer.name, peer.addr);
    }
}
