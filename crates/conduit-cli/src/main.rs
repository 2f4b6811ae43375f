//! conduit demo CLI
//!
//! Two-role demo exercising the multiplexer end to end: `listen` registers a
//! protocol handler that reads one message and replies with three, `dial`
//! opens a stream to a listener and prints what comes back, in order.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use conduit_core::{Options, Stream, Switch};
use conduit_crypto::Keypair;
use tokio::net::TcpStream;

use config::FileConfig;

const DEMO_PROTOCOL: &str = "conduit-demo/1.0.0";

#[derive(Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,

    /// Optional TOML config file overriding the built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum simultaneous connections accepted or dialled per peer
    #[arg(long)]
    max_connections_per_peer: Option<usize>,

    /// Seconds a stream may sit idle before it is closed locally
    #[arg(long)]
    stream_idle_secs: Option<u64>,

    /// Seconds a connection may sit idle before its transport is closed
    #[arg(long)]
    connection_idle_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for inbound connections and reply to streams on the demo protocol
    Listen {
        /// Address to bind and accept connections on
        #[arg(short, long, default_value = "127.0.0.1:4433")]
        bind: String,
    },
    /// Dial a listener, open a stream, and print its replies
    Dial {
        /// Address of the listener to connect to
        #[arg(short, long)]
        address: String,

        /// Message to write on the opened stream
        #[arg(short, long, default_value = "yo yo yo yo")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    let file_config = match &cli.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let options = config::build_options(
        file_config.as_ref(),
        cli.max_connections_per_peer,
        cli.stream_idle_secs,
        cli.connection_idle_secs,
    );

    match cli.command {
        Commands::Listen { bind } => run_listen(bind, options).await,
        Commands::Dial { address, message } => run_dial(address, message, options).await,
    }
}

async fn run_listen(bind: String, options: Options) -> anyhow::Result<()> {
    let identity = Keypair::generate()?;
    let switch = Switch::new(identity, options);
    tracing::info!(peer_id = %switch.peer_id(), %bind, "starting listener");

    switch.add_protocol(DEMO_PROTOCOL, |stream: Arc<Stream<TcpStream>>| {
        Box::pin(async move {
            let Ok(payload) = stream.read().await else {
                return;
            };
            tracing::info!(protocol = stream.protocol(), payload = %String::from_utf8_lossy(&payload), "handling stream");
            for _ in 0..3 {
                if stream.write(b"what up what up".to_vec()).await.is_err() {
                    return;
                }
            }
            let _ = stream.close().await;
        })
    });

    switch.listen(bind).await?;
    Ok(())
}

async fn run_dial(address: String, message: String, options: Options) -> anyhow::Result<()> {
    let identity = Keypair::generate()?;
    let switch = Switch::new(identity, options);
    tracing::info!(peer_id = %switch.peer_id(), %address, "dialing");

    let peer_id = switch.connect(&address).await?;
    let stream = switch.open_stream(DEMO_PROTOCOL, peer_id).await?;

    stream.write(message.into_bytes()).await?;

    for _ in 0..3 {
        let reply = stream.read().await?;
        println!("{}", String::from_utf8_lossy(&reply));
    }

    stream.close().await?;
    switch.disconnect(peer_id).await;
    Ok(())
}
