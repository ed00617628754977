//! Headless watchroom client
//!
//! Joins a room, follows the shared playback state, and logs everything the
//! relay and call engine do. Useful for soak-testing a relay and as a
//! minimal embedding example.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchroom_client::{
    AppEvent, ClientConfig, IceServerConfig, RecordingSink, RtcConnector, RtcMediaSource,
    WatchroomClient,
};

#[derive(Parser, Debug)]
#[command(name = "watchroom", about = "Headless watchroom client", version)]
struct Args {
    /// Relay endpoint URL
    #[arg(long, env = "WATCHROOM_ENDPOINT", default_value = "ws://localhost:4000")]
    endpoint: String,

    /// Display name announced to the room
    #[arg(long, env = "WATCHROOM_NAME", default_value = "viewer")]
    name: String,

    /// STUN server URLs (replaces the defaults when given)
    #[arg(long = "stun")]
    stun_servers: Vec<String>,

    /// Video to select right after joining
    #[arg(long)]
    select: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = ClientConfig {
        endpoint: args.endpoint,
        display_name: args.name,
        ..ClientConfig::default()
    };
    if !args.stun_servers.is_empty() {
        config.ice_servers = args
            .stun_servers
            .iter()
            .map(|url| IceServerConfig::stun(url.as_str()))
            .collect();
    }

    let connector = Arc::new(RtcConnector::new(&config)?);
    let (client, mut events) = WatchroomClient::connect(
        config,
        Arc::new(RecordingSink::new()),
        connector,
        Arc::new(RtcMediaSource::new()),
    )
    .await?;

    let handle = client.handle();
    let runner = tokio::spawn(client.run());

    if let Some(filename) = args.select {
        handle.select_video(filename)?;
    }
    handle.request_videos()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                handle.shutdown()?;
                break;
            }
            maybe_event = events.recv() => {
                match maybe_event {
                    Some(AppEvent::Status(status)) => info!(?status, "relay status"),
                    Some(event) => info!(?event, "room event"),
                    None => break,
                }
            }
        }
    }

    runner.await??;
    Ok(())
}
