//! WebSocket relay connection with bounded-backoff reconnect

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::{Error, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use watchroom_protocol::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Observable connection status of the relay channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Initial connection in progress
    Connecting,
    /// Connected and announced to the relay
    Connected,
    /// Transient drop; reconnect attempts in progress
    Reconnecting,
    /// Reconnect attempts exhausted; terminal
    Unreachable,
    /// Closed locally or rejected by the relay; terminal
    Closed,
}

impl ChannelStatus {
    /// Whether no further traffic will flow on this channel
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelStatus::Unreachable | ChannelStatus::Closed)
    }
}

/// Local participant identity, created per successful handshake
///
/// A reconnect mints a fresh `connection_id`: the remote side may have
/// observed our departure, so state keyed to the old identity is invalid.
#[derive(Debug, Clone)]
pub struct Session {
    /// Identity used as `lastUpdatedBy` and as our signaling peer id
    pub connection_id: String,

    /// Display name announced on join
    pub display_name: String,

    /// When this identity was announced
    pub joined_at: SystemTime,
}

impl Session {
    fn announce(display_name: &str) -> Self {
        Self {
            connection_id: format!("peer-{}", uuid::Uuid::new_v4()),
            display_name: display_name.to_string(),
            joined_at: SystemTime::now(),
        }
    }
}

/// Cloneable handle for queueing outbound events on the channel
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelSender {
    /// Queue an event for delivery to the relay
    ///
    /// Events queued while the channel is reconnecting are delivered after
    /// the re-join announcement on the new connection.
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|e| Error::ChannelError(format!("channel task gone: {}", e)))
    }

    /// Loopback sender that is not backed by a live relay connection
    ///
    /// Everything queued is handed to the returned receiver instead; used by
    /// tests and embeddings that capture outbound traffic themselves.
    pub fn detached() -> (ChannelSender, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSender { tx }, rx)
    }
}

/// Typed relay channel over a WebSocket connection
///
/// Inbound events are delivered through a single receiver in strict arrival
/// order. Connection status transitions are published on a watch channel for
/// dependents (the call engine invalidates sessions on `Reconnecting`).
pub struct SignalingChannel {
    sender: ChannelSender,
    status_rx: watch::Receiver<ChannelStatus>,
    session: Arc<RwLock<Option<Session>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalingChannel {
    /// Connect to the relay and announce presence
    ///
    /// Retries with bounded exponential backoff per `config.reconnect`;
    /// returns [`Error::Unreachable`] once attempts are exhausted. On
    /// success, returns the channel plus the single ordered inbound event
    /// receiver.
    pub async fn connect(
        config: &ClientConfig,
    ) -> Result<(SignalingChannel, mpsc::UnboundedReceiver<ServerEvent>)> {
        config.validate()?;

        info!("Connecting to relay: {}", config.endpoint);
        let ws = dial_with_retry(config, false).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = Arc::new(RwLock::new(None));

        tokio::spawn(supervise(
            config.clone(),
            ws,
            outbound_rx,
            inbound_tx,
            status_tx,
            session.clone(),
            shutdown_rx,
        ));

        Ok((
            SignalingChannel {
                sender: ChannelSender { tx: outbound_tx },
                status_rx,
                session,
                shutdown_tx,
            },
            inbound_rx,
        ))
    }

    /// Queue an event for delivery to the relay
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.sender.send(event)
    }

    /// Cloneable outbound handle for other components
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    /// Watch receiver for connection status transitions
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Current local session identity, if announced
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Close the channel; terminal
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Backoff delay before retry `attempt` (0-based), without jitter
fn base_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let exp = policy
        .initial_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    exp.min(policy.max_delay)
}

/// Backoff delay with up to 25% additive jitter
fn jittered_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let base = base_delay(policy, attempt);
    let jitter_cap = (base.as_millis() as u64) / 4;
    if jitter_cap == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_cap))
}

/// One connection attempt, bounded by `connect_timeout`
async fn dial(config: &ClientConfig) -> Result<WsStream> {
    let attempt = connect_async(config.endpoint.as_str());
    match timeout(config.connect_timeout, attempt).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(Error::ChannelError(format!("connect failed: {}", e))),
        Err(_) => Err(Error::OperationTimeout(format!(
            "connect to {} exceeded {:?}",
            config.endpoint, config.connect_timeout
        ))),
    }
}

/// Dial with the configured backoff schedule
///
/// `delay_first` distinguishes reconnects (the old connection just dropped,
/// so wait before the first attempt) from initial connects.
async fn dial_with_retry(config: &ClientConfig, delay_first: bool) -> Result<WsStream> {
    let policy = &config.reconnect;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 || delay_first {
            let delay = jittered_delay(policy, attempt.saturating_sub(1));
            debug!("Retrying relay connection in {:?}", delay);
            sleep(delay).await;
        }

        match dial(config).await {
            Ok(ws) => return Ok(ws),
            Err(e) => warn!(
                "Relay connection attempt {}/{} failed: {}",
                attempt + 1,
                policy.max_attempts,
                e
            ),
        }
    }

    Err(Error::Unreachable(format!(
        "gave up on {} after {} attempts",
        config.endpoint, policy.max_attempts
    )))
}

enum PumpExit {
    /// Local close request or all senders dropped
    Shutdown,
    /// Relay rejected us (`server-full`); do not retry
    Rejected,
    /// Transport dropped; eligible for reconnect
    Dropped,
}

async fn supervise(
    config: ClientConfig,
    mut ws: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    inbound_tx: mpsc::UnboundedSender<ServerEvent>,
    status_tx: watch::Sender<ChannelStatus>,
    session: Arc<RwLock<Option<Session>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let (mut write, mut read) = ws.split();

        // Re-announce before any queued traffic flows on this connection.
        match announce(&mut write, &config, &session).await {
            Ok(()) => {
                let _ = status_tx.send(ChannelStatus::Connected);
            }
            Err(e) => {
                warn!("Failed to announce on new connection: {}", e);
                *session.write().await = None;
                let _ = status_tx.send(ChannelStatus::Reconnecting);
                match dial_with_retry(&config, true).await {
                    Ok(new_ws) => {
                        ws = new_ws;
                        continue;
                    }
                    Err(e) => {
                        warn!("Relay unreachable: {}", e);
                        let _ = status_tx.send(ChannelStatus::Unreachable);
                        return;
                    }
                }
            }
        }

        let exit = pump(
            &mut write,
            &mut read,
            &mut outbound_rx,
            &inbound_tx,
            &mut shutdown_rx,
        )
        .await;

        *session.write().await = None;

        match exit {
            PumpExit::Shutdown => {
                let _ = write.send(Message::Close(None)).await;
                info!("Relay channel closed");
                let _ = status_tx.send(ChannelStatus::Closed);
                return;
            }
            PumpExit::Rejected => {
                warn!("Relay rejected the connection (room full)");
                let _ = status_tx.send(ChannelStatus::Closed);
                return;
            }
            PumpExit::Dropped => {
                info!("Relay connection dropped; reconnecting");
                let _ = status_tx.send(ChannelStatus::Reconnecting);
                match dial_with_retry(&config, true).await {
                    Ok(new_ws) => ws = new_ws,
                    Err(e) => {
                        warn!("Relay unreachable: {}", e);
                        let _ = status_tx.send(ChannelStatus::Unreachable);
                        return;
                    }
                }
            }
        }
    }
}

/// Mint a fresh session identity and announce it to the relay
async fn announce(
    write: &mut WsWrite,
    config: &ClientConfig,
    session: &Arc<RwLock<Option<Session>>>,
) -> Result<()> {
    let fresh = Session::announce(&config.display_name);
    debug!("Announcing as {}", fresh.connection_id);

    let join = ClientEvent::UserJoin {
        name: fresh.display_name.clone(),
        id: fresh.connection_id.clone(),
    };
    let json = join
        .to_json()
        .map_err(|e| Error::SerializationError(e.to_string()))?;
    write
        .send(Message::Text(json))
        .await
        .map_err(|e| Error::ChannelError(format!("join send failed: {}", e)))?;

    *session.write().await = Some(fresh);
    Ok(())
}

/// Forward traffic in both directions until the connection ends
async fn pump(
    write: &mut WsWrite,
    read: &mut WsRead,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    inbound_tx: &mpsc::UnboundedSender<ServerEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                return PumpExit::Shutdown;
            }

            maybe_event = outbound_rx.recv() => {
                let Some(event) = maybe_event else {
                    return PumpExit::Shutdown;
                };
                let json = match event.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Dropping unencodable outbound event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    warn!("Outbound send failed: {}", e);
                    return PumpExit::Dropped;
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match ServerEvent::from_json(&text) {
                            Ok(ServerEvent::ServerFull) => {
                                let _ = inbound_tx.send(ServerEvent::ServerFull);
                                return PumpExit::Rejected;
                            }
                            Ok(event) => {
                                if inbound_tx.send(event).is_err() {
                                    return PumpExit::Shutdown;
                                }
                            }
                            Err(e) => {
                                // Unknown or malformed events are dropped, never fatal.
                                debug!("Ignoring undecodable frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return PumpExit::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Relay read error: {}", e);
                        return PumpExit::Dropped;
                    }
                }
            }
        }
    }
}
