//! Client facade
//!
//! Owns the channel, the reconciler, and the call engine, and runs the
//! single dispatch task that feeds them in strict arrival order. Commands
//! from the embedding application come in on a typed channel; application
//! -facing happenings go out as [`AppEvent`]s.

use crate::call::{CallEngine, CallEvent, LinkEvent, MediaSource, PeerConnector};
use crate::channel::{ChannelStatus, Session, SignalingChannel};
use crate::config::ClientConfig;
use crate::library::VideoLibrary;
use crate::playback::{MediaSink, PlaybackReconciler};
use crate::roster::{Participant, Roster};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use watchroom_protocol::{ClientEvent, ServerEvent};

/// Typed commands accepted by the dispatch task
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Local play action
    Play,
    /// Local pause action
    Pause,
    /// Local seek action
    Seek(f64),
    /// Local mute/unmute action
    SetMuted(bool),
    /// Local playback volume change, `[0, 1]`
    SetVolume(f64),
    /// Continuous playhead position tick
    NotePosition(f64),
    /// Select a video for the room
    SelectVideo(String),
    /// Ask the relay for the current video list
    RequestVideos,
    /// Invite a peer (default: the first other participant) to a call
    InviteCall(Option<String>),
    /// Start a call by sending an offer directly
    StartCall(Option<String>),
    /// Accept an incoming call invitation
    AcceptCall(String),
    /// Hang up the call with a peer
    EndCall(String),
    /// Flip the microphone intent
    ToggleMicrophone,
    /// Flip the camera intent
    ToggleCamera,
    /// Local microphone gain, 0..=100
    SetMicGain(u32),
    /// Local playback volume for one peer's stream, 0..=100
    SetRemoteVolume(String, u32),
    /// Close the channel and stop the dispatch task
    Shutdown,
}

/// Application-facing happenings
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Relay connection status changed
    Status(ChannelStatus),
    /// We announced ourselves under a (new) session identity
    Joined(Session),
    /// The participant list changed
    RosterUpdated(Vec<Participant>),
    /// The available-video list changed
    VideoListUpdated(Vec<String>),
    /// A video was selected for the room
    VideoSelected(String),
    /// A participant's upload is progressing
    UploadProgress {
        /// Fraction complete in `[0, 1]`
        progress: f64,
        /// Estimated seconds remaining
        remaining: f64,
        /// Upload speed in bytes per second
        speed: f64,
    },
    /// Call engine happening
    Call(CallEvent),
    /// The relay rejected us: the room is full
    RoomFull,
}

/// Cloneable handle for driving the client from the application
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ClientHandle {
    /// Queue a command for the dispatch task
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|e| Error::ChannelError(format!("client task gone: {}", e)))
    }

    /// Local play action
    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    /// Local pause action
    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Local seek action
    pub fn seek(&self, seconds: f64) -> Result<()> {
        self.send(Command::Seek(seconds))
    }

    /// Local mute/unmute action
    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(Command::SetMuted(muted))
    }

    /// Local playback volume change
    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.send(Command::SetVolume(volume))
    }

    /// Continuous playhead position tick
    pub fn note_position(&self, seconds: f64) -> Result<()> {
        self.send(Command::NotePosition(seconds))
    }

    /// Select a video for the room
    pub fn select_video(&self, filename: impl Into<String>) -> Result<()> {
        self.send(Command::SelectVideo(filename.into()))
    }

    /// Ask the relay for the current video list
    pub fn request_videos(&self) -> Result<()> {
        self.send(Command::RequestVideos)
    }

    /// Invite a peer to a call
    pub fn invite_call(&self, peer_id: Option<String>) -> Result<()> {
        self.send(Command::InviteCall(peer_id))
    }

    /// Start a call by sending an offer directly
    pub fn start_call(&self, peer_id: Option<String>) -> Result<()> {
        self.send(Command::StartCall(peer_id))
    }

    /// Accept an incoming call invitation
    pub fn accept_call(&self, from: impl Into<String>) -> Result<()> {
        self.send(Command::AcceptCall(from.into()))
    }

    /// Hang up the call with a peer
    pub fn end_call(&self, peer_id: impl Into<String>) -> Result<()> {
        self.send(Command::EndCall(peer_id.into()))
    }

    /// Flip the microphone intent
    pub fn toggle_microphone(&self) -> Result<()> {
        self.send(Command::ToggleMicrophone)
    }

    /// Flip the camera intent
    pub fn toggle_camera(&self) -> Result<()> {
        self.send(Command::ToggleCamera)
    }

    /// Local microphone gain, 0..=100
    pub fn set_mic_gain(&self, level: u32) -> Result<()> {
        self.send(Command::SetMicGain(level))
    }

    /// Local playback volume for one peer's stream, 0..=100
    pub fn set_remote_volume(&self, peer_id: impl Into<String>, level: u32) -> Result<()> {
        self.send(Command::SetRemoteVolume(peer_id.into(), level))
    }

    /// Close the channel and stop the dispatch task
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

/// One connected client session
///
/// Everything is owned here and passed by handle, never through globals;
/// dropping the client (after [`run`](Self::run) returns) releases the
/// channel and any call resources.
pub struct WatchroomClient {
    dispatcher: Dispatcher,
    inbound_rx: mpsc::UnboundedReceiver<ServerEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    call_events_rx: mpsc::UnboundedReceiver<CallEvent>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    commands_tx: mpsc::UnboundedSender<Command>,
}

impl WatchroomClient {
    /// Connect to the relay, announce, and assemble the client
    ///
    /// Returns once the join announcement is on the wire, so every component
    /// starts with a session identity. The second element receives
    /// [`AppEvent`]s for the application to render.
    pub async fn connect(
        config: ClientConfig,
        sink: Arc<dyn MediaSink>,
        connector: Arc<dyn PeerConnector>,
        media: Arc<dyn MediaSource>,
    ) -> Result<(WatchroomClient, mpsc::UnboundedReceiver<AppEvent>)> {
        let (channel, inbound_rx) = SignalingChannel::connect(&config).await?;

        let mut status = channel.status();
        let announced = *status
            .wait_for(|s| *s == ChannelStatus::Connected || s.is_terminal())
            .await
            .map_err(|_| Error::ChannelError("channel task exited".to_string()))?;
        if announced.is_terminal() {
            return Err(Error::Unreachable(
                "relay rejected the connection".to_string(),
            ));
        }

        let session = channel
            .session()
            .await
            .ok_or_else(|| Error::ChannelError("no session after connect".to_string()))?;
        info!("Joined relay as {}", session.connection_id);

        let reconciler = PlaybackReconciler::new(
            sink,
            channel.sender(),
            session.connection_id.as_str(),
            &config,
        );

        let (mut engine, call_events_rx, link_rx) =
            CallEngine::new(connector, media, channel.sender());
        engine.set_local_peer_id(session.connection_id.as_str());

        let mut roster = Roster::new();
        roster.set_local_id(session.connection_id.as_str());

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (app_tx, app_rx) = mpsc::unbounded_channel();

        let client = WatchroomClient {
            dispatcher: Dispatcher {
                channel,
                reconciler,
                engine,
                roster,
                library: VideoLibrary::new(),
                app_tx,
            },
            inbound_rx,
            link_rx,
            call_events_rx,
            commands_rx,
            commands_tx,
        };

        Ok((client, app_rx))
    }

    /// Cloneable command handle for the application
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Run the dispatch loop until the channel is terminal
    ///
    /// All inbound channel events, transport happenings, and commands are
    /// processed on this single task, in arrival order per source.
    pub async fn run(self) -> Result<()> {
        let WatchroomClient {
            mut dispatcher,
            mut inbound_rx,
            mut link_rx,
            mut call_events_rx,
            mut commands_rx,
            commands_tx,
        } = self;
        drop(commands_tx);

        let mut status_stream = WatchStream::new(dispatcher.channel.status());

        loop {
            tokio::select! {
                Some(status) = status_stream.next() => {
                    if dispatcher.handle_status(status).await {
                        break;
                    }
                }
                Some(event) = inbound_rx.recv() => {
                    dispatcher.handle_server_event(event).await;
                }
                Some(event) = link_rx.recv() => {
                    dispatcher.engine.handle_link_event(event).await;
                }
                Some(event) = call_events_rx.recv() => {
                    dispatcher.app(AppEvent::Call(event));
                }
                Some(command) = commands_rx.recv() => {
                    dispatcher.handle_command(command).await;
                }
                else => break,
            }
        }

        debug!("Dispatch loop finished");
        Ok(())
    }
}

struct Dispatcher {
    channel: SignalingChannel,
    reconciler: PlaybackReconciler,
    engine: CallEngine,
    roster: Roster,
    library: VideoLibrary,
    app_tx: mpsc::UnboundedSender<AppEvent>,
}

impl Dispatcher {
    fn app(&self, event: AppEvent) {
        let _ = self.app_tx.send(event);
    }

    /// Returns `true` when the loop should stop
    async fn handle_status(&mut self, status: ChannelStatus) -> bool {
        match status {
            ChannelStatus::Connected => {
                if let Some(session) = self.channel.session().await {
                    self.reconciler
                        .set_session_id(session.connection_id.as_str());
                    self.engine.set_local_peer_id(session.connection_id.as_str());
                    self.roster.set_local_id(session.connection_id.as_str());
                    self.app(AppEvent::Joined(session));
                }
                // Refresh room state after (re)joining.
                let _ = self.channel.send(ClientEvent::GetVideos);
                self.app(AppEvent::Status(status));
                false
            }
            ChannelStatus::Reconnecting => {
                // The remote side may have observed our departure; every
                // call session assumed the old connection identity.
                self.engine.invalidate_all().await;
                self.app(AppEvent::Status(status));
                false
            }
            ChannelStatus::Unreachable | ChannelStatus::Closed => {
                self.engine.invalidate_all().await;
                self.app(AppEvent::Status(status));
                true
            }
            ChannelStatus::Connecting => {
                self.app(AppEvent::Status(status));
                false
            }
        }
    }

    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ExistingUsers(users) => {
                self.roster.apply_snapshot(&users);
                self.app(AppEvent::RosterUpdated(self.roster.participants().to_vec()));
            }
            ServerEvent::UserJoined(user) => {
                self.roster.apply_joined(&user);
                self.app(AppEvent::RosterUpdated(self.roster.participants().to_vec()));
            }
            ServerEvent::UserLeft { id } => {
                self.roster.apply_left(&id);
                self.engine.handle_peer_left(&id).await;
                self.app(AppEvent::RosterUpdated(self.roster.participants().to_vec()));
            }
            ServerEvent::AvailableVideos(videos) => {
                self.library.set_videos(videos);
                self.app(AppEvent::VideoListUpdated(self.library.videos().to_vec()));
            }
            ServerEvent::VideoSelected { filename } => {
                self.library.select(filename.as_str());
                self.reconciler.load(filename.as_str());
                self.app(AppEvent::VideoSelected(filename));
            }
            ServerEvent::VideoDeleted { filename } => {
                if self.library.delete(&filename) {
                    self.reconciler.unload();
                }
                self.app(AppEvent::VideoListUpdated(self.library.videos().to_vec()));
            }
            ServerEvent::VideoState(state) => self.reconciler.apply_remote(&state),
            ServerEvent::Play { time } => self.reconciler.apply_remote_play(time),
            ServerEvent::Pause { time } => self.reconciler.apply_remote_pause(time),
            ServerEvent::Seek { time } => self.reconciler.apply_remote_seek(time),
            ServerEvent::Mute => self.reconciler.apply_remote_muted(true),
            ServerEvent::Unmute => self.reconciler.apply_remote_muted(false),
            ServerEvent::VolumeChange { level } => self.reconciler.apply_remote_volume(level),
            ServerEvent::Offer { from, signal } => {
                if let Err(e) = self.engine.handle_incoming_offer(from, signal).await {
                    warn!("Incoming offer failed: {}", e);
                }
            }
            ServerEvent::Answer { from, signal } => {
                if let Err(e) = self.engine.handle_answer(from, signal).await {
                    warn!("Answer handling failed: {}", e);
                }
            }
            ServerEvent::IceCandidate { from, candidate } => {
                self.engine.handle_ice_candidate(from, candidate).await;
            }
            ServerEvent::IncomingCall { from } => self.engine.handle_incoming_call(from),
            ServerEvent::CallAccepted { signal } => {
                if let Err(e) = self.engine.handle_call_accepted(signal).await {
                    warn!("call-accepted handling failed: {}", e);
                }
            }
            ServerEvent::RemoteMediaToggled {
                peer_id,
                audio,
                video,
            } => {
                self.engine.handle_remote_media_toggled(peer_id, audio, video);
            }
            ServerEvent::ServerFull => self.app(AppEvent::RoomFull),
            ServerEvent::UploadProgress {
                progress,
                remaining,
                speed,
            } => self.app(AppEvent::UploadProgress {
                progress,
                remaining,
                speed,
            }),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play => self.reconciler.play(),
            Command::Pause => self.reconciler.pause(),
            Command::Seek(seconds) => self.reconciler.seek(seconds),
            Command::SetMuted(muted) => self.reconciler.set_muted(muted),
            Command::SetVolume(volume) => self.reconciler.set_volume(volume),
            Command::NotePosition(seconds) => self.reconciler.note_position(seconds),
            Command::SelectVideo(filename) => {
                self.library.select(filename.as_str());
                self.reconciler.load(filename.as_str());
                if let Err(e) = self.channel.send(ClientEvent::SelectVideo {
                    filename: filename.clone(),
                }) {
                    warn!("Failed to relay video selection: {}", e);
                }
                self.app(AppEvent::VideoSelected(filename));
            }
            Command::RequestVideos => {
                if let Err(e) = self.channel.send(ClientEvent::GetVideos) {
                    warn!("Failed to request video list: {}", e);
                }
            }
            Command::InviteCall(peer) => {
                let target = peer.or_else(|| self.roster.other_peer());
                if let Err(e) = self.engine.invite(target) {
                    warn!("Call invitation failed: {}", e);
                }
            }
            Command::StartCall(peer) => {
                let target = peer.or_else(|| self.roster.other_peer());
                if let Err(e) = self.engine.initiate(target).await {
                    warn!("Call start failed: {}", e);
                }
            }
            Command::AcceptCall(from) => {
                if let Err(e) = self.engine.accept_call(from).await {
                    warn!("Call accept failed: {}", e);
                }
            }
            Command::EndCall(peer) => {
                let _ = self.engine.end_call(&peer).await;
            }
            Command::ToggleMicrophone => {
                if let Err(e) = self.engine.toggle_microphone() {
                    warn!("Microphone toggle failed: {}", e);
                }
            }
            Command::ToggleCamera => {
                if let Err(e) = self.engine.toggle_camera().await {
                    warn!("Camera toggle failed: {}", e);
                }
            }
            Command::SetMicGain(level) => self.engine.set_mic_gain(level),
            Command::SetRemoteVolume(peer, level) => {
                self.engine.set_remote_volume(peer, level);
            }
            Command::Shutdown => self.channel.close(),
        }
    }
}
