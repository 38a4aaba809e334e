//! Collaborator contracts for the external signaling and media engines.
//!
//! The controller never speaks SIP or ICE itself. An engine implementation
//! builds agents from a [`SignalingConfig`], and every notification the engine
//! produces (transport up/down, registration and session state, inbound
//! tracks) is pushed into the [`SignalingEvents`] sender it was given.

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::{MediaKind, MediaStream, MediaTrack, Result, SignalingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Initial,
    Registered,
    Unregistered,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initial,
    Establishing,
    Established,
    Terminating,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    TransportConnected,
    TransportDisconnected { reason: Option<String> },
    Registration(RegistrationState),
    Session(SessionState),
    Track { track: MediaTrack, stream: MediaStream },
}

/// Sending side of an agent's notification channel.
#[derive(Debug, Clone)]
pub struct SignalingEvents {
    tx: mpsc::UnboundedSender<SignalingEvent>,
}

impl SignalingEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SignalingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SignalingEvents { tx }, rx)
    }

    /// Returns false once the controller stopped listening to this agent.
    pub fn emit(&self, event: SignalingEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn transport_connected(&self) -> bool {
        self.emit(SignalingEvent::TransportConnected)
    }

    pub fn transport_disconnected(&self, reason: Option<String>) -> bool {
        self.emit(SignalingEvent::TransportDisconnected { reason })
    }

    pub fn registration_state(&self, state: RegistrationState) -> bool {
        self.emit(SignalingEvent::Registration(state))
    }

    pub fn session_state(&self, state: SessionState) -> bool {
        self.emit(SignalingEvent::Session(state))
    }
}

/// Handed to a new session; the media engine reports inbound tracks through it.
#[derive(Debug, Clone)]
pub struct TrackDelegate {
    events: SignalingEvents,
}

impl TrackDelegate {
    pub fn new(events: SignalingEvents) -> Self {
        TrackDelegate { events }
    }

    pub fn on_track(&self, track: MediaTrack, stream: MediaStream) -> bool {
        self.events.emit(SignalingEvent::Track { track, stream })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOptions {
    pub expires: u32,
    pub refresh_frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub const AUDIO_ONLY: MediaConstraints = MediaConstraints {
        audio: true,
        video: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub constraints: MediaConstraints,
}

impl SessionOptions {
    pub fn audio_only() -> Self {
        SessionOptions {
            constraints: MediaConstraints::AUDIO_ONLY,
        }
    }
}

pub trait SignalingEngine: Send + Sync {
    fn create_agent(
        &self,
        config: SignalingConfig,
        events: SignalingEvents,
    ) -> Result<Box<dyn SignalingAgent>>;
}

pub trait SignalingAgent: Send + Sync {
    fn config(&self) -> &SignalingConfig;
    fn start(&mut self) -> BoxFuture<'_, Result<()>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<()>>;
    fn create_registration(
        &mut self,
        options: RegistrationOptions,
    ) -> Result<Box<dyn RegistrationHandle>>;
    fn create_session(
        &mut self,
        target: &str,
        options: SessionOptions,
        delegate: TrackDelegate,
    ) -> Result<Box<dyn OutboundSession>>;
}

pub trait RegistrationHandle: Send + Sync {
    fn register(&mut self) -> BoxFuture<'_, Result<()>>;
    fn unregister(&mut self) -> BoxFuture<'_, Result<()>>;
}

pub trait OutboundSession: Send + Sync {
    fn invite(&mut self) -> BoxFuture<'_, Result<()>>;
    fn terminate(&mut self) -> BoxFuture<'_, Result<()>>;
    /// Negotiated media, once the engine has set it up
    fn media_channel(&mut self) -> Option<&mut dyn MediaChannel>;
}

pub trait MediaChannel: Send + Sync {
    fn senders(&mut self) -> Vec<&mut dyn MediaSender>;
}

pub trait MediaSender: Send + Sync {
    /// Kind of the attached track, if any
    fn kind(&self) -> Option<MediaKind>;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
}
