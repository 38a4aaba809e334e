// Core error types
use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which call operation a [`SipError::Call`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOperation {
    MakeCall,
    Hangup,
    Mute,
    Unmute,
}

impl CallOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOperation::MakeCall => "make call",
            CallOperation::Hangup => "hang up",
            CallOperation::Mute => "mute",
            CallOperation::Unmute => "unmute",
        }
    }
}

impl fmt::Display for CallOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SipError {
    /// Malformed address or option rejected by the signaling engine
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// WebSocket or connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Failed to {operation}: {reason}")]
    Call {
        operation: CallOperation,
        reason: String,
    },

    #[error("Not connected to SIP server")]
    NotConnected,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl SipError {
    pub fn transport(msg: impl Into<String>) -> Self {
        SipError::Transport(msg.into())
    }

    pub fn registration(msg: impl Into<String>) -> Self {
        SipError::Registration(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        SipError::Media(msg.into())
    }

    /// Wraps an engine failure with the call operation it interrupted.
    pub fn call(operation: CallOperation, cause: SipError) -> Self {
        SipError::Call {
            operation,
            reason: cause.reason(),
        }
    }

    /// The bare failure description, without the category prefix.
    pub fn reason(&self) -> String {
        match self {
            SipError::Configuration(msg)
            | SipError::Transport(msg)
            | SipError::Registration(msg)
            | SipError::InvalidState(msg)
            | SipError::Media(msg) => msg.clone(),
            SipError::Call { reason, .. } => reason.clone(),
            SipError::NotConnected | SipError::Timeout(_) => self.to_string(),
        }
    }

    /// Transport and registration failures are recovered by reconnecting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SipError::Transport(_) | SipError::Registration(_) | SipError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SipError>;

// SIP URI, just enough to carry the self address around
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipUri {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
}

impl SipUri {
    pub fn new(host: impl Into<String>) -> Self {
        SipUri {
            scheme: "sip".to_string(),
            user: None,
            host: host.into(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(ref user) = self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)
    }
}

// Media types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Remote media stream handed over by the negotiation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        MediaStream { id: id.into() }
    }
}

/// Inbound track announced by the negotiation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

impl MediaTrack {
    pub fn audio(id: impl Into<String>) -> Self {
        MediaTrack {
            id: id.into(),
            kind: MediaKind::Audio,
        }
    }

    pub fn video(id: impl Into<String>) -> Self {
        MediaTrack {
            id: id.into(),
            kind: MediaKind::Video,
        }
    }
}

// Logging abstraction
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to `tracing`; installing a subscriber is up to the application.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "rs_softphone", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "rs_softphone", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "rs_softphone", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "rs_softphone", "{}", message);
    }
}

pub const DEFAULT_DOMAIN: &str = "sip.example.com";

pub const DEFAULT_STUN_SERVERS: [&str; 3] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

// Configuration types
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClientConfig {
    /// Domain used when credentials carry none
    pub default_domain: String,
    pub connect_timeout: Duration,
    pub max_reconnect_attempts: u32,
    /// Flat delay between reconnect attempts
    pub reconnect_delay: Duration,
    pub register_expires: u32,
    pub register_refresh: u32,
    pub stun_servers: Vec<String>,
    /// Retry knobs handed to the engine's own transport
    pub transport_reconnection_attempts: u32,
    pub transport_reconnection_timeout: Duration,
    pub trace_sip: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            default_domain: DEFAULT_DOMAIN.to_string(),
            connect_timeout: Duration::from_secs(15),
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(2),
            register_expires: 300,
            register_refresh: 90,
            stun_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            transport_reconnection_attempts: 3,
            transport_reconnection_timeout: Duration::from_secs(4),
            trace_sip: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn domain_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.domain.as_deref().unwrap_or(fallback)
    }
}
