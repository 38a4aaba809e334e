// lib.rs - Main library module for rs_softphone

// Signaling lifecycle for a browser-style softphone: connect and register
// against a SIP-over-WebSocket server, recover from transport loss, and drive
// one outbound audio call at a time. The SIP stack itself sits behind the
// SignalingEngine trait.

#[path = "audio.rs"]
mod audio;
#[path = "connection.rs"]
mod connection;
#[path = "controller.rs"]
mod controller;
#[path = "core.rs"]
mod core;
#[path = "phone.rs"]
mod phone;
#[path = "session.rs"]
mod session;
#[path = "signaling.rs"]
mod signaling;
#[path = "sip_config.rs"]
mod sip_config;

#[cfg(test)]
mod testing;

// Re-export core types
pub use crate::audio::*;
pub use crate::connection::*;
pub use crate::controller::*;
pub use crate::core::*;
pub use crate::phone::*;
pub use crate::session::*;
pub use crate::signaling::*;
pub use crate::sip_config::*;

// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        // Main API
        CallSessionController,
        ControllerBuilder,
        Phone,

        // Configuration
        ClientConfig,
        Credentials,
        SignalingConfig,

        // States
        CallStatus,
        ConnectionState,
        ConnectionStatus,
        RegistrationState,
        SessionState,

        // Collaborators
        PlaybackElement,
        PlaybackHost,
        SignalingAgent,
        SignalingEngine,
        SignalingEvents,

        // Logging
        Logger,
        TracingLogger,

        // Core types
        Result,
        SipError,
        SipEvent,
        SipEventKind,
        Subscription,
    };
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
