// Signaling configuration for a SIP-over-WebSocket agent
use std::time::Duration;

use crate::{ClientConfig, MediaConstraints, SipUri};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub servers: Vec<String>,
    pub trace_sip: bool,
    pub connection_timeout: Duration,
    pub max_reconnection_attempts: u32,
    pub reconnection_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceTransportPolicy {
    All,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub transport_policy: IceTransportPolicy,
    pub candidate_pool_size: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    pub constraints: MediaConstraints,
    pub ice: IceConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLogLevel {
    Debug,
    Log,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLogOptions {
    pub builtin_enabled: bool,
    pub level: EngineLogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogMatching {
    BranchMatch,
    Strict,
}

/// Interop switches for registrars behind NAT or without UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityFlags {
    /// Advertise TCP in Via when UDP is not usable
    pub via_tcp: bool,
    /// Put the IP address rather than a hostname in Contact
    pub ip_in_contact: bool,
    pub dialog_matching: DialogMatching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    pub uri: SipUri,
    pub authorization_username: String,
    pub authorization_password: String,
    pub transport: TransportOptions,
    pub media: MediaOptions,
    pub log: EngineLogOptions,
    pub compatibility: CompatibilityFlags,
}

impl SignalingConfig {
    /// Build with the stock tuning; see [`SignalingConfig::build_with`].
    pub fn build(username: &str, password: &str, domain: &str) -> Self {
        Self::build_with(&ClientConfig::default(), username, password, domain)
    }

    /// No validation happens here: an empty or odd domain goes through
    /// verbatim and is left for the engine to reject.
    pub fn build_with(tuning: &ClientConfig, username: &str, password: &str, domain: &str) -> Self {
        SignalingConfig {
            uri: SipUri::new(domain).with_user(username),
            authorization_username: username.to_string(),
            authorization_password: password.to_string(),
            transport: TransportOptions {
                servers: vec![format!("wss://{}/ws", domain)],
                trace_sip: tuning.trace_sip,
                connection_timeout: tuning.connect_timeout,
                max_reconnection_attempts: tuning.transport_reconnection_attempts,
                reconnection_timeout: tuning.transport_reconnection_timeout,
            },
            media: MediaOptions {
                constraints: MediaConstraints::AUDIO_ONLY,
                ice: IceConfiguration {
                    ice_servers: tuning
                        .stun_servers
                        .iter()
                        .map(|urls| IceServer { urls: urls.clone() })
                        .collect(),
                    transport_policy: IceTransportPolicy::All,
                    candidate_pool_size: 0,
                },
            },
            log: EngineLogOptions {
                builtin_enabled: true,
                level: EngineLogLevel::Debug,
            },
            compatibility: CompatibilityFlags {
                via_tcp: true,
                ip_in_contact: true,
                dialog_matching: DialogMatching::BranchMatch,
            },
        }
    }
}
