//! Presentation-facing wrapper around [`CallSessionController`].
//!
//! Keeps what a dialer UI shows: an append-only log of SIP events and the
//! status of the current call. The controller stays the source of truth for
//! connection state; nothing here mutates the agent or the session directly.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{CallSessionController, ConnectionState, ConnectionStatus, Credentials, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum SipEventKind {
    Register,
    Invite,
    Bye,
    Message,
}

impl fmt::Display for SipEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SipEventKind::Register => "REGISTER",
            SipEventKind::Invite => "INVITE",
            SipEventKind::Bye => "BYE",
            SipEventKind::Message => "MESSAGE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SipEvent {
    pub kind: SipEventKind,
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub content: Option<String>,
}

impl SipEvent {
    pub fn new(kind: SipEventKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        SipEvent {
            kind,
            timestamp: Utc::now(),
            from: from.into(),
            to: to.into(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Append-only event history.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<SipEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog { events: Vec::new() }
    }

    pub fn push(&mut self, event: SipEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SipEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStatus {
    pub in_call: bool,
    pub remote_party: Option<String>,
    pub muted: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl CallStatus {
    fn started(remote_party: &str) -> Self {
        CallStatus {
            in_call: true,
            remote_party: Some(remote_party.to_string()),
            muted: false,
            started_at: Some(Utc::now()),
        }
    }

    pub fn duration(&self) -> Duration {
        match self.started_at {
            Some(started) if self.in_call => Utc::now() - started,
            _ => Duration::zero(),
        }
    }
}

pub struct Phone {
    controller: CallSessionController,
    credentials: Option<Credentials>,
    log: EventLog,
    call: CallStatus,
}

impl Phone {
    pub fn new(controller: CallSessionController) -> Self {
        Phone {
            controller,
            credentials: None,
            log: EventLog::new(),
            call: CallStatus::default(),
        }
    }

    pub fn controller(&self) -> &CallSessionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut CallSessionController {
        &mut self.controller
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.controller.connection_state()
    }

    pub fn is_registered(&self) -> bool {
        self.controller.connection_state().status == ConnectionStatus::Registered
    }

    pub fn events(&self) -> &[SipEvent] {
        self.log.events()
    }

    pub fn call_status(&self) -> &CallStatus {
        &self.call
    }

    /// Connects with the credentials, falling back to the configured default
    /// domain. Logs a REGISTER event once registered.
    pub async fn register(&mut self, credentials: Credentials) -> Result<()> {
        let domain = credentials
            .domain_or(&self.controller.config().default_domain)
            .to_string();
        self.credentials = Some(credentials.clone());

        self.controller
            .connect(&credentials.username, &credentials.password, &domain)
            .await?;
        self.log
            .push(SipEvent::new(SipEventKind::Register, &credentials.username, domain));
        Ok(())
    }

    /// Does nothing unless registered.
    pub async fn make_call(&mut self, destination: &str) -> Result<()> {
        let Some(username) = self.registered_user() else {
            return Ok(());
        };

        self.controller.make_call(destination).await?;
        self.log
            .push(SipEvent::new(SipEventKind::Invite, username, destination));
        self.call = CallStatus::started(destination);
        Ok(())
    }

    /// Does nothing without a call in progress.
    pub async fn end_call(&mut self) -> Result<()> {
        let Some(remote) = self.call.remote_party.clone() else {
            return Ok(());
        };
        let Some(username) = self.credentials.as_ref().map(|c| c.username.clone()) else {
            return Ok(());
        };
        if !self.call.in_call {
            return Ok(());
        }

        self.controller.hangup().await?;
        self.log.push(SipEvent::new(SipEventKind::Bye, username, remote));
        self.call = CallStatus::default();
        Ok(())
    }

    /// Returns the new muted flag.
    pub fn toggle_mute(&mut self) -> Result<bool> {
        let muted = !self.call.muted;
        self.controller.set_muted(muted)?;
        self.call.muted = muted;
        Ok(muted)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.call = CallStatus::default();
        self.controller.disconnect().await
    }

    fn registered_user(&self) -> Option<String> {
        if !self.is_registered() {
            return None;
        }
        self.credentials.as_ref().map(|c| c.username.clone())
    }
}
