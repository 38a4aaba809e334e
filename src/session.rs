use crate::{MediaKind, OutboundSession, Result, SessionState, SipError};

/// The one outbound call a controller may own.
pub struct CallSession {
    target: String,
    state: SessionState,
    handle: Box<dyn OutboundSession>,
}

impl CallSession {
    pub fn new(target: String, handle: Box<dyn OutboundSession>) -> Self {
        CallSession {
            target,
            state: SessionState::Initial,
            handle,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Last state the engine reported for this session
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub async fn invite(&mut self) -> Result<()> {
        self.handle.invite().await
    }

    pub async fn terminate(&mut self) -> Result<()> {
        self.handle.terminate().await
    }

    /// Toggle every outbound audio sender. The tracks stay attached, so the
    /// negotiated media line is untouched. Returns how many senders changed.
    pub fn set_audio_enabled(&mut self, enabled: bool) -> Result<usize> {
        let Some(channel) = self.handle.media_channel() else {
            return Ok(0);
        };

        let mut toggled = 0;
        for sender in channel.senders() {
            if sender.kind() == Some(MediaKind::Audio) {
                sender.set_enabled(enabled)?;
                toggled += 1;
            }
        }
        Ok(toggled)
    }
}

/// Holds at most one [`CallSession`]; the only way in is `start_session` and
/// the only way out is `end_session`.
#[derive(Default)]
pub struct SessionSlot {
    active: Option<CallSession>,
}

impl SessionSlot {
    pub fn new() -> Self {
        SessionSlot { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn start_session(&mut self, session: CallSession) -> Result<&mut CallSession> {
        if let Some(ref existing) = self.active {
            return Err(SipError::InvalidState(format!(
                "a call to {} is already in progress",
                existing.target
            )));
        }
        Ok(self.active.insert(session))
    }

    pub fn end_session(&mut self) -> Option<CallSession> {
        self.active.take()
    }

    pub fn active(&self) -> Option<&CallSession> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut CallSession> {
        self.active.as_mut()
    }
}
