use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout_at};

use crate::{
    AudioSink, CallOperation, CallSession, ClientConfig, ConnectionState, ConnectionStateManager,
    ConnectionStatus, Credentials, Logger, PlaybackHost, RegistrationHandle, RegistrationOptions,
    RegistrationState, Result, SessionOptions, SessionSlot, SignalingAgent, SignalingConfig,
    SignalingEngine, SignalingEvent, SignalingEvents, SipError, Subscription, TrackDelegate,
    TracingLogger,
};

// Controller builder
pub struct ControllerBuilder {
    config: ClientConfig,
    logger: Option<Arc<dyn Logger>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        ControllerBuilder {
            config: ClientConfig::default(),
            logger: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_domain(mut self, domain: &str) -> Self {
        self.config.default_domain = domain.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn registration_expiry(mut self, expires: u32, refresh: u32) -> Self {
        self.config.register_expires = expires;
        self.config.register_refresh = refresh;
        self
    }

    pub fn stun_servers(mut self, servers: Vec<String>) -> Self {
        self.config.stun_servers = servers;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(
        self,
        engine: Arc<dyn SignalingEngine>,
        playback: Arc<dyn PlaybackHost>,
    ) -> CallSessionController {
        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger));

        CallSessionController {
            engine,
            config: self.config,
            state: ConnectionStateManager::new(),
            audio: AudioSink::new(playback, logger.clone()),
            agent: None,
            registration: None,
            session: SessionSlot::new(),
            events: None,
            reconnect_attempts: 0,
            logger,
        }
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the signaling agent, its registration and the single call session.
///
/// Every operation takes `&mut self`, so at most one of them is in flight per
/// controller. Engine notifications queue up on a per-agent channel and are
/// applied by `connect` while it waits for registration, and afterwards by
/// [`process_next_event`](Self::process_next_event) or
/// [`process_pending_events`](Self::process_pending_events).
pub struct CallSessionController {
    engine: Arc<dyn SignalingEngine>,
    config: ClientConfig,
    state: ConnectionStateManager,
    audio: AudioSink,
    agent: Option<Box<dyn SignalingAgent>>,
    registration: Option<Box<dyn RegistrationHandle>>,
    session: SessionSlot,
    events: Option<(SignalingEvents, mpsc::UnboundedReceiver<SignalingEvent>)>,
    reconnect_attempts: u32,
    logger: Arc<dyn Logger>,
}

impl CallSessionController {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.state.get_state()
    }

    /// The listener stays registered until the returned handle is dropped.
    pub fn on_connection_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.state.subscribe(listener)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    pub fn has_registration(&self) -> bool {
        self.registration.is_some()
    }

    pub fn active_call(&self) -> Option<&CallSession> {
        self.session.active()
    }

    pub fn audio_ready(&self) -> bool {
        self.audio.is_ready()
    }

    /// Connect and register, retrying with a flat backoff. Resolves once the
    /// registrar has accepted the registration.
    pub async fn connect(&mut self, username: &str, password: &str, domain: &str) -> Result<bool> {
        let credentials = Credentials::new(username, password).with_domain(domain);
        self.connect_with_recovery(credentials).await?;
        Ok(true)
    }

    async fn connect_with_recovery(&mut self, mut credentials: Credentials) -> Result<()> {
        loop {
            let failure = match self.try_connect(&credentials).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if let Some(recovered) = self.last_known_credentials() {
                credentials = recovered;
            }
            self.handle_failure(failure).await?;
        }
    }

    /// Publish the failure, then either wait out the backoff or give up.
    async fn handle_failure(&mut self, error: SipError) -> Result<()> {
        self.logger.error(&format!("Connection error: {}", error));
        self.state.set_state(ConnectionState::error(error.reason()));

        let max = self.config.max_reconnect_attempts;
        if self.reconnect_attempts >= max {
            return Err(error);
        }

        self.reconnect_attempts += 1;
        self.logger.info(&format!(
            "Attempting to reconnect ({}/{})...",
            self.reconnect_attempts, max
        ));
        sleep(self.config.reconnect_delay).await;
        Ok(())
    }

    fn last_known_credentials(&self) -> Option<Credentials> {
        let config = self.agent.as_ref()?.config();
        Some(
            Credentials::new(
                config.authorization_username.clone(),
                config.authorization_password.clone(),
            )
            .with_domain(config.uri.host.clone()),
        )
    }

    async fn try_connect(&mut self, credentials: &Credentials) -> Result<()> {
        self.state.set_state(ConnectionState::connecting());

        if let Err(e) = self.teardown().await {
            self.logger.warn(&format!("Cleanup before connect failed: {}", e));
        }

        let deadline = Instant::now() + self.config.connect_timeout;
        let domain = credentials.domain_or(&self.config.default_domain);
        let config = SignalingConfig::build_with(
            &self.config,
            &credentials.username,
            &credentials.password,
            domain,
        );

        let (events, rx) = SignalingEvents::channel();
        self.events = Some((events.clone(), rx));

        let agent = match self.engine.create_agent(config, events) {
            Ok(agent) => agent,
            Err(e) => {
                self.events = None;
                return Err(e);
            }
        };
        let agent = self.agent.insert(agent);
        match timeout_at(deadline, agent.start()).await {
            Ok(result) => result?,
            Err(_) => return Err(SipError::Timeout("WebSocket connection".to_string())),
        }

        // The transport may already have come up, or dropped again
        self.apply_queued_events()?;

        let options = RegistrationOptions {
            expires: self.config.register_expires,
            refresh_frequency: self.config.register_refresh,
        };
        let agent = self.agent.as_mut().ok_or(SipError::NotConnected)?;
        let registration = agent.create_registration(options)?;
        let registration = self.registration.insert(registration);
        match timeout_at(deadline, registration.register()).await {
            Ok(result) => result?,
            Err(_) => return Err(SipError::Timeout("registration request".to_string())),
        }

        self.await_registration(deadline).await?;
        self.logger.info("Successfully registered with SIP server");
        Ok(())
    }

    async fn await_registration(&mut self, deadline: Instant) -> Result<()> {
        loop {
            let Some((_, rx)) = self.events.as_mut() else {
                return Err(SipError::NotConnected);
            };
            let event = match timeout_at(deadline, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(SipError::transport("signaling agent went away")),
                Err(_) => {
                    return Err(SipError::registration("timed out waiting for registration"));
                }
            };

            if self.apply_event(event)? {
                return Ok(());
            }
        }
    }

    /// Apply one engine notification. `Ok(true)` means the registrar just
    /// accepted us; an `Err` is a connection failure to recover from.
    fn apply_event(&mut self, event: SignalingEvent) -> Result<bool> {
        match event {
            SignalingEvent::TransportConnected => {
                self.logger.info("WebSocket connected");
                self.state.set_state(ConnectionState::connected());
                Ok(false)
            }
            SignalingEvent::TransportDisconnected { reason } => {
                let message = match reason {
                    Some(reason) => format!("WebSocket disconnected: {}", reason),
                    None => "WebSocket disconnected".to_string(),
                };
                Err(SipError::transport(message))
            }
            SignalingEvent::Registration(state) => {
                self.logger.debug(&format!("Registration state: {:?}", state));
                match state {
                    RegistrationState::Registered => {
                        self.state.set_state(ConnectionState::registered());
                        self.reconnect_attempts = 0;
                        Ok(true)
                    }
                    RegistrationState::Terminated => {
                        Err(SipError::registration("Registration terminated"))
                    }
                    _ => Ok(false),
                }
            }
            SignalingEvent::Session(state) => {
                self.logger.debug(&format!("Session state: {:?}", state));
                if let Some(call) = self.session.active_mut() {
                    call.set_state(state);
                }
                Ok(false)
            }
            SignalingEvent::Track { track, stream } => {
                if let Err(e) = self.audio.bind_track(&track, &stream) {
                    self.logger.warn(&format!("Could not bind remote track {}: {}", track.id, e));
                }
                Ok(false)
            }
        }
    }

    fn try_next_event(&mut self) -> Option<SignalingEvent> {
        self.events.as_mut()?.1.try_recv().ok()
    }

    fn apply_queued_events(&mut self) -> Result<()> {
        while let Some(event) = self.try_next_event() {
            self.apply_event(event)?;
        }
        Ok(())
    }

    /// Wait for the next engine notification and apply it, reconnecting if
    /// it reports a failure. Returns `Ok(false)` when there is no agent to
    /// listen to.
    pub async fn process_next_event(&mut self) -> Result<bool> {
        if self.agent.is_none() {
            return Ok(false);
        }
        let Some((_, rx)) = self.events.as_mut() else {
            return Ok(false);
        };
        let Some(event) = rx.recv().await else {
            self.events = None;
            return Ok(false);
        };

        self.dispatch(event).await?;
        Ok(true)
    }

    /// Apply every notification already queued, without waiting.
    pub async fn process_pending_events(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(event) = self.try_next_event() {
            self.dispatch(event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn dispatch(&mut self, event: SignalingEvent) -> Result<()> {
        let Err(failure) = self.apply_event(event) else {
            return Ok(());
        };

        let Some(credentials) = self.last_known_credentials() else {
            self.logger.error(&format!("Connection error: {}", failure));
            self.state.set_state(ConnectionState::error(failure.reason()));
            return Err(SipError::NotConnected);
        };
        self.handle_failure(failure).await?;
        self.connect_with_recovery(credentials).await
    }

    pub async fn make_call(&mut self, destination: &str) -> Result<bool> {
        let Some(agent) = self.agent.as_mut() else {
            return Err(SipError::NotConnected);
        };
        let Some((events, _)) = self.events.as_ref() else {
            return Err(SipError::NotConnected);
        };
        let status = self.state.get_state().status;
        if status != ConnectionStatus::Registered {
            return Err(SipError::InvalidState(format!(
                "cannot place a call while {}",
                status
            )));
        }
        if let Some(call) = self.session.active() {
            return Err(SipError::InvalidState(format!(
                "a call to {} is already in progress",
                call.target()
            )));
        }

        let target = format!("sip:{}", destination);
        self.logger.debug(&format!("Placing call to {}", target));
        let delegate = TrackDelegate::new(events.clone());
        let handle = agent
            .create_session(&target, SessionOptions::audio_only(), delegate)
            .map_err(|e| SipError::call(CallOperation::MakeCall, e))?;

        let call = self.session.start_session(CallSession::new(target, handle))?;
        if let Err(e) = call.invite().await {
            self.session.end_session();
            self.logger.error(&format!("Call failed: {}", e));
            return Err(SipError::call(CallOperation::MakeCall, e));
        }

        self.logger.info("Call initiated successfully");
        Ok(true)
    }

    /// The session is only released once terminate succeeds, so a failed
    /// hangup can be retried.
    pub async fn hangup(&mut self) -> Result<()> {
        let Some(call) = self.session.active_mut() else {
            self.logger.debug("No active call to hang up");
            return Ok(());
        };

        if let Err(e) = call.terminate().await {
            self.logger.error(&format!("Hangup failed: {}", e));
            return Err(SipError::call(CallOperation::Hangup, e));
        }

        self.session.end_session();
        self.logger.info("Call terminated successfully");
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        let Some(call) = self.session.active_mut() else {
            return Ok(());
        };

        let operation = if muted {
            CallOperation::Mute
        } else {
            CallOperation::Unmute
        };
        match call.set_audio_enabled(!muted) {
            Ok(0) => Ok(()),
            Ok(_) => {
                self.logger
                    .info(if muted { "Microphone muted" } else { "Microphone unmuted" });
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("Mute operation failed: {}", e));
                Err(SipError::call(operation, e))
            }
        }
    }

    /// Tear everything down and report `disconnected`. Each step runs even if
    /// an earlier one failed; the first failure is returned afterwards.
    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.teardown().await;
        self.state.set_state(ConnectionState::disconnected());
        self.logger.info("SIP service disconnected");
        result
    }

    // session -> registration -> agent -> audio
    async fn teardown(&mut self) -> Result<()> {
        // Whatever the old agent still has to say is no longer relevant
        self.events = None;
        let mut first_error = None;

        if let Some(mut call) = self.session.end_session() {
            if let Err(e) = call.terminate().await {
                self.logger.warn(&format!("Terminating session during teardown failed: {}", e));
                first_error.get_or_insert(SipError::call(CallOperation::Hangup, e));
            }
        }

        if let Some(mut registration) = self.registration.take() {
            if let Err(e) = registration.unregister().await {
                self.logger.warn(&format!("Unregister failed: {}", e));
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut agent) = self.agent.take() {
            if let Err(e) = agent.stop().await {
                self.logger.warn(&format!("Stopping signaling agent failed: {}", e));
                first_error.get_or_insert(e);
            }
        }

        self.audio.cleanup();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
