// Scripted fakes for the engine, media and playback seams
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::{
    Logger, MediaChannel, MediaKind, MediaSender, MediaStream, MediaTrack, OutboundSession,
    PlaybackElement, PlaybackHost, RegistrationHandle, RegistrationOptions, RegistrationState,
    Result, SessionOptions, SessionState, SignalingAgent, SignalingConfig, SignalingEngine,
    SignalingEvents, SipError, TrackDelegate,
};

// Logger that keeps everything for assertions
pub struct MemoryLogger {
    entries: Mutex<Vec<(&'static str, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        MemoryLogger {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn contains(&self, level: &str, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    fn push(&self, level: &'static str, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

impl Logger for MemoryLogger {
    fn debug(&self, message: &str) {
        self.push("DEBUG", message);
    }

    fn info(&self, message: &str) {
        self.push("INFO", message);
    }

    fn warn(&self, message: &str) {
        self.push("WARN", message);
    }

    fn error(&self, message: &str) {
        self.push("ERROR", message);
    }
}

// Playback host

#[derive(Debug, Clone, Default)]
pub struct ElementRecord {
    pub autoplay: bool,
    pub plays_inline: bool,
    pub source: Option<MediaStream>,
    pub play_requests: usize,
    pub removed: bool,
    pub remove_calls: usize,
}

#[derive(Default)]
struct HostState {
    elements: Vec<ElementRecord>,
    reject_play: Option<String>,
}

pub struct FakePlaybackHost {
    state: Arc<Mutex<HostState>>,
}

impl FakePlaybackHost {
    pub fn new() -> Self {
        FakePlaybackHost {
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().elements.len()
    }

    pub fn element(&self, index: usize) -> ElementRecord {
        self.state.lock().unwrap().elements[index].clone()
    }

    pub fn reject_play(&self, reason: &str) {
        self.state.lock().unwrap().reject_play = Some(reason.to_string());
    }
}

impl PlaybackHost for FakePlaybackHost {
    fn create_element(&self) -> Result<Box<dyn PlaybackElement>> {
        let mut state = self.state.lock().unwrap();
        state.elements.push(ElementRecord::default());
        Ok(Box::new(FakeElement {
            index: state.elements.len() - 1,
            state: self.state.clone(),
        }))
    }
}

struct FakeElement {
    index: usize,
    state: Arc<Mutex<HostState>>,
}

impl FakeElement {
    fn update(&self, f: impl FnOnce(&mut ElementRecord)) {
        let mut state = self.state.lock().unwrap();
        f(&mut state.elements[self.index]);
    }
}

impl PlaybackElement for FakeElement {
    fn set_autoplay(&mut self, enabled: bool) {
        self.update(|e| e.autoplay = enabled);
    }

    fn set_plays_inline(&mut self, enabled: bool) {
        self.update(|e| e.plays_inline = enabled);
    }

    fn set_source(&mut self, stream: Option<MediaStream>) {
        self.update(|e| e.source = stream);
    }

    fn play_when_ready(&mut self) -> BoxFuture<'static, Result<()>> {
        let state = self.state.clone();
        let index = self.index;
        Box::pin(async move {
            let mut state = state.lock().unwrap();
            state.elements[index].play_requests += 1;
            match state.reject_play.clone() {
                Some(reason) => Err(SipError::media(reason)),
                None => Ok(()),
            }
        })
    }

    fn remove(&mut self) {
        self.update(|e| {
            e.removed = true;
            e.remove_calls += 1;
        });
    }
}

// Outbound session and its media

pub struct FakeSender {
    kind: Option<MediaKind>,
    enabled: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
}

impl MediaSender for FakeSender {
    fn kind(&self) -> Option<MediaKind> {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SipError::media("sender track ended"));
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeMedia {
    senders: Vec<FakeSender>,
}

impl MediaChannel for FakeMedia {
    fn senders(&mut self) -> Vec<&mut dyn MediaSender> {
        self.senders
            .iter_mut()
            .map(|s| s as &mut dyn MediaSender)
            .collect()
    }
}

#[derive(Default)]
struct SessionRecord {
    invites: usize,
    terminates: usize,
    fail_invite: Option<String>,
    fail_terminate: Option<String>,
}

pub struct FakeSession {
    record: Arc<Mutex<SessionRecord>>,
    media: Option<FakeMedia>,
    events: Option<SignalingEvents>,
}

/// Test-side view of a [`FakeSession`].
#[derive(Clone)]
pub struct SessionProbe {
    record: Arc<Mutex<SessionRecord>>,
    flags: Vec<Arc<AtomicBool>>,
    fail_mute: Arc<AtomicBool>,
    delegate: Option<TrackDelegate>,
    pub target: String,
}

impl FakeSession {
    /// Senders: audio, video, audio. All enabled.
    pub fn new() -> (Self, SessionProbe) {
        Self::with_delegate(String::new(), None, None)
    }

    fn with_delegate(
        target: String,
        delegate: Option<TrackDelegate>,
        events: Option<SignalingEvents>,
    ) -> (Self, SessionProbe) {
        let record = Arc::new(Mutex::new(SessionRecord::default()));
        let fail_mute = Arc::new(AtomicBool::new(false));
        let kinds = [MediaKind::Audio, MediaKind::Video, MediaKind::Audio];
        let flags: Vec<Arc<AtomicBool>> =
            kinds.iter().map(|_| Arc::new(AtomicBool::new(true))).collect();
        let senders = kinds
            .iter()
            .zip(&flags)
            .map(|(kind, flag)| FakeSender {
                kind: Some(*kind),
                enabled: flag.clone(),
                fail: fail_mute.clone(),
            })
            .collect();

        let session = FakeSession {
            record: record.clone(),
            media: Some(FakeMedia { senders }),
            events,
        };
        let probe = SessionProbe {
            record,
            flags,
            fail_mute,
            delegate,
            target,
        };
        (session, probe)
    }
}

impl OutboundSession for FakeSession {
    fn invite(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut record = self.record.lock().unwrap();
            record.invites += 1;
            if let Some(reason) = record.fail_invite.clone() {
                return Err(SipError::transport(reason));
            }
            if let Some(ref events) = self.events {
                events.session_state(SessionState::Establishing);
            }
            Ok(())
        })
    }

    fn terminate(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut record = self.record.lock().unwrap();
            record.terminates += 1;
            if let Some(reason) = record.fail_terminate.clone() {
                return Err(SipError::transport(reason));
            }
            if let Some(ref events) = self.events {
                events.session_state(SessionState::Terminated);
            }
            Ok(())
        })
    }

    fn media_channel(&mut self) -> Option<&mut dyn MediaChannel> {
        self.media
            .as_mut()
            .map(|media| media as &mut dyn MediaChannel)
    }
}

impl SessionProbe {
    pub fn invites(&self) -> usize {
        self.record.lock().unwrap().invites
    }

    pub fn terminates(&self) -> usize {
        self.record.lock().unwrap().terminates
    }

    pub fn sender_flags(&self) -> Vec<bool> {
        self.flags.iter().map(|f| f.load(Ordering::SeqCst)).collect()
    }

    pub fn fail_invite(&self, reason: &str) {
        self.record.lock().unwrap().fail_invite = Some(reason.to_string());
    }

    pub fn fail_terminate(&self, reason: Option<&str>) {
        self.record.lock().unwrap().fail_terminate = reason.map(str::to_string);
    }

    pub fn fail_mute(&self) {
        self.fail_mute.store(true, Ordering::SeqCst);
    }

    /// Play the media engine announcing an inbound track.
    pub fn emit_track(&self, track: MediaTrack, stream: MediaStream) -> bool {
        match self.delegate {
            Some(ref delegate) => delegate.on_track(track, stream),
            None => false,
        }
    }
}

// Signaling engine

/// What the next agent created by [`FakeEngine`] will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Transport connects and the registrar accepts
    Register,
    /// `create_agent` itself fails
    FailCreate(String),
    /// `start` fails before any transport event
    FailStart(String),
    /// Transport connects, then drops before registering
    DropTransport,
    /// `register` returns an error
    RejectRegister(String),
    /// Registrar answers with a terminated registration
    TerminateRegistration,
    /// Registrar never answers
    Silent,
}

#[derive(Default)]
struct EngineState {
    script: VecDeque<Attempt>,
    fallback: Option<Attempt>,
    attempts: usize,
    configs: Vec<SignalingConfig>,
    events: Option<SignalingEvents>,
    sessions: Vec<SessionProbe>,
    next_invite_failure: Option<String>,
    session_create_failure: Option<String>,
    fail_unregister: bool,
    fail_stop: bool,
    withhold_media: bool,
    registrations: usize,
    unregisters: usize,
    stops: usize,
    order: Vec<&'static str>,
}

pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    /// Every attempt registers unless scripted otherwise.
    pub fn new() -> Arc<Self> {
        Arc::new(FakeEngine {
            state: Arc::new(Mutex::new(EngineState {
                fallback: Some(Attempt::Register),
                ..EngineState::default()
            })),
        })
    }

    /// Queue outcomes for the next attempts, in order.
    pub fn script(&self, attempts: impl IntoIterator<Item = Attempt>) {
        self.state.lock().unwrap().script.extend(attempts);
    }

    /// Outcome once the script runs dry.
    pub fn always(&self, attempt: Attempt) {
        self.state.lock().unwrap().fallback = Some(attempt);
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn configs(&self) -> Vec<SignalingConfig> {
        self.state.lock().unwrap().configs.clone()
    }

    /// Notification sender of the most recent agent
    pub fn events(&self) -> SignalingEvents {
        self.state
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("no agent created yet")
    }

    pub fn sessions(&self) -> Vec<SessionProbe> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn fail_next_invite(&self, reason: &str) {
        self.state.lock().unwrap().next_invite_failure = Some(reason.to_string());
    }

    pub fn fail_session_create(&self, reason: &str) {
        self.state.lock().unwrap().session_create_failure = Some(reason.to_string());
    }

    pub fn fail_unregister(&self) {
        self.state.lock().unwrap().fail_unregister = true;
    }

    pub fn fail_stop(&self) {
        self.state.lock().unwrap().fail_stop = true;
    }

    /// Sessions created from now on have no negotiated media channel.
    pub fn withhold_media(&self) {
        self.state.lock().unwrap().withhold_media = true;
    }

    pub fn registrations(&self) -> usize {
        self.state.lock().unwrap().registrations
    }

    pub fn unregisters(&self) -> usize {
        self.state.lock().unwrap().unregisters
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    /// Teardown calls as they reached the engine
    pub fn order(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().order.clone()
    }
}

impl SignalingEngine for FakeEngine {
    fn create_agent(
        &self,
        config: SignalingConfig,
        events: SignalingEvents,
    ) -> Result<Box<dyn SignalingAgent>> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        state.configs.push(config.clone());
        let attempt = match state.script.pop_front() {
            Some(attempt) => attempt,
            None => state.fallback.clone().unwrap_or(Attempt::Register),
        };
        if let Attempt::FailCreate(ref reason) = attempt {
            return Err(SipError::transport(reason.clone()));
        }
        state.events = Some(events.clone());

        Ok(Box::new(FakeAgent {
            config,
            attempt,
            events,
            engine: self.state.clone(),
        }))
    }
}

struct FakeAgent {
    config: SignalingConfig,
    attempt: Attempt,
    events: SignalingEvents,
    engine: Arc<Mutex<EngineState>>,
}

impl SignalingAgent for FakeAgent {
    fn config(&self) -> &SignalingConfig {
        &self.config
    }

    fn start(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Attempt::FailStart(ref reason) = self.attempt {
                return Err(SipError::transport(reason.clone()));
            }
            self.events.transport_connected();
            if self.attempt == Attempt::DropTransport {
                self.events.transport_disconnected(Some("WebSocket closed".to_string()));
            }
            Ok(())
        })
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut engine = self.engine.lock().unwrap();
            engine.stops += 1;
            engine.order.push("stop");
            if engine.fail_stop {
                return Err(SipError::transport("agent refused to stop"));
            }
            Ok(())
        })
    }

    fn create_registration(
        &mut self,
        options: RegistrationOptions,
    ) -> Result<Box<dyn RegistrationHandle>> {
        assert_eq!(options.expires, 300);
        assert_eq!(options.refresh_frequency, 90);
        Ok(Box::new(FakeRegistration {
            attempt: self.attempt.clone(),
            events: self.events.clone(),
            engine: self.engine.clone(),
        }))
    }

    fn create_session(
        &mut self,
        target: &str,
        options: SessionOptions,
        delegate: TrackDelegate,
    ) -> Result<Box<dyn OutboundSession>> {
        assert!(options.constraints.audio && !options.constraints.video);
        let mut engine = self.engine.lock().unwrap();
        if let Some(reason) = engine.session_create_failure.take() {
            return Err(SipError::Configuration(reason));
        }

        let (mut session, probe) = FakeSession::with_delegate(
            target.to_string(),
            Some(delegate),
            Some(self.events.clone()),
        );
        if engine.withhold_media {
            session.media = None;
        }
        if let Some(reason) = engine.next_invite_failure.take() {
            probe.fail_invite(&reason);
        }
        engine.sessions.push(probe);
        Ok(Box::new(TracedSession {
            inner: session,
            engine: self.engine.clone(),
        }))
    }
}

struct FakeRegistration {
    attempt: Attempt,
    events: SignalingEvents,
    engine: Arc<Mutex<EngineState>>,
}

impl RegistrationHandle for FakeRegistration {
    fn register(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.engine.lock().unwrap().registrations += 1;
            match self.attempt {
                Attempt::RejectRegister(ref reason) => Err(SipError::registration(reason.clone())),
                Attempt::TerminateRegistration => {
                    self.events.registration_state(RegistrationState::Terminated);
                    Ok(())
                }
                Attempt::Register => {
                    self.events.registration_state(RegistrationState::Registered);
                    Ok(())
                }
                _ => Ok(()),
            }
        })
    }

    fn unregister(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut engine = self.engine.lock().unwrap();
            engine.unregisters += 1;
            engine.order.push("unregister");
            if engine.fail_unregister {
                return Err(SipError::registration("registrar unreachable"));
            }
            Ok(())
        })
    }
}

// Records terminate ordering on the engine
struct TracedSession {
    inner: FakeSession,
    engine: Arc<Mutex<EngineState>>,
}

impl OutboundSession for TracedSession {
    fn invite(&mut self) -> BoxFuture<'_, Result<()>> {
        self.inner.invite()
    }

    fn terminate(&mut self) -> BoxFuture<'_, Result<()>> {
        self.engine.lock().unwrap().order.push("terminate");
        self.inner.terminate()
    }

    fn media_channel(&mut self) -> Option<&mut dyn MediaChannel> {
        self.inner.media_channel()
    }
}
