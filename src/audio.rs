use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::{Logger, MediaKind, MediaStream, MediaTrack, Result};

/// Host facility that owns playback elements (an `<audio>` tag, a sound card
/// sink, ...).
pub trait PlaybackHost: Send + Sync {
    fn create_element(&self) -> Result<Box<dyn PlaybackElement>>;
}

pub trait PlaybackElement: Send + Sync {
    fn set_autoplay(&mut self, enabled: bool);
    fn set_plays_inline(&mut self, enabled: bool);
    fn set_source(&mut self, stream: Option<MediaStream>);
    /// Waits until the element can play, then asks it to play.
    fn play_when_ready(&mut self) -> BoxFuture<'static, Result<()>>;
    /// Detach the element from the host.
    fn remove(&mut self);
}

/// Owns the single remote-audio playback element.
///
/// `uninitialized -> ready -> uninitialized`; both transitions are idempotent.
pub struct AudioSink {
    host: Arc<dyn PlaybackHost>,
    element: Option<Box<dyn PlaybackElement>>,
    playback: Option<JoinHandle<()>>,
    logger: Arc<dyn Logger>,
}

impl AudioSink {
    pub fn new(host: Arc<dyn PlaybackHost>, logger: Arc<dyn Logger>) -> Self {
        AudioSink {
            host,
            element: None,
            playback: None,
            logger,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.element.is_some()
    }

    pub fn initialize(&mut self) -> Result<()> {
        if self.element.is_some() {
            return Ok(());
        }

        let mut element = self.host.create_element()?;
        element.set_autoplay(true);
        element.set_plays_inline(true);
        self.element = Some(element);
        self.logger.debug("Remote audio element created");
        Ok(())
    }

    /// Attach an inbound stream. Only element creation can fail here; a
    /// rejected `play` is logged as a warning and never reaches the caller.
    pub fn bind_track(&mut self, track: &MediaTrack, stream: &MediaStream) -> Result<()> {
        if self.element.is_none() {
            self.initialize()?;
        }

        if track.kind != MediaKind::Audio {
            self.logger.debug(&format!("Ignoring {:?} track {}", track.kind, track.id));
            return Ok(());
        }

        let Some(element) = self.element.as_mut() else {
            return Ok(());
        };
        element.set_source(Some(stream.clone()));
        let play = element.play_when_ready();

        if let Some(previous) = self.playback.take() {
            previous.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.logger.warn("Audio playback not started: no async runtime");
            return Ok(());
        };
        let logger = self.logger.clone();
        self.playback = Some(runtime.spawn(async move {
            if let Err(e) = play.await {
                logger.warn(&format!("Audio playback failed: {}", e));
            }
        }));

        self.logger.info(&format!("Bound remote stream {} to audio output", stream.id));
        Ok(())
    }

    pub fn cleanup(&mut self) {
        let Some(mut element) = self.element.take() else {
            return;
        };

        if let Some(playback) = self.playback.take() {
            playback.abort();
        }
        element.set_source(None);
        element.remove();
        self.logger.debug("Remote audio element removed");
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.cleanup();
    }
}
