//! A [`VideoSink`] that plays back an attached stream.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};

use super::{Frame, VideoSink, VideoStream};
use crate::ticker::Ticker;

/// How long playback pauses after the stream fails to deliver a frame.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// The outcome of the most recent read from the stream.
type Latest = Arc<Mutex<Option<anyhow::Result<Frame>>>>;

/// Plays an attached [`VideoStream`].
///
/// Once playing, a background thread keeps reading frames from the stream, so
/// [`VideoSink::current_frame`] always returns the newest frame, no matter how rarely it is called.
/// Frames that arrive between two calls are skipped.
#[derive(Default)]
pub struct StreamSink {
    /// The attached stream, until playback takes it over.
    stream: Option<Box<dyn VideoStream>>,
    latest: Latest,
    playback: Option<Ticker<Box<dyn VideoStream>>>,
}

impl StreamSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a stream is attached and [`VideoSink::play`] has succeeded since.
    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }
}

impl VideoSink for StreamSink {
    fn attach(&mut self, stream: Box<dyn VideoStream>) {
        log::debug!("attaching {} stream", stream.resolution());
        // Dropping the ticker stops the old playback thread, which keeps writing to the old slot
        // until its current read returns.
        self.playback = None;
        self.latest = Latest::default();
        self.stream = Some(stream);
    }

    fn play(&mut self) -> anyhow::Result<()> {
        if self.playback.is_some() {
            return Ok(());
        }
        let Some(stream) = &mut self.stream else {
            bail!("no stream attached");
        };
        let frame = stream.read().context("stream did not deliver a frame")?;
        *lock(&self.latest) = Some(Ok(frame));

        let Some(stream) = self.stream.take() else {
            bail!("no stream attached");
        };
        let latest = self.latest.clone();
        let playback = Ticker::spawn("video playback", Duration::ZERO, stream, move |stream, _| {
            let res = stream.read();
            if let Err(e) = &res {
                log::debug!("video stream error: {e:#}");
                thread::sleep(READ_ERROR_BACKOFF);
            }
            *lock(&latest) = Some(res);
        })
        .context("failed to spawn playback thread")?;
        self.playback = Some(playback);
        Ok(())
    }

    fn current_frame(&mut self) -> anyhow::Result<Frame> {
        if self.playback.is_none() {
            bail!("playback has not been started");
        }
        match &*lock(&self.latest) {
            Some(Ok(frame)) => Ok(frame.clone()),
            Some(Err(e)) => Err(anyhow!("{e:#}")),
            None => bail!("no frame available"),
        }
    }
}

fn lock(latest: &Latest) -> MutexGuard<'_, Option<anyhow::Result<Frame>>> {
    latest.lock().unwrap_or_else(|e| e.into_inner())
}
