//! The hand position relay.
//!
//! [`HandRelay`] acquires a camera stream, loads a landmark detector, and then polls the detector
//! on a background thread, turning every hand it reports into a [`PalmPosition`] that is passed to
//! a user-supplied callback.

use std::{
    any::Any,
    error::Error,
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    time::Duration,
};

use crate::{
    detector::{DetectorConfig, DetectorLoader, LandmarkDetector},
    notify::{LogNotifier, Notifier},
    palm::{palm_positions, PalmPosition},
    resolution::Resolution,
    ticker::{CancellationToken, Stopped, Ticker},
    timer::{FpsCounter, Timer},
    video::{Camera, VideoSink},
};

/// Callback receiving the palm positions of all hands detected in a frame.
pub type HandsCallback = Box<dyn FnMut(&[PalmPosition]) + Send>;

/// Configuration of a [`HandRelay`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    resolution: Resolution,
    tick_interval: Duration,
    detector: DetectorConfig,
}

impl RelayOptions {
    /// Delay between the end of one detection and the start of the next one (~30 per second).
    pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(33);

    /// Sets the resolution to request from the camera.
    ///
    /// The width is also used to mirror palm positions horizontally, regardless of the resolution
    /// the camera ends up delivering.
    #[inline]
    pub fn resolution(self, resolution: Resolution) -> Self {
        Self { resolution, ..self }
    }

    /// Sets the delay between detections.
    #[inline]
    pub fn tick_interval(self, tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..self
        }
    }

    /// Sets the configuration the landmark detector is loaded with.
    #[inline]
    pub fn detector(self, detector: DetectorConfig) -> Self {
        Self { detector, ..self }
    }

    pub fn capture_resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        &self.detector
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::RES_VGA,
            tick_interval: Self::DEFAULT_TICK_INTERVAL,
            detector: DetectorConfig::default(),
        }
    }
}

/// Error returned by [`HandRelay::initialize`], indicating which setup step failed.
#[derive(Debug)]
pub enum InitError {
    /// No camera is available, or access to it was denied.
    CameraAccess(anyhow::Error),
    /// The camera stream could not be played back.
    Playback(anyhow::Error),
    /// The landmark detection model failed to load.
    ModelLoad(anyhow::Error),
}

impl InitError {
    /// Returns the error reported by the failing collaborator.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            InitError::CameraAccess(e) | InitError::Playback(e) | InitError::ModelLoad(e) => e,
        }
    }

    /// Returns the message shown to the user when this error occurs.
    pub fn user_message(&self) -> &'static str {
        match self {
            InitError::CameraAccess(_) => {
                "Could not access webcam. Please ensure you have granted camera permissions."
            }
            InitError::Playback(_) => "Could not start the webcam video stream.",
            InitError::ModelLoad(_) => "Could not load the hand tracking model.",
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitError::CameraAccess(_) => "failed to access camera",
            InitError::Playback(_) => "failed to play camera stream",
            InitError::ModelLoad(_) => "failed to load landmark detector",
        })
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&**self.cause())
    }
}

/// Whether a [`HandRelay`] is currently polling its detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Polling,
}

/// Everything [`HandRelay::initialize`] sets up.
#[derive(Default)]
struct Session {
    detector: Option<Box<dyn LandmarkDetector>>,
    video: Option<Box<dyn VideoSink>>,
    on_hands: Option<HandsCallback>,
}

/// A [`Session`] that is complete enough to run detections, owned by the ticker thread.
struct Pipeline {
    detector: Box<dyn LandmarkDetector>,
    video: Box<dyn VideoSink>,
    on_hands: Option<HandsCallback>,
    frame_width: f32,
    t_estimate: Timer,
    fps: FpsCounter,
}

impl Pipeline {
    /// Returns the session back if it lacks a detector or video sink.
    fn new(session: Session, frame_width: f32) -> Result<Self, Session> {
        let Session {
            detector,
            video,
            on_hands,
        } = session;
        match (detector, video) {
            (Some(detector), Some(video)) => Ok(Self {
                detector,
                video,
                on_hands,
                frame_width,
                t_estimate: Timer::new("estimate"),
                fps: FpsCounter::new("hand relay"),
            }),
            (detector, video) => Err(Session {
                detector,
                video,
                on_hands,
            }),
        }
    }

    fn into_session(self) -> Session {
        Session {
            detector: Some(self.detector),
            video: Some(self.video),
            on_hands: self.on_hands,
        }
    }

    fn tick(&mut self, token: &CancellationToken) {
        let positions = match panic::catch_unwind(AssertUnwindSafe(|| self.detect())) {
            Ok(Ok(positions)) => positions,
            Ok(Err(e)) => {
                log::error!("error detecting hands: {e:#}");
                return;
            }
            Err(payload) => {
                log::error!("landmark detector panicked: {}", panic_message(&*payload));
                return;
            }
        };
        log::trace!("detected {} hand(s): {:?}", positions.len(), positions);

        // `stop` may have been called while the detector was busy, in which case nothing is
        // delivered. `stop` waits for a callback that is already running.
        let on_hands = &mut self.on_hands;
        let delivered = token.unless_cancelled(|| match on_hands {
            Some(on_hands) => panic::catch_unwind(AssertUnwindSafe(|| on_hands(&positions))),
            None => Ok(()),
        });
        match delivered {
            None => return,
            Some(Ok(())) => {}
            Some(Err(payload)) => {
                log::error!("hands callback panicked: {}", panic_message(&*payload));
            }
        }

        self.fps.tick_with([&self.t_estimate]);
    }

    fn detect(&mut self) -> anyhow::Result<Vec<PalmPosition>> {
        let frame = self.video.current_frame()?;
        let hands = self.t_estimate.time(|| self.detector.estimate(&frame))?;
        Ok(palm_positions(&hands, self.frame_width)?)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// Relays palm positions from a camera-fed landmark detector to a callback.
///
/// A relay is set up with [`HandRelay::initialize`], after which [`HandRelay::start`] and
/// [`HandRelay::stop`] control a background thread that runs a detection every
/// [`RelayOptions::tick_interval`]. Dropping the relay stops it.
pub struct HandRelay {
    camera: Box<dyn Camera>,
    loader: Box<dyn DetectorLoader>,
    notifier: Box<dyn Notifier>,
    options: RelayOptions,
    session: Session,
    ticker: Option<Ticker<Pipeline>>,
    /// A stopped loop that still owns the session, possibly finishing its last detection.
    stopping: Option<Stopped<Pipeline>>,
}

impl HandRelay {
    /// Creates a relay with the default [`RelayOptions`].
    pub fn new<C, L>(camera: C, loader: L) -> Self
    where
        C: Camera + 'static,
        L: DetectorLoader + 'static,
    {
        Self::with_options(camera, loader, RelayOptions::default())
    }

    pub fn with_options<C, L>(camera: C, loader: L, options: RelayOptions) -> Self
    where
        C: Camera + 'static,
        L: DetectorLoader + 'static,
    {
        Self {
            camera: Box::new(camera),
            loader: Box::new(loader),
            notifier: Box::new(LogNotifier),
            options,
            session: Session::default(),
            ticker: None,
            stopping: None,
        }
    }

    /// Replaces the [`Notifier`] used to tell the user about setup failures.
    ///
    /// By default, a [`LogNotifier`] is used.
    pub fn with_notifier<N: Notifier + 'static>(self, notifier: N) -> Self {
        Self {
            notifier: Box::new(notifier),
            ..self
        }
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    pub fn state(&self) -> RelayState {
        match &self.ticker {
            Some(ticker) if !ticker.is_finished() => RelayState::Polling,
            _ => RelayState::Idle,
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == RelayState::Polling
    }

    /// Returns whether a detector and video sink are available, so that [`HandRelay::start`]
    /// can begin polling.
    pub fn is_initialized(&self) -> bool {
        self.is_running()
            || self.stopping.is_some()
            || (self.session.detector.is_some() && self.session.video.is_some())
    }

    /// Sets up the camera stream and landmark detector.
    ///
    /// The camera stream is attached to `video`, and `on_hands` will be invoked with the palm
    /// positions detected in each frame once [`HandRelay::start`] is called.
    ///
    /// This blocks until the camera is delivering frames and the detector has been loaded. If the
    /// relay is running, it is stopped first, and the previous session is discarded without
    /// waiting for its last detection to finish.
    ///
    /// On failure, the user is notified and an error describing the failed step is returned. The
    /// video sink and callback stay registered, but the relay cannot be started until
    /// initialization succeeds.
    pub fn initialize<S, F>(&mut self, video: S, on_hands: F) -> Result<(), InitError>
    where
        S: VideoSink + 'static,
        F: FnMut(&[PalmPosition]) + Send + 'static,
    {
        self.stop();
        self.stopping = None;

        let mut video: Box<dyn VideoSink> = Box::new(video);
        self.session.detector = None;
        self.session.on_hands = Some(Box::new(on_hands));
        let result = self.acquire(&mut *video);
        self.session.video = Some(video);

        match result {
            Ok(detector) => {
                self.session.detector = Some(detector);
                log::info!("hand tracking initialized successfully");
                Ok(())
            }
            Err(e) => {
                log::error!("error setting up hand tracking: {e}: {:#}", e.cause());
                self.notifier.alert(e.user_message());
                Err(e)
            }
        }
    }

    fn acquire(&mut self, video: &mut dyn VideoSink) -> Result<Box<dyn LandmarkDetector>, InitError> {
        let resolution = self.options.resolution;
        let stream = self
            .camera
            .request_stream(resolution)
            .map_err(InitError::CameraAccess)?;
        log::debug!("requested {resolution} camera stream, got {}", stream.resolution());

        video.attach(stream);
        video.play().map_err(InitError::Playback)?;

        let config = &self.options.detector;
        log::debug!(
            "loading {} hand landmark model (runtime {}, up to {} hands)",
            config.model(),
            config.runtime_name(),
            config.hand_limit(),
        );
        self.loader.load(config).map_err(InitError::ModelLoad)
    }

    /// Starts polling the detector on a background thread.
    ///
    /// Does nothing if the relay is already running. If [`HandRelay::initialize`] hasn't
    /// succeeded yet, an error is logged and nothing else happens.
    ///
    /// After [`HandRelay::stop`], this waits for a detection that was still in progress to
    /// finish before polling resumes.
    pub fn start(&mut self) {
        if self.is_running() {
            log::debug!("hand tracking already running, ignoring start");
            return;
        }
        // The loop thread only exits on its own if it panicked.
        self.stop();
        self.reclaim();

        let session = mem::take(&mut self.session);
        let frame_width = self.options.resolution.width() as f32;
        let pipeline = match Pipeline::new(session, frame_width) {
            Ok(pipeline) => pipeline,
            Err(session) => {
                self.session = session;
                log::error!("hand tracking not initialized");
                return;
            }
        };

        match Ticker::spawn(
            "hand relay",
            self.options.tick_interval,
            pipeline,
            |pipeline, token| pipeline.tick(token),
        ) {
            Ok(ticker) => {
                log::debug!("hand tracking started");
                self.ticker = Some(ticker);
            }
            Err(e) => {
                log::error!("failed to spawn hand relay thread, relay must be re-initialized: {e}");
            }
        }
    }

    /// Stops polling the detector.
    ///
    /// This does not wait for a detection that is already in progress. That detection finishes in
    /// the background and its result is discarded. If the callback is running, this waits for it
    /// to return. Once this method returns, the callback will not be invoked again until the relay
    /// is restarted. Does nothing if the relay isn't running.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            self.stopping = Some(ticker.cancel());
            log::debug!("hand tracking stopped");
        }
    }

    /// Takes the session back from a stopped loop, waiting for it to exit.
    fn reclaim(&mut self) {
        let Some(stopped) = self.stopping.take() else {
            return;
        };
        match stopped.join() {
            Ok(pipeline) => self.session = pipeline.into_session(),
            Err(payload) => log::error!(
                "hand relay thread panicked, relay must be re-initialized: {}",
                panic_message(&*payload)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn default_options() {
        let options = RelayOptions::default();
        assert_eq!(options.capture_resolution(), Resolution::new(640, 480));
        assert_eq!(options.interval(), Duration::from_millis(33));
        assert_eq!(options.detector_config(), &DetectorConfig::default());

        let options = options
            .resolution(Resolution::RES_720P)
            .tick_interval(Duration::from_millis(10))
            .detector(DetectorConfig::default().max_hands(1));
        assert_eq!(options.capture_resolution().width(), 1280);
        assert_eq!(options.interval(), Duration::from_millis(10));
        assert_eq!(options.detector_config().hand_limit(), 1);
    }

    #[test]
    fn panic_messages() {
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static");
        let payload = panic::catch_unwind(|| panic!("formatted {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 1");
        let payload = panic::catch_unwind(|| panic::panic_any(7)).unwrap_err();
        assert_eq!(panic_message(&*payload), "Box<dyn Any>");
    }

    #[test]
    fn init_error_reporting() {
        let err = InitError::CameraAccess(anyhow!("permission denied"));
        assert_eq!(err.to_string(), "failed to access camera");
        assert_eq!(err.source().unwrap().to_string(), "permission denied");
        assert_eq!(
            err.user_message(),
            "Could not access webcam. Please ensure you have granted camera permissions."
        );

        let err = InitError::ModelLoad(anyhow!("404").context("fetching assets"));
        assert_eq!(err.to_string(), "failed to load landmark detector");
        assert_eq!(format!("{:#}", err.cause()), "fetching assets: 404");
        assert_ne!(
            err.user_message(),
            InitError::Playback(anyhow!("")).user_message()
        );
    }
}
