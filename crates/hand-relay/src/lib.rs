//! Relays palm positions from a camera-fed hand landmark detector.
//!
//! The landmark model itself is external: this crate acquires a camera stream, hands frames to a
//! [`LandmarkDetector`], reduces every detected hand to the center of its palm, and passes the
//! resulting [`PalmPosition`]s to a callback roughly 30 times per second.
//!
//! ```no_run
//! use hand_relay::{video::{sink::StreamSink, webcam::Webcam}, DetectorConfig, HandRelay};
//! # use hand_relay::{landmark::HandKeypoints, video::Frame, LandmarkDetector};
//! # struct MyModel;
//! # impl LandmarkDetector for MyModel {
//! #     fn estimate(&mut self, _: &Frame) -> anyhow::Result<Vec<HandKeypoints>> { Ok(Vec::new()) }
//! # }
//! # fn load_model(_: &DetectorConfig) -> anyhow::Result<MyModel> { Ok(MyModel) }
//!
//! let mut relay = HandRelay::new(Webcam::default(), load_model);
//! relay.initialize(StreamSink::new(), |hands| println!("{hands:?}"))?;
//! relay.start();
//! # Ok::<(), hand_relay::InitError>(())
//! ```
//!
//! # Coordinates
//!
//! Palm positions are in pixels of the configured capture resolution (640x480 by default), with
//! the X axis mirrored so that they match what a user sees when looking at their own camera
//! image. Y points down.
//!
//! # Environment Variables
//!
//! * `HAND_RELAY_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an
//!   explicit device name. If unset, the first device that supports a compatible image format
//!   will be used.
//!
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod detector;
pub mod landmark;
pub mod notify;
pub mod palm;
pub mod relay;
pub mod resolution;
pub mod ticker;
pub mod timer;
pub mod video;

pub use detector::{DetectorConfig, DetectorLoader, LandmarkDetector, ModelType};
pub use palm::PalmPosition;
pub use relay::{HandRelay, HandsCallback, InitError, RelayOptions, RelayState};
pub use resolution::Resolution;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this crate will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` can be used to override this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
