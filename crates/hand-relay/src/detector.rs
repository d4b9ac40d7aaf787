//! Interface to external hand landmark detection models.
//!
//! The relay doesn't estimate landmarks itself. A [`DetectorLoader`] creates a
//! [`LandmarkDetector`] from a [`DetectorConfig`], and the detector is then asked for the hand
//! keypoints of each frame.

use std::fmt;

use crate::landmark::HandKeypoints;
use crate::video::Frame;

/// Fidelity tier of the hand landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Smaller and faster, but less accurate model.
    Lite,
    /// The full-size model.
    Full,
}

impl Default for ModelType {
    #[inline]
    fn default() -> Self {
        Self::Full
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelType::Lite => "lite",
            ModelType::Full => "full",
        })
    }
}

/// Configuration passed to a [`DetectorLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    runtime: String,
    asset_path: String,
    max_hands: usize,
    model_type: ModelType,
}

impl DetectorConfig {
    pub const DEFAULT_RUNTIME: &'static str = "mediapipe";
    pub const DEFAULT_ASSET_PATH: &'static str = "https://cdn.jsdelivr.net/npm/@mediapipe/hands";
    pub const DEFAULT_MAX_HANDS: usize = 2;

    /// Sets the identifier of the runtime the model should be executed with.
    #[inline]
    pub fn runtime(self, runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            ..self
        }
    }

    /// Sets the location the loader fetches the model's supporting assets from.
    #[inline]
    pub fn asset_path(self, asset_path: impl Into<String>) -> Self {
        Self {
            asset_path: asset_path.into(),
            ..self
        }
    }

    /// Sets the maximum number of hands the detector should report per frame.
    #[inline]
    pub fn max_hands(self, max_hands: usize) -> Self {
        Self { max_hands, ..self }
    }

    #[inline]
    pub fn model_type(self, model_type: ModelType) -> Self {
        Self { model_type, ..self }
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime
    }

    pub fn asset_location(&self) -> &str {
        &self.asset_path
    }

    pub fn hand_limit(&self) -> usize {
        self.max_hands
    }

    pub fn model(&self) -> ModelType {
        self.model_type
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            runtime: Self::DEFAULT_RUNTIME.into(),
            asset_path: Self::DEFAULT_ASSET_PATH.into(),
            max_hands: Self::DEFAULT_MAX_HANDS,
            model_type: ModelType::Full,
        }
    }
}

/// A loaded hand landmark model.
pub trait LandmarkDetector: Send {
    /// Estimates the keypoints of all hands visible in `frame`.
    ///
    /// Hands are returned in the model's own order, which carries no identity across frames.
    fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<HandKeypoints>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<HandKeypoints>> {
        (**self).estimate(frame)
    }
}

/// Creates [`LandmarkDetector`]s.
///
/// Loading may block for a long time, for example while model assets are downloaded.
///
/// This is implemented for closures taking a `&DetectorConfig` and returning a detector.
pub trait DetectorLoader: Send {
    fn load(&self, config: &DetectorConfig) -> anyhow::Result<Box<dyn LandmarkDetector>>;
}

impl<F, D> DetectorLoader for F
where
    F: Fn(&DetectorConfig) -> anyhow::Result<D> + Send,
    D: LandmarkDetector + 'static,
{
    fn load(&self, config: &DetectorConfig) -> anyhow::Result<Box<dyn LandmarkDetector>> {
        let detector = self(config)?;
        Ok(Box::new(detector))
    }
}
