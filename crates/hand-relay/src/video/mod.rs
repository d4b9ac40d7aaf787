//! Camera access and video playback.
//!
//! A [`Camera`] hands out [`VideoStream`]s. The relay attaches the stream to a [`VideoSink`]
//! supplied by the caller, and the landmark detector is fed from whatever the sink is currently
//! showing.

pub mod sink;
pub mod webcam;

use image::RgbImage;

use crate::resolution::Resolution;

/// A single decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Creates an all-black frame of the given resolution.
    pub fn blank(res: Resolution) -> Self {
        Self::new(RgbImage::new(res.width(), res.height()))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// A live stream of camera frames.
pub trait VideoStream: Send {
    /// Returns the resolution the stream was negotiated at.
    fn resolution(&self) -> Resolution;

    /// Reads the next frame, blocking until one is available.
    fn read(&mut self) -> anyhow::Result<Frame>;
}

/// Source of camera streams.
pub trait Camera: Send {
    /// Requests access to a camera stream with (at least) the given resolution.
    ///
    /// This can block for a significant amount of time and fails if no camera is available or
    /// access to it is denied.
    fn request_stream(&mut self, constraints: Resolution) -> anyhow::Result<Box<dyn VideoStream>>;
}

/// A video playback target that a camera stream can be bound to.
pub trait VideoSink: Send {
    /// Binds `stream` to this sink, replacing any previously attached stream.
    fn attach(&mut self, stream: Box<dyn VideoStream>);

    /// Starts playback and blocks until the attached stream is delivering frames.
    fn play(&mut self) -> anyhow::Result<()>;

    /// Returns the frame that is currently being played.
    fn current_frame(&mut self) -> anyhow::Result<Frame>;
}
