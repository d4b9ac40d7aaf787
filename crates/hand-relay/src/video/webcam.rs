//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::{cmp::Reverse, env};

use anyhow::{bail, Context};
use image::ImageFormat;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use super::{Camera, Frame, VideoStream};
use crate::resolution::Resolution;
use crate::timer::{FpsCounter, Timer};

const ENV_VAR_WEBCAM_NAME: &str = "HAND_RELAY_WEBCAM_NAME";

/// Device selection options for [`Webcam`].
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    fps: Option<u32>,
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, requesting a stream will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the minimum frame rate the webcam should deliver.
    #[inline]
    pub fn fps(self, fps: u32) -> Self {
        Self {
            fps: Some(fps),
            ..self
        }
    }
}

/// A V4L2 webcam, usable as the relay's [`Camera`].
#[derive(Debug, Default)]
pub struct Webcam {
    options: WebcamOptions,
}

impl Webcam {
    pub fn new(options: WebcamOptions) -> Self {
        Self { options }
    }

    /// Opens the first supported webcam found, negotiating a format that covers `resolution`.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(&self, resolution: Resolution) -> anyhow::Result<WebcamStream> {
        let env_name = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &env_name {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
        }
        let name = self.options.name.as_deref().or(env_name.as_deref());

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match open_device(dev, name, resolution, self.options.fps) {
                    Ok(Some(stream)) => return Ok(stream),
                    Ok(None) => {}
                    Err(e) => log::debug!("{e}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }
}

impl Camera for Webcam {
    fn request_stream(&mut self, constraints: Resolution) -> anyhow::Result<Box<dyn VideoStream>> {
        let stream = self.open(constraints)?;
        Ok(Box::new(stream))
    }
}

fn open_device(
    dev: Device,
    name: Option<&str>,
    resolution: Resolution,
    fps: Option<u32>,
) -> anyhow::Result<Option<WebcamStream>> {
    let caps = dev.capabilities()?;
    if let Some(name) = name {
        if caps.card() != name {
            return Ok(None);
        }
    }

    let cap_flags = caps.device_capabilities();
    let path = dev.path()?;
    log::debug!(
        "device {} ({}) capabilities: {:?}",
        caps.card(),
        path.display(),
        cap_flags,
    );

    if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
        return Ok(None);
    }

    let (pixfmt, fract) = negotiate_format(&dev, resolution, fps)?;
    let capture = dev.video_capture(pixfmt)?;
    let format = capture.format();
    let negotiated = Resolution::new(format.width(), format.height());
    let actual = capture.set_frame_interval(fract)?;

    log::info!(
        "opened {} ({}), {} @ {:.1}Hz",
        caps.card(),
        path.display(),
        negotiated,
        1.0 / actual.as_f32(),
    );

    let stream = capture.into_stream()?;
    Ok(Some(WebcamStream {
        stream,
        resolution: negotiated,
        t_dequeue: Timer::new("dequeue"),
        t_decode: Timer::new("decode"),
        fps: FpsCounter::new(format!("webcam {}", caps.card())),
    }))
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(
    device: &Device,
    resolution: Resolution,
    fps: Option<u32>,
) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let fmt = pick_format(&formats, resolution, fps)
        .context("failed to negotiate a webcam format")?;
    log::debug!(
        "negotiated {} @ {:.1}Hz for requested {}",
        fmt.resolution,
        1.0 / fmt.frame_interval.as_f32(),
        resolution,
    );
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks the smallest format covering `resolution` at the highest frame rate, falling back to the
/// largest format if none is large enough.
///
/// If `fps` is given, formats below that rate are only used when nothing else is available.
fn pick_format(
    formats: &[FrameFormat],
    resolution: Resolution,
    fps: Option<u32>,
) -> Option<FrameFormat> {
    let fast_enough = |fmt: &&FrameFormat| {
        fps.map_or(true, |fps| {
            (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
        })
    };
    let candidates = if formats.iter().any(|fmt| fast_enough(&fmt)) {
        formats.iter().filter(fast_enough).copied().collect::<Vec<_>>()
    } else {
        formats.to_vec()
    };

    let covering = candidates
        .iter()
        .filter(|fmt| fmt.resolution.covers(resolution))
        .min_by_key(|fmt| (fmt.resolution.num_pixels(), fmt.frame_interval));
    covering.copied().or_else(|| {
        candidates
            .iter()
            .max_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)))
            .copied()
    })
}

/// A stream of frames captured by a [`Webcam`].
pub struct WebcamStream {
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
    fps: FpsCounter,
}

impl VideoStream for WebcamStream {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn read(&mut self) -> anyhow::Result<Frame> {
        let dequeue_guard = self.t_dequeue.start();
        let t_decode = &self.t_decode;
        let decoded = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            Ok(t_decode.time(|| image::load_from_memory_with_format(&buf, ImageFormat::Jpeg)))
        })?;
        self.fps.tick_with([&self.t_dequeue, &self.t_decode]);

        // Even good webcams produce the occasional corrupted MJPG frame. The error is reported to
        // the caller, which skips the frame.
        let image = decoded.context("webcam decode error")?;
        Ok(Frame::new(image.into_rgb8()))
    }
}
