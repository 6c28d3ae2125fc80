//! Camera acquisition.
//!
//! [`setup_camera`] asks a [`CameraBackend`] for a user-facing stream, binds
//! it to the [`VideoSource`] and returns once the first frame has arrived and
//! playback has started.

use crate::{Error, Result};
use log::{debug, info, warn};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Device class, which decides whether to pin the capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Phone or tablet
    Mobile,
    /// Everything else
    Desktop,
}

impl ClientKind {
    /// Classify a user-agent string
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        let android = ua.contains("android");
        let ios = ["iphone", "ipad", "ipod"].iter().any(|d| ua.contains(d));
        if android || ios {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    /// Classify the platform this binary was built for
    #[must_use]
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "android" | "ios" => Self::Mobile,
            _ => Self::Desktop,
        }
    }
}

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Front camera, facing the user
    User,
    /// Rear camera
    Environment,
}

/// What to ask the camera for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub facing_mode: FacingMode,
    /// Requested width; `None` lets the device choose
    pub width: Option<u32>,
    /// Requested height; `None` lets the device choose
    pub height: Option<u32>,
}

impl MediaConstraints {
    /// Front camera, no audio; exact size on desktop, device default on mobile
    #[must_use]
    pub fn for_client(client: ClientKind, width: u32, height: u32) -> Self {
        let (width, height) = match client {
            ClientKind::Mobile => (None, None),
            ClientKind::Desktop => (Some(width), Some(height)),
        };
        Self {
            audio: false,
            facing_mode: FacingMode::User,
            width,
            height,
        }
    }
}

/// A live frame source handed out by a [`CameraBackend`]
pub trait VideoStream {
    /// Block until the stream knows its format or `timeout` passes; returns readiness
    fn wait_for_metadata(&mut self, timeout: Duration) -> Result<bool>;

    /// Start delivering frames
    fn play(&mut self) -> Result<()>;

    /// Latest frame, or `None` when nothing is available right now
    fn read_frame(&mut self) -> Result<Option<Mat>>;

    /// Stop the stream and free the device
    fn release(&mut self) -> Result<()>;
}

/// Host camera capability
pub trait CameraBackend {
    type Stream: VideoStream;

    /// Whether the host can capture video at all
    fn is_available(&self) -> bool;

    /// Open a stream honoring `constraints` as far as the device allows
    fn open(&mut self, constraints: &MediaConstraints) -> Result<Self::Stream>;
}

/// Display-side handle for the camera stream, bound once per mount
pub struct VideoSource<S: VideoStream> {
    stream: Option<S>,
    width: u32,
    height: u32,
    playing: bool,
}

impl<S: VideoStream> VideoSource<S> {
    /// Unbound source with the configured dimensions
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            stream: None,
            width,
            height,
            playing: false,
        }
    }

    /// Configured dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Attach a stream
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a stream is already bound.
    pub fn bind(&mut self, stream: S) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::InvalidInput("Video source already has a stream".to_string()));
        }
        self.stream = Some(stream);
        Ok(())
    }

    /// Wait for stream metadata, then start playback
    ///
    /// # Errors
    ///
    /// Returns `CaptureUnavailable` if nothing is bound or metadata never arrives.
    pub fn start_when_ready(&mut self, timeout: Duration) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::CaptureUnavailable("No stream bound to the video source".to_string()))?;

        if !stream.wait_for_metadata(timeout)? {
            return Err(Error::CaptureUnavailable(format!(
                "Camera produced no frame within {} ms",
                timeout.as_millis()
            )));
        }
        stream.play()?;
        self.playing = true;
        Ok(())
    }

    /// True once a stream is bound and playing
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.playing && self.stream.is_some()
    }

    /// Current frame, or `None` when the source is not playable or has no new frame
    ///
    /// # Errors
    ///
    /// Propagates stream read failures.
    pub fn current_frame(&mut self) -> Result<Option<Mat>> {
        if !self.playing {
            return Ok(None);
        }
        match self.stream.as_mut() {
            Some(stream) => stream.read_frame(),
            None => Ok(None),
        }
    }

    /// Release the bound stream, if any
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.release() {
                warn!("Failed to release video stream: {}", e);
            }
        }
        self.playing = false;
    }
}

impl<S: VideoStream> Drop for VideoSource<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Acquire a camera stream and bind it to `video`
///
/// # Errors
///
/// Returns `CaptureUnavailable` when the backend has no camera capability,
/// the device cannot be opened, or no frame arrives within `timeout`.
pub fn setup_camera<C: CameraBackend>(
    backend: &mut C,
    video: &mut VideoSource<C::Stream>,
    client: ClientKind,
    timeout: Duration,
) -> Result<()> {
    if !backend.is_available() {
        return Err(Error::CaptureUnavailable(
            "Camera capture API not available on this host".to_string(),
        ));
    }

    let (width, height) = video.dimensions();
    let constraints = MediaConstraints::for_client(client, width, height);
    debug!("Requesting camera with {:?}", constraints);

    let stream = backend.open(&constraints).map_err(|e| match e {
        Error::CaptureUnavailable(_) => e,
        other => Error::CaptureUnavailable(other.to_string()),
    })?;

    video.bind(stream)?;
    if let Err(e) = video.start_when_ready(timeout) {
        video.release();
        return Err(e);
    }
    info!("Camera ready");
    Ok(())
}

/// Where an [`OpenCvCamera`] reads frames from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraDevice {
    /// Webcam index
    Index(i32),
    /// Video file, useful for replaying recordings
    File(PathBuf),
}

/// Camera backend over `OpenCV`'s `videoio`
pub struct OpenCvCamera {
    device: CameraDevice,
}

impl OpenCvCamera {
    #[must_use]
    pub fn new(device: CameraDevice) -> Self {
        Self { device }
    }
}

impl CameraBackend for OpenCvCamera {
    type Stream = OpenCvStream;

    fn is_available(&self) -> bool {
        match &self.device {
            CameraDevice::Index(_) => videoio::get_camera_backends()
                .map(|backends| !backends.is_empty())
                .unwrap_or(false),
            CameraDevice::File(path) => path.exists(),
        }
    }

    fn open(&mut self, constraints: &MediaConstraints) -> Result<OpenCvStream> {
        let mut capture = match &self.device {
            CameraDevice::Index(index) => {
                info!("Opening camera {}", index);
                if constraints.facing_mode != FacingMode::User {
                    debug!("Facing mode is not selectable through videoio, using camera {}", index);
                }
                let mut cap = VideoCapture::new(*index, videoio::CAP_ANY)?;
                if let Some(width) = constraints.width {
                    cap.set(CAP_PROP_FRAME_WIDTH, f64::from(width))?;
                }
                if let Some(height) = constraints.height {
                    cap.set(CAP_PROP_FRAME_HEIGHT, f64::from(height))?;
                }
                // Keep latency low: always read the newest frame
                cap.set(CAP_PROP_BUFFERSIZE, 1.0)?;
                cap
            }
            CameraDevice::File(path) => {
                info!("Opening video file: {}", path.display());
                VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?
            }
        };

        if !capture.is_opened()? {
            return Err(Error::capture_unavailable());
        }
        if constraints.audio {
            debug!("Audio capture requested but not supported, ignoring");
        }

        Ok(OpenCvStream {
            capture: Some(capture),
            pending: None,
        })
    }
}

/// Stream backed by a `VideoCapture`
pub struct OpenCvStream {
    capture: Option<VideoCapture>,
    pending: Option<Mat>,
}

impl OpenCvStream {
    fn grab(&mut self) -> Result<Option<Mat>> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };
        let mut frame = Mat::default();
        if !capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl VideoStream for OpenCvStream {
    fn wait_for_metadata(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.grab()? {
                debug!("First frame {}x{}", frame.cols(), frame.rows());
                self.pending = Some(frame);
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn play(&mut self) -> Result<()> {
        // videoio streams run from the moment they are opened
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Mat>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.grab()
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut capture) = self.capture.take() {
            capture.release()?;
        }
        Ok(())
    }
}
