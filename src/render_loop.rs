//! The capture, infer, draw cycle.
//!
//! Each call to [`InferenceLoop::cycle`] pulls one frame, estimates poses,
//! and redraws the surface from scratch. Cycles never overlap: the caller
//! runs the next one only after the previous one has returned.

use crate::{
    capture::{VideoSource, VideoStream},
    config::{Algorithm, Config},
    draw::{draw_keypoints, draw_skeleton, Color, Surface},
    inference::{MultiPoseParams, PoseModel},
    keypoints::Pose,
    Result,
};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared "still mounted" token; cleared once to stop the loop for good
#[derive(Debug, Clone)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    /// A flag in the active state
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Request teardown; the loop stops at its next cycle
    pub fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for ActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// Why a cycle drew nothing
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Cycle requested before the loop was started
    NotRunning,
    /// Model or video source missing or not playable
    InferenceUnavailable(String),
    /// The stream had no frame ready
    NoFrame,
    /// Reading the frame or estimating poses failed
    EstimationFailed(String),
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The surface was redrawn
    Drawn {
        /// Poses returned by the model
        poses: usize,
        /// Keypoint circles drawn
        keypoints: usize,
        /// Skeleton segments drawn
        segments: usize,
    },
    /// Nothing was drawn; the loop continues
    Skipped(SkipReason),
    /// The active flag was cleared; the loop is over
    Stopped,
}

/// Everything a cycle needs from the configuration, resolved once
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub algorithm: Algorithm,
    pub flip_horizontal: bool,
    pub multi_pose: MultiPoseParams,
    pub min_pose_confidence: f32,
    pub min_part_confidence: f32,
    pub show_video: bool,
    pub show_points: bool,
    pub show_skeleton: bool,
    pub color: Color,
    pub line_width: u32,
}

impl RenderSettings {
    /// Resolve settings from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the skeleton color does not parse.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            algorithm: config.detection.algorithm,
            flip_horizontal: config.video.flip_horizontal,
            multi_pose: MultiPoseParams::from_config(config),
            min_pose_confidence: config.detection.min_pose_confidence,
            min_part_confidence: config.detection.min_part_confidence,
            show_video: config.display.show_video,
            show_points: config.display.show_points,
            show_skeleton: config.display.show_skeleton,
            color: config.skeleton_color()?,
            line_width: config.display.skeleton_line_width,
        })
    }
}

/// Paces the loop to the display refresh rate
pub trait FrameScheduler {
    /// Block until the next frame is due
    fn wait_for_next_frame(&mut self);
}

/// Sleeps so that frames start at most `fps` times per second
#[derive(Debug)]
pub struct FixedRateScheduler {
    period: Duration,
    last: Option<Instant>,
}

impl FixedRateScheduler {
    #[must_use]
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.max(1),
            last: None,
        }
    }
}

impl FrameScheduler for FixedRateScheduler {
    fn wait_for_next_frame(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.period {
                std::thread::sleep(self.period - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Running counters, reported at debug level once per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub drawn: u64,
    pub skipped: u64,
}

/// The render loop state machine
pub struct InferenceLoop {
    settings: RenderSettings,
    state: LoopState,
    active: ActiveFlag,
    stats: LoopStats,
    window_start: Instant,
    window_drawn: u64,
}

impl InferenceLoop {
    #[must_use]
    pub fn new(settings: RenderSettings, active: ActiveFlag) -> Self {
        Self {
            settings,
            state: LoopState::Idle,
            active,
            stats: LoopStats::default(),
            window_start: Instant::now(),
            window_drawn: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Idle to Running; no effect once stopped
    pub fn start(&mut self) {
        if self.state == LoopState::Idle {
            debug!("Render loop running");
            self.state = LoopState::Running;
            self.window_start = Instant::now();
        }
    }

    /// Run one capture, infer, draw cycle
    ///
    /// Missing inputs and estimation failures skip the cycle. Only surface
    /// failures are returned as errors.
    ///
    /// # Errors
    ///
    /// Propagates drawing errors from the surface.
    pub fn cycle<M, S, D>(
        &mut self,
        model: Option<&mut M>,
        video: Option<&mut VideoSource<S>>,
        surface: &mut D,
    ) -> Result<CycleOutcome>
    where
        M: PoseModel + ?Sized,
        S: VideoStream,
        D: Surface + ?Sized,
    {
        if !self.active.is_active() {
            if self.state != LoopState::Stopped {
                debug!("Render loop stopped after {} cycles", self.stats.cycles);
            }
            self.state = LoopState::Stopped;
            return Ok(CycleOutcome::Stopped);
        }
        if self.state != LoopState::Running {
            return Ok(self.skip(SkipReason::NotRunning));
        }
        self.stats.cycles += 1;

        let (Some(model), Some(video)) = (model, video) else {
            return Ok(self.skip(SkipReason::InferenceUnavailable(
                "model or video source missing".to_string(),
            )));
        };
        if !video.is_playable() {
            return Ok(self.skip(SkipReason::InferenceUnavailable(
                "video source not playable".to_string(),
            )));
        }

        let frame = match video.current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(self.skip(SkipReason::NoFrame)),
            Err(e) => {
                warn!("Failed to read frame: {}", e);
                return Ok(self.skip(SkipReason::EstimationFailed(e.to_string())));
            }
        };

        let poses = match self.estimate(model, &frame) {
            Ok(poses) => poses,
            Err(e) => {
                warn!("Pose estimation failed, skipping frame: {}", e);
                return Ok(self.skip(SkipReason::EstimationFailed(e.to_string())));
            }
        };

        surface.clear()?;
        if self.settings.show_video {
            surface.draw_video_mirrored(&frame)?;
        }

        let mut keypoints = 0;
        let mut segments = 0;
        for pose in poses.iter().filter(|p| p.score >= self.settings.min_pose_confidence) {
            if self.settings.show_points {
                keypoints += draw_keypoints(
                    &pose.keypoints,
                    self.settings.min_part_confidence,
                    self.settings.color,
                    surface,
                    1.0,
                )?;
            }
            if self.settings.show_skeleton {
                segments += draw_skeleton(
                    &pose.keypoints,
                    self.settings.min_part_confidence,
                    self.settings.color,
                    self.settings.line_width,
                    surface,
                    1.0,
                )?;
            }
        }

        self.stats.drawn += 1;
        self.report_rate();
        Ok(CycleOutcome::Drawn {
            poses: poses.len(),
            keypoints,
            segments,
        })
    }

    fn estimate<M: PoseModel + ?Sized>(&self, model: &mut M, frame: &opencv::core::Mat) -> Result<Vec<Pose>> {
        match self.settings.algorithm {
            Algorithm::SinglePose => Ok(vec![model.estimate_single(frame, self.settings.flip_horizontal)?]),
            Algorithm::MultiPose => {
                let mut poses = model.estimate_multiple(frame, &self.settings.multi_pose)?;
                poses.truncate(self.settings.multi_pose.max_detections);
                Ok(poses)
            }
        }
    }

    fn skip(&mut self, reason: SkipReason) -> CycleOutcome {
        debug!("Skipping cycle: {:?}", reason);
        self.stats.skipped += 1;
        CycleOutcome::Skipped(reason)
    }

    #[allow(clippy::cast_precision_loss)] // Frame counts are small
    fn report_rate(&mut self) {
        self.window_drawn += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            debug!("Rendering at {:.1} FPS", self.window_drawn as f64 / elapsed.as_secs_f64());
            self.window_start = Instant::now();
            self.window_drawn = 0;
        }
    }
}
