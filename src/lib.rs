//! Real-time human pose overlay for webcam video.
//!
//! Frames from a user-facing camera are run through PoseNet and the detected
//! keypoints and skeleton are drawn over a mirrored copy of the video:
//! - ONNX Runtime for PoseNet inference
//! - `OpenCV` for capture, drawing and display
//!
//! Each cycle of the render loop:
//! 1. Reads the current camera frame
//! 2. Estimates one pose, or several with non-max suppression
//! 3. Clears the canvas and draws the mirrored frame
//! 4. Draws keypoints and skeleton segments above the confidence thresholds
//!
//! # Examples
//!
//! ## Decoding model outputs
//!
//! ```no_run
//! use posenet_overlay::{config::{Config, ModelConfig}, inference::PoseModel, posenet::PoseNet};
//! use opencv::{imgcodecs, prelude::*};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let mut model = PoseNet::new("assets/posenet_mobilenet_v1.onnx", &ModelConfig::default(), 0.5)?;
//!
//! let image = imgcodecs::imread("person.jpg", imgcodecs::IMREAD_COLOR)?;
//! let pose = model.estimate_single(&image, config.video.flip_horizontal)?;
//! for keypoint in &pose.keypoints {
//!     println!("{}: ({:.1}, {:.1}) {:.2}", keypoint.part.name(), keypoint.position.x, keypoint.position.y, keypoint.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the overlay
//!
//! ```no_run
//! use posenet_overlay::{
//!     app::PoseNetApp,
//!     capture::{CameraDevice, OpenCvCamera},
//!     config::Config,
//!     draw::MatSurface,
//!     host::{self, HighGuiPresenter, HostMode},
//!     posenet::PoseNetLoader,
//!     render_loop::FixedRateScheduler,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let (width, height) = (config.video.width, config.video.height);
//! let fps = config.video.target_fps;
//!
//! let surface = MatSurface::new(width, height)?;
//! let camera = OpenCvCamera::new(CameraDevice::Index(0));
//! let mut app = PoseNetApp::new(config, PoseNetLoader, camera, surface)?;
//!
//! host::create_main_window(host::WINDOW_TITLE, HostMode::Development, width, height)?;
//! let mut presenter = HighGuiPresenter::new(host::WINDOW_TITLE, HostMode::Development, app.active_flag());
//!
//! app.mount()?;
//! app.run_until_stopped(&mut FixedRateScheduler::new(fps), &mut presenter)?;
//! app.unmount();
//! # Ok(())
//! # }
//! ```

/// Error types and result handling
pub mod error;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

/// Body parts, keypoints, poses and the skeleton adjacency tables
pub mod keypoints;

/// Drawing surface and keypoint/skeleton drawing helpers
pub mod draw;

/// Image preprocessing and numeric helpers
pub mod utils;

/// Pose estimation service interface
pub mod inference;

/// PoseNet model and output decoding
pub mod posenet;

/// Camera acquisition
pub mod capture;

/// The capture, infer, draw cycle
pub mod render_loop;

/// Lifecycle shell
pub mod app;

/// Main window management
pub mod host;

pub use error::{Error, Result};
