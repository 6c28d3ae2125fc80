//! Configuration management for the pose overlay application

use crate::{
    capture::ClientKind,
    constants::{
        DEFAULT_TARGET_FPS, DEFAULT_VIDEO_HEIGHT, DEFAULT_VIDEO_WIDTH, DESKTOP_MULTIPLIER, MOBILE_MULTIPLIER,
        RESNET_INPUT_RESOLUTION, VALID_OUTPUT_STRIDES,
    },
    draw::Color,
    utils::valid_input_resolution,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application configuration, fixed for the lifetime of a mounted app
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture configuration
    pub video: VideoConfig,

    /// Model architecture configuration
    pub model: ModelConfig,

    /// Pose detection parameters
    pub detection: DetectionConfig,

    /// Overlay display configuration
    pub display: DisplayConfig,

    /// Client classification override
    pub client: ClientConfig,
}

/// Capture and canvas dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Video and drawing surface width
    pub width: u32,

    /// Video and drawing surface height
    pub height: u32,

    /// Mirror estimated poses horizontally
    pub flip_horizontal: bool,

    /// Camera device index
    pub camera_index: i32,

    /// Display refresh rate driving the render loop
    pub target_fps: u32,
}

/// Network architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    MobileNetV1,
    ResNet50,
}

/// Fixed network input resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputResolution {
    pub width: u32,
    pub height: u32,
}

/// Model architecture parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Backbone architecture
    pub architecture: Architecture,

    /// Output stride the model was exported with
    pub output_stride: u32,

    /// Input resolution; derived from the frame and `image_scale_factor` when unset
    pub input_resolution: Option<InputResolution>,

    /// Width multiplier; chosen from the client kind when unset
    pub multiplier: Option<f32>,

    /// Path to the ONNX model file
    pub path: PathBuf,
}

/// Pose estimation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// One subject per frame
    #[serde(rename = "single-pose", alias = "single-subject")]
    SinglePose,
    /// Up to `max_pose_detections` subjects per frame
    #[serde(rename = "multi-pose", alias = "multi-subject")]
    MultiPose,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single-pose" | "single-subject" | "single" => Ok(Self::SinglePose),
            "multi-pose" | "multi-subject" | "multi" => Ok(Self::MultiPose),
            other => Err(Error::ConfigError(format!("Unknown algorithm: {other}"))),
        }
    }
}

/// Detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Single- or multi-subject estimation
    pub algorithm: Algorithm,

    /// Minimum overall pose score for a pose to be drawn
    pub min_pose_confidence: f32,

    /// Minimum keypoint score for a keypoint or segment end to be drawn
    pub min_part_confidence: f32,

    /// Upper bound on poses returned per frame in multi-pose mode
    pub max_pose_detections: usize,

    /// Non-max suppression radius in pixels
    pub nms_radius: f32,

    /// Fraction of the frame size fed to the network
    pub image_scale_factor: f32,
}

/// Overlay styling and visibility
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_video: bool,
    pub show_skeleton: bool,
    pub show_points: bool,

    /// CSS color name or `#rrggbb`
    pub skeleton_color: String,

    /// Segment stroke width in pixels
    pub skeleton_line_width: u32,

    /// Label shown while the model and camera are loading
    pub loading_text: String,
}

/// Client classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User-agent string to classify instead of the build target
    pub user_agent: Option<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIDEO_WIDTH,
            height: DEFAULT_VIDEO_HEIGHT,
            flip_horizontal: true,
            camera_index: 0,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::MobileNetV1,
            output_stride: 16,
            input_resolution: None,
            multiplier: None,
            path: PathBuf::from("assets/posenet_mobilenet_v1.onnx"),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::SinglePose,
            min_pose_confidence: 0.1,
            min_part_confidence: 0.5,
            max_pose_detections: 2,
            nms_radius: 20.0,
            image_scale_factor: 0.5,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_video: true,
            show_skeleton: true,
            show_points: true,
            skeleton_color: "aqua".to_string(),
            skeleton_line_width: 2,
            loading_text: "load posenet".to_string(),
        }
    }
}

impl ModelConfig {
    /// Width multiplier, falling back to the client-dependent default
    #[must_use]
    pub fn effective_multiplier(&self, client: ClientKind) -> f32 {
        self.multiplier.unwrap_or(match client {
            ClientKind::Mobile => MOBILE_MULTIPLIER,
            ClientKind::Desktop => DESKTOP_MULTIPLIER,
        })
    }

    /// Architecture default input size: fixed for ResNet50, frame-derived for MobileNet
    #[must_use]
    pub fn default_input_resolution(&self) -> Option<InputResolution> {
        match self.architecture {
            Architecture::ResNet50 => {
                let side = valid_input_resolution(RESNET_INPUT_RESOLUTION, self.output_stride);
                Some(InputResolution {
                    width: side,
                    height: side,
                })
            }
            Architecture::MobileNetV1 => None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::IoError(e.to_string()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| Error::IoError(e.to_string()))?;

        Ok(())
    }

    /// Parsed skeleton color
    pub fn skeleton_color(&self) -> Result<Color> {
        Color::parse(&self.display.skeleton_color)
    }

    /// Client kind, from the configured user agent or the build target
    #[must_use]
    pub fn client_kind(&self) -> ClientKind {
        match &self.client.user_agent {
            Some(ua) => ClientKind::from_user_agent(ua),
            None => ClientKind::detect(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(Error::ConfigError(
                "Video dimensions must be greater than 0".to_string(),
            ));
        }
        if self.video.target_fps == 0 {
            return Err(Error::ConfigError("Target FPS must be greater than 0".to_string()));
        }

        if !VALID_OUTPUT_STRIDES.contains(&self.model.output_stride) {
            return Err(Error::ConfigError(format!(
                "Output stride must be one of {:?}, got {}",
                VALID_OUTPUT_STRIDES, self.model.output_stride
            )));
        }
        if let Some(multiplier) = self.model.multiplier {
            if multiplier <= 0.0 {
                return Err(Error::ConfigError("Multiplier must be positive".to_string()));
            }
        }
        if let Some(resolution) = self.model.input_resolution {
            if resolution.width == 0 || resolution.height == 0 {
                return Err(Error::ConfigError(
                    "Input resolution must be greater than 0".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.detection.min_pose_confidence) {
            return Err(Error::ConfigError(
                "Pose confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.min_part_confidence) {
            return Err(Error::ConfigError(
                "Part confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.detection.max_pose_detections == 0 {
            return Err(Error::ConfigError(
                "Max pose detections must be greater than 0".to_string(),
            ));
        }
        if self.detection.nms_radius < 0.0 {
            return Err(Error::ConfigError("NMS radius must not be negative".to_string()));
        }
        if !(self.detection.image_scale_factor > 0.0 && self.detection.image_scale_factor <= 1.0) {
            return Err(Error::ConfigError(
                "Image scale factor must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.display.skeleton_line_width == 0 {
            return Err(Error::ConfigError(
                "Skeleton line width must be greater than 0".to_string(),
            ));
        }
        self.skeleton_color()?;

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# PoseNet overlay configuration

video:
  width: 600
  height: 500
  flip_horizontal: true
  camera_index: 0
  target_fps: 60

model:
  architecture: MobileNetV1
  output_stride: 16
  # input_resolution: { width: 513, height: 513 }
  # multiplier: 1.01
  path: "assets/posenet_mobilenet_v1.onnx"

detection:
  algorithm: "single-pose"
  min_pose_confidence: 0.1
  min_part_confidence: 0.5
  max_pose_detections: 2
  nms_radius: 20.0
  image_scale_factor: 0.5

display:
  show_video: true
  show_skeleton: true
  show_points: true
  skeleton_color: "aqua"
  skeleton_line_width: 2
  loading_text: "load posenet"

client:
  # e.g. "Mozilla/5.0 (Linux; Android 14)" to force the mobile profile
  user_agent: null
"#;
