//! Constants used throughout the application

/// Number of body-part keypoints produced by PoseNet
pub const NUM_KEYPOINTS: usize = 17;

/// Number of parent/child edges used for multi-pose traversal
pub const NUM_POSE_EDGES: usize = 16;

/// Default capture dimensions
pub const DEFAULT_VIDEO_WIDTH: u32 = 600;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 500;

/// Radius of the filled circle drawn for each keypoint
pub const KEYPOINT_RADIUS: f32 = 3.0;

/// Architecture width multipliers
pub const DESKTOP_MULTIPLIER: f32 = 1.01;
pub const MOBILE_MULTIPLIER: f32 = 0.50;

/// ResNet50 input resolution before snapping to the output stride
pub const RESNET_INPUT_RESOLUTION: u32 = 500;

/// Output strides the model family supports
pub const VALID_OUTPUT_STRIDES: [u32; 3] = [8, 16, 32];

/// MobileNet input normalization: `x / 127.5 - 1`
pub const MOBILENET_NORMALIZATION_SCALE: f32 = 127.5;

/// ResNet50 per-channel ImageNet mean (RGB), added to raw pixel values
pub const RESNET_IMAGENET_MEAN: [f32; 3] = [-123.15, -115.90, -103.06];

/// Local maximum search radius when building the multi-pose part queue
pub const LOCAL_MAXIMUM_RADIUS: usize = 1;

/// Offset refinement steps when traversing to a target keypoint
pub const OFFSET_REFINE_STEPS: usize = 2;

/// Seconds to wait for a freshly opened camera to deliver its first frame
pub const CAMERA_METADATA_TIMEOUT_SECS: u64 = 5;

/// Default display refresh rate
pub const DEFAULT_TARGET_FPS: u32 = 60;
