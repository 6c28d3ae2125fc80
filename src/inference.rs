//! Pose estimation service interface.
//!
//! The render loop only talks to these traits, so any backend that turns a
//! frame into poses can drive it.

use crate::{config::Config, keypoints::Pose, Result};
use opencv::core::Mat;

/// Per-call options for multi-pose estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiPoseParams {
    /// Mirror returned poses horizontally
    pub flip_horizontal: bool,
    /// Upper bound on returned poses
    pub max_detections: usize,
    /// Minimum part score for a pose root
    pub score_threshold: f32,
    /// Non-max suppression radius in network input pixels
    pub nms_radius: f32,
}

impl MultiPoseParams {
    /// Options derived from the application configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            flip_horizontal: config.video.flip_horizontal,
            max_detections: config.detection.max_pose_detections,
            score_threshold: config.detection.min_part_confidence,
            nms_radius: config.detection.nms_radius,
        }
    }
}

/// A loaded pose estimation model
pub trait PoseModel {
    /// Estimate the single most likely pose in a frame
    fn estimate_single(&mut self, frame: &Mat, flip_horizontal: bool) -> Result<Pose>;

    /// Estimate up to `params.max_detections` poses in a frame
    fn estimate_multiple(&mut self, frame: &Mat, params: &MultiPoseParams) -> Result<Vec<Pose>>;
}

/// Creates a model from configuration
pub trait ModelLoader {
    type Model: PoseModel;

    /// Load the model; called once per mount
    fn load(&self, config: &Config) -> Result<Self::Model>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_config() {
        let mut config = Config::default();
        config.detection.max_pose_detections = 4;
        config.detection.nms_radius = 30.0;
        config.video.flip_horizontal = false;

        let params = MultiPoseParams::from_config(&config);

        assert_eq!(params.max_detections, 4);
        assert_eq!(params.score_threshold, config.detection.min_part_confidence);
        assert_eq!(params.nms_radius, 30.0);
        assert!(!params.flip_horizontal);
    }
}
