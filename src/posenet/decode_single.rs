//! Single-pose decoding: one keypoint per part at the heatmap maximum.

use super::PoseNetOutputs;
use crate::{
    constants::NUM_KEYPOINTS,
    keypoints::{BodyPart, Keypoint, Pose},
};

/// Decode the single most likely pose
///
/// Each part is placed at its highest-scoring cell, refined by the offset at
/// that cell. The pose score is the mean keypoint score.
#[must_use]
#[allow(clippy::cast_precision_loss)] // NUM_KEYPOINTS is tiny
pub fn decode_single_pose(outputs: &PoseNetOutputs) -> Pose {
    let (height, width) = outputs.grid();

    let keypoints: Vec<Keypoint> = BodyPart::ALL
        .iter()
        .map(|&part| {
            let mut best = (0, 0, f32::NEG_INFINITY);
            for y in 0..height {
                for x in 0..width {
                    let score = outputs.score(y, x, part);
                    if score > best.2 {
                        best = (y, x, score);
                    }
                }
            }
            let (y, x, score) = best;
            let position = outputs.image_coords(y, x, part);
            Keypoint {
                part,
                position,
                score,
            }
        })
        .collect();

    let score = keypoints.iter().map(|k| k.score).sum::<f32>() / NUM_KEYPOINTS as f32;
    Pose::new(score, keypoints)
}
