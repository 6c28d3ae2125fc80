//! Multi-pose decoding.
//!
//! Candidate roots are heatmap local maxima, visited strongest first. A root
//! too close to the same part of an already decoded pose is dropped. Each
//! accepted root grows a full skeleton by following the displacement fields
//! along the pose chain, first towards the nose and then out to the limbs.

use super::PoseNetOutputs;
use crate::{
    constants::{LOCAL_MAXIMUM_RADIUS, NUM_KEYPOINTS, OFFSET_REFINE_STEPS},
    keypoints::{BodyPart, Keypoint, Pose, POSE_CHAIN},
    utils::safe_cast::f32_to_index_clamp,
};
use ndarray::Array3;
use opencv::core::Point2f;

/// A heatmap local maximum that may seed a pose
#[derive(Debug, Clone, Copy)]
struct PartCandidate {
    score: f32,
    part: BodyPart,
    y: usize,
    x: usize,
}

fn squared_distance(a: Point2f, b: Point2f) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

fn is_local_maximum(outputs: &PoseNetOutputs, candidate: &PartCandidate, radius: usize) -> bool {
    let (height, width) = outputs.grid();
    let y_range = candidate.y.saturating_sub(radius)..=(candidate.y + radius).min(height - 1);
    for y in y_range {
        let x_range = candidate.x.saturating_sub(radius)..=(candidate.x + radius).min(width - 1);
        for x in x_range {
            if outputs.score(y, x, candidate.part) > candidate.score {
                return false;
            }
        }
    }
    true
}

/// Local maxima scoring at least `threshold`, strongest first
fn build_part_queue(outputs: &PoseNetOutputs, threshold: f32) -> Vec<PartCandidate> {
    let (height, width) = outputs.grid();
    let mut queue = Vec::new();

    for y in 0..height {
        for x in 0..width {
            for part in BodyPart::ALL {
                let score = outputs.score(y, x, part);
                if score < threshold {
                    continue;
                }
                let candidate = PartCandidate { score, part, y, x };
                if is_local_maximum(outputs, &candidate, LOCAL_MAXIMUM_RADIUS) {
                    queue.push(candidate);
                }
            }
        }
    }

    queue.sort_by(|a, b| b.score.total_cmp(&a.score));
    queue
}

/// Grid cell nearest an image-space point
#[allow(clippy::cast_precision_loss)] // Stride is small
fn strided_index(point: Point2f, outputs: &PoseNetOutputs) -> (usize, usize) {
    let (height, width) = outputs.grid();
    let stride = outputs.output_stride as f32;
    (
        f32_to_index_clamp(point.y / stride, height),
        f32_to_index_clamp(point.x / stride, width),
    )
}

fn displacement(displacements: &Array3<f32>, edge: usize, y: usize, x: usize) -> Point2f {
    let edges = POSE_CHAIN.len();
    Point2f::new(displacements[[y, x, edge + edges]], displacements[[y, x, edge]])
}

/// Follow one chain edge from a decoded keypoint to the target part
#[allow(clippy::cast_precision_loss)] // Grid sizes are small
fn traverse_to_target(
    outputs: &PoseNetOutputs,
    edge: usize,
    source: &Keypoint,
    target: BodyPart,
    displacements: &Array3<f32>,
) -> Keypoint {
    let stride = outputs.output_stride as f32;
    let (sy, sx) = strided_index(source.position, outputs);
    let d = displacement(displacements, edge, sy, sx);

    let mut position = Point2f::new(source.position.x + d.x, source.position.y + d.y);
    for _ in 0..OFFSET_REFINE_STEPS {
        let (ty, tx) = strided_index(position, outputs);
        let offset = outputs.offset(ty, tx, target);
        position = Point2f::new(tx as f32 * stride + offset.x, ty as f32 * stride + offset.y);
    }

    let (ty, tx) = strided_index(position, outputs);
    Keypoint {
        part: target,
        position,
        score: outputs.score(ty, tx, target),
    }
}

/// Grow a full skeleton from a root keypoint
fn decode_pose(outputs: &PoseNetOutputs, root: &PartCandidate, root_position: Point2f) -> Vec<Keypoint> {
    let mut instance: [Option<Keypoint>; NUM_KEYPOINTS] = [None; NUM_KEYPOINTS];
    instance[root.part.id()] = Some(Keypoint {
        part: root.part,
        position: root_position,
        score: root.score,
    });

    // Towards the root of the chain
    for edge in (0..POSE_CHAIN.len()).rev() {
        let (parent, child) = POSE_CHAIN[edge];
        if let (Some(source), None) = (instance[child.id()], instance[parent.id()]) {
            instance[parent.id()] = Some(traverse_to_target(
                outputs,
                edge,
                &source,
                parent,
                &outputs.displacements_bwd,
            ));
        }
    }

    // Out to the leaves
    for (edge, &(parent, child)) in POSE_CHAIN.iter().enumerate() {
        if let (Some(source), None) = (instance[parent.id()], instance[child.id()]) {
            instance[child.id()] = Some(traverse_to_target(
                outputs,
                edge,
                &source,
                child,
                &outputs.displacements_fwd,
            ));
        }
    }

    instance.into_iter().flatten().collect()
}

fn within_nms_radius(poses: &[Pose], squared_radius: f32, point: Point2f, part: BodyPart) -> bool {
    poses.iter().any(|pose| {
        pose.keypoint(part)
            .is_some_and(|k| squared_distance(k.position, point) <= squared_radius)
    })
}

/// Mean keypoint score, ignoring keypoints that overlap an existing pose
#[allow(clippy::cast_precision_loss)] // Keypoint count is tiny
fn instance_score(poses: &[Pose], squared_radius: f32, keypoints: &[Keypoint]) -> f32 {
    let total: f32 = keypoints
        .iter()
        .filter(|k| !within_nms_radius(poses, squared_radius, k.position, k.part))
        .map(|k| k.score)
        .sum();
    total / keypoints.len().max(1) as f32
}

/// Decode up to `max_detections` poses
///
/// `score_threshold` gates which heatmap maxima may seed a pose; `nms_radius`
/// is in input-image pixels.
#[must_use]
pub fn decode_multiple_poses(
    outputs: &PoseNetOutputs,
    max_detections: usize,
    score_threshold: f32,
    nms_radius: f32,
) -> Vec<Pose> {
    let squared_radius = nms_radius * nms_radius;
    let mut poses: Vec<Pose> = Vec::new();

    for root in build_part_queue(outputs, score_threshold) {
        if poses.len() >= max_detections {
            break;
        }

        let root_position = outputs.image_coords(root.y, root.x, root.part);
        if within_nms_radius(&poses, squared_radius, root_position, root.part) {
            continue;
        }

        let keypoints = decode_pose(outputs, &root, root_position);
        let score = instance_score(&poses, squared_radius, &keypoints);
        poses.push(Pose::new(score, keypoints));
    }

    poses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posenet::test_support::blank_outputs;

    /// Place a strong peak for every part at one cell
    fn plant_person(outputs: &mut PoseNetOutputs, y: usize, x: usize, score: f32) {
        for part in BodyPart::ALL {
            outputs.heatmaps[[y, x, part.id()]] = score;
        }
    }

    #[test]
    fn test_no_candidates_below_threshold() {
        let outputs = blank_outputs(10, 10, 16, 0.2);
        assert!(decode_multiple_poses(&outputs, 5, 0.5, 20.0).is_empty());
    }

    #[test]
    fn test_two_separated_people() {
        let mut outputs = blank_outputs(20, 20, 16, 0.0);
        plant_person(&mut outputs, 3, 3, 0.9);
        plant_person(&mut outputs, 15, 15, 0.8);

        let poses = decode_multiple_poses(&outputs, 5, 0.5, 20.0);

        assert_eq!(poses.len(), 2);
        assert!(poses.iter().all(|p| p.keypoints.len() == NUM_KEYPOINTS));
        // Strongest root decoded first
        assert_eq!(poses[0].keypoints[0].position, Point2f::new(48.0, 48.0));
        assert!((poses[0].score - 0.9).abs() < 1e-5);
        assert_eq!(poses[1].keypoints[0].position, Point2f::new(240.0, 240.0));
    }

    #[test]
    fn test_max_detections_respected() {
        let mut outputs = blank_outputs(30, 30, 16, 0.0);
        plant_person(&mut outputs, 3, 3, 0.9);
        plant_person(&mut outputs, 15, 15, 0.8);
        plant_person(&mut outputs, 26, 26, 0.7);

        assert_eq!(decode_multiple_poses(&outputs, 2, 0.5, 20.0).len(), 2);
        assert_eq!(decode_multiple_poses(&outputs, 1, 0.5, 20.0).len(), 1);
    }

    #[test]
    fn test_nms_suppresses_nearby_roots() {
        let mut outputs = blank_outputs(10, 10, 16, 0.0);
        // Two nose peaks two cells apart, both local maxima (radius 1)
        outputs.heatmaps[[4, 2, BodyPart::Nose.id()]] = 0.9;
        outputs.heatmaps[[4, 4, BodyPart::Nose.id()]] = 0.8;

        // 32px apart: suppressed with a 40px radius, kept with 20px
        assert_eq!(decode_multiple_poses(&outputs, 5, 0.5, 40.0).len(), 1);
        assert_eq!(decode_multiple_poses(&outputs, 5, 0.5, 20.0).len(), 2);
    }

    #[test]
    fn test_traversal_follows_displacements() {
        let mut outputs = blank_outputs(10, 10, 10, 0.0);
        outputs.heatmaps[[2, 2, BodyPart::Nose.id()]] = 0.9;
        outputs.heatmaps[[2, 5, BodyPart::LeftEye.id()]] = 0.7;

        // Edge 0 is nose -> leftEye; displace +30px in x from the nose cell
        let edges = POSE_CHAIN.len();
        outputs.displacements_fwd[[2, 2, edges]] = 30.0;

        let poses = decode_multiple_poses(&outputs, 1, 0.5, 20.0);
        let eye = poses[0].keypoint(BodyPart::LeftEye).unwrap();
        assert_eq!(eye.position, Point2f::new(50.0, 20.0));
        assert!((eye.score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_local_maximum_requires_no_stronger_neighbour() {
        let mut outputs = blank_outputs(5, 5, 16, 0.0);
        outputs.heatmaps[[2, 2, 0]] = 0.6;
        outputs.heatmaps[[2, 3, 0]] = 0.7;

        let queue = build_part_queue(&outputs, 0.5);
        assert_eq!(queue.len(), 1);
        assert_eq!((queue[0].y, queue[0].x), (2, 3));
    }
}
