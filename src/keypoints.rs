//! Body-part keypoints, pose results, and the skeleton adjacency tables.

use crate::constants::NUM_KEYPOINTS;
use opencv::core::Point2f;

/// Body parts in the order PoseNet emits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    /// All parts, indexed by their heatmap channel
    pub const ALL: [BodyPart; NUM_KEYPOINTS] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    /// Heatmap channel of this part
    #[must_use]
    pub fn id(self) -> usize {
        self as usize
    }

    /// Part for a heatmap channel
    #[must_use]
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Canonical camelCase name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BodyPart::Nose => "nose",
            BodyPart::LeftEye => "leftEye",
            BodyPart::RightEye => "rightEye",
            BodyPart::LeftEar => "leftEar",
            BodyPart::RightEar => "rightEar",
            BodyPart::LeftShoulder => "leftShoulder",
            BodyPart::RightShoulder => "rightShoulder",
            BodyPart::LeftElbow => "leftElbow",
            BodyPart::RightElbow => "rightElbow",
            BodyPart::LeftWrist => "leftWrist",
            BodyPart::RightWrist => "rightWrist",
            BodyPart::LeftHip => "leftHip",
            BodyPart::RightHip => "rightHip",
            BodyPart::LeftKnee => "leftKnee",
            BodyPart::RightKnee => "rightKnee",
            BodyPart::LeftAnkle => "leftAnkle",
            BodyPart::RightAnkle => "rightAnkle",
        }
    }
}

/// A body-part location with its own confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub part: BodyPart,
    pub position: Point2f,
    pub score: f32,
}

impl Keypoint {
    #[must_use]
    pub fn new(part: BodyPart, x: f32, y: f32, score: f32) -> Self {
        Self {
            part,
            position: Point2f::new(x, y),
            score,
        }
    }
}

/// One detected subject: overall score plus keypoints in `BodyPart::ALL` order
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    #[must_use]
    pub fn new(score: f32, keypoints: Vec<Keypoint>) -> Self {
        Self { score, keypoints }
    }

    /// Keypoint for a given part, if present
    #[must_use]
    pub fn keypoint(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.part == part)
    }

    /// Scale all positions, e.g. from model input space to frame space
    pub fn scale(&mut self, scale_x: f32, scale_y: f32) {
        for keypoint in &mut self.keypoints {
            keypoint.position.x *= scale_x;
            keypoint.position.y *= scale_y;
        }
    }

    /// Mirror all positions around the vertical axis of an image `width` pixels wide
    pub fn flip_horizontal(&mut self, width: f32) {
        for keypoint in &mut self.keypoints {
            keypoint.position.x = width - 1.0 - keypoint.position.x;
        }
    }
}

/// Pairs connected by a skeleton segment when drawing
pub const CONNECTED_PARTS: [(BodyPart, BodyPart); 12] = [
    (BodyPart::LeftHip, BodyPart::LeftShoulder),
    (BodyPart::LeftElbow, BodyPart::LeftShoulder),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightShoulder),
    (BodyPart::RightElbow, BodyPart::RightShoulder),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftHip, BodyPart::RightHip),
];

/// Parent/child tree rooted at the nose, walked during multi-pose decoding
pub const POSE_CHAIN: [(BodyPart, BodyPart); crate::constants::NUM_POSE_EDGES] = [
    (BodyPart::Nose, BodyPart::LeftEye),
    (BodyPart::LeftEye, BodyPart::LeftEar),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::RightEye, BodyPart::RightEar),
    (BodyPart::Nose, BodyPart::LeftShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::Nose, BodyPart::RightShoulder),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

/// Keypoint pairs to connect, skipping any pair with an end below `min_confidence`
#[must_use]
pub fn adjacent_keypoints(keypoints: &[Keypoint], min_confidence: f32) -> Vec<(Keypoint, Keypoint)> {
    CONNECTED_PARTS
        .iter()
        .filter_map(|&(a, b)| {
            let first = keypoints.iter().find(|k| k.part == a)?;
            let second = keypoints.iter().find(|k| k.part == b)?;
            if first.score < min_confidence || second.score < min_confidence {
                return None;
            }
            Some((*first, *second))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_pose(score: f32) -> Vec<Keypoint> {
        BodyPart::ALL
            .iter()
            .enumerate()
            .map(|(i, &part)| Keypoint::new(part, i as f32, i as f32 * 2.0, score))
            .collect()
    }

    #[test]
    fn test_part_ids_match_order() {
        for (i, part) in BodyPart::ALL.iter().enumerate() {
            assert_eq!(part.id(), i);
            assert_eq!(BodyPart::from_id(i), Some(*part));
        }
        assert_eq!(BodyPart::from_id(NUM_KEYPOINTS), None);
        assert_eq!(BodyPart::RightAnkle.name(), "rightAnkle");
    }

    #[test]
    fn test_pose_chain_is_a_tree_rooted_at_nose() {
        // Every part except the nose is a child exactly once
        for part in BodyPart::ALL.iter().skip(1) {
            let count = POSE_CHAIN.iter().filter(|(_, child)| child == part).count();
            assert_eq!(count, 1, "{} should have one parent", part.name());
        }
        assert!(POSE_CHAIN.iter().all(|(_, child)| *child != BodyPart::Nose));
    }

    #[test]
    fn test_adjacent_keypoints_all_confident() {
        let keypoints = full_pose(0.9);
        assert_eq!(adjacent_keypoints(&keypoints, 0.5).len(), CONNECTED_PARTS.len());
    }

    #[test]
    fn test_adjacent_keypoints_drops_low_confidence_endpoint() {
        let mut keypoints = full_pose(0.9);
        keypoints[BodyPart::LeftShoulder.id()].score = 0.1;

        let pairs = adjacent_keypoints(&keypoints, 0.5);
        // Left shoulder appears in three connections
        assert_eq!(pairs.len(), CONNECTED_PARTS.len() - 3);
        assert!(pairs
            .iter()
            .all(|(a, b)| a.part != BodyPart::LeftShoulder && b.part != BodyPart::LeftShoulder));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let keypoints = full_pose(0.5);
        assert_eq!(adjacent_keypoints(&keypoints, 0.5).len(), CONNECTED_PARTS.len());
    }

    #[test]
    fn test_flip_and_scale() {
        let mut pose = Pose::new(1.0, vec![Keypoint::new(BodyPart::Nose, 10.0, 20.0, 1.0)]);
        pose.scale(2.0, 0.5);
        assert_eq!(pose.keypoints[0].position, Point2f::new(20.0, 10.0));

        pose.flip_horizontal(100.0);
        assert_eq!(pose.keypoints[0].position.x, 79.0);
        assert!(pose.keypoint(BodyPart::Nose).is_some());
        assert!(pose.keypoint(BodyPart::LeftEye).is_none());
    }
}
