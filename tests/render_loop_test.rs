//! Render loop cycle behavior against fake models and a recording surface


use posenet_overlay::{
    capture::{setup_camera, ClientKind, VideoSource},
    config::{Algorithm, Config},
    keypoints::{BodyPart, CONNECTED_PARTS},
    render_loop::{ActiveFlag, CycleOutcome, InferenceLoop, LoopState, RenderSettings, SkipReason},
};
use proptest::prelude::*;
use std::time::Duration;
use test_helpers::{full_pose, test_config, DrawOp, FakeCamera, FakeModel, FakeStream, RecordingSurface};

fn playing_video(camera: &mut FakeCamera) -> VideoSource<FakeStream> {
    let mut video = VideoSource::new(600, 500);
    setup_camera(camera, &mut video, ClientKind::Desktop, Duration::from_secs(1)).unwrap();
    video
}

fn running_loop(config: &Config) -> InferenceLoop {
    let mut render_loop = InferenceLoop::new(RenderSettings::from_config(config).unwrap(), ActiveFlag::new());
    render_loop.start();
    render_loop
}

#[test]
fn test_low_score_pose_draws_nothing() {
    let mut config = test_config();
    config.detection.min_pose_confidence = 0.1;
    config.detection.min_part_confidence = 0.5;

    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::with_poses(vec![full_pose(0.05, 0.9)]);
    let mut surface = RecordingSurface::new(600, 500);

    let outcome = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Drawn {
            poses: 1,
            keypoints: 0,
            segments: 0
        }
    );
    assert_eq!(surface.ops, vec![DrawOp::Clear, DrawOp::Video]);
}

#[test]
fn test_confident_pose_drawn_exactly_once() {
    let config = test_config();
    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9)]);
    let mut surface = RecordingSurface::new(600, 500);

    render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert_eq!(surface.circles(), BodyPart::ALL.len());
    assert_eq!(surface.lines(), CONNECTED_PARTS.len());
    assert_eq!(model.single_calls, 1);
    assert_eq!(model.multi_calls, 0);
}

#[test]
fn test_low_confidence_part_excluded_from_points_and_segments() {
    let config = test_config();
    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);

    let mut pose = full_pose(0.9, 0.9);
    let elbow = pose.keypoints[BodyPart::LeftElbow.id()];
    pose.keypoints[BodyPart::LeftElbow.id()].score = 0.2;
    let mut model = FakeModel::with_poses(vec![pose]);
    let mut surface = RecordingSurface::new(600, 500);

    render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    let touches_elbow = |p: &opencv::core::Point2f| *p == elbow.position;
    assert_eq!(surface.circles(), BodyPart::ALL.len() - 1);
    // Elbow is in two segments: shoulder-elbow and elbow-wrist
    assert_eq!(surface.lines(), CONNECTED_PARTS.len() - 2);
    assert!(!surface.ops.iter().any(|op| match op {
        DrawOp::Circle(c) => touches_elbow(c),
        DrawOp::Line(a, b) => touches_elbow(a) || touches_elbow(b),
        _ => false,
    }));
}

#[test]
fn test_multi_pose_results_capped() {
    let mut config = test_config();
    config.detection.algorithm = Algorithm::MultiPose;
    config.detection.max_pose_detections = 2;

    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9), full_pose(0.8, 0.9), full_pose(0.7, 0.9)]);
    let mut surface = RecordingSurface::new(600, 500);

    let outcome = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert_eq!(model.multi_calls, 1);
    assert_eq!(model.last_params.map(|p| p.max_detections), Some(2));
    assert!(matches!(outcome, CycleOutcome::Drawn { poses: 2, .. }));
    assert_eq!(surface.circles(), 2 * BodyPart::ALL.len());
}

#[test]
fn test_surface_cleared_every_cycle() {
    let config = test_config();
    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut surface = RecordingSurface::new(600, 500);

    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9)]);
    render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();
    let mut model = FakeModel::with_poses(vec![full_pose(0.01, 0.9)]);
    render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert_eq!(surface.ops.iter().filter(|op| **op == DrawOp::Clear).count(), 2);
    assert_eq!(surface.since_last_clear(), &[DrawOp::Video]);
}

#[test]
fn test_hidden_video_not_drawn() {
    let mut config = test_config();
    config.display.show_video = false;
    config.display.show_skeleton = false;

    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9)]);
    let mut surface = RecordingSurface::new(600, 500);

    render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert!(!surface.ops.contains(&DrawOp::Video));
    assert_eq!(surface.lines(), 0);
    assert_eq!(surface.circles(), BodyPart::ALL.len());
}

#[test]
fn test_missing_model_skips_and_continues() {
    let config = test_config();
    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut surface = RecordingSurface::new(600, 500);

    let outcome = render_loop
        .cycle(None::<&mut FakeModel>, Some(&mut video), &mut surface)
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Skipped(SkipReason::InferenceUnavailable(_))));
    assert!(surface.ops.is_empty());
    assert_eq!(render_loop.state(), LoopState::Running);

    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9)]);
    let outcome = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();
    assert!(matches!(outcome, CycleOutcome::Drawn { .. }));
}

#[test]
fn test_unplayable_video_skips() {
    let config = test_config();
    let mut render_loop = running_loop(&config);
    let mut video: VideoSource<FakeStream> = VideoSource::new(600, 500);
    let mut model = FakeModel::default();
    let mut surface = RecordingSurface::new(600, 500);

    let outcome = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert!(matches!(outcome, CycleOutcome::Skipped(SkipReason::InferenceUnavailable(_))));
    assert_eq!(model.single_calls, 0);
}

#[test]
fn test_estimation_failure_skips_frame_only() {
    let config = test_config();
    let mut render_loop = running_loop(&config);
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9)]);
    model.failures = 1;
    let mut surface = RecordingSurface::new(600, 500);

    let first = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();
    assert!(matches!(first, CycleOutcome::Skipped(SkipReason::EstimationFailed(_))));
    assert!(surface.ops.is_empty());

    let second = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();
    assert!(matches!(second, CycleOutcome::Drawn { .. }));

    let stats = render_loop.stats();
    assert_eq!((stats.cycles, stats.drawn, stats.skipped), (2, 1, 1));
}

#[test]
fn test_deactivated_loop_stops() {
    let config = test_config();
    let active = ActiveFlag::new();
    let mut render_loop = InferenceLoop::new(RenderSettings::from_config(&config).unwrap(), active.clone());
    render_loop.start();

    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::with_poses(vec![full_pose(0.9, 0.9)]);
    let mut surface = RecordingSurface::new(600, 500);

    active.deactivate();
    let outcome = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert_eq!(outcome, CycleOutcome::Stopped);
    assert_eq!(render_loop.state(), LoopState::Stopped);
    assert_eq!(model.single_calls, 0);
    assert!(surface.ops.is_empty());

    // Stopped is terminal
    render_loop.start();
    assert_eq!(render_loop.state(), LoopState::Stopped);
}

#[test]
fn test_idle_loop_does_not_draw() {
    let config = test_config();
    let mut render_loop = InferenceLoop::new(RenderSettings::from_config(&config).unwrap(), ActiveFlag::new());
    let mut camera = FakeCamera::working();
    let mut video = playing_video(&mut camera);
    let mut model = FakeModel::default();
    let mut surface = RecordingSurface::new(600, 500);

    let outcome = render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NotRunning));
    assert_eq!(model.single_calls, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_only_confident_parts_drawn(
        pose_score in 0.0f32..1.0,
        part_scores in proptest::collection::vec(0.0f32..1.0, 17),
    ) {
        let config = test_config();
        let min_pose = config.detection.min_pose_confidence;
        let min_part = config.detection.min_part_confidence;

        let mut pose = full_pose(pose_score, 0.0);
        for (keypoint, score) in pose.keypoints.iter_mut().zip(&part_scores) {
            keypoint.score = *score;
        }

        let mut render_loop = running_loop(&config);
        let mut camera = FakeCamera::working();
        let mut video = playing_video(&mut camera);
        let mut model = FakeModel::with_poses(vec![pose]);
        let mut surface = RecordingSurface::new(600, 500);
        render_loop.cycle(Some(&mut model), Some(&mut video), &mut surface).unwrap();

        let expected_circles = if pose_score >= min_pose {
            part_scores.iter().filter(|s| **s >= min_part).count()
        } else {
            0
        };
        let expected_lines = if pose_score >= min_pose {
            CONNECTED_PARTS
                .iter()
                .filter(|(a, b)| part_scores[a.id()] >= min_part && part_scores[b.id()] >= min_part)
                .count()
        } else {
            0
        };

        prop_assert_eq!(surface.circles(), expected_circles);
        prop_assert_eq!(surface.lines(), expected_lines);
        prop_assert_eq!(surface.ops.first(), Some(&DrawOp::Clear));
    }
}
