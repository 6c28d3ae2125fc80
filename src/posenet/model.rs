use super::{decode_multiple_poses, decode_single_pose, PoseNetOutputs};
use crate::{
    config::{Architecture, Config, InputResolution, ModelConfig},
    constants::{NUM_KEYPOINTS, NUM_POSE_EDGES},
    inference::{ModelLoader, MultiPoseParams, PoseModel},
    keypoints::Pose,
    utils::{image_conversion::frame_to_input_tensor, scaled_input_size, sigmoid},
    Error, Result,
};
use ndarray::{Array3, ArrayD, Axis, CowArray, Ix4};
use opencv::{core::Mat, prelude::*};
use ort::{Environment, Session, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// PoseNet running on `ONNX` Runtime
///
/// The model takes an NHWC float image and returns heatmap logits, offsets,
/// and forward/backward displacements, either NHWC or NCHW. The layout is
/// read from the declared output shapes, or from the first inference when
/// those are dynamic, and then applied to every output.
pub struct PoseNet {
    session: Session,
    layout: Option<OutputLayout>,
    architecture: Architecture,
    output_stride: u32,
    fixed_input: Option<InputResolution>,
    image_scale_factor: f32,
    backward_first: bool,
}

impl PoseNet {
    /// Load a PoseNet model from an `ONNX` file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model file does not exist or cannot be loaded
    /// - The model does not expose four outputs
    pub fn new<P: AsRef<Path>>(model_path: P, model: &ModelConfig, image_scale_factor: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(Error::ModelError(format!("Model not found: {}", model_path.display())));
        }
        log::info!("Initializing PoseNet with model: {}", model_path.display());

        let environment = Arc::new(
            Environment::builder()
                .with_name("posenet")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelInputError("Model has no inputs".to_string()))?;

        // NHWC: [batch, height, width, channels]
        let model_input = match input.dimensions.as_slice() {
            [_, Some(height), Some(width), _] => Some(InputResolution {
                width: *width,
                height: *height,
            }),
            _ => None,
        };

        if session.outputs.len() < 4 {
            return Err(Error::ModelOutputError(format!(
                "Expected 4 outputs (heatmaps, offsets, displacements), model has {}",
                session.outputs.len()
            )));
        }

        // Displacements are matched by position unless the names say otherwise
        let displacement_names: Vec<String> = session
            .outputs
            .iter()
            .map(|o| o.name.to_lowercase())
            .filter(|n| n.contains("displacement") || n.contains("fwd") || n.contains("bwd"))
            .collect();
        let backward_first = displacement_names
            .first()
            .is_some_and(|n| n.contains("bwd") || n.contains("backward"));

        let declared: Vec<[usize; 4]> = session
            .outputs
            .iter()
            .filter_map(|o| declared_shape(&o.dimensions))
            .collect();
        let layout = OutputLayout::detect(&declared);
        match layout {
            Some(layout) => log::info!("PoseNet outputs are {:?}", layout),
            None => log::debug!("Output layout not declared, detecting on first frame"),
        }

        let fixed_input = model
            .input_resolution
            .or(model_input)
            .or_else(|| model.default_input_resolution());
        if let Some(resolution) = fixed_input {
            log::info!("PoseNet input fixed at {}x{}", resolution.width, resolution.height);
        }

        Ok(Self {
            session,
            layout,
            architecture: model.architecture,
            output_stride: model.output_stride,
            fixed_input,
            image_scale_factor,
            backward_first,
        })
    }

    /// Network input size for a frame
    fn input_size(&self, frame: &Mat) -> Result<(u32, u32)> {
        if let Some(resolution) = self.fixed_input {
            return Ok((resolution.width, resolution.height));
        }
        let width = u32::try_from(frame.cols())
            .map_err(|_| Error::InvalidInput(format!("Invalid frame width {}", frame.cols())))?;
        let height = u32::try_from(frame.rows())
            .map_err(|_| Error::InvalidInput(format!("Invalid frame height {}", frame.rows())))?;
        Ok(scaled_input_size(width, height, self.image_scale_factor, self.output_stride))
    }

    /// Run the network; returns outputs plus the input-to-frame scale factors
    #[allow(clippy::cast_precision_loss)] // Image dimensions are small
    fn infer(&mut self, frame: &Mat) -> Result<(PoseNetOutputs, f32, f32)> {
        let (input_width, input_height) = self.input_size(frame)?;
        let input = frame_to_input_tensor(frame, input_width, input_height, self.architecture)?;

        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let tensors = {
            let outputs = self.session.run(vec![input_tensor])?;
            outputs
                .iter()
                .map(|value| Ok(value.try_extract::<f32>()?.view().to_owned()))
                .collect::<Result<Vec<ArrayD<f32>>>>()?
        };
        let layout = self.output_layout(&tensors)?;

        let mut heatmaps = None;
        let mut offsets = None;
        let mut displacements = Vec::with_capacity(2);
        for tensor in tensors {
            let hwc = to_hwc(tensor, layout)?;
            match hwc.dim().2 {
                NUM_KEYPOINTS => heatmaps = Some(hwc),
                c if c == NUM_KEYPOINTS * 2 => offsets = Some(hwc),
                c if c == NUM_POSE_EDGES * 2 => displacements.push(hwc),
                c => log::debug!("Ignoring model output with {} channels", c),
            }
        }

        let mut heatmaps =
            heatmaps.ok_or_else(|| Error::ModelOutputError("No heatmap output".to_string()))?;
        heatmaps.mapv_inplace(sigmoid);
        let offsets = offsets.ok_or_else(|| Error::ModelOutputError("No offset output".to_string()))?;
        let [first, second] = <[Array3<f32>; 2]>::try_from(displacements).map_err(|found| {
            Error::ModelOutputError(format!("Expected 2 displacement outputs, got {}", found.len()))
        })?;
        let (fwd, bwd) = if self.backward_first { (second, first) } else { (first, second) };

        let outputs = PoseNetOutputs::new(heatmaps, offsets, fwd, bwd, self.output_stride)?;
        let scale_x = frame.cols() as f32 / input_width as f32;
        let scale_y = frame.rows() as f32 / input_height as f32;
        Ok((outputs, scale_x, scale_y))
    }

    /// Layout of the output tensors, detected once and cached
    fn output_layout(&mut self, tensors: &[ArrayD<f32>]) -> Result<OutputLayout> {
        if let Some(layout) = self.layout {
            return Ok(layout);
        }
        let shapes: Vec<[usize; 4]> = tensors
            .iter()
            .filter_map(|t| <[usize; 4]>::try_from(t.shape()).ok())
            .collect();
        let layout = OutputLayout::detect(&shapes).ok_or_else(|| {
            Error::ModelDataFormatError(format!("Unrecognized output shapes {:?}", shapes))
        })?;
        log::info!("PoseNet outputs are {:?}", layout);
        self.layout = Some(layout);
        Ok(layout)
    }
}

/// Where the channel axis sits in the model's 4D outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputLayout {
    /// `[batch, height, width, channels]`
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

impl OutputLayout {
    /// The layout whose channel axis holds one heatmap, one offset and two
    /// displacement tensors
    ///
    /// NHWC wins when both axes fit. Unknown dimensions should be passed as 0.
    fn detect(shapes: &[[usize; 4]]) -> Option<Self> {
        let fits = |axis: usize| {
            let count = |channels: usize| shapes.iter().filter(|s| s[axis] == channels).count();
            count(NUM_KEYPOINTS) == 1 && count(NUM_KEYPOINTS * 2) == 1 && count(NUM_POSE_EDGES * 2) == 2
        };
        if fits(3) {
            Some(Self::Nhwc)
        } else if fits(1) {
            Some(Self::Nchw)
        } else {
            None
        }
    }
}

/// Declared output shape, with dynamic dimensions as 0
fn declared_shape(dimensions: &[Option<u32>]) -> Option<[usize; 4]> {
    let shape: Vec<usize> = dimensions
        .iter()
        .map(|d| d.map_or(0, |v| v as usize))
        .collect();
    <[usize; 4]>::try_from(shape.as_slice()).ok()
}

/// Drop the batch axis and put channels last
fn to_hwc(tensor: ArrayD<f32>, layout: OutputLayout) -> Result<Array3<f32>> {
    let tensor = tensor
        .into_dimensionality::<Ix4>()
        .map_err(|e| Error::ModelDataFormatError(format!("Expected a 4D output tensor: {e}")))?;
    let single = tensor.index_axis_move(Axis(0), 0);

    match layout {
        OutputLayout::Nhwc => Ok(single),
        OutputLayout::Nchw => Ok(single.permuted_axes([1, 2, 0]).as_standard_layout().to_owned()),
    }
}

/// Mirror and rescale poses from network input space to frame space
#[allow(clippy::cast_precision_loss)] // Image dimensions are small
fn to_frame_space(poses: &mut [Pose], scale_x: f32, scale_y: f32, flip_horizontal: bool, frame_width: i32) {
    for pose in poses {
        pose.scale(scale_x, scale_y);
        if flip_horizontal {
            pose.flip_horizontal(frame_width as f32);
        }
    }
}

impl PoseModel for PoseNet {
    fn estimate_single(&mut self, frame: &Mat, flip_horizontal: bool) -> Result<Pose> {
        let (outputs, scale_x, scale_y) = self.infer(frame)?;
        let mut poses = [decode_single_pose(&outputs)];
        to_frame_space(&mut poses, scale_x, scale_y, flip_horizontal, frame.cols());
        let [pose] = poses;
        Ok(pose)
    }

    fn estimate_multiple(&mut self, frame: &Mat, params: &MultiPoseParams) -> Result<Vec<Pose>> {
        let (outputs, scale_x, scale_y) = self.infer(frame)?;
        let mut poses = decode_multiple_poses(
            &outputs,
            params.max_detections,
            params.score_threshold,
            params.nms_radius,
        );
        to_frame_space(&mut poses, scale_x, scale_y, params.flip_horizontal, frame.cols());
        Ok(poses)
    }
}

/// Substitute a `{multiplier}` placeholder with the checkpoint suffix, e.g. `101` or `050`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Multipliers are small positives
pub fn resolve_model_path(path: &Path, multiplier: f32) -> PathBuf {
    let template = path.to_string_lossy();
    if !template.contains("{multiplier}") {
        return path.to_path_buf();
    }
    let suffix = format!("{:03}", (multiplier * 100.0).round() as u32);
    PathBuf::from(template.replace("{multiplier}", &suffix))
}

/// Loads [`PoseNet`] from the configured model path
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseNetLoader;

impl ModelLoader for PoseNetLoader {
    type Model = PoseNet;

    fn load(&self, config: &Config) -> Result<PoseNet> {
        let multiplier = config.model.effective_multiplier(config.client_kind());
        let path = resolve_model_path(&config.model.path, multiplier);
        log::info!(
            "Loading {:?} (multiplier {:.2}, output stride {})",
            config.model.architecture,
            multiplier,
            config.model.output_stride
        );
        PoseNet::new(path, &config.model, config.detection.image_scale_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::{BodyPart, Keypoint};
    use ndarray::Array4;

    #[test]
    fn test_resolve_model_path() {
        let template = Path::new("assets/posenet_mobilenet_{multiplier}.onnx");
        assert_eq!(
            resolve_model_path(template, 1.01),
            PathBuf::from("assets/posenet_mobilenet_101.onnx")
        );
        assert_eq!(
            resolve_model_path(template, 0.5),
            PathBuf::from("assets/posenet_mobilenet_050.onnx")
        );

        let plain = Path::new("assets/model.onnx");
        assert_eq!(resolve_model_path(plain, 0.5), plain.to_path_buf());
    }

    /// Heatmap, offsets and both displacements for a `grid` x `grid` output
    fn output_shapes(grid: usize, layout: OutputLayout) -> Vec<[usize; 4]> {
        [NUM_KEYPOINTS, NUM_KEYPOINTS * 2, NUM_POSE_EDGES * 2, NUM_POSE_EDGES * 2]
            .into_iter()
            .map(|c| match layout {
                OutputLayout::Nhwc => [1, grid, grid, c],
                OutputLayout::Nchw => [1, c, grid, grid],
            })
            .collect()
    }

    #[test]
    fn test_layout_detected_from_channel_counts() {
        assert_eq!(OutputLayout::detect(&output_shapes(33, OutputLayout::Nhwc)), Some(OutputLayout::Nhwc));
        assert_eq!(OutputLayout::detect(&output_shapes(33, OutputLayout::Nchw)), Some(OutputLayout::Nchw));
    }

    #[test]
    fn test_layout_when_grid_matches_a_channel_count() {
        // ResNet50 at stride 16 has a 32x32 grid, the displacement channel count
        for grid in [NUM_KEYPOINTS, NUM_KEYPOINTS * 2, NUM_POSE_EDGES * 2] {
            for layout in [OutputLayout::Nhwc, OutputLayout::Nchw] {
                assert_eq!(OutputLayout::detect(&output_shapes(grid, layout)), Some(layout));
            }
        }
    }

    #[test]
    fn test_layout_from_dynamic_declared_dims() {
        let declared: Vec<[usize; 4]> = [NUM_KEYPOINTS, NUM_KEYPOINTS * 2, NUM_POSE_EDGES * 2, NUM_POSE_EDGES * 2]
            .into_iter()
            .filter_map(|c| declared_shape(&[Some(1), None, None, Some(c as u32)]))
            .collect();
        assert_eq!(OutputLayout::detect(&declared), Some(OutputLayout::Nhwc));
        assert_eq!(declared_shape(&[Some(1), Some(17)]), None);
    }

    #[test]
    fn test_layout_unknown_shapes() {
        assert_eq!(OutputLayout::detect(&[[1, 5, 5, 5]; 4]), None);
        assert_eq!(OutputLayout::detect(&[]), None);
    }

    #[test]
    fn test_to_hwc_nhwc_passthrough() {
        let tensor = Array4::<f32>::zeros((1, 9, 11, NUM_KEYPOINTS)).into_dyn();
        let hwc = to_hwc(tensor, OutputLayout::Nhwc).unwrap();
        assert_eq!(hwc.dim(), (9, 11, NUM_KEYPOINTS));
    }

    #[test]
    fn test_to_hwc_nchw_permuted() {
        let mut tensor = Array4::<f32>::zeros((1, NUM_KEYPOINTS * 2, 9, 11));
        tensor[[0, 3, 4, 5]] = 7.0;
        let hwc = to_hwc(tensor.into_dyn(), OutputLayout::Nchw).unwrap();
        assert_eq!(hwc.dim(), (9, 11, NUM_KEYPOINTS * 2));
        assert_eq!(hwc[[4, 5, 3]], 7.0);
    }

    #[test]
    fn test_to_hwc_nchw_heatmap_on_32_grid() {
        let mut tensor = Array4::<f32>::zeros((1, NUM_KEYPOINTS, 32, 32));
        tensor[[0, 16, 2, 30]] = 1.5;
        let hwc = to_hwc(tensor.into_dyn(), OutputLayout::Nchw).unwrap();
        assert_eq!(hwc.dim(), (32, 32, NUM_KEYPOINTS));
        assert_eq!(hwc[[2, 30, 16]], 1.5);
    }

    #[test]
    fn test_to_hwc_rejects_non_4d() {
        let tensor = ndarray::Array3::<f32>::zeros((5, 5, 5)).into_dyn();
        assert!(to_hwc(tensor, OutputLayout::Nhwc).is_err());
    }

    #[test]
    fn test_to_frame_space() {
        let mut poses = vec![Pose::new(1.0, vec![Keypoint::new(BodyPart::Nose, 10.0, 10.0, 1.0)])];
        to_frame_space(&mut poses, 2.0, 3.0, true, 600);
        assert_eq!(poses[0].keypoints[0].position.x, 579.0);
        assert_eq!(poses[0].keypoints[0].position.y, 30.0);
    }

    #[test]
    fn test_missing_model_file() {
        let result = PoseNet::new("does/not/exist.onnx", &ModelConfig::default(), 0.5);
        assert!(matches!(result, Err(Error::ModelError(_))));
    }
}
