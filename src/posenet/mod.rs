//! PoseNet output decoding and the ONNX Runtime model wrapper.
//!
//! The network produces four tensors on a grid `output_stride` times smaller
//! than its input:
//! - heatmaps `(h, w, 17)`: per-part confidence
//! - offsets `(h, w, 34)`: sub-cell refinement, y for part `k` at `k`, x at `k + 17`
//! - forward / backward displacements `(h, w, 32)`: vectors along each
//!   [`POSE_CHAIN`](crate::keypoints::POSE_CHAIN) edge, y at `e`, x at `e + 16`

pub mod decode_multi;
pub mod decode_single;
pub mod model;

pub use decode_multi::decode_multiple_poses;
pub use decode_single::decode_single_pose;
pub use model::{PoseNet, PoseNetLoader};

use crate::{
    constants::{NUM_KEYPOINTS, NUM_POSE_EDGES},
    keypoints::BodyPart,
    Error, Result,
};
use ndarray::Array3;
use opencv::core::Point2f;

/// Decoded network outputs for one frame
#[derive(Debug, Clone)]
pub struct PoseNetOutputs {
    pub heatmaps: Array3<f32>,
    pub offsets: Array3<f32>,
    pub displacements_fwd: Array3<f32>,
    pub displacements_bwd: Array3<f32>,
    pub output_stride: u32,
}

impl PoseNetOutputs {
    /// Bundle output tensors, checking that their shapes agree
    ///
    /// # Errors
    ///
    /// Returns `ModelDataFormatError` when grids differ or channel counts are wrong.
    pub fn new(
        heatmaps: Array3<f32>,
        offsets: Array3<f32>,
        displacements_fwd: Array3<f32>,
        displacements_bwd: Array3<f32>,
        output_stride: u32,
    ) -> Result<Self> {
        let (h, w, k) = heatmaps.dim();
        let expect = |name: &str, arr: &Array3<f32>, channels: usize| -> Result<()> {
            if arr.dim() != (h, w, channels) {
                return Err(Error::ModelDataFormatError(format!(
                    "{name} has shape {:?}, expected ({h}, {w}, {channels})",
                    arr.dim()
                )));
            }
            Ok(())
        };

        if k != NUM_KEYPOINTS {
            return Err(Error::ModelDataFormatError(format!(
                "heatmaps have {k} channels, expected {NUM_KEYPOINTS}"
            )));
        }
        expect("offsets", &offsets, NUM_KEYPOINTS * 2)?;
        expect("forward displacements", &displacements_fwd, NUM_POSE_EDGES * 2)?;
        expect("backward displacements", &displacements_bwd, NUM_POSE_EDGES * 2)?;
        if output_stride == 0 {
            return Err(Error::ModelDataFormatError("output stride must be positive".to_string()));
        }

        Ok(Self {
            heatmaps,
            offsets,
            displacements_fwd,
            displacements_bwd,
            output_stride,
        })
    }

    /// Grid size as (height, width)
    #[must_use]
    pub fn grid(&self) -> (usize, usize) {
        let (h, w, _) = self.heatmaps.dim();
        (h, w)
    }

    /// Heatmap score of a part at a grid cell
    #[must_use]
    pub fn score(&self, y: usize, x: usize, part: BodyPart) -> f32 {
        self.heatmaps[[y, x, part.id()]]
    }

    /// Offset vector of a part at a grid cell
    #[must_use]
    pub fn offset(&self, y: usize, x: usize, part: BodyPart) -> Point2f {
        let id = part.id();
        Point2f::new(self.offsets[[y, x, id + NUM_KEYPOINTS]], self.offsets[[y, x, id]])
    }

    /// Image-space position of a part anchored at a grid cell
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Grid sizes are small
    pub fn image_coords(&self, y: usize, x: usize, part: BodyPart) -> Point2f {
        let stride = self.output_stride as f32;
        let offset = self.offset(y, x, part);
        Point2f::new(x as f32 * stride + offset.x, y as f32 * stride + offset.y)
    }
}
