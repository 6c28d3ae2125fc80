//! Utility functions for image preprocessing and model input sizing.

pub mod image_conversion;
pub mod safe_cast;

/// Snap a resolution to the nearest size the network accepts
///
/// PoseNet accepts sizes of the form `k * output_stride + 1`; other values are
/// floored to the closest such size.
#[must_use]
pub fn valid_input_resolution(resolution: u32, output_stride: u32) -> u32 {
    if output_stride == 0 {
        return resolution.max(1);
    }
    if resolution % output_stride == 1 {
        return resolution;
    }
    (resolution / output_stride).max(1) * output_stride + 1
}

/// Network input size for a frame, scaled by `image_scale_factor`
#[must_use]
#[allow(clippy::cast_precision_loss)] // Frame sizes are small
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Scale factor is in (0, 1]
pub fn scaled_input_size(frame_width: u32, frame_height: u32, image_scale_factor: f32, output_stride: u32) -> (u32, u32) {
    let scale = |size: u32| valid_input_resolution((size as f32 * image_scale_factor) as u32, output_stride);
    (scale(frame_width), scale(frame_height))
}

/// Logistic function applied to raw heatmap logits
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
