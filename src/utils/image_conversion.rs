//! Conversion of `OpenCV` frames into PoseNet input tensors.

use crate::{
    config::Architecture,
    constants::{MOBILENET_NORMALIZATION_SCALE, RESNET_IMAGENET_MEAN},
    utils::safe_cast::u32_to_i32,
    Error, Result,
};
use ndarray::Array4;
use opencv::{
    core::{Mat, Size, Vec3f, CV_32F},
    imgproc::{self, InterpolationFlags},
    prelude::*,
};

/// Normalize one RGB pixel value for the given backbone
#[must_use]
pub fn normalize_pixel(value: f32, channel: usize, architecture: Architecture) -> f32 {
    match architecture {
        Architecture::MobileNetV1 => value / MOBILENET_NORMALIZATION_SCALE - 1.0,
        Architecture::ResNet50 => value + RESNET_IMAGENET_MEAN[channel],
    }
}

/// Resize a BGR frame and lay it out as a normalized NHWC tensor `[1, height, width, 3]`
///
/// # Errors
///
/// Returns an error if the frame is empty or not 3-channel, or if resizing fails.
#[allow(clippy::cast_sign_loss)] // Dimensions validated positive
pub fn frame_to_input_tensor(frame: &Mat, width: u32, height: u32, architecture: Architecture) -> Result<Array4<f32>> {
    if frame.empty() || frame.channels() != 3 {
        return Err(Error::InvalidInput(format!(
            "Expected a non-empty 3-channel frame, got {}x{}x{}",
            frame.cols(),
            frame.rows(),
            frame.channels()
        )));
    }

    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(u32_to_i32(width)?, u32_to_i32(height)?),
        0.0,
        0.0,
        InterpolationFlags::INTER_LINEAR as i32,
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let mut float_image = Mat::default();
    rgb.convert_to(&mut float_image, CV_32F, 1.0, 0.0)?;

    let (rows, cols) = (height as usize, width as usize);
    let mut data = vec![0.0f32; rows * cols * 3];
    for row in 0..rows {
        for col in 0..cols {
            let pixel = float_image.at_2d::<Vec3f>(row as i32, col as i32)?;
            let base = (row * cols + col) * 3;
            for ch in 0..3 {
                data[base + ch] = normalize_pixel(pixel[ch], ch, architecture);
            }
        }
    }

    Array4::from_shape_vec((1, rows, cols, 3), data)
        .map_err(|e| Error::ModelDataFormatError(format!("Failed to create input tensor: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_mobilenet_range() {
        assert_eq!(normalize_pixel(0.0, 0, Architecture::MobileNetV1), -1.0);
        assert_eq!(normalize_pixel(255.0, 2, Architecture::MobileNetV1), 1.0);
    }

    #[test]
    fn test_resnet_mean() {
        let v = normalize_pixel(123.15, 0, Architecture::ResNet50);
        assert!(v.abs() < 1e-4);
    }

    #[test]
    fn test_tensor_shape_and_channel_order() {
        // Pure blue in BGR
        let frame = Mat::new_rows_cols_with_default(40, 60, CV_8UC3, Scalar::new(255.0, 0.0, 0.0, 0.0)).unwrap();

        let tensor = frame_to_input_tensor(&frame, 33, 17, Architecture::MobileNetV1).unwrap();

        assert_eq!(tensor.shape(), &[1, 17, 33, 3]);
        // RGB order: red channel empty, blue channel full
        assert_eq!(tensor[[0, 5, 5, 0]], -1.0);
        assert_eq!(tensor[[0, 5, 5, 2]], 1.0);
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(frame_to_input_tensor(&Mat::default(), 17, 17, Architecture::MobileNetV1).is_err());
    }
}
