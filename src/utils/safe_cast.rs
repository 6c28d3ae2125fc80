//! Safe casting utilities for pixel coordinates and tensor indices

use crate::{Error, Result};

/// Safely convert u32 to i32 with overflow checking
///
/// # Errors
///
/// Returns an error if the value exceeds i32::MAX
pub fn u32_to_i32(value: u32) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in i32")))
}

/// Clamp and convert f32 to i32 for pixel coordinates
#[must_use]
#[allow(clippy::cast_precision_loss)] // Acceptable for clamping bounds
#[allow(clippy::cast_possible_truncation)] // Clamping ensures safe truncation
pub fn f32_to_i32_clamp(value: f32, min: i32, max: i32) -> i32 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };

    if !value.is_finite() {
        return min;
    }

    let clamped = value.clamp(min as f32, max as f32);
    (clamped as i32).clamp(min, max)
}

/// Round a coordinate to the nearest cell index in `0..len`
///
/// Non-finite values map to 0; `len` of 0 yields 0.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Grid sizes are small
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast
pub fn f32_to_index_clamp(value: f32, len: usize) -> usize {
    if len == 0 || !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, (len - 1) as f32) as usize
}
