//! Drawing helpers for keypoints and skeleton segments.
//!
//! The free functions are stateless and work against any [`Surface`]; the
//! OpenCV-backed [`MatSurface`] is the canvas used by the application.

use crate::{
    constants::KEYPOINT_RADIUS,
    keypoints::{adjacent_keypoints, Keypoint},
    utils::safe_cast::{f32_to_i32_clamp, u32_to_i32},
    Error, Result,
};
use opencv::{
    core::{self, Mat, Point, Point2f, Scalar, Size, CV_8UC3},
    imgproc::{self, InterpolationFlags, FILLED, LINE_AA},
    prelude::*,
};

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a CSS color name, `#rrggbb`, or `#rgb`
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim().to_lowercase();
        if let Some(hex) = value.strip_prefix('#') {
            return Self::parse_hex(hex).ok_or_else(|| Error::ConfigError(format!("Invalid hex color: #{hex}")));
        }

        let color = match value.as_str() {
            "aqua" | "cyan" => Self::rgb(0, 255, 255),
            "black" => Self::rgb(0, 0, 0),
            "blue" => Self::rgb(0, 0, 255),
            "fuchsia" | "magenta" => Self::rgb(255, 0, 255),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "green" => Self::rgb(0, 128, 0),
            "lime" => Self::rgb(0, 255, 0),
            "maroon" => Self::rgb(128, 0, 0),
            "navy" => Self::rgb(0, 0, 128),
            "olive" => Self::rgb(128, 128, 0),
            "orange" => Self::rgb(255, 165, 0),
            "purple" => Self::rgb(128, 0, 128),
            "red" => Self::rgb(255, 0, 0),
            "silver" => Self::rgb(192, 192, 192),
            "teal" => Self::rgb(0, 128, 128),
            "white" => Self::rgb(255, 255, 255),
            "yellow" => Self::rgb(255, 255, 0),
            other => return Err(Error::ConfigError(format!("Unknown color: {other}"))),
        };
        Ok(color)
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            3 => {
                let expand = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
                Some(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => None,
        }
    }

    /// BGR scalar as `OpenCV` expects it
    #[must_use]
    pub fn to_scalar(self) -> Scalar {
        Scalar::new(f64::from(self.b), f64::from(self.g), f64::from(self.r), 0.0)
    }
}

/// A 2D raster the overlay is drawn onto
pub trait Surface {
    /// Surface dimensions as (width, height)
    fn size(&self) -> (u32, u32);

    /// Erase everything drawn so far
    fn clear(&mut self) -> Result<()>;

    /// Draw a video frame mirrored horizontally, scaled to the surface size
    fn draw_video_mirrored(&mut self, frame: &Mat) -> Result<()>;

    /// Draw a filled circle
    fn fill_circle(&mut self, center: Point2f, radius: f32, color: Color) -> Result<()>;

    /// Draw a straight segment
    fn stroke_line(&mut self, from: Point2f, to: Point2f, color: Color, width: u32) -> Result<()>;
}

fn scaled(point: Point2f, scale: f32) -> Point2f {
    Point2f::new(point.x * scale, point.y * scale)
}

/// Draw a filled circle for each keypoint meeting `min_confidence`
///
/// Returns the number of circles drawn.
///
/// # Errors
///
/// Propagates any failure from the surface.
pub fn draw_keypoints<S: Surface + ?Sized>(
    keypoints: &[Keypoint],
    min_confidence: f32,
    color: Color,
    surface: &mut S,
    scale: f32,
) -> Result<usize> {
    let mut drawn = 0;
    for keypoint in keypoints.iter().filter(|k| k.score >= min_confidence) {
        surface.fill_circle(scaled(keypoint.position, scale), KEYPOINT_RADIUS, color)?;
        drawn += 1;
    }
    Ok(drawn)
}

/// Draw a segment between every adjacent pair whose ends both meet `min_confidence`
///
/// Returns the number of segments drawn.
///
/// # Errors
///
/// Propagates any failure from the surface.
pub fn draw_skeleton<S: Surface + ?Sized>(
    keypoints: &[Keypoint],
    min_confidence: f32,
    color: Color,
    line_width: u32,
    surface: &mut S,
    scale: f32,
) -> Result<usize> {
    let pairs = adjacent_keypoints(keypoints, min_confidence);
    for (a, b) in &pairs {
        surface.stroke_line(scaled(a.position, scale), scaled(b.position, scale), color, line_width)?;
    }
    Ok(pairs.len())
}

/// `OpenCV` canvas sized to the configured video dimensions
pub struct MatSurface {
    canvas: Mat,
    width: u32,
    height: u32,
}

impl MatSurface {
    /// Create a black canvas
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions do not fit an `OpenCV` matrix.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let canvas = Mat::new_rows_cols_with_default(
            u32_to_i32(height)?,
            u32_to_i32(width)?,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        Ok(Self { canvas, width, height })
    }

    /// The rendered frame, ready to be shown
    #[must_use]
    pub fn canvas(&self) -> &Mat {
        &self.canvas
    }

    fn pixel(point: Point2f) -> Point {
        Point::new(
            f32_to_i32_clamp(point.x.round(), i32::MIN, i32::MAX),
            f32_to_i32_clamp(point.y.round(), i32::MIN, i32::MAX),
        )
    }
}

impl Surface for MatSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) -> Result<()> {
        self.canvas.set_to(&Scalar::all(0.0), &Mat::default())?;
        Ok(())
    }

    fn draw_video_mirrored(&mut self, frame: &Mat) -> Result<()> {
        if frame.empty() {
            return Err(Error::InvalidInput("Cannot draw an empty video frame".to_string()));
        }

        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(u32_to_i32(self.width)?, u32_to_i32(self.height)?),
            0.0,
            0.0,
            InterpolationFlags::INTER_LINEAR as i32,
        )?;

        // Column x lands on column width - 1 - x
        core::flip(&resized, &mut self.canvas, 1)?;
        Ok(())
    }

    fn fill_circle(&mut self, center: Point2f, radius: f32, color: Color) -> Result<()> {
        imgproc::circle(
            &mut self.canvas,
            Self::pixel(center),
            f32_to_i32_clamp(radius.round(), 1, i32::MAX),
            color.to_scalar(),
            FILLED,
            LINE_AA,
            0,
        )?;
        Ok(())
    }

    fn stroke_line(&mut self, from: Point2f, to: Point2f, color: Color, width: u32) -> Result<()> {
        imgproc::line(
            &mut self.canvas,
            Self::pixel(from),
            Self::pixel(to),
            color.to_scalar(),
            u32_to_i32(width)?,
            LINE_AA,
            0,
        )?;
        Ok(())
    }
}
