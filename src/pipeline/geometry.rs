//! Screen location in a camera frame.
//!
//! Finding the launch monitor display and undoing the camera perspective is
//! delegated to a `ScreenGeometry`. `BoundingBoxGeometry` covers the case of
//! a frame already aimed squarely at the screen.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::RecorderError;

/// A point in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Top-left, top-right, bottom-right, bottom-left.
pub type Corners = [Point; 4];

pub trait ScreenGeometry: Send {
    /// Locates the display, `None` when it is not visible.
    fn detect_screen_corners(&mut self, frame: &RgbaImage) -> Option<Corners>;

    /// Produces the display as an upright image.
    fn rectify(&self, frame: &RgbaImage, corners: &Corners) -> Result<RgbaImage, RecorderError>;
}

/// Crops the axis-aligned bounding box of the corners.
#[derive(Clone, Debug, Default)]
pub struct BoundingBoxGeometry {
    fixed: Option<Corners>,
    output_size: Option<(u32, u32)>,
}

impl BoundingBoxGeometry {
    /// Treats the whole frame as the screen.
    pub fn full_frame() -> Self {
        Self::default()
    }

    /// Always reports the given corners, for a fixed camera mount.
    pub fn with_corners(corners: Corners) -> Self {
        Self {
            fixed: Some(corners),
            output_size: None,
        }
    }

    /// Resizes rectified output so layouts see a stable resolution.
    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = Some((width, height));
        self
    }
}

impl ScreenGeometry for BoundingBoxGeometry {
    fn detect_screen_corners(&mut self, frame: &RgbaImage) -> Option<Corners> {
        if let Some(corners) = self.fixed {
            return Some(corners);
        }
        if frame.width() == 0 || frame.height() == 0 {
            return None;
        }
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Some([
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
    }

    fn rectify(&self, frame: &RgbaImage, corners: &Corners) -> Result<RgbaImage, RecorderError> {
        let clamp_x = |v: f32| v.round().clamp(0.0, frame.width() as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, frame.height() as f32) as u32;

        let left = clamp_x(corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min));
        let right = clamp_x(corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max));
        let top = clamp_y(corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min));
        let bottom = clamp_y(corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max));

        if right <= left || bottom <= top {
            return Err(RecorderError::Rectify {
                reason: format!(
                    "corners enclose no pixels of the {}x{} frame",
                    frame.width(),
                    frame.height()
                ),
            });
        }

        let cropped = imageops::crop_imm(frame, left, top, right - left, bottom - top).to_image();
        Ok(match self.output_size {
            Some((width, height)) if (width, height) != cropped.dimensions() => {
                imageops::resize(&cropped, width, height, FilterType::Triangle)
            }
            _ => cropped,
        })
    }
}
