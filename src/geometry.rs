//! Model-space to display-space coordinate mapping.

use crate::detect::Detection;

/// Intrinsic resolution of a media source and its current rendered size.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MediaGeometry {
    pub natural_width: f32,
    pub natural_height: f32,
    pub display_width: f32,
    pub display_height: f32,
}

impl MediaGeometry {
    pub fn new(natural_width: f32, natural_height: f32, display_width: f32, display_height: f32) -> Self {
        Self {
            natural_width,
            natural_height,
            display_width,
            display_height,
        }
    }

    /// Geometry for a source shown at its native size.
    pub fn native(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32, width as f32, height as f32)
    }

    /// Horizontal scale. 1.0 when the natural width is unknown.
    pub fn scale_x(&self) -> f32 {
        axis_scale(self.display_width, self.natural_width)
    }

    /// Vertical scale. 1.0 when the natural height is unknown.
    pub fn scale_y(&self) -> f32 {
        axis_scale(self.display_height, self.natural_height)
    }

    pub fn with_display_size(self, width: u32, height: u32) -> Self {
        Self {
            display_width: width as f32,
            display_height: height as f32,
            ..self
        }
    }

    /// Overlay surface size in whole pixels.
    pub fn display_pixels(&self) -> (u32, u32) {
        (to_pixels(self.display_width), to_pixels(self.display_height))
    }
}

fn axis_scale(display: f32, natural: f32) -> f32 {
    if natural > 0.0 && natural.is_finite() && display.is_finite() {
        display / natural
    } else {
        1.0
    }
}

fn to_pixels(value: f32) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round() as u32
    } else {
        0
    }
}

/// Axis-aligned rectangle in display pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// Map a model-space detection box onto the display surface.
pub fn map_detection(detection: &Detection, geometry: &MediaGeometry) -> DisplayRect {
    let scale_x = geometry.scale_x();
    let scale_y = geometry.scale_y();
    DisplayRect {
        left: (detection.x - detection.width / 2.0) * scale_x,
        top: (detection.y - detection.height / 2.0) * scale_y,
        width: detection.width * scale_x,
        height: detection.height * scale_y,
    }
}
