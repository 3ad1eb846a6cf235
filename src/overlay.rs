//! Detection overlay rendering.
//!
//! The overlay is a transparent surface sized to the displayed media. Every
//! render starts from a cleared surface, so rendering is idempotent and stale
//! boxes never accumulate.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{imageops, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, Blend};
use imageproc::rect::Rect;

use crate::detect::DetectionSet;
use crate::geometry::{map_detection, DisplayRect, MediaGeometry};

/// Glyph cell size of the label font, in pixels.
const GLYPH_SIZE: u32 = 8;

/// Drawing target for the overlay renderer.
///
/// Coordinates are display pixels with the origin at the top-left corner.
pub trait OverlaySurface {
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
    /// Reset every pixel to fully transparent.
    fn clear(&mut self);
    fn fill_rect(&mut self, rect: DisplayRect, color: Rgba<u8>);
    fn stroke_rect(&mut self, rect: DisplayRect, line_width: f32, color: Rgba<u8>);
    /// Advance width of `text` in pixels.
    fn measure_text(&self, text: &str) -> f32;
    /// Draw `text` with its baseline at `baseline`.
    fn fill_text(&mut self, text: &str, x: f32, baseline: f32, color: Rgba<u8>);
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub box_stroke: Rgba<u8>,
    pub box_fill: Rgba<u8>,
    pub line_width: f32,
    pub label_fill: Rgba<u8>,
    pub label_text: Rgba<u8>,
    pub label_height: f32,
    pub label_padding: f32,
    /// Text baseline sits this far above the box top.
    pub label_baseline_offset: f32,
    /// Lowest allowed text baseline, keeps glyphs inside the surface.
    pub label_min_baseline: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_stroke: Rgba([0x22, 0xc5, 0x5e, 0xff]),
            box_fill: Rgba([34, 197, 94, 38]),
            line_width: 2.0,
            label_fill: Rgba([0x16, 0xa3, 0x4a, 0xff]),
            label_text: Rgba([0xff, 0xff, 0xff, 0xff]),
            label_height: 18.0,
            label_padding: 4.0,
            label_baseline_offset: 5.0,
            label_min_baseline: 12.0,
        }
    }
}

/// Draws detection boxes and labels onto an overlay surface.
#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Fully redraw `surface` for the given detections and geometry.
    pub fn render<S: OverlaySurface + ?Sized>(
        &self,
        surface: &mut S,
        detections: &DetectionSet,
        geometry: &MediaGeometry,
    ) {
        let (width, height) = geometry.display_pixels();
        if surface.size() != (width, height) {
            surface.resize(width, height);
        }
        surface.clear();

        let style = &self.style;
        for detection in detections {
            let rect = map_detection(detection, geometry);
            surface.fill_rect(rect, style.box_fill);
            surface.stroke_rect(rect, style.line_width, style.box_stroke);

            let text = detection.label();
            let label = DisplayRect {
                left: rect.left,
                top: (rect.top - style.label_height).max(0.0),
                width: surface.measure_text(&text) + style.label_padding * 2.0,
                height: style.label_height,
            };
            surface.fill_rect(label, style.label_fill);
            let baseline = (rect.top - style.label_baseline_offset).max(style.label_min_baseline);
            surface.fill_text(
                &text,
                rect.left + style.label_padding,
                baseline,
                style.label_text,
            );
        }
    }
}

/// `OverlaySurface` backed by an RGBA image.
#[derive(Clone, Debug)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Draw the overlay on top of `frame`, scaling the frame to the overlay size.
    pub fn composite_onto(&self, frame: &RgbImage) -> RgbaImage {
        let (width, height) = self.image.dimensions();
        let base: RgbaImage = image::DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
        let mut base = if base.dimensions() == (width, height) || width == 0 || height == 0 {
            base
        } else {
            imageops::resize(&base, width, height, imageops::FilterType::Triangle)
        };
        imageops::overlay(&mut base, &self.image, 0, 0);
        base
    }

    fn pixel_rect(&self, left: f32, top: f32, width: f32, height: f32) -> Option<Rect> {
        let (max_w, max_h) = self.image.dimensions();
        let x0 = left.round().max(0.0);
        let y0 = top.round().max(0.0);
        let x1 = (left + width).round().min(max_w as f32);
        let y1 = (top + height).round().min(max_h as f32);
        if !(x1 > x0 && y1 > y0) {
            return None;
        }
        Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
    }

    fn paint(&mut self, rect: Rect, color: Rgba<u8>) {
        if color[3] == u8::MAX {
            draw_filled_rect_mut(&mut self.image, rect, color);
        } else {
            let mut canvas = Blend(std::mem::take(&mut self.image));
            draw_filled_rect_mut(&mut canvas, rect, color);
            self.image = canvas.0;
        }
    }
}

impl OverlaySurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn fill_rect(&mut self, rect: DisplayRect, color: Rgba<u8>) {
        if let Some(area) = self.pixel_rect(rect.left, rect.top, rect.width, rect.height) {
            self.paint(area, color);
        }
    }

    fn stroke_rect(&mut self, rect: DisplayRect, line_width: f32, color: Rgba<u8>) {
        let half = line_width / 2.0;
        let outer_left = rect.left - half;
        let outer_top = rect.top - half;
        let outer_width = rect.width + line_width;
        let outer_height = rect.height + line_width;
        let bands = [
            (outer_left, outer_top, outer_width, line_width),
            (outer_left, rect.top + rect.height - half, outer_width, line_width),
            (outer_left, outer_top, line_width, outer_height),
            (rect.left + rect.width - half, outer_top, line_width, outer_height),
        ];
        for (left, top, width, height) in bands {
            if let Some(area) = self.pixel_rect(left, top, width, height) {
                self.paint(area, color);
            }
        }
    }

    fn measure_text(&self, text: &str) -> f32 {
        (text.chars().count() as u32 * GLYPH_SIZE) as f32
    }

    fn fill_text(&mut self, text: &str, x: f32, baseline: f32, color: Rgba<u8>) {
        let (width, height) = self.image.dimensions();
        // Off-surface origins are pinned just outside the edge so cell offsets stay small.
        let text_width = self.measure_text(text);
        let origin_x = clamp_origin(x, -text_width, width as f32);
        let origin_y = clamp_origin(baseline - GLYPH_SIZE as f32, -(GLYPH_SIZE as f32), height as f32);
        for (index, ch) in text.chars().enumerate() {
            let glyph = BASIC_FONTS
                .get(ch)
                .or_else(|| BASIC_FONTS.get('?'))
                .unwrap_or([0; 8]);
            let cell_x = origin_x + (index as i64) * GLYPH_SIZE as i64;
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_SIZE as i64 {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    let px = cell_x + col;
                    let py = origin_y + row as i64;
                    if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                        continue;
                    }
                    self.image.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

fn clamp_origin(value: f32, min: f32, max: f32) -> i64 {
    if value.is_nan() {
        return max as i64;
    }
    value.round().clamp(min, max) as i64
}

/// Render `detections` at the frame's native size and composite them onto it.
pub fn annotate(frame: &RgbImage, detections: &DetectionSet, renderer: &OverlayRenderer) -> RgbaImage {
    let (width, height) = frame.dimensions();
    let geometry = MediaGeometry::native(width, height);
    let mut surface = RasterSurface::new(width, height);
    renderer.render(&mut surface, detections, &geometry);
    surface.composite_onto(frame)
}
