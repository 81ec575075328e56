use ab_glyph::{FontVec, PxScale};
use common_types::{Centroids, PathSegment, PixelPt, RequiredList};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use log::debug;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub path_color: [u8; 3],
    pub fallback_color: [u8; 3],
    pub start_marker: [u8; 3],
    pub end_marker: [u8; 3],
    pub text_color: [u8; 3],
    pub marker_radius: i32,
    pub line_width: i32,
    pub text_scale: f32,
    pub line_spacing: i32, // vertical gap between stacked item names
    pub dash: f32,         // fallback dash and gap length, in pixels
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            path_color: [255, 0, 0],
            fallback_color: [255, 255, 0],
            start_marker: [0, 128, 0],
            end_marker: [0, 0, 255],
            text_color: [0, 0, 0],
            marker_radius: 5,
            line_width: 2,
            text_scale: 12.0,
            line_spacing: 10,
            dash: 6.0,
        }
    }
}

/// Stroke a polyline `width` pixels wide by repeating it at small offsets.
fn draw_polyline(img: &mut RgbImage, pts: &[PixelPt], color: Rgb<u8>, width: i32) {
    if pts.len() < 2 {
        return;
    }
    let half = (width / 2).max(0);
    for ox in -half..=half {
        for oy in -half..=half {
            for pair in pts.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                draw_line_segment_mut(
                    img,
                    ((a.x as i32 + ox) as f32, (a.y as i32 + oy) as f32),
                    ((b.x as i32 + ox) as f32, (b.y as i32 + oy) as f32),
                    color,
                );
            }
        }
    }
}

/// Dashed straight line; dashes and gaps are both `dash` pixels long.
fn draw_dashed_line(img: &mut RgbImage, a: PixelPt, b: PixelPt, color: Rgb<u8>, width: i32, dash: f32) {
    let (ax, ay) = (a.x as f32, a.y as f32);
    let (dx, dy) = (b.x as f32 - ax, b.y as f32 - ay);
    let len = dx.hypot(dy);
    if len == 0.0 || dash <= 0.0 {
        return;
    }
    let half = (width / 2).max(0);
    let mut t = 0.0f32;
    while t < len {
        let t1 = (t + dash).min(len);
        let p0 = (ax + dx * t / len, ay + dy * t / len);
        let p1 = (ax + dx * t1 / len, ay + dy * t1 / len);
        for ox in -half..=half {
            for oy in -half..=half {
                let (ox, oy) = (ox as f32, oy as f32);
                draw_line_segment_mut(img, (p0.0 + ox, p0.1 + oy), (p1.0 + ox, p1.1 + oy), color);
            }
        }
        t += 2.0 * dash;
    }
}

/// Draw planned segments, stop markers and item names onto the base map.
///
/// Found paths are solid; fallback segments are dashed in their own color so
/// the approximation stays visible. Items are stacked under each stop's
/// original centroid, and only when a font is available.
pub fn draw_route(
    image: &mut RgbImage,
    segments: &[PathSegment],
    centroids: &Centroids,
    required: &RequiredList,
    font: Option<&FontVec>,
    cfg: &RenderSettings,
) {
    let scale = PxScale::from(cfg.text_scale);
    for seg in segments {
        if seg.fallback {
            draw_dashed_line(
                image,
                seg.start,
                seg.end,
                Rgb(cfg.fallback_color),
                cfg.line_width,
                cfg.dash,
            );
        } else {
            draw_polyline(image, &seg.points, Rgb(cfg.path_color), cfg.line_width);
        }

        let (s, e) = (seg.start, seg.end);
        draw_filled_circle_mut(image, (s.x as i32, s.y as i32), cfg.marker_radius, Rgb(cfg.start_marker));
        draw_filled_circle_mut(image, (e.x as i32, e.y as i32), cfg.marker_radius, Rgb(cfg.end_marker));

        let (Some(font), Some(c)) = (font, centroids.get(&seg.from)) else {
            continue;
        };
        let mut y = c.y as i32;
        for item in required.items(&seg.from) {
            draw_text_mut(image, Rgb(cfg.text_color), c.x as i32, y, scale, font, item);
            y += cfg.line_spacing;
        }
    }
    debug!("Rendered {} segments", segments.len());
}
