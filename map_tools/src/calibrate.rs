use common_types::{CalibratedLabel, LabelSpec, PixelPt, Pt, ReferenceRect, RouteError};
use image::RgbImage;
use log::{debug, info};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Exact color marking the raster's content origin and extent.
    pub anchor: [u8; 3],
    /// Label anchor vs glyph box offset, in pixels.
    pub bias_x: f64,
    pub bias_y: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            anchor: [247, 247, 247],
            bias_x: 30.0,
            bias_y: 25.0,
        }
    }
}

/// Affine scale + offset from markup coordinates to trimmed-raster pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub top_left: PixelPt,
    pub bottom_right: PixelPt,
    pub scale_x: f64,
    pub scale_y: f64,
    pub reference: ReferenceRect,
    pub bias_x: f64,
    pub bias_y: f64,
}

/// First anchor-colored pixel in row-major order and the first one scanning
/// back from the bottom-right corner.
pub fn find_anchors(img: &RgbImage, anchor: [u8; 3]) -> Option<(PixelPt, PixelPt)> {
    let w = img.width() as usize;
    if w == 0 {
        return None;
    }
    let raw = img.as_raw();
    let first = raw.chunks_exact(3).position(|c| c == anchor)?;
    let last = raw.chunks_exact(3).rposition(|c| c == anchor)?;
    let at = |i: usize| PixelPt::new((i % w) as u32, (i / w) as u32);
    Some((at(first), at(last)))
}

impl Calibration {
    /// Derive the transform from the trimmed image and the markup's
    /// background rectangle.
    pub fn fit(
        img: &RgbImage,
        reference: ReferenceRect,
        cfg: &CalibrationSettings,
    ) -> Result<Self, RouteError> {
        let (top_left, bottom_right) =
            find_anchors(img, cfg.anchor).ok_or(RouteError::CalibrationFailure)?;

        let (rw, rh) = (reference.width(), reference.height());
        if !(rw.is_finite() && rh.is_finite() && rw > 0.0 && rh > 0.0) {
            return Err(RouteError::DegenerateReference { width: rw, height: rh });
        }

        let scale_x = (bottom_right.x as f64 - top_left.x as f64) / rw;
        let scale_y = (bottom_right.y as f64 - top_left.y as f64) / rh;
        debug!(
            "Anchors {} .. {}, scale ({:.4}, {:.4})",
            top_left, bottom_right, scale_x, scale_y
        );

        Ok(Self {
            top_left,
            bottom_right,
            scale_x,
            scale_y,
            reference,
            bias_x: cfg.bias_x,
            bias_y: cfg.bias_y,
        })
    }

    /// Map a markup-space point to pixel space.
    pub fn to_pixels(&self, source: Pt) -> Pt {
        Pt {
            x: (source.x - self.reference.min_x) * self.scale_x + self.top_left.x as f64 + self.bias_x,
            y: (source.y - self.reference.min_y) * self.scale_y + self.top_left.y as f64 + self.bias_y,
        }
    }

    pub fn apply(&self, label: &LabelSpec) -> CalibratedLabel {
        let px = self.to_pixels(Pt::new(label.source_x, label.source_y));
        CalibratedLabel {
            pixel_x: px.x,
            pixel_y: px.y,
            name: label.name.clone(),
        }
    }
}

/// Calibrate every label against the trimmed base map.
pub fn calibrate_labels(
    img: &RgbImage,
    labels: &[LabelSpec],
    reference: ReferenceRect,
    cfg: &CalibrationSettings,
) -> Result<Vec<CalibratedLabel>, RouteError> {
    let calibration = Calibration::fit(img, reference, cfg)?;
    let out: Vec<CalibratedLabel> = labels.iter().map(|l| calibration.apply(l)).collect();
    info!("Calibrated {} labels", out.len());
    Ok(out)
}
