use common_types::{CropBox, RouteError};
use image::{imageops, RgbImage};
use log::{debug, info};
use serde::Deserialize;

/// Border conventions of the exported store map images.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrimSettings {
    pub right_border: u32, // reserved strip along the right edge
    pub top_border: u32,   // reserved band along the top
    pub background: [u8; 3],
    /// Per-channel difference at or below which a pixel counts as background.
    pub tolerance: u8,
}

impl Default for TrimSettings {
    fn default() -> Self {
        Self {
            right_border: 16,
            top_border: 66,
            background: [247, 247, 247],
            tolerance: 100,
        }
    }
}

/// Trimmed base map plus the crop used, so the barrier map can be cut identically.
#[derive(Debug, Clone)]
pub struct Trimmed {
    pub image: RgbImage,
    pub crop: CropBox,
}

/// Drop the reserved right strip and top band. `None` when nothing is left.
pub fn strip_borders(img: &RgbImage, cfg: &TrimSettings) -> Option<RgbImage> {
    let (w, h) = img.dimensions();
    if w <= cfg.right_border || h <= cfg.top_border {
        return None;
    }
    let out = imageops::crop_imm(img, 0, cfg.top_border, w - cfg.right_border, h - cfg.top_border);
    Some(out.to_image())
}

/// Bounding box of every pixel that differs from `background` by more than
/// `tolerance` in any channel. `None` for an image that is all background.
pub fn content_bbox(img: &RgbImage, background: [u8; 3], tolerance: u8) -> Option<CropBox> {
    let mut x0 = u32::MAX;
    let mut y0 = u32::MAX;
    let mut x1 = 0u32;
    let mut y1 = 0u32;
    let mut found = false;

    for (x, y, p) in img.enumerate_pixels() {
        let differs = p
            .0
            .iter()
            .zip(background.iter())
            .any(|(&a, &b)| a.abs_diff(b) > tolerance);
        if differs {
            found = true;
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }

    found.then(|| CropBox {
        x: x0,
        y: y0,
        width: x1 - x0 + 1,
        height: y1 - y0 + 1,
    })
}

/// Strip the borders, then crop to the content bounding box.
pub fn trim_image(img: &RgbImage, cfg: &TrimSettings) -> Result<Trimmed, RouteError> {
    let stripped = strip_borders(img, cfg).ok_or(RouteError::EmptyContent)?;
    let crop =
        content_bbox(&stripped, cfg.background, cfg.tolerance).ok_or(RouteError::EmptyContent)?;
    debug!(
        "Content box at ({}, {}) size {}x{} inside {}x{}",
        crop.x,
        crop.y,
        crop.width,
        crop.height,
        stripped.width(),
        stripped.height()
    );
    let image = imageops::crop_imm(&stripped, crop.x, crop.y, crop.width, crop.height).to_image();
    info!("Trimmed base map to {}x{}", image.width(), image.height());
    Ok(Trimmed { image, crop })
}

/// Cut a second image with the same framing using a crop box from [`trim_image`].
pub fn crop_like(img: &RgbImage, crop: CropBox, cfg: &TrimSettings) -> Result<RgbImage, RouteError> {
    let stripped = strip_borders(img, cfg).ok_or(RouteError::EmptyContent)?;
    let (w, h) = stripped.dimensions();
    if crop.x + crop.width > w || crop.y + crop.height > h {
        return Err(RouteError::DimensionMismatch {
            expected: (crop.x + crop.width, crop.y + crop.height),
            found: (w, h),
        });
    }
    Ok(imageops::crop_imm(&stripped, crop.x, crop.y, crop.width, crop.height).to_image())
}
