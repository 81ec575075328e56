//! Raster preparation for store floor maps: trimming, label calibration,
//! region segmentation and barrier extraction.

pub mod barrier;
pub mod calibrate;
pub mod markup;
pub mod segment;
pub mod trim;

pub use barrier::{barrier_mask_image, build_barrier_grid, BarrierSettings};
pub use calibrate::{calibrate_labels, Calibration, CalibrationSettings};
pub use markup::{parse_store_markup, MarkupError, StoreMarkup};
pub use segment::{segment_regions, SegmentSettings, Segmentation};
pub use trim::{crop_like, trim_image, TrimSettings, Trimmed};

use common_types::RouteError;
use image::RgbImage;

/// Decode encoded image bytes (any format `image` supports) into RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, RouteError> {
    let img = image::load_from_memory(bytes).map_err(|e| RouteError::ImageDecode(e.to_string()))?;
    Ok(img.to_rgb8())
}
