//! Walking routes across retail floor-plan rasters.
//!
//! [`generate_route`] runs the whole chain: trim the base map, calibrate the
//! markup labels into pixel space, grow one region per label, build the
//! barrier grid, order the required regions and plan each leg around the
//! barriers, then draw the result onto the trimmed map.

pub mod classify;
pub mod config;

use std::io::Cursor;

use ab_glyph::FontVec;
use common_types::{
    centroids, BarrierGrid, Centroids, Degradation, LabelSpec, PathSegment, ReferenceRect,
    RequiredList, Route, RouteError,
};
use image::{ImageFormat, RgbImage};
use log::{debug, info, warn};
use map_tools::{
    build_barrier_grid, calibrate_labels, crop_like, decode_rgb, segment_regions, trim_image,
    Segmentation, StoreMarkup,
};
use pathfinding::{draw_route, plan_route, polyline_length, shopping_order};

pub use classify::{
    classify_items, parse_classifier_reply, CachePolicy, ClassificationCache, Classifier,
    ClassifyError, RetryPolicy,
};
pub use config::{default_font, load_font, EngineConfig};

/// One route request: two encoded images of the same store plus its markup
/// data and the classified shopping list.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    /// Base map (PNG or JPEG) with labels' anchor pixels and borders.
    pub base_image: &'a [u8],
    /// Same map with open floor painted in the open-floor color.
    pub barrier_image: &'a [u8],
    pub labels: &'a [LabelSpec],
    pub reference: ReferenceRect,
    pub required: &'a RequiredList,
}

impl<'a> RouteRequest<'a> {
    pub fn from_markup(
        base_image: &'a [u8],
        barrier_image: &'a [u8],
        markup: &'a StoreMarkup,
        required: &'a RequiredList,
    ) -> Self {
        Self {
            base_image,
            barrier_image,
            labels: &markup.labels,
            reference: markup.reference,
            required,
        }
    }
}

/// Rendered route and everything the caller may want to inspect or report.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub image: RgbImage,
    pub segmentation: Segmentation,
    pub centroids: Centroids,
    /// Occupancy grid the legs were planned on.
    pub grid: BarrierGrid,
    pub route: Route,
    pub segments: Vec<PathSegment>,
    pub degradations: Vec<Degradation>,
    /// Required regions with no matching label on the map.
    pub skipped_regions: Vec<String>,
}

impl RouteOutcome {
    /// True when any leg or stop had to be approximated.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Pixel length of the whole route, fallback lines included.
    pub fn walking_distance(&self) -> f64 {
        self.segments.iter().map(|s| polyline_length(&s.points)).sum()
    }

    /// Labels the segmenter could not seed.
    pub fn dropped_labels(&self) -> &[String] {
        &self.segmentation.dropped
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RouteError> {
        let mut out = Cursor::new(Vec::new());
        self.image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| RouteError::ImageEncode(e.to_string()))?;
        Ok(out.into_inner())
    }
}

/// Decode both images and run [`generate_route_from_images`].
pub fn generate_route(
    req: &RouteRequest<'_>,
    cfg: &EngineConfig,
    font: Option<&FontVec>,
) -> Result<RouteOutcome, RouteError> {
    let base = decode_rgb(req.base_image)?;
    let barrier = decode_rgb(req.barrier_image)?;
    debug!(
        "Decoded base {:?} and barrier {:?}",
        base.dimensions(),
        barrier.dimensions()
    );
    generate_route_from_images(&base, &barrier, req.labels, req.reference, req.required, cfg, font)
}

/// Full pipeline over already-decoded images.
///
/// Without a `font` the bundled [`default_font`] draws label and item text.
pub fn generate_route_from_images(
    base: &RgbImage,
    barrier: &RgbImage,
    labels: &[LabelSpec],
    reference: ReferenceRect,
    required: &RequiredList,
    cfg: &EngineConfig,
    font: Option<&FontVec>,
) -> Result<RouteOutcome, RouteError> {
    if base.dimensions() != barrier.dimensions() {
        return Err(RouteError::DimensionMismatch {
            expected: base.dimensions(),
            found: barrier.dimensions(),
        });
    }

    let bundled;
    let font = match font {
        Some(font) => font,
        None => {
            bundled = default_font()?;
            &bundled
        }
    };

    let trimmed = trim_image(base, &cfg.trim)?;
    let calibrated = calibrate_labels(&trimmed.image, labels, reference, &cfg.calibration)?;

    let segmentation = segment_regions(
        trimmed.image.dimensions(),
        &calibrated,
        &cfg.segmentation,
        Some(font),
    );
    for name in &segmentation.dropped {
        warn!("Label '{}' did not seed a region", name);
    }
    let centroids = centroids(&segmentation.regions);

    let barrier_trimmed = crop_like(barrier, trimmed.crop, &cfg.trim)?;
    let grid = build_barrier_grid(&barrier_trimmed, &cfg.barrier);
    debug!(
        "Barrier grid {:?}, {} free cells",
        grid.dimensions(),
        grid.free_count()
    );

    let order = shopping_order(&centroids, required)?;
    let plan = plan_route(&order.route, &centroids, &grid, &cfg.planner)?;

    let mut image = trimmed.image;
    draw_route(&mut image, &plan.segments, &centroids, required, Some(font), &cfg.render);

    if plan.degradations.is_empty() {
        info!("Route rendered with {} stops", order.route.len());
    } else {
        warn!(
            "Route rendered with {} degradations",
            plan.degradations.len()
        );
    }

    Ok(RouteOutcome {
        image,
        segmentation,
        centroids,
        grid,
        route: order.route,
        segments: plan.segments,
        degradations: plan.degradations,
        skipped_regions: order.skipped,
    })
}
