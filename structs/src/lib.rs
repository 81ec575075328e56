use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Continuous position (x, y), either in source (markup) space or pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pt {
    pub x: f64,
    pub y: f64,
}

impl Pt {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Pt) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Integer pixel position (column x, row y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelPt {
    pub x: u32,
    pub y: u32,
}

impl PixelPt {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for PixelPt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A text label as found in the store markup, in source coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub source_x: f64,
    pub source_y: f64,
    pub font_size: f64,
    pub name: String,
}

/// A label mapped into the trimmed raster's pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedLabel {
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub name: String,
}

/// Extent of the markup's background group in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ReferenceRect {
    /// Reduce an arbitrary set of corner points to the min/max corner pair.
    /// Returns `None` for fewer than two points.
    pub fn from_corners(corners: &[(f64, f64)]) -> Option<Self> {
        if corners.len() < 2 {
            return None;
        }
        let mut rect = ReferenceRect {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for &(x, y) in corners {
            rect.min_x = rect.min_x.min(x);
            rect.min_y = rect.min_y.min(y);
            rect.max_x = rect.max_x.max(x);
            rect.max_y = rect.max_y.max(y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Content bounding box, relative to the border-stripped image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Binary occupancy map aligned pixel-for-pixel with the trimmed base image.
/// `true` = occupied. Anything outside the grid counts as occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierGrid {
    width: u32,
    height: u32,
    occupied: Vec<bool>,
}

impl BarrierGrid {
    /// Grid with every cell free.
    pub fn free(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            occupied: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Build a grid by asking `is_occupied(x, y)` for every cell.
    pub fn from_fn(width: u32, height: u32, mut is_occupied: impl FnMut(u32, u32) -> bool) -> Self {
        let mut occupied = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                occupied.push(is_occupied(x, y));
            }
        }
        Self { width, height, occupied }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    #[inline]
    pub fn is_occupied(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return true;
        }
        self.occupied[self.index(x, y)]
    }

    #[inline]
    pub fn is_free(&self, x: u32, y: u32) -> bool {
        !self.is_occupied(x, y)
    }

    pub fn set_occupied(&mut self, x: u32, y: u32, occupied: bool) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.occupied[idx] = occupied;
        }
    }

    pub fn free_count(&self) -> usize {
        self.occupied.iter().filter(|&&o| !o).count()
    }
}

/// Region name -> pixels owned by that region. Built once by the segmenter.
pub type RegionMap = BTreeMap<String, Vec<PixelPt>>;

/// Region name -> mean position of its pixels.
pub type Centroids = BTreeMap<String, Pt>;

/// Arithmetic mean of every region's pixel set. Empty regions are left out.
pub fn centroids(regions: &RegionMap) -> Centroids {
    regions
        .iter()
        .filter(|(_, pixels)| !pixels.is_empty())
        .map(|(name, pixels)| {
            let n = pixels.len() as f64;
            let (sx, sy) = pixels
                .iter()
                .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
            (name.clone(), Pt { x: sx / n, y: sy / n })
        })
        .collect()
}

/// Region name -> items the shopper needs there.
///
/// Only regions with at least one item count as required stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredList(BTreeMap<String, Vec<String>>);

impl RequiredList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, region: S, items: Vec<String>) {
        self.0.insert(region.into(), items);
    }

    /// Items to print at `region`; empty when the region carries none.
    pub fn items(&self, region: &str) -> &[String] {
        self.0.get(region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of regions with a non-empty item list, in name order.
    pub fn required_regions(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Vec<String>>> for RequiredList {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl<S: Into<String>, I: Into<String>> FromIterator<(S, Vec<I>)> for RequiredList {
    fn from_iter<T: IntoIterator<Item = (S, Vec<I>)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

/// Visiting order: entrance, required stops, checkout, entrance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub stops: Vec<String>,
}

impl Route {
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Consecutive (from, to) pairs.
    pub fn legs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.stops
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
    }
}

/// Walked polyline between two consecutive stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub from: String,
    pub to: String,
    /// Snapped start point.
    pub start: PixelPt,
    /// Snapped end point.
    pub end: PixelPt,
    /// Pixels from `start` to `end`; exactly `[start, end]` for a fallback.
    pub points: Vec<PixelPt>,
    /// True when no barrier-avoiding path was found and a direct line is used.
    pub fallback: bool,
}

impl PathSegment {
    /// Number of steps along the polyline.
    pub fn steps(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

/// Why the grid search for a segment produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFailure {
    /// The expansion budget ran out before reaching the goal.
    BudgetExhausted { expansions: usize },
    /// The open set drained: barriers separate the endpoints.
    Disconnected,
    /// An endpoint sits on an occupied cell even after snapping.
    EndpointBlocked,
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchFailure::BudgetExhausted { expansions } => {
                write!(f, "search budget exhausted after {expansions} expansions")
            }
            SearchFailure::Disconnected => write!(f, "endpoints are disconnected by barriers"),
            SearchFailure::EndpointBlocked => write!(f, "start or goal in barrier"),
        }
    }
}

/// Approximations the pipeline recovered from. Rendering goes on, but the
/// caller is told.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Degradation {
    #[error("no walkable path from '{from}' to '{to}' ({reason}); drew a direct line")]
    UnreachableSegment {
        from: String,
        to: String,
        reason: SearchFailure,
    },

    #[error("no free cell near '{region}' at {at}; kept the original position")]
    SnapFailure { region: String, at: PixelPt },
}

/// Failures that abort a route request before anything is rendered.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteError {
    #[error("image has no content after trimming")]
    EmptyContent,

    #[error("no background-colored anchor pixel found for calibration")]
    CalibrationFailure,

    #[error("reference rectangle is degenerate ({width} x {height})")]
    DegenerateReference { width: f64, height: f64 },

    #[error("no region name contains 'entrance'")]
    MissingEntrance,

    #[error("more than one entrance region: {0:?}")]
    AmbiguousEntrance(Vec<String>),

    #[error("route stop '{0}' has no region on the map")]
    UnknownStop(String),

    #[error("image dimensions differ: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load font: {0}")]
    Font(String),

    #[error("store markup: {0}")]
    Markup(String),
}
