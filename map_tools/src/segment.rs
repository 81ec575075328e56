use std::collections::{HashMap, VecDeque};

use ab_glyph::{FontVec, PxScale};
use common_types::{CalibratedLabel, PixelPt, RegionMap};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    /// Untouched canvas color that a fill may claim.
    pub fillable: [u8; 3],
    /// Seed for the per-label fill colors; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub text_scale: f32,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            fillable: [255, 255, 255],
            seed: None,
            text_scale: 12.0,
        }
    }
}

/// Filled canvas plus the pixels each region claimed.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub canvas: RgbImage,
    pub regions: RegionMap,
    /// Labels that did not open a fill (seed off-canvas or already claimed).
    pub dropped: Vec<String>,
}

/// One active fill front.
struct Front {
    queue: VecDeque<PixelPt>,
    color: Rgb<u8>,
    region: usize,
}

const NEIGHBORS4: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Multi-source flood fill over `canvas`.
///
/// Every label seeds one queue. Queues advance in lock-step, one pixel per
/// queue per round, claiming 4-connected neighbors that still carry the
/// `fillable` color. A claimed pixel never changes owner. When two fronts reach
/// a pixel in the same round the earlier label wins, so boundaries are only
/// approximately equidistant. Each pixel is claimed at most once, which bounds
/// the total work by the canvas size.
pub fn flood_fill_regions<R: Rng>(
    mut canvas: RgbImage,
    labels: &[CalibratedLabel],
    fillable: Rgb<u8>,
    rng: &mut R,
) -> Segmentation {
    let (w, h) = canvas.dimensions();
    let idx = |x: u32, y: u32| -> usize { (y as usize) * (w as usize) + x as usize };

    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut names: Vec<String> = Vec::new();
    let mut pixels: Vec<Vec<PixelPt>> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut fronts: Vec<Front> = Vec::with_capacity(labels.len());
    let mut dropped = Vec::new();

    for label in labels {
        let (sx, sy) = (label.pixel_x as i64, label.pixel_y as i64);
        if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
            warn!(
                "Label '{}' seeds at ({:.1}, {:.1}), outside the {}x{} canvas; dropped",
                label.name, label.pixel_x, label.pixel_y, w, h
            );
            dropped.push(label.name.clone());
            continue;
        }
        let seed = PixelPt::new(sx as u32, sy as u32);
        if visited[idx(seed.x, seed.y)] {
            warn!("Label '{}' seeds on an already claimed pixel {}", label.name, seed);
            dropped.push(label.name.clone());
            continue;
        }

        let region = *by_name.entry(label.name.clone()).or_insert_with(|| {
            names.push(label.name.clone());
            pixels.push(Vec::new());
            names.len() - 1
        });
        let color = Rgb([
            rng.random_range(0..=254u8),
            rng.random_range(0..=254u8),
            rng.random_range(0..=254u8),
        ]);

        canvas.put_pixel(seed.x, seed.y, color);
        visited[idx(seed.x, seed.y)] = true;
        pixels[region].push(seed);
        fronts.push(Front {
            queue: VecDeque::from([seed]),
            color,
            region,
        });
    }

    let mut rounds = 0usize;
    loop {
        let mut active = false;
        for front in fronts.iter_mut() {
            let Some(p) = front.queue.pop_front() else {
                continue;
            };
            active = true;
            for (dx, dy) in NEIGHBORS4 {
                let nx = p.x as i64 + dx;
                let ny = p.y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let i = idx(nx, ny);
                if visited[i] || *canvas.get_pixel(nx, ny) != fillable {
                    continue;
                }
                visited[i] = true;
                canvas.put_pixel(nx, ny, front.color);
                front.queue.push_back(PixelPt::new(nx, ny));
                pixels[front.region].push(PixelPt::new(nx, ny));
            }
        }
        if !active {
            break;
        }
        rounds += 1;
    }
    debug!("Flood fill finished after {} rounds", rounds);

    let regions: RegionMap = names.into_iter().zip(pixels).collect();
    Segmentation { canvas, regions, dropped }
}

/// Write each label's name centered on its seed point.
pub fn annotate_labels(canvas: &mut RgbImage, labels: &[CalibratedLabel], font: &FontVec, scale: f32) {
    let scale = PxScale::from(scale);
    for label in labels {
        let (tw, th) = text_size(scale, font, &label.name);
        let x = label.pixel_x as i32 - (tw / 2) as i32;
        let y = label.pixel_y as i32 - (th / 2) as i32;
        draw_text_mut(canvas, Rgb([0, 0, 0]), x, y, scale, font, &label.name);
    }
}

/// Segment a blank canvas of `size` around the calibrated labels.
pub fn segment_regions(
    size: (u32, u32),
    labels: &[CalibratedLabel],
    cfg: &SegmentSettings,
    font: Option<&FontVec>,
) -> Segmentation {
    let fillable = Rgb(cfg.fillable);
    let canvas = RgbImage::from_pixel(size.0, size.1, fillable);
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut seg = flood_fill_regions(canvas, labels, fillable, &mut rng);
    if let Some(font) = font {
        annotate_labels(&mut seg.canvas, labels, font, cfg.text_scale);
    }
    info!(
        "Segmented {} regions ({} labels dropped)",
        seg.regions.len(),
        seg.dropped.len()
    );
    seg
}
