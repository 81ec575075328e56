#![allow(dead_code)]

use std::io::Cursor;

use aisle_route::EngineConfig;
use common_types::{LabelSpec, ReferenceRect, RequiredList};
use image::{ImageFormat, Rgb, RgbImage};

// Raw maps are 216x266; stripping the 16px right strip and 66px top band
// leaves 200x200, and a dark outline at 10..=189 trims that to 180x180.
pub const RAW_W: u32 = 216;
pub const RAW_H: u32 = 266;
pub const TOP: u32 = 66;
pub const OUTLINE: std::ops::RangeInclusive<u32> = 10..=189;

pub fn base_map() -> RgbImage {
    let mut img = RgbImage::from_pixel(RAW_W, RAW_H, Rgb([247, 247, 247]));
    for i in OUTLINE {
        for j in [*OUTLINE.start(), *OUTLINE.end()] {
            img.put_pixel(i, j + TOP, Rgb([0, 0, 0]));
            img.put_pixel(j, i + TOP, Rgb([0, 0, 0]));
        }
    }
    img
}

/// Open floor everywhere except a wall at trimmed x = 90 for trimmed y < `wall_end`.
pub fn barrier_map(wall_end: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(RAW_W, RAW_H, Rgb([224, 224, 224]));
    let x = 10 + 90;
    for y in 0..wall_end {
        img.put_pixel(x, 10 + y + TOP, Rgb([40, 40, 40]));
    }
    img
}

pub fn label(name: &str, x: f64, y: f64) -> LabelSpec {
    LabelSpec { source_x: x, source_y: y, font_size: 12.0, name: name.into() }
}

pub fn store_labels() -> Vec<LabelSpec> {
    vec![
        label("entrance", 10.0, 160.0),
        label("dairy", 160.0, 20.0),
        label("checkout", 20.0, 20.0),
        label("produce", 160.0, 160.0),
    ]
}

// Anchors land on trimmed (1, 1) and (178, 178): one pixel per unit.
pub fn reference() -> ReferenceRect {
    ReferenceRect { min_x: 0.0, min_y: 0.0, max_x: 177.0, max_y: 177.0 }
}

pub fn config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.calibration.bias_x = 0.0;
    cfg.calibration.bias_y = 0.0;
    cfg.segmentation.seed = Some(11);
    cfg
}

pub fn required() -> RequiredList {
    [("dairy", vec!["milk", "butter"])].into_iter().collect()
}

pub fn png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}
