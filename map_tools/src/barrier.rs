use common_types::BarrierGrid;
use image::{GrayImage, Luma, RgbImage};
use log::info;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BarrierSettings {
    /// Color of walkable floor in the barrier map.
    pub open_floor: [u8; 3],
    pub tolerance: u8,
}

impl Default for BarrierSettings {
    fn default() -> Self {
        Self {
            open_floor: [224, 224, 224],
            tolerance: 0,
        }
    }
}

/// Free iff every channel is within `tolerance` of the open-floor color.
#[inline]
pub fn is_open_floor(px: [u8; 3], cfg: &BarrierSettings) -> bool {
    px.iter()
        .zip(cfg.open_floor.iter())
        .all(|(&a, &b)| a.abs_diff(b) <= cfg.tolerance)
}

/// Threshold a cropped barrier map into an occupancy grid.
pub fn build_barrier_grid(img: &RgbImage, cfg: &BarrierSettings) -> BarrierGrid {
    let (w, h) = img.dimensions();
    let grid = BarrierGrid::from_fn(w, h, |x, y| !is_open_floor(img.get_pixel(x, y).0, cfg));
    info!(
        "Barrier grid {}x{}: {} free cells",
        w,
        h,
        grid.free_count()
    );
    grid
}

/// Visualize a grid: free cells 0, occupied cells 255.
pub fn barrier_mask_image(grid: &BarrierGrid) -> GrayImage {
    GrayImage::from_fn(grid.width(), grid.height(), |x, y| {
        if grid.is_occupied(x, y) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    #[test]
    fn only_floor_gray_is_free() {
        let mut img = RgbImage::from_pixel(4, 2, Rgb([224, 224, 224]));
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([247, 247, 247]));
        img.put_pixel(2, 0, Rgb([224, 224, 225]));
        let grid = build_barrier_grid(&img, &BarrierSettings::default());
        assert!(grid.is_occupied(0, 0));
        assert!(grid.is_occupied(1, 0));
        assert!(grid.is_occupied(2, 0));
        assert!(grid.is_free(3, 0));
        assert_eq!(grid.free_count(), 5);

        let mask = barrier_mask_image(&grid);
        assert_eq!(mask.get_pixel(0, 0), &Luma([255]));
        assert_eq!(mask.get_pixel(3, 1), &Luma([0]));
    }

    #[test]
    fn tolerance_widens_the_floor_band() {
        let img = RgbImage::from_pixel(1, 1, Rgb([226, 222, 224]));
        let strict = build_barrier_grid(&img, &BarrierSettings::default());
        let loose = build_barrier_grid(&img, &BarrierSettings { tolerance: 2, ..Default::default() });
        assert!(strict.is_occupied(0, 0));
        assert!(loose.is_free(0, 0));
    }

    proptest! {
        #[test]
        fn cell_depends_only_on_its_pixel(
            pixels in prop::collection::vec(any::<[u8; 3]>(), 12),
            tolerance in 0u8..8
        ) {
            let cfg = BarrierSettings { tolerance, ..Default::default() };
            let img = RgbImage::from_fn(4, 3, |x, y| Rgb(pixels[(y * 4 + x) as usize]));
            let grid = build_barrier_grid(&img, &cfg);

            // same pixels in reverse order give the mirrored grid
            let mirrored = RgbImage::from_fn(4, 3, |x, y| Rgb(pixels[11 - (y * 4 + x) as usize]));
            let mirror_grid = build_barrier_grid(&mirrored, &cfg);

            for y in 0..3u32 {
                for x in 0..4u32 {
                    let px = pixels[(y * 4 + x) as usize];
                    prop_assert_eq!(grid.is_free(x, y), is_open_floor(px, &cfg));
                    prop_assert_eq!(grid.is_free(x, y), mirror_grid.is_free(3 - x, 2 - y));
                }
            }
        }
    }
}
