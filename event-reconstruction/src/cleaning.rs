//! Image cleaning: tailcuts with a pedestal-noise-scaled threshold,
//! neighbour pruning, temporal coincidence and island selection.

use crate::config::CleaningConfig;
use crate::extraction::CalibratedImage;
use cherenkov_common::{PixelId, Real, geometry::CameraGeometry};

/// Boolean per-pixel flag array produced by cleaning.
///
/// An empty mask is a valid result: the event carries no image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningMask {
    flags: Vec<bool>,
}

impl CleaningMask {
    pub fn new(n_pixels: usize) -> Self {
        Self {
            flags: vec![false; n_pixels],
        }
    }

    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn get(&self, pixel: PixelId) -> bool {
        self.flags[pixel]
    }

    pub fn set(&mut self, pixel: PixelId, value: bool) {
        self.flags[pixel] = value;
    }

    pub fn n_set(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.flags.iter().any(|&f| f)
    }

    pub fn iter_set(&self) -> impl Iterator<Item = PixelId> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(pixel, &flag)| flag.then_some(pixel))
    }
}

#[derive(Debug, Clone)]
pub struct TailcutsCleaner {
    config: CleaningConfig,
}

impl TailcutsCleaner {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    /// Cleans one image against per-pixel pedestal noise.
    ///
    /// A pixel is "picture" if its charge reaches
    /// max(picture-thresh, sigma·pedestal_std); "boundary" if it reaches
    /// the equivalent boundary threshold and touches a picture pixel.
    /// The `min-number-picture-neighbors` pruning counts neighbours
    /// among picture pixels only (pre-prune set).
    pub fn clean(
        &self,
        geometry: &CameraGeometry,
        image: &CalibratedImage,
        pedestal_std: &[Real],
    ) -> CleaningMask {
        let cfg = &self.config;
        let n_pixels = image.n_pixels();

        let picture: Vec<bool> = (0..n_pixels)
            .map(|pixel| {
                let threshold = cfg.picture_thresh.max(cfg.sigma * pedestal_std[pixel]);
                image.charges[pixel] >= threshold
            })
            .collect();

        let picture_kept: Vec<bool> = (0..n_pixels)
            .map(|pixel| {
                if !picture[pixel] {
                    return false;
                }
                if cfg.keep_isolated_pixels {
                    return true;
                }
                let picture_neighbors = geometry
                    .neighbors(pixel)
                    .iter()
                    .filter(|&&nb| picture[nb])
                    .count();
                picture_neighbors >= cfg.min_number_picture_neighbors
            })
            .collect();

        let mut mask = CleaningMask::new(n_pixels);
        for pixel in 0..n_pixels {
            if picture_kept[pixel] {
                mask.set(pixel, true);
                continue;
            }
            let threshold = cfg.boundary_thresh.max(cfg.sigma * pedestal_std[pixel]);
            if image.charges[pixel] >= threshold
                && geometry.neighbors(pixel).iter().any(|&nb| picture_kept[nb])
            {
                mask.set(pixel, true);
            }
        }

        let mask = self.apply_time_coincidence(geometry, image, &picture_kept, mask);

        if cfg.use_only_main_island {
            keep_main_island(geometry, &mask)
        } else {
            mask
        }
    }

    /// Drops pixels whose peak time strays more than `delta-time` from
    /// the mean peak time of their picture neighbours. Pixels without
    /// picture neighbours are left untouched.
    fn apply_time_coincidence(
        &self,
        geometry: &CameraGeometry,
        image: &CalibratedImage,
        picture_kept: &[bool],
        mask: CleaningMask,
    ) -> CleaningMask {
        let delta_time = self.config.delta_time;
        let mut filtered = CleaningMask::new(mask.len());
        for pixel in mask.iter_set() {
            let times: Vec<Real> = geometry
                .neighbors(pixel)
                .iter()
                .filter(|&&nb| picture_kept[nb] && nb != pixel)
                .map(|&nb| image.peak_times[nb])
                .collect();
            if times.is_empty() {
                filtered.set(pixel, true);
                continue;
            }
            let mean = times.iter().sum::<Real>() / times.len() as Real;
            if (image.peak_times[pixel] - mean).abs() <= delta_time {
                filtered.set(pixel, true);
            }
        }
        filtered
    }
}

/// Connected components of the set pixels, in discovery order over
/// ascending pixel ids.
pub fn islands(geometry: &CameraGeometry, mask: &CleaningMask) -> Vec<Vec<PixelId>> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();

    for seed in mask.iter_set() {
        if visited[seed] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = vec![seed];
        visited[seed] = true;
        while let Some(pixel) = queue.pop() {
            component.push(pixel);
            for &nb in geometry.neighbors(pixel) {
                if mask.get(nb) && !visited[nb] {
                    visited[nb] = true;
                    queue.push(nb);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}

/// Keeps only the largest island by pixel count; ties go to the island
/// discovered first (the one containing the lowest pixel id).
fn keep_main_island(geometry: &CameraGeometry, mask: &CleaningMask) -> CleaningMask {
    let components = islands(geometry, mask);
    let mut main = CleaningMask::new(mask.len());
    if let Some(largest) = components.iter().max_by_key(|c| {
        // max_by_key takes the last maximum; invert the index to prefer
        // the first
        (c.len(), usize::MAX - c[0])
    }) {
        for &pixel in largest {
            main.set(pixel, true);
        }
    }
    main
}

#[cfg(test)]
mod tests {
    use super::*;
    use cherenkov_common::EventType;
    use chrono::Utc;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn square_grid(side: usize) -> CameraGeometry {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for row in 0..side {
            for col in 0..side {
                xs.push(col as Real);
                ys.push(row as Real);
            }
        }
        CameraGeometry::from_positions(xs, ys, 1.1)
    }

    fn image(charges: Vec<Real>, peak_times: Vec<Real>) -> CalibratedImage {
        CalibratedImage {
            event_id: 1,
            tel_id: 1,
            event_type: EventType::Shower,
            timestamp: Utc::now(),
            charges,
            peak_times,
        }
    }

    fn config() -> CleaningConfig {
        CleaningConfig {
            picture_thresh: 6.0,
            boundary_thresh: 3.0,
            sigma: 2.5,
            keep_isolated_pixels: false,
            min_number_picture_neighbors: 0,
            use_only_main_island: false,
            delta_time: 100.0,
        }
    }

    #[test]
    fn picture_and_boundary_selection() {
        let geometry = square_grid(5);
        let mut charges = vec![0.0; 25];
        charges[12] = 100.0;
        charges[11] = 4.0;
        charges[13] = 4.0;
        // above boundary threshold but not adjacent to any picture pixel
        charges[0] = 4.0;
        let image = image(charges, vec![10.0; 25]);
        let cleaner = TailcutsCleaner::new(config());

        let mask = cleaner.clean(&geometry, &image, &vec![0.0; 25]);
        assert_eq!(mask.iter_set().collect::<Vec<_>>(), vec![11, 12, 13]);
    }

    #[test]
    fn pedestal_noise_raises_the_threshold() {
        let geometry = square_grid(3);
        let mut charges = vec![0.0; 9];
        charges[4] = 7.0;
        let image = image(charges, vec![0.0; 9]);
        let cleaner = TailcutsCleaner::new(config());

        let quiet = cleaner.clean(&geometry, &image, &vec![0.0; 9]);
        assert_eq!(quiet.n_set(), 1);

        // sigma * std = 2.5 * 4 = 10 > 7
        let noisy = cleaner.clean(&geometry, &image, &vec![4.0; 9]);
        assert!(noisy.is_empty());
    }

    #[test]
    fn isolated_picture_pixel_dropped_unless_kept() {
        let geometry = square_grid(3);
        let mut charges = vec![0.0; 9];
        charges[4] = 100.0;
        let image = image(charges, vec![0.0; 9]);

        let mut cfg = config();
        cfg.min_number_picture_neighbors = 1;
        let mask = TailcutsCleaner::new(cfg).clean(&geometry, &image, &vec![0.0; 9]);
        assert!(mask.is_empty());

        let mut cfg = config();
        cfg.min_number_picture_neighbors = 1;
        cfg.keep_isolated_pixels = true;
        let mask = TailcutsCleaner::new(cfg).clean(&geometry, &image, &vec![0.0; 9]);
        assert_eq!(mask.n_set(), 1);
    }

    #[test]
    fn out_of_time_boundary_pixel_is_dropped() {
        let geometry = square_grid(3);
        let mut charges = vec![0.0; 9];
        charges[4] = 100.0;
        charges[3] = 100.0;
        charges[5] = 4.0;
        let mut peak_times = vec![10.0; 9];
        peak_times[5] = 25.0;
        let image = image(charges, peak_times);

        let mut cfg = config();
        cfg.delta_time = 5.0;
        let mask = TailcutsCleaner::new(cfg).clean(&geometry, &image, &vec![0.0; 9]);
        assert_eq!(mask.iter_set().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn empty_mask_is_a_valid_result() {
        let geometry = square_grid(3);
        let image = image(vec![0.0; 9], vec![0.0; 9]);
        let mask = TailcutsCleaner::new(config()).clean(&geometry, &image, &vec![0.0; 9]);
        assert!(mask.is_empty());
    }

    #[test]
    fn main_island_selection_keeps_one_component() {
        let geometry = square_grid(5);
        let mut charges = vec![0.0; 25];
        // three-pixel island
        charges[0] = 100.0;
        charges[1] = 100.0;
        charges[2] = 100.0;
        // two-pixel island, separated diagonally
        charges[18] = 100.0;
        charges[19] = 100.0;
        let image = image(charges, vec![0.0; 25]);

        let mut cfg = config();
        cfg.use_only_main_island = true;
        let mask = TailcutsCleaner::new(cfg).clean(&geometry, &image, &vec![0.0; 25]);
        assert_eq!(mask.iter_set().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(islands(&geometry, &mask).len(), 1);
    }

    fn random_image(seed: u64, n_pixels: usize) -> CalibratedImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let charges = (0..n_pixels)
            .map(|_| rng.random_range(0.0..12.0))
            .collect();
        image(charges, vec![0.0; n_pixels])
    }

    #[test]
    fn mask_shrinks_monotonically_with_thresholds() {
        let geometry = square_grid(8);
        for seed in 0..20 {
            let image = random_image(seed, 64);
            let mut previous: Option<CleaningMask> = None;
            for step in 0..8 {
                let mut cfg = config();
                cfg.picture_thresh = 2.0 + step as Real;
                cfg.boundary_thresh = 1.0 + step as Real;
                let mask = TailcutsCleaner::new(cfg).clean(&geometry, &image, &vec![0.0; 64]);
                if let Some(previous) = &previous {
                    for pixel in mask.iter_set() {
                        assert!(previous.get(pixel), "raising thresholds added pixel {pixel}");
                    }
                }
                previous = Some(mask);
            }
        }
    }

    #[test]
    fn main_island_invariant_holds_for_random_images() {
        let geometry = square_grid(8);
        let mut cfg = config();
        cfg.use_only_main_island = true;
        cfg.picture_thresh = 9.0;
        cfg.boundary_thresh = 7.0;
        let cleaner = TailcutsCleaner::new(cfg);
        for seed in 100..130 {
            let image = random_image(seed, 64);
            let mask = cleaner.clean(&geometry, &image, &vec![0.0; 64]);
            assert!(islands(&geometry, &mask).len() <= 1);
        }
    }
}
