//! Data volume reduction: zero-suppression of pixels far from the
//! cleaned image.

use crate::cleaning::CleaningMask;
use crate::config::{VolumeReducerAlgorithm, VolumeReducerConfig};
use crate::extraction::CalibratedImage;
use cherenkov_common::geometry::CameraGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeReducer {
    PassThrough,
    ZeroSuppression { dilations: usize },
}

impl VolumeReducer {
    pub fn from_config(config: &VolumeReducerConfig) -> Self {
        match config.algorithm {
            None => Self::PassThrough,
            Some(VolumeReducerAlgorithm::ZeroSuppression) => Self::ZeroSuppression {
                dilations: config.parameters.number_of_dilations,
            },
        }
    }

    /// Zeroes charge and peak time outside the cleaning mask grown by
    /// the configured number of neighbor dilations. The mask itself is
    /// untouched.
    pub fn reduce(
        &self,
        geometry: &CameraGeometry,
        image: &mut CalibratedImage,
        mask: &CleaningMask,
    ) {
        let Self::ZeroSuppression { dilations } = *self else {
            return;
        };
        let kept = dilate(geometry, mask, dilations);
        for pixel in 0..image.charges.len() {
            if !kept.get(pixel) {
                image.charges[pixel] = 0.0;
                image.peak_times[pixel] = 0.0;
            }
        }
    }
}

/// Grows a mask by adding the neighbors of set pixels, `steps` times.
pub fn dilate(geometry: &CameraGeometry, mask: &CleaningMask, steps: usize) -> CleaningMask {
    let mut grown = mask.clone();
    for _ in 0..steps {
        let frontier: Vec<_> = grown.iter_set().collect();
        for pixel in frontier {
            for &neighbor in geometry.neighbors(pixel) {
                grown.set(neighbor, true);
            }
        }
    }
    grown
}
