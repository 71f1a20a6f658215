//! Camera geometry: pixel positions, neighbour lists and border rings.
//!
//! The geometry is loaded once per run and shared read-only by every
//! worker. Neighbour relations are precomputed so that cleaning and
//! parameterization never search for them per event.

use crate::{PixelId, Real};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraGeometry {
    pix_x: Vec<Real>,
    pix_y: Vec<Real>,
    neighbors: Vec<Vec<PixelId>>,
    /// Pixels on the outermost camera ring.
    border_width_1: Vec<bool>,
    /// Pixels on the two outermost camera rings.
    border_width_2: Vec<bool>,
}

impl CameraGeometry {
    /// Builds a geometry from pixel positions, linking as neighbours all
    /// pixel pairs closer than `neighbor_radius`.
    ///
    /// Border rings are derived from connectivity: a pixel with fewer
    /// neighbours than the camera-wide maximum lies on the outer ring,
    /// and the second ring is the outer ring plus its neighbours.
    pub fn from_positions(pix_x: Vec<Real>, pix_y: Vec<Real>, neighbor_radius: Real) -> Self {
        assert_eq!(pix_x.len(), pix_y.len());
        let n = pix_x.len();
        let r2 = neighbor_radius * neighbor_radius;

        let mut neighbors = vec![Vec::new(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = pix_x[i] - pix_x[j];
                let dy = pix_y[i] - pix_y[j];
                if dx * dx + dy * dy <= r2 {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }

        let max_neighbors = neighbors.iter().map(Vec::len).max().unwrap_or(0);
        let border_width_1: Vec<bool> = neighbors.iter().map(|nb| nb.len() < max_neighbors).collect();
        let mut border_width_2 = border_width_1.clone();
        for (pixel, on_border) in border_width_1.iter().enumerate() {
            if *on_border {
                for &nb in &neighbors[pixel] {
                    border_width_2[nb] = true;
                }
            }
        }

        Self {
            pix_x,
            pix_y,
            neighbors,
            border_width_1,
            border_width_2,
        }
    }

    pub fn n_pixels(&self) -> usize {
        self.pix_x.len()
    }

    pub fn pix_x(&self, pixel: PixelId) -> Real {
        self.pix_x[pixel]
    }

    pub fn pix_y(&self, pixel: PixelId) -> Real {
        self.pix_y[pixel]
    }

    pub fn neighbors(&self, pixel: PixelId) -> &[PixelId] {
        &self.neighbors[pixel]
    }

    pub fn on_border_width_1(&self, pixel: PixelId) -> bool {
        self.border_width_1[pixel]
    }

    pub fn on_border_width_2(&self, pixel: PixelId) -> bool {
        self.border_width_2[pixel]
    }
}
