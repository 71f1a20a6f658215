//! Source-dependent analysis: direction-discriminating features
//! relative to a candidate source position, and wobble off-region
//! enumeration.

use crate::hillas::HillasParameters;
use cherenkov_common::Real;

/// A candidate source position in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePosition {
    pub x: Real,
    pub y: Real,
}

/// One on- or off-source region. Index 0 is always the on-source
/// region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WobbleRegion {
    pub index: u32,
    pub position: SourcePosition,
}

/// Enumerates the on-region plus `n_off` background regions, obtained
/// by rotating the on-source offset around the pointing centre in
/// 360°/(n_off+1) increments.
pub fn wobble_regions(on_region: SourcePosition, n_off: u32) -> Vec<WobbleRegion> {
    let step = std::f64::consts::TAU / (n_off + 1) as Real;
    (0..=n_off)
        .map(|index| {
            let (sin, cos) = (index as Real * step).sin_cos();
            WobbleRegion {
                index,
                position: SourcePosition {
                    x: on_region.x * cos - on_region.y * sin,
                    y: on_region.x * sin + on_region.y * cos,
                },
            }
        })
        .collect()
}

/// Direction-relative quantities for one candidate source position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceFeatures {
    pub dist: Real,
    pub signed_skewness: Real,
    pub signed_time_gradient: Real,
}

/// Signs skewness and time gradient toward the candidate source.
///
/// The sign is that of the source's longitudinal coordinate along the
/// major axis, so the features discriminate images pointing toward the
/// source from those pointing away.
pub fn source_features(hillas: &HillasParameters, source: &SourcePosition) -> SourceFeatures {
    let dx = source.x - hillas.cog_x;
    let dy = source.y - hillas.cog_y;
    let longitudinal = dx * hillas.psi.cos() + dy * hillas.psi.sin();
    let sign = if longitudinal >= 0.0 { 1.0 } else { -1.0 };
    SourceFeatures {
        dist: dx.hypot(dy),
        signed_skewness: sign * hillas.skewness,
        signed_time_gradient: sign * hillas.time_gradient,
    }
}

/// Resolves per-region source features for the configured observation
/// layout.
#[derive(Debug, Clone)]
pub struct SourceDependentResolver {
    regions: Vec<WobbleRegion>,
}

impl SourceDependentResolver {
    /// A wobble layout with `n_off` off-source regions.
    pub fn wobble(on_region: SourcePosition, n_off: u32) -> Self {
        Self {
            regions: wobble_regions(on_region, n_off),
        }
    }

    /// An on-source-only layout.
    pub fn on_only(on_region: SourcePosition) -> Self {
        Self {
            regions: vec![WobbleRegion {
                index: 0,
                position: on_region,
            }],
        }
    }

    pub fn regions(&self) -> &[WobbleRegion] {
        &self.regions
    }

    /// Source features per region, in region-index order.
    pub fn features(&self, hillas: &HillasParameters) -> Vec<(u32, SourceFeatures)> {
        self.regions
            .iter()
            .map(|region| (region.index, source_features(hillas, &region.position)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn hillas_along_x() -> HillasParameters {
        HillasParameters {
            intensity: 100.0,
            cog_x: 0.2,
            cog_y: 0.0,
            r: 0.2,
            phi: 0.0,
            length: 0.3,
            width: 0.1,
            psi: 0.0,
            skewness: 0.4,
            kurtosis: 2.0,
            time_gradient: 1.2,
            time_intercept: 10.0,
            leakage_pixels_width_1: 0.0,
            leakage_pixels_width_2: 0.0,
            leakage_intensity_width_1: 0.0,
            leakage_intensity_width_2: 0.0,
        }
    }

    #[test]
    fn three_off_regions_at_right_angles() {
        let regions = wobble_regions(SourcePosition { x: 0.4, y: 0.0 }, 3);
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[0].index, 0);
        assert_approx_eq!(regions[0].position.x, 0.4, 1e-12);
        assert_approx_eq!(regions[0].position.y, 0.0, 1e-12);
        assert_approx_eq!(regions[1].position.x, 0.0, 1e-12);
        assert_approx_eq!(regions[1].position.y, 0.4, 1e-12);
        assert_approx_eq!(regions[2].position.x, -0.4, 1e-12);
        assert_approx_eq!(regions[2].position.y, 0.0, 1e-12);
        assert_approx_eq!(regions[3].position.x, 0.0, 1e-12);
        assert_approx_eq!(regions[3].position.y, -0.4, 1e-12);
    }

    #[test]
    fn all_regions_keep_the_on_offset() {
        let on = SourcePosition { x: 0.3, y: 0.1 };
        let offset = on.x.hypot(on.y);
        for region in wobble_regions(on, 5) {
            assert_approx_eq!(region.position.x.hypot(region.position.y), offset, 1e-12);
        }
    }

    #[test]
    fn features_signed_toward_the_source() {
        let hillas = hillas_along_x();

        let toward = source_features(&hillas, &SourcePosition { x: 1.0, y: 0.0 });
        assert_approx_eq!(toward.dist, 0.8, 1e-12);
        assert_approx_eq!(toward.signed_skewness, 0.4, 1e-12);
        assert_approx_eq!(toward.signed_time_gradient, 1.2, 1e-12);

        let away = source_features(&hillas, &SourcePosition { x: -1.0, y: 0.0 });
        assert_approx_eq!(away.signed_skewness, -0.4, 1e-12);
        assert_approx_eq!(away.signed_time_gradient, -1.2, 1e-12);
    }

    #[test]
    fn resolver_emits_one_feature_set_per_region() {
        let resolver =
            SourceDependentResolver::wobble(SourcePosition { x: 0.4, y: 0.0 }, 3);
        let features = resolver.features(&hillas_along_x());
        assert_eq!(features.len(), 4);
        assert_eq!(
            features.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }
}
