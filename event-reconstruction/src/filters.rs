//! Quality cuts on image parameters.

use crate::features::{FeatureName, hillas_feature_value};
use crate::hillas::HillasParameters;
use cherenkov_common::Real;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    Accepted,
    Rejected { criterion: FeatureName },
}

/// Applies the configured inclusive [min, max] cuts to one event's
/// image parameters. Cuts are evaluated in a fixed order so the
/// reported criterion is deterministic.
#[derive(Debug, Clone)]
pub struct EventFilter {
    cuts: Vec<(FeatureName, Real, Real)>,
}

impl EventFilter {
    /// Builds the filter from the validated configuration map. Keys are
    /// known to parse after [crate::config::ReconstructionConfig::validate].
    pub fn new(filters: &BTreeMap<String, [Real; 2]>) -> Self {
        let cuts = filters
            .iter()
            .filter_map(|(key, &[min, max])| {
                FeatureName::from_str(key)
                    .ok()
                    .map(|feature| (feature, min, max))
            })
            .collect();
        Self { cuts }
    }

    /// The first failing cut rejects the event. A feature undefined for
    /// this image counts as failing its cut.
    pub fn evaluate(&self, hillas: &HillasParameters) -> FilterDecision {
        for &(feature, min, max) in &self.cuts {
            match hillas_feature_value(hillas, feature) {
                Some(value) if (min..=max).contains(&value) => {}
                _ => return FilterDecision::Rejected { criterion: feature },
            }
        }
        FilterDecision::Accepted
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hillas() -> HillasParameters {
        HillasParameters {
            intensity: 120.0,
            cog_x: 0.3,
            cog_y: 0.4,
            r: 0.5,
            phi: 0.927,
            length: 0.4,
            width: 0.1,
            psi: 0.2,
            skewness: 0.3,
            kurtosis: 2.5,
            time_gradient: 1.5,
            time_intercept: 12.0,
            leakage_pixels_width_1: 0.0,
            leakage_pixels_width_2: 0.1,
            leakage_intensity_width_1: 0.0,
            leakage_intensity_width_2: 0.05,
        }
    }

    fn cuts(entries: &[(&str, Real, Real)]) -> BTreeMap<String, [Real; 2]> {
        entries
            .iter()
            .map(|&(key, min, max)| (key.to_owned(), [min, max]))
            .collect()
    }

    #[test]
    fn passes_when_all_cuts_hold() {
        let filter = EventFilter::new(&cuts(&[
            ("intensity", 50.0, 1e9),
            ("width", 0.0, 10.0),
            ("length", 0.0, 10.0),
        ]));
        assert_eq!(filter.evaluate(&hillas()), FilterDecision::Accepted);
    }

    #[test]
    fn bounds_are_inclusive() {
        let filter = EventFilter::new(&cuts(&[("intensity", 120.0, 120.0)]));
        assert_eq!(filter.evaluate(&hillas()), FilterDecision::Accepted);
    }

    #[test]
    fn reports_the_failing_criterion() {
        let filter = EventFilter::new(&cuts(&[
            ("intensity", 500.0, 1e9),
            ("width", 0.0, 10.0),
        ]));
        assert_eq!(
            filter.evaluate(&hillas()),
            FilterDecision::Rejected {
                criterion: FeatureName::Intensity
            }
        );
    }

    #[test]
    fn undefined_feature_fails_its_cut() {
        let filter = EventFilter::new(&cuts(&[("wl", 0.01, 1.0)]));
        let mut degenerate = hillas();
        degenerate.length = 0.0;
        assert_eq!(
            filter.evaluate(&degenerate),
            FilterDecision::Rejected {
                criterion: FeatureName::Wl
            }
        );
    }
}
