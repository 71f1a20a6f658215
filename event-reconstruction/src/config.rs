//! The structured configuration document.
//!
//! Loaded once at startup, validated, then consumed as an immutable
//! settings object. Unknown keys and out-of-range values are fatal.

use crate::error::ConfigurationError;
use crate::features::{FeatureName, FeatureSchema};
use cherenkov_common::{Real, TelId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReconstructionConfig {
    /// Telescope ids allowed into the chain; unset means all.
    #[serde(default)]
    pub allowed_tels: Option<BTreeSet<TelId>>,
    #[serde(default)]
    pub max_events: Option<usize>,
    pub image_extractor: ExtractorConfig,
    /// Extractor used for muon-candidate events; falls back to
    /// `image-extractor` when unset.
    #[serde(default)]
    pub image_extractor_for_muons: Option<ExtractorConfig>,
    pub gain_selector: GainSelectorConfig,
    pub tailcuts_clean_with_pedestal_threshold: CleaningConfig,
    /// Inclusive [min, max] quality cuts per feature name.
    #[serde(default)]
    pub events_filters: BTreeMap<String, [Real; 2]>,
    pub random_forest_regressor_args: ForestArgs,
    pub random_forest_classifier_args: ForestArgs,
    pub regression_features: Vec<String>,
    pub classification_features: Vec<String>,
    #[serde(default)]
    pub source_dependent: bool,
    pub observation_mode: ObservationMode,
    #[serde(default)]
    pub n_off_wobble: u32,
    #[serde(default)]
    pub source_ra_deg: Option<Real>,
    #[serde(default)]
    pub source_dec_deg: Option<Real>,
    #[serde(default)]
    pub volume_reducer: VolumeReducerConfig,
    /// Waveforms arrive already calibrated; skip pedestal/gain/time
    /// calibration entirely.
    #[serde(default)]
    pub custom_calibration: bool,
    /// Scale the pedestal by the running estimate fed from interleaved
    /// pedestal events. Forces sequential ordered processing.
    #[serde(default)]
    pub calibrate_flatfields_and_pedestals: bool,
    #[serde(default)]
    pub running_pedestal: RunningPedestalConfig,
    #[serde(default)]
    pub ordering_mode: OrderingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "type")]
pub enum ExtractorConfig {
    LocalPeakWindowSum {
        window_shift: usize,
        window_width: usize,
    },
    GlobalPeakWindowSum {
        window_shift: usize,
        window_width: usize,
    },
}

impl ExtractorConfig {
    fn window_width(&self) -> usize {
        match *self {
            Self::LocalPeakWindowSum { window_width, .. }
            | Self::GlobalPeakWindowSum { window_width, .. } => window_width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum GainSelectorConfig {
    ThresholdGainSelector { threshold: Real },
}

impl GainSelectorConfig {
    pub fn threshold(&self) -> Real {
        match *self {
            Self::ThresholdGainSelector { threshold } => threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CleaningConfig {
    pub picture_thresh: Real,
    pub boundary_thresh: Real,
    /// Scale of the per-pixel pedestal-noise threshold.
    pub sigma: Real,
    #[serde(default)]
    pub keep_isolated_pixels: bool,
    #[serde(default)]
    pub min_number_picture_neighbors: usize,
    #[serde(default)]
    pub use_only_main_island: bool,
    /// Maximum distance, in sample units, from the mean peak time of
    /// neighbouring picture pixels.
    pub delta_time: Real,
}

/// Hyperparameters the ensemble models were trained with. Validated
/// here; consumed by the training pipeline, which is out of core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ForestArgs {
    pub n_estimators: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_bootstrap")]
    pub bootstrap: bool,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default)]
    pub max_features: MaxFeatures,
    /// Fixed seed: required for reproducible predictions.
    pub random_state: u64,
    /// Classifier only.
    #[serde(default)]
    pub class_weight: Option<ClassWeight>,
}

fn default_bootstrap() -> bool {
    true
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_min_samples_split() -> usize {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaxFeatures {
    #[default]
    All,
    Sqrt,
    Log2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassWeight {
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationMode {
    Wobble,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingMode {
    /// Results are emitted sorted by event id.
    #[default]
    Ordered,
    /// Results are emitted in completion order.
    AsCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VolumeReducerConfig {
    #[serde(default)]
    pub algorithm: Option<VolumeReducerAlgorithm>,
    #[serde(default)]
    pub parameters: VolumeReducerParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeReducerAlgorithm {
    ZeroSuppression,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VolumeReducerParameters {
    #[serde(default = "default_dilations")]
    pub number_of_dilations: usize,
}

impl Default for VolumeReducerParameters {
    fn default() -> Self {
        Self {
            number_of_dilations: default_dilations(),
        }
    }
}

fn default_dilations() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunningPedestalConfig {
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: Real,
    #[serde(default = "default_warm_up")]
    pub warm_up: usize,
}

impl Default for RunningPedestalConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: default_smoothing_factor(),
            warm_up: default_warm_up(),
        }
    }
}

fn default_smoothing_factor() -> Real {
    0.1
}

fn default_warm_up() -> usize {
    10
}

impl ReconstructionConfig {
    pub fn from_json_str(document: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn regression_schema(&self) -> Result<FeatureSchema, ConfigurationError> {
        FeatureSchema::parse(&self.regression_features, self.source_dependent)
    }

    pub fn classification_schema(&self) -> Result<FeatureSchema, ConfigurationError> {
        let schema = FeatureSchema::parse(&self.classification_features, self.source_dependent)?;
        if !schema.contains(FeatureName::LogRecoEnergy) {
            return Err(ConfigurationError::MissingEnergyFeature);
        }
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for extractor in std::iter::once(&self.image_extractor)
            .chain(self.image_extractor_for_muons.as_ref())
        {
            if extractor.window_width() == 0 {
                return Err(ConfigurationError::OutOfRange {
                    key: "image-extractor.window-width",
                    reason: "must be at least 1",
                });
            }
        }
        if self.gain_selector.threshold() <= 0.0 {
            return Err(ConfigurationError::OutOfRange {
                key: "gain-selector.threshold",
                reason: "must be positive",
            });
        }

        let cleaning = &self.tailcuts_clean_with_pedestal_threshold;
        if cleaning.sigma < 0.0 {
            return Err(ConfigurationError::OutOfRange {
                key: "tailcuts-clean-with-pedestal-threshold.sigma",
                reason: "must not be negative",
            });
        }
        if cleaning.delta_time <= 0.0 {
            return Err(ConfigurationError::OutOfRange {
                key: "tailcuts-clean-with-pedestal-threshold.delta-time",
                reason: "must be positive",
            });
        }

        for (key, [min, max]) in &self.events_filters {
            let feature = FeatureName::from_str(key)
                .map_err(|_| ConfigurationError::UnknownFeature(key.clone()))?;
            if feature == FeatureName::LogRecoEnergy || feature.requires_source_dependent() {
                return Err(ConfigurationError::OutOfRange {
                    key: "events-filters",
                    reason: "cuts apply to image parameters only",
                });
            }
            if min > max {
                return Err(ConfigurationError::EmptyFilterRange {
                    key: key.clone(),
                    min: *min,
                    max: *max,
                });
            }
        }

        for args in [
            &self.random_forest_regressor_args,
            &self.random_forest_classifier_args,
        ] {
            if args.n_estimators == 0 {
                return Err(ConfigurationError::OutOfRange {
                    key: "n-estimators",
                    reason: "must be at least 1",
                });
            }
            if args.min_samples_leaf == 0 {
                return Err(ConfigurationError::OutOfRange {
                    key: "min-samples-leaf",
                    reason: "must be at least 1",
                });
            }
            if args.min_samples_split < 2 {
                return Err(ConfigurationError::OutOfRange {
                    key: "min-samples-split",
                    reason: "must be at least 2",
                });
            }
        }
        if self.random_forest_regressor_args.class_weight.is_some() {
            return Err(ConfigurationError::ClassWeightOnRegressor);
        }

        self.regression_schema()?;
        self.classification_schema()?;

        if self.source_dependent && (self.source_ra_deg.is_none() || self.source_dec_deg.is_none())
        {
            return Err(ConfigurationError::MissingSourcePosition);
        }
        if self.observation_mode == ObservationMode::On && self.n_off_wobble > 0 {
            return Err(ConfigurationError::OutOfRange {
                key: "n-off-wobble",
                reason: "off regions require wobble observation mode",
            });
        }

        let smoothing = self.running_pedestal.smoothing_factor;
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(ConfigurationError::OutOfRange {
                key: "running-pedestal.smoothing-factor",
                reason: "must lie in [0, 1]",
            });
        }
        if self.calibrate_flatfields_and_pedestals && self.ordering_mode == OrderingMode::AsCompleted
        {
            return Err(ConfigurationError::AdaptivePedestalRequiresOrdered);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_INPUT: &str = r#"
        {
            "allowed-tels": [1],
            "max-events": 10000,
            "image-extractor": {
                "type": "local-peak-window-sum",
                "window-shift": 4,
                "window-width": 8
            },
            "image-extractor-for-muons": {
                "type": "global-peak-window-sum",
                "window-shift": 4,
                "window-width": 8
            },
            "gain-selector": {
                "type": "threshold-gain-selector",
                "threshold": 4094
            },
            "tailcuts-clean-with-pedestal-threshold": {
                "picture-thresh": 8,
                "boundary-thresh": 4,
                "sigma": 2.5,
                "keep-isolated-pixels": false,
                "min-number-picture-neighbors": 2,
                "use-only-main-island": false,
                "delta-time": 2
            },
            "events-filters": {
                "intensity": [50, 1e9],
                "width": [0, 10],
                "length": [0, 10],
                "wl": [0.01, 1],
                "r": [0, 1],
                "leakage_intensity_width_2": [0, 1]
            },
            "random-forest-regressor-args": {
                "n-estimators": 150,
                "max-depth": 50,
                "min-samples-leaf": 2,
                "min-samples-split": 2,
                "max-features": "sqrt",
                "random-state": 42
            },
            "random-forest-classifier-args": {
                "n-estimators": 100,
                "max-depth": 100,
                "min-samples-leaf": 2,
                "min-samples-split": 2,
                "max-features": "sqrt",
                "random-state": 42,
                "class-weight": "balanced"
            },
            "regression-features": [
                "log_intensity", "width", "length", "wl",
                "skewness", "kurtosis", "time_gradient",
                "leakage_intensity_width_2"
            ],
            "classification-features": [
                "log_intensity", "width", "length", "wl",
                "skewness", "kurtosis", "time_gradient",
                "leakage_intensity_width_2", "log_reco_energy"
            ],
            "source-dependent": false,
            "observation-mode": "wobble",
            "n-off-wobble": 3,
            "volume-reducer": {
                "algorithm": "zero-suppression",
                "parameters": { "number-of-dilations": 1 }
            },
            "ordering-mode": "ordered"
        }
    "#;

    #[test]
    fn parses_the_full_document() {
        let config = ReconstructionConfig::from_json_str(JSON_INPUT).unwrap();
        assert_eq!(config.max_events, Some(10000));
        assert_eq!(
            config.image_extractor,
            ExtractorConfig::LocalPeakWindowSum {
                window_shift: 4,
                window_width: 8
            }
        );
        assert_eq!(config.gain_selector.threshold(), 4094.0);
        assert_eq!(config.n_off_wobble, 3);
        assert_eq!(config.events_filters.len(), 6);
        assert_eq!(
            config.random_forest_classifier_args.class_weight,
            Some(ClassWeight::Balanced)
        );
        assert_eq!(config.ordering_mode, OrderingMode::Ordered);
        assert_eq!(
            config.volume_reducer.algorithm,
            Some(VolumeReducerAlgorithm::ZeroSuppression)
        );
        assert_eq!(config.regression_schema().unwrap().len(), 8);
        assert_eq!(config.classification_schema().unwrap().len(), 9);
    }

    #[test]
    fn round_trip_yields_identical_settings() {
        let config = ReconstructionConfig::from_json_str(JSON_INPUT).unwrap();
        let serialized = serde_json::to_string(&config).unwrap();
        let reloaded = ReconstructionConfig::from_json_str(&serialized).unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn unknown_keys_are_fatal() {
        let with_unknown = JSON_INPUT.replace("\"ordering-mode\"", "\"odrering-mode\"");
        assert!(matches!(
            ReconstructionConfig::from_json_str(&with_unknown),
            Err(ConfigurationError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_feature_is_fatal() {
        let with_unknown = JSON_INPUT.replace("\"kurtosis\"", "\"curtosis\"");
        assert!(matches!(
            ReconstructionConfig::from_json_str(&with_unknown),
            Err(ConfigurationError::UnknownFeature(_))
        ));
    }

    #[test]
    fn classification_schema_must_consume_energy() {
        let without_energy = JSON_INPUT.replace(", \"log_reco_energy\"", "");
        assert!(matches!(
            ReconstructionConfig::from_json_str(&without_energy),
            Err(ConfigurationError::MissingEnergyFeature)
        ));
    }

    #[test]
    fn source_dependent_requires_a_source_position() {
        let source_dependent =
            JSON_INPUT.replace("\"source-dependent\": false", "\"source-dependent\": true");
        assert!(matches!(
            ReconstructionConfig::from_json_str(&source_dependent),
            Err(ConfigurationError::MissingSourcePosition)
        ));
    }

    #[test]
    fn adaptive_pedestal_rejects_completion_ordering() {
        let adaptive = JSON_INPUT
            .replace(
                "\"ordering-mode\": \"ordered\"",
                "\"ordering-mode\": \"as-completed\", \"calibrate-flatfields-and-pedestals\": true",
            );
        assert!(matches!(
            ReconstructionConfig::from_json_str(&adaptive),
            Err(ConfigurationError::AdaptivePedestalRequiresOrdered)
        ));
    }

    #[test]
    fn class_weight_on_the_regressor_is_fatal() {
        let bad = JSON_INPUT.replace(
            "\"random-state\": 42\n            },",
            "\"random-state\": 42, \"class-weight\": \"balanced\"\n            },",
        );
        assert!(matches!(
            ReconstructionConfig::from_json_str(&bad),
            Err(ConfigurationError::ClassWeightOnRegressor)
        ));
    }
}
