use crate::features::FeatureName;
use thiserror::Error;

pub type RunResult<T> = Result<T, RunError>;

/// Fatal errors which abort the run before any event is processed.
///
/// Per-event conditions (empty mask, degenerate moments, failed quality
/// cuts) are not errors; they downgrade the event to an invalid or
/// rejected record, see [crate::processing::EventStatus].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("calibration unavailable: {0}")]
    CalibrationUnavailable(#[from] CalibrationUnavailable),
    #[error("model mismatch: {0}")]
    ModelMismatch(#[from] ModelMismatch),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown feature name `{0}`")]
    UnknownFeature(String),
    #[error("feature `{0}` requires source-dependent mode")]
    SourceDependentFeature(FeatureName),
    #[error("classification features must include `log_reco_energy`")]
    MissingEnergyFeature,
    #[error("option `{key}` out of range: {reason}")]
    OutOfRange {
        key: &'static str,
        reason: &'static str,
    },
    #[error("filter `{key}` has min {min} greater than max {max}")]
    EmptyFilterRange { key: String, min: f64, max: f64 },
    #[error("source-dependent mode requires source-ra-deg and source-dec-deg")]
    MissingSourcePosition,
    #[error("class-weight is only valid for the classifier")]
    ClassWeightOnRegressor,
    #[error("adaptive pedestal calibration requires the ordered sequential mode")]
    AdaptivePedestalRequiresOrdered,
}

#[derive(Debug, Error)]
pub enum CalibrationUnavailable {
    #[error("no calibration constants loaded and custom-calibration is not set")]
    MissingConstants,
    #[error("calibration constants cover {actual} pixels, camera has {expected}")]
    PixelCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ModelMismatch {
    #[error("model `{model}` expects {expected} features, schema provides {actual}")]
    ArityMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("model `{model}` feature {index} is `{expected}`, schema provides `{actual}`")]
    FeatureMismatch {
        model: &'static str,
        index: usize,
        expected: FeatureName,
        actual: FeatureName,
    },
    #[error("classification schema does not consume the energy estimate")]
    EnergyStageNotConsumed,
}

/// Why a per-event parameterization or feature vector is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidImageReason {
    #[strum(to_string = "empty cleaning mask")]
    EmptyMask,
    #[strum(to_string = "fewer than three pixels survive cleaning")]
    TooFewPixels,
    #[strum(to_string = "zero total intensity")]
    ZeroIntensity,
    #[strum(to_string = "feature `{0}` undefined for this image")]
    UndefinedFeature(FeatureName),
}

impl From<InvalidImageReason> for cherenkov_common::metrics::events_invalid::InvalidKind {
    fn from(value: InvalidImageReason) -> Self {
        use cherenkov_common::metrics::events_invalid::InvalidKind;
        match value {
            InvalidImageReason::EmptyMask => InvalidKind::EmptyMask,
            InvalidImageReason::TooFewPixels => InvalidKind::TooFewPixels,
            InvalidImageReason::ZeroIntensity => InvalidKind::ZeroIntensity,
            InvalidImageReason::UndefinedFeature(_) => InvalidKind::UndefinedFeature,
        }
    }
}
