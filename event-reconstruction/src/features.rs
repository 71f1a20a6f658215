//! Feature-vector assembly: named, ordered numeric vectors drawn from a
//! closed feature set.
//!
//! The feature order is part of the model contract: it must exactly
//! match the order the ensemble models were trained with.

use crate::error::{ConfigurationError, InvalidImageReason};
use crate::hillas::HillasParameters;
use crate::source_dep::SourceFeatures;
use cherenkov_common::Real;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Closed set of recognized feature names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    Intensity,
    LogIntensity,
    Width,
    Length,
    Wl,
    Skewness,
    Kurtosis,
    TimeGradient,
    #[strum(to_string = "leakage_intensity_width_1")]
    #[serde(rename = "leakage_intensity_width_1")]
    LeakageIntensityWidth1,
    #[strum(to_string = "leakage_intensity_width_2")]
    #[serde(rename = "leakage_intensity_width_2")]
    LeakageIntensityWidth2,
    R,
    Phi,
    Psi,
    /// Distance from the image centroid to the candidate source
    /// position. Source-dependent mode only.
    Dist,
    /// Skewness signed toward the candidate source. Source-dependent
    /// mode only.
    SignedSkewness,
    /// Time gradient signed toward the candidate source.
    /// Source-dependent mode only.
    SignedTimeGradient,
    /// log10 of the energy-regression output, consumed by the
    /// classifier.
    LogRecoEnergy,
}

impl FeatureName {
    pub fn requires_source_dependent(self) -> bool {
        matches!(
            self,
            Self::Dist | Self::SignedSkewness | Self::SignedTimeGradient
        )
    }
}

/// Ordered list of feature names defining one vector layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<FeatureName>,
}

impl FeatureSchema {
    /// Parses configured feature-name strings, rejecting names outside
    /// the closed set and source-dependent names when that mode is off.
    pub fn parse(names: &[String], source_dependent: bool) -> Result<Self, ConfigurationError> {
        let names = names
            .iter()
            .map(|name| {
                let feature = FeatureName::from_str(name)
                    .map_err(|_| ConfigurationError::UnknownFeature(name.clone()))?;
                if feature.requires_source_dependent() && !source_dependent {
                    return Err(ConfigurationError::SourceDependentFeature(feature));
                }
                Ok(feature)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }

    pub fn names(&self) -> &[FeatureName] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: FeatureName) -> bool {
        self.names.contains(&name)
    }
}

/// One event's numeric vector, ordered per its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<Real>,
}

/// Looks up a Hillas-derived feature value; `None` when the quantity is
/// undefined for this image.
pub fn hillas_feature_value(hillas: &HillasParameters, name: FeatureName) -> Option<Real> {
    match name {
        FeatureName::Intensity => Some(hillas.intensity),
        FeatureName::LogIntensity => {
            (hillas.intensity > 0.0).then(|| hillas.intensity.log10())
        }
        FeatureName::Width => Some(hillas.width),
        FeatureName::Length => Some(hillas.length),
        FeatureName::Wl => hillas.wl(),
        FeatureName::Skewness => Some(hillas.skewness),
        FeatureName::Kurtosis => Some(hillas.kurtosis),
        FeatureName::TimeGradient => Some(hillas.time_gradient),
        FeatureName::LeakageIntensityWidth1 => Some(hillas.leakage_intensity_width_1),
        FeatureName::LeakageIntensityWidth2 => Some(hillas.leakage_intensity_width_2),
        FeatureName::R => Some(hillas.r),
        FeatureName::Phi => Some(hillas.phi),
        FeatureName::Psi => Some(hillas.psi),
        _ => None,
    }
}

/// Assembles vectors for a fixed schema.
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder {
    schema: FeatureSchema,
}

impl FeatureVectorBuilder {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Builds the vector for one event.
    ///
    /// Any referenced feature that is unavailable invalidates the whole
    /// vector, which excludes the event from prediction.
    pub fn build(
        &self,
        hillas: &HillasParameters,
        source: Option<&SourceFeatures>,
        log_reco_energy: Option<Real>,
    ) -> Result<FeatureVector, InvalidImageReason> {
        let values = self
            .schema
            .names
            .iter()
            .map(|&name| {
                let value = match name {
                    FeatureName::Dist => source.map(|s| s.dist),
                    FeatureName::SignedSkewness => source.map(|s| s.signed_skewness),
                    FeatureName::SignedTimeGradient => source.map(|s| s.signed_time_gradient),
                    FeatureName::LogRecoEnergy => log_reco_energy,
                    _ => hillas_feature_value(hillas, name),
                };
                value.ok_or(InvalidImageReason::UndefinedFeature(name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FeatureVector { values })
    }
}
