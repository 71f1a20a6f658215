//! Pre-trained ensemble models and the two-stage inference chain.
//!
//! Models are loaded from serialized artifacts and never trained here.
//! Inference is pure: the same feature vector always yields bit-identical
//! outputs.

use crate::error::{InvalidImageReason, ModelMismatch};
use crate::features::{FeatureName, FeatureSchema, FeatureVector, FeatureVectorBuilder};
use crate::hillas::HillasParameters;
use crate::source_dep::SourceFeatures;
use cherenkov_common::Real;
use serde::{Deserialize, Serialize};

/// One node of a serialized decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "node")]
pub enum Node {
    Split {
        /// Index into the model's feature layout.
        feature: usize,
        threshold: Real,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        value: Real,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DecisionTree {
    root: Node,
}

impl DecisionTree {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    /// Walks the tree; values at or below the threshold descend left.
    pub fn predict(&self, vector: &FeatureVector) -> Real {
        let mut node = &self.root;
        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if vector.values[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
                Node::Leaf { value } => return *value,
            }
        }
    }
}

/// A serialized random forest: the trained feature layout plus its
/// trees. Prediction averages the per-tree outputs, so a classifier
/// forest whose leaves hold class probabilities yields a probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Forest {
    pub expected_features: Vec<FeatureName>,
    pub trees: Vec<DecisionTree>,
}

impl Forest {
    pub fn predict(&self, vector: &FeatureVector) -> Real {
        let sum: Real = self.trees.iter().map(|tree| tree.predict(vector)).sum();
        sum / self.trees.len() as Real
    }

    fn check_schema(
        &self,
        model: &'static str,
        schema: &FeatureSchema,
    ) -> Result<(), ModelMismatch> {
        if self.expected_features.len() != schema.len() {
            return Err(ModelMismatch::ArityMismatch {
                model,
                expected: self.expected_features.len(),
                actual: schema.len(),
            });
        }
        for (index, (&expected, &actual)) in self
            .expected_features
            .iter()
            .zip(schema.names())
            .enumerate()
        {
            if expected != actual {
                return Err(ModelMismatch::FeatureMismatch {
                    model,
                    index,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// The full set of model artifacts for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModelBundle {
    pub energy_regressor: Forest,
    pub gamma_classifier: Forest,
    #[serde(default)]
    pub disp_norm_regressor: Option<Forest>,
    #[serde(default)]
    pub disp_sign_classifier: Option<Forest>,
}

/// Per-event (or per-region) inference output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Prediction {
    /// log10 of the reconstructed energy.
    pub log_reco_energy: Real,
    /// Probability that the event is a gamma ray.
    pub gammaness: Real,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disp_norm: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disp_sign: Option<Real>,
}

impl Prediction {
    /// Reconstructed energy in TeV.
    pub fn reco_energy(&self) -> Real {
        10f64.powf(self.log_reco_energy)
    }
}

/// Runs the two-stage inference chain: energy regression first, its
/// output fed to the classifier as `log_reco_energy`.
pub struct EnsemblePredictor {
    bundle: ModelBundle,
    regression: FeatureVectorBuilder,
    classification: FeatureVectorBuilder,
}

impl EnsemblePredictor {
    /// Checks every model's trained feature layout against the
    /// configured schemas before any event is touched.
    pub fn new(
        bundle: ModelBundle,
        regression_schema: FeatureSchema,
        classification_schema: FeatureSchema,
    ) -> Result<Self, ModelMismatch> {
        bundle
            .energy_regressor
            .check_schema("energy-regressor", &regression_schema)?;
        bundle
            .gamma_classifier
            .check_schema("gamma-classifier", &classification_schema)?;
        if !classification_schema.contains(FeatureName::LogRecoEnergy) {
            return Err(ModelMismatch::EnergyStageNotConsumed);
        }
        if let Some(disp_norm) = &bundle.disp_norm_regressor {
            disp_norm.check_schema("disp-norm-regressor", &regression_schema)?;
        }
        if let Some(disp_sign) = &bundle.disp_sign_classifier {
            disp_sign.check_schema("disp-sign-classifier", &regression_schema)?;
        }
        Ok(Self {
            bundle,
            regression: FeatureVectorBuilder::new(regression_schema),
            classification: FeatureVectorBuilder::new(classification_schema),
        })
    }

    pub fn predict(
        &self,
        hillas: &HillasParameters,
        source: Option<&SourceFeatures>,
    ) -> Result<Prediction, InvalidImageReason> {
        let regression_vector = self.regression.build(hillas, source, None)?;
        let log_reco_energy = self.bundle.energy_regressor.predict(&regression_vector);

        let classification_vector =
            self.classification
                .build(hillas, source, Some(log_reco_energy))?;
        let gammaness = self.bundle.gamma_classifier.predict(&classification_vector);

        Ok(Prediction {
            log_reco_energy,
            gammaness,
            disp_norm: self
                .bundle
                .disp_norm_regressor
                .as_ref()
                .map(|forest| forest.predict(&regression_vector)),
            disp_sign: self
                .bundle
                .disp_sign_classifier
                .as_ref()
                .map(|forest| forest.predict(&regression_vector)),
        })
    }
}
