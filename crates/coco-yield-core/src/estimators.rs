//! Pretrained base estimators and their registry.
//!
//! The engine treats every base estimator as a black box behind the
//! [`Estimator`] trait: one feature vector in, one scalar yield estimate out.
//! Two artifact families are provided, a linear model and a gradient-boosted
//! regression tree ensemble; both are loaded from JSON artifacts and never
//! refitted here.

use crate::error::{Result, YieldError};
use crate::features::{FeatureGroup, FeatureValue, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Produce a scalar yield estimate from a feature vector.
///
/// Implementations must be stateless with respect to `estimate`; the engine
/// calls them concurrently without locking.
pub trait Estimator: Send + Sync + fmt::Debug {
    /// Stable identifier used for registration and weighting.
    fn id(&self) -> &str;

    /// Feature group this estimator consumes.
    fn group(&self) -> FeatureGroup;

    /// Raw (unweighted, unadjusted) yield estimate.
    fn estimate(&self, features: &FeatureVector) -> Result<f64>;
}

/// Untransformed output of one base estimator for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEstimateResult {
    pub estimator_id: String,
    pub raw_value: f64,
}

/// Run `estimator` on `features`, checking group and output finiteness.
pub fn run_estimator(
    estimator: &dyn Estimator,
    features: &FeatureVector,
) -> Result<BaseEstimateResult> {
    if features.group() != estimator.group() {
        return Err(estimation_error(
            estimator.id(),
            format!(
                "expects {} features, got {} features",
                estimator.group(),
                features.group()
            ),
        ));
    }

    let raw_value = estimator.estimate(features)?;
    if !raw_value.is_finite() {
        return Err(estimation_error(
            estimator.id(),
            format!("produced a non-finite estimate ({})", raw_value),
        ));
    }

    debug!(estimator = estimator.id(), raw_value, "base estimate");
    Ok(BaseEstimateResult {
        estimator_id: estimator.id().to_string(),
        raw_value,
    })
}

fn estimation_error(estimator: &str, reason: impl Into<String>) -> YieldError {
    YieldError::Estimation {
        estimator: estimator.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// Categorical encoding
// ============================================================================

/// Mapping from a categorical label to a number.
///
/// For linear models the number is the level's additive contribution; for
/// tree ensembles it is the code compared against split thresholds. Lookup is
/// case-insensitive and ignores surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoricalEncoding {
    pub levels: BTreeMap<String, f64>,
    /// Level used for labels not present in `levels`
    #[serde(default)]
    pub fallback: Option<String>,
}

impl CategoricalEncoding {
    /// Encode `label`, falling back to the fallback level if configured.
    pub fn encode(&self, label: &str) -> Option<f64> {
        self.lookup(label)
            .or_else(|| self.fallback.as_deref().and_then(|f| self.lookup(f)))
    }

    fn lookup(&self, label: &str) -> Option<f64> {
        let label = label.trim();
        self.levels
            .iter()
            .find(|(level, _)| level.trim().eq_ignore_ascii_case(label))
            .map(|(_, v)| *v)
    }

    fn validate(&self, owner: &str, feature: &str) -> Result<()> {
        if self.levels.is_empty() {
            return Err(YieldError::InvalidModel(format!(
                "{}: categorical feature '{}' has no levels",
                owner, feature
            )));
        }
        if let Some((level, _)) = self.levels.iter().find(|(_, v)| !v.is_finite()) {
            return Err(YieldError::InvalidModel(format!(
                "{}: level '{}' of '{}' is not finite",
                owner, level, feature
            )));
        }
        if let Some(fallback) = &self.fallback {
            if self.lookup(fallback).is_none() {
                return Err(YieldError::InvalidModel(format!(
                    "{}: fallback '{}' of '{}' is not a known level",
                    owner, fallback, feature
                )));
            }
        }
        Ok(())
    }
}

fn numeric_feature(id: &str, features: &FeatureVector, name: &str) -> Result<f64> {
    match features.get(name) {
        Some(FeatureValue::Numeric(v)) => Ok(*v),
        Some(FeatureValue::Categorical(_)) => Err(estimation_error(
            id,
            format!("feature '{}' is categorical, expected a number", name),
        )),
        None => Err(estimation_error(id, format!("missing feature '{}'", name))),
    }
}

fn encoded_feature(
    id: &str,
    features: &FeatureVector,
    name: &str,
    encoding: &CategoricalEncoding,
) -> Result<f64> {
    match features.get(name) {
        Some(FeatureValue::Categorical(label)) => encoding.encode(label).ok_or_else(|| {
            estimation_error(id, format!("unknown level '{}' for feature '{}'", label, name))
        }),
        Some(FeatureValue::Numeric(_)) => Err(estimation_error(
            id,
            format!("feature '{}' is numeric, expected a label", name),
        )),
        None => Err(estimation_error(id, format!("missing feature '{}'", name))),
    }
}

fn check_feature_names<'a>(
    owner: &str,
    group: FeatureGroup,
    names: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    for name in names {
        if !group.feature_names().contains(&name.as_str()) {
            return Err(YieldError::InvalidModel(format!(
                "{}: '{}' is not a {} feature",
                owner, name, group
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Linear estimator
// ============================================================================

/// Linear model: `intercept + Σ coef·x + Σ level contribution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEstimator {
    pub id: String,
    pub group: FeatureGroup,
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
    #[serde(default)]
    pub categorical: BTreeMap<String, CategoricalEncoding>,
}

impl LinearEstimator {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(YieldError::InvalidModel(
                "linear estimator with empty id".to_string(),
            ));
        }
        if !self.intercept.is_finite() {
            return Err(YieldError::InvalidModel(format!(
                "{}: intercept is not finite",
                self.id
            )));
        }
        check_feature_names(&self.id, self.group, self.coefficients.keys())?;
        check_feature_names(&self.id, self.group, self.categorical.keys())?;
        if let Some((name, _)) = self.coefficients.iter().find(|(_, c)| !c.is_finite()) {
            return Err(YieldError::InvalidModel(format!(
                "{}: coefficient for '{}' is not finite",
                self.id, name
            )));
        }
        for (name, encoding) in &self.categorical {
            encoding.validate(&self.id, name)?;
        }
        Ok(())
    }
}

impl Estimator for LinearEstimator {
    fn id(&self) -> &str {
        &self.id
    }

    fn group(&self) -> FeatureGroup {
        self.group
    }

    fn estimate(&self, features: &FeatureVector) -> Result<f64> {
        let mut total = self.intercept;
        for (name, coef) in &self.coefficients {
            total += coef * numeric_feature(&self.id, features, name)?;
        }
        for (name, encoding) in &self.categorical {
            total += encoded_feature(&self.id, features, name, encoding)?;
        }
        Ok(total)
    }
}

// ============================================================================
// Tree ensemble estimator
// ============================================================================

/// A regression tree node (internal or leaf).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Index into the estimator's `features` (internal nodes)
    #[serde(default)]
    pub feature: usize,
    /// Split threshold; `x <= threshold` goes left
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    /// Leaf value (None for internal nodes)
    #[serde(default)]
    pub value: Option<f64>,
}

/// A single regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn evaluate(&self, x: &[f64]) -> std::result::Result<f64, String> {
        let mut idx = 0usize;
        // A well-formed tree reaches a leaf in at most nodes.len() steps.
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(idx)
                .ok_or_else(|| format!("node index {} out of range", idx))?;
            if let Some(value) = node.value {
                return Ok(value);
            }
            let feature_value = x
                .get(node.feature)
                .ok_or_else(|| format!("feature index {} out of range", node.feature))?;
            idx = if *feature_value <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
        Err("tree does not terminate in a leaf".to_string())
    }

    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node.value {
                Some(v) if !v.is_finite() => {
                    return Err(format!("leaf {} has a non-finite value", i));
                }
                Some(_) => {}
                None => {
                    if node.feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            i, node.feature, n_features
                        ));
                    }
                    if node.left >= self.nodes.len() || node.right >= self.nodes.len() {
                        return Err(format!("node {} has a child out of range", i));
                    }
                    if !node.threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", i));
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_learning_rate() -> f64 {
    1.0
}

/// Gradient-boosted regression trees: `base_score + learning_rate · Σ tree(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsembleEstimator {
    pub id: String,
    pub group: FeatureGroup,
    /// Feature names in tree index order
    pub features: Vec<String>,
    #[serde(default)]
    pub categorical: BTreeMap<String, CategoricalEncoding>,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl TreeEnsembleEstimator {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(YieldError::InvalidModel(
                "tree ensemble with empty id".to_string(),
            ));
        }
        if self.trees.is_empty() {
            return Err(YieldError::InvalidModel(format!("{}: no trees", self.id)));
        }
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(YieldError::InvalidModel(format!(
                "{}: base_score and learning_rate must be finite",
                self.id
            )));
        }
        check_feature_names(&self.id, self.group, self.features.iter())?;
        check_feature_names(&self.id, self.group, self.categorical.keys())?;
        for (name, encoding) in &self.categorical {
            encoding.validate(&self.id, name)?;
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.features.len()).map_err(|reason| {
                YieldError::InvalidModel(format!("{}: tree {}: {}", self.id, t, reason))
            })?;
        }
        Ok(())
    }

    fn feature_row(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        self.features
            .iter()
            .map(|name| match self.categorical.get(name) {
                Some(encoding) => encoded_feature(&self.id, features, name, encoding),
                None => numeric_feature(&self.id, features, name),
            })
            .collect()
    }
}

impl Estimator for TreeEnsembleEstimator {
    fn id(&self) -> &str {
        &self.id
    }

    fn group(&self) -> FeatureGroup {
        self.group
    }

    fn estimate(&self, features: &FeatureVector) -> Result<f64> {
        let row = self.feature_row(features)?;
        let mut sum = 0.0;
        for (t, tree) in self.trees.iter().enumerate() {
            sum += tree
                .evaluate(&row)
                .map_err(|reason| estimation_error(&self.id, format!("tree {}: {}", t, reason)))?;
        }
        Ok(self.base_score + self.learning_rate * sum)
    }
}

// ============================================================================
// Artifacts and registry
// ============================================================================

/// Serialized form of a pretrained estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorArtifact {
    Linear(LinearEstimator),
    TreeEnsemble(TreeEnsembleEstimator),
}

impl EstimatorArtifact {
    pub fn id(&self) -> &str {
        match self {
            Self::Linear(e) => &e.id,
            Self::TreeEnsemble(e) => &e.id,
        }
    }

    /// Validate the artifact and turn it into a shareable estimator.
    pub fn into_estimator(self) -> Result<Arc<dyn Estimator>> {
        match self {
            Self::Linear(e) => {
                e.validate()?;
                Ok(Arc::new(e))
            }
            Self::TreeEnsemble(e) => {
                e.validate()?;
                Ok(Arc::new(e))
            }
        }
    }
}

/// Top-level layout of an estimator artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub estimators: Vec<EstimatorArtifact>,
}

/// Immutable set of base estimators keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct EstimatorRegistry {
    estimators: BTreeMap<String, Arc<dyn Estimator>>,
}

impl EstimatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an estimator; identifiers must be unique.
    pub fn register(&mut self, estimator: Arc<dyn Estimator>) -> Result<()> {
        let id = estimator.id().to_string();
        if self.estimators.contains_key(&id) {
            return Err(YieldError::InvalidModel(format!(
                "duplicate estimator id '{}'",
                id
            )));
        }
        self.estimators.insert(id, estimator);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Arc<dyn Estimator>> {
        self.estimators
            .get(id)
            .ok_or_else(|| YieldError::UnknownEstimator(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.estimators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    /// Build a registry from already-deserialized artifacts.
    pub fn from_artifacts(artifacts: Vec<EstimatorArtifact>) -> Result<Self> {
        let mut registry = Self::new();
        for artifact in artifacts {
            registry.register(artifact.into_estimator()?)?;
        }
        Ok(registry)
    }

    /// Parse an artifact file's JSON content.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(json)?;
        Self::from_artifacts(file.estimators)
    }

    /// Load an artifact file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| YieldError::Io(format!("{}: {}", path.display(), e)))?;
        let registry = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            count = registry.len(),
            "loaded estimator artifacts"
        );
        Ok(registry)
    }
}
