//! Immutable estimator configuration and pure component construction.
//!
//! A [`DmlConfig`] is a plain value: changing an option means building a new
//! config and calling [`rebuild`] again, which always constructs fresh
//! wrapper and model instances. Nothing is rewired in place, so a fitted
//! component can never be silently invalidated by a configuration change.
//!
//! The preset constructors mirror the common estimator variants: a linear
//! final stage, a kernel final stage over random Fourier features, and a
//! non-parametric final stage fit through the weighting trick. Presets with
//! a fixed final model reject caller-supplied replacements; their exposed
//! hyperparameters are the only knobs.

use crate::estimate::{
    EstimationError, FinalStageRegressor, FirstStageResidualizer, NuisanceModel, NuisanceRole,
};
use crate::featurize::{Featurizer, PolynomialFeatures, RandomFourierFeatures};
use crate::learners::{KernelSmoother, LinearRegressor, LogisticClassifier, Regressor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Ridge applied to the stock first-stage learners. The expanded linear
/// first-stage design contains exactly collinear columns, so the default
/// nuisance fits must tolerate a rank-deficient cross product.
const FIRST_STAGE_RIDGE: f64 = 1e-6;

/// Errors raised while building components from a configuration or while
/// persisting one.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "the {preset} preset owns its final-stage model; adjust its exposed hyperparameters instead of replacing the model"
    )]
    ImmutableFinalModel { preset: &'static str },
    #[error("the custom final stage requires an explicit final-stage model")]
    MissingFinalModel,
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error("failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// The final-stage model family a configuration selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinalStageKind {
    /// Ordinary least squares through the origin.
    Linear,
    /// Ridge regression over the kernel featurizer's random features.
    Kernel { regularization: f64 },
    /// Nadaraya-Watson smoother fit through the weighting trick.
    NonParametric { bandwidth: f64 },
    /// A caller-supplied model passed to [`rebuild_with_models`].
    Custom,
}

impl FinalStageKind {
    fn preset_name(&self) -> &'static str {
        match self {
            FinalStageKind::Linear => "linear",
            FinalStageKind::Kernel { .. } => "kernel",
            FinalStageKind::NonParametric { .. } => "non-parametric",
            FinalStageKind::Custom => "custom",
        }
    }
}

/// The featurizer applied to the heterogeneity features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeaturizerKind {
    None,
    Polynomial { degree: usize },
    RandomFourier { dim: usize, bandwidth: f64 },
}

/// The complete blueprint of an estimator configuration. Serializable so a
/// configuration can be recorded next to its results and rebuilt exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmlConfig {
    /// Expand the outcome model's input with the cross product of the
    /// controls and the featurized heterogeneity features plus an intercept.
    pub linear_first_stage: bool,
    /// Model the treatment as a classifier over categories and drop the
    /// baseline category from the residual.
    pub discrete_treatment: bool,
    /// Add an explicit intercept column to the final design (standard mode
    /// only).
    pub fit_cate_intercept: bool,
    /// Fit the final stage through the weighted-regression reduction instead
    /// of the cross-product design.
    pub use_weight_trick: bool,
    pub final_stage: FinalStageKind,
    pub featurizer: FeaturizerKind,
    /// Seed for every random component (the random Fourier projection).
    /// Identical seed, data and configuration reproduce identical results.
    pub seed: u64,
}

impl DmlConfig {
    /// The parametric preset: linear first stages and an unpenalized linear
    /// final stage.
    pub fn linear(discrete_treatment: bool, fit_cate_intercept: bool) -> Self {
        Self {
            linear_first_stage: true,
            discrete_treatment,
            fit_cate_intercept,
            use_weight_trick: false,
            final_stage: FinalStageKind::Linear,
            featurizer: FeaturizerKind::None,
            seed: 0,
        }
    }

    /// The kernel preset: random Fourier features with a ridge final stage.
    pub fn kernel(
        dim: usize,
        bandwidth: f64,
        regularization: f64,
        discrete_treatment: bool,
        fit_cate_intercept: bool,
        seed: u64,
    ) -> Self {
        Self {
            linear_first_stage: false,
            discrete_treatment,
            fit_cate_intercept,
            use_weight_trick: false,
            final_stage: FinalStageKind::Kernel { regularization },
            featurizer: FeaturizerKind::RandomFourier { dim, bandwidth },
            seed,
        }
    }

    /// The non-parametric preset: a kernel smoother final stage fit through
    /// the weighting trick. Incompatible with an explicit CATE intercept by
    /// construction.
    pub fn non_parametric(bandwidth: f64, discrete_treatment: bool) -> Self {
        Self {
            linear_first_stage: false,
            discrete_treatment,
            fit_cate_intercept: false,
            use_weight_trick: true,
            final_stage: FinalStageKind::NonParametric { bandwidth },
            featurizer: FeaturizerKind::None,
            seed: 0,
        }
    }

    /// Saves the configuration in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }
}

/// The freshly constructed wrapper set for one estimator lifecycle. The
/// crossfitting driver clones nothing out of this; it calls [`rebuild`] once
/// per fold when it needs per-fold residualizer instances.
pub struct DmlComponents {
    pub outcome_model: FirstStageResidualizer,
    pub treatment_model: FirstStageResidualizer,
    pub final_stage: FinalStageRegressor,
}

/// Builds a complete component set from a configuration using the stock
/// learners. Every call constructs new instances.
pub fn rebuild(config: &DmlConfig) -> Result<DmlComponents, ConfigError> {
    rebuild_with_models(
        config,
        default_outcome_model(),
        default_treatment_model(config),
        None,
    )
}

/// Builds a component set with caller-supplied first-stage models and, for
/// the custom final stage only, a caller-supplied final model. Fixed-final
/// presets reject an injected final model.
pub fn rebuild_with_models(
    config: &DmlConfig,
    outcome_model: NuisanceModel,
    treatment_model: NuisanceModel,
    final_model: Option<Box<dyn Regressor>>,
) -> Result<DmlComponents, ConfigError> {
    let final_model: Box<dyn Regressor> = match (&config.final_stage, final_model) {
        (FinalStageKind::Linear, None) => Box::new(LinearRegressor::new()),
        (FinalStageKind::Kernel { regularization }, None) => {
            Box::new(LinearRegressor::with_penalty(*regularization))
        }
        (FinalStageKind::NonParametric { bandwidth }, None) => {
            Box::new(KernelSmoother::new(*bandwidth))
        }
        (FinalStageKind::Custom, Some(model)) => model,
        (FinalStageKind::Custom, None) => return Err(ConfigError::MissingFinalModel),
        (kind, Some(_)) => {
            return Err(ConfigError::ImmutableFinalModel {
                preset: kind.preset_name(),
            });
        }
    };
    if matches!(config.final_stage, FinalStageKind::NonParametric { .. })
        && !config.use_weight_trick
    {
        return Err(ConfigError::Estimation(
            EstimationError::InfeasibleConfiguration(
                "the non-parametric final stage requires the weighting trick".into(),
            ),
        ));
    }

    let outcome_model = FirstStageResidualizer::new(
        outcome_model,
        NuisanceRole::Outcome,
        build_featurizer(config),
        config.linear_first_stage,
        config.discrete_treatment,
    )?;
    let treatment_model = FirstStageResidualizer::new(
        treatment_model,
        NuisanceRole::Treatment,
        build_featurizer(config),
        config.linear_first_stage,
        config.discrete_treatment,
    )?;
    let final_stage = FinalStageRegressor::new(
        final_model,
        config.fit_cate_intercept,
        build_featurizer(config),
        config.use_weight_trick,
    )?;
    Ok(DmlComponents {
        outcome_model,
        treatment_model,
        final_stage,
    })
}

fn default_outcome_model() -> NuisanceModel {
    NuisanceModel::Regress(Box::new(LinearRegressor::with_intercept_and_penalty(
        FIRST_STAGE_RIDGE,
    )))
}

fn default_treatment_model(config: &DmlConfig) -> NuisanceModel {
    if config.discrete_treatment {
        NuisanceModel::Classify(Box::new(LogisticClassifier::new()))
    } else {
        NuisanceModel::Regress(Box::new(LinearRegressor::with_intercept_and_penalty(
            FIRST_STAGE_RIDGE,
        )))
    }
}

/// One fresh featurizer instance per wrapper. Instances share the seed, so
/// the projections agree across wrappers without sharing state.
fn build_featurizer(config: &DmlConfig) -> Option<Box<dyn Featurizer>> {
    match &config.featurizer {
        FeaturizerKind::None => None,
        FeaturizerKind::Polynomial { degree } => Some(Box::new(PolynomialFeatures::new(*degree))),
        FeaturizerKind::RandomFourier { dim, bandwidth } => Some(Box::new(
            RandomFourierFeatures::new(*dim, *bandwidth, config.seed),
        )),
    }
}
