#![deny(dead_code)]
#![deny(unused_imports)]

//! # orthoml
//!
//! A two-stage orthogonalized regression engine ("double machine learning")
//! for estimating heterogeneous treatment effects from observational data.
//!
//! Given outcomes `Y`, treatments `T`, heterogeneity features `X` and nuisance
//! controls `W`, the first stage removes the parts of `Y` and `T` that are
//! predictable from `(X, W)` using arbitrary regressors or classifiers. The
//! second stage regresses the residual outcome on the residual treatment,
//! parameterized so the regression coefficient varies with `X`, which yields
//! the conditional average treatment effect (CATE) function.
//!
//! This crate provides the per-fold nuisance wrappers, the final residual-on-
//! residual regression, and CATE prediction. Fold generation, parallel fold
//! scheduling and statistical inference are the caller's concern: an external
//! crossfitting driver fits one [`estimate::FirstStageResidualizer`] per fold,
//! assembles out-of-fold residuals, and hands the pooled residuals to a single
//! [`estimate::FinalStageRegressor`].

pub mod config;
pub mod design;
pub mod estimate;
pub mod featurize;
pub mod learners;
pub mod panel;
pub mod treatment;

pub use config::{DmlComponents, DmlConfig, FeaturizerKind, FinalStageKind, rebuild, rebuild_with_models};
pub use estimate::{
    CatePredictor, EstimationError, FinalStageRegressor, FirstStageResidualizer, NuisanceModel,
    NuisanceRole,
};
pub use featurize::{Featurizer, PolynomialFeatures, RandomFourierFeatures};
pub use learners::{Classifier, KernelSmoother, LinearRegressor, LogisticClassifier, Regressor};
