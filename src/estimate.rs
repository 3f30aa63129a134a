//! First- and final-stage wrappers for the two-stage orthogonalized
//! regression procedure.
//!
//! The estimating equation is
//!
//! ```text
//! Y - E[Y | X, W] = Theta(X) . (T - E[T | X, W]) + epsilon
//! ```
//!
//! so the procedure runs in two stages:
//!
//! 1. **Residualization.** A [`FirstStageResidualizer`] adapts an arbitrary
//!    regressor (or classifier, for a categorical treatment) into a nuisance
//!    model for `E[Y | X, W]` or `E[T | X, W]`. An external crossfitting
//!    driver fits one instance per fold and subtracts the out-of-fold
//!    predictions to form the residuals.
//!
//! 2. **Final regression.** A [`FinalStageRegressor`] fits the pooled
//!    residual outcome on the residual treatment, parameterized so the
//!    coefficient varies with `X`. The standard mode regresses on the
//!    cross product of featurized `X` and the residual treatment; the
//!    weighting-trick mode reduces the problem to a weighted regression
//!    that arbitrary non-parametric learners can solve.
//!
//! Prediction probes the fitted final model with unit treatment vectors and
//! reshapes the result into the constant-marginal effect tensor; see
//! [`CatePredictor`].

use crate::design::{
    add_intercept, broadcast_unit_treatments, combined_inputs, cross_product,
    reshape_treatmentwise_effects,
};
use crate::featurize::{FeaturizeError, Featurizer};
use crate::learners::{Classifier, ModelError, Regressor};
use crate::treatment::{self, EncodingError};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

/// Residual treatments with magnitude below this are clipped before the
/// weighting-trick division; a well-fit treatment model routinely produces
/// near-zero residuals and the ratio target must stay finite.
const MIN_TREATMENT_RESIDUAL: f64 = 1e-5;

/// A comprehensive error type for both estimation stages.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error(
        "provided crossfit folds contain training splits that don't contain all treatments: {0}"
    )]
    InvalidFoldSplit(#[from] EncodingError),

    #[error("infeasible configuration: {0}")]
    InfeasibleConfiguration(String),

    #[error(
        "the weighting trick supports only single-dimensional continuous treatment or binary categorical treatment; the residual treatment has {d_t} columns"
    )]
    UnsupportedTreatmentDimension { d_t: usize },

    #[error("input blocks disagree on the number of samples: expected {expected}, found {found}")]
    SampleCountMismatch { expected: usize, found: usize },

    #[error("the final-stage model has not been fitted yet")]
    NotFitted,

    #[error("underlying model failed: {0}")]
    Model(#[from] ModelError),

    #[error("featurizer failed: {0}")]
    Featurize(#[from] FeaturizeError),
}

/// Which nuisance function a first-stage wrapper estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NuisanceRole {
    /// The outcome model `E[Y | X, W]`.
    Outcome,
    /// The treatment model `E[T | X, W]`.
    Treatment,
}

/// The underlying learner a residualizer adapts: a regressor for continuous
/// targets, or a classifier when the treatment is categorical.
pub enum NuisanceModel {
    Regress(Box<dyn Regressor>),
    Classify(Box<dyn Classifier>),
}

/// Adapts a user-supplied learner into a nuisance model that predicts
/// `E[Y | X, W]` or `E[T | X, W]` over a possibly expanded input block.
///
/// Each instance exclusively owns its underlying model and mutates it only
/// during its own `fit`; the crossfitting driver creates one instance per
/// fold and never shares them.
pub struct FirstStageResidualizer {
    model: NuisanceModel,
    role: NuisanceRole,
    featurizer: Option<Box<dyn Featurizer>>,
    linear_first_stage: bool,
    discrete_treatment: bool,
}

impl FirstStageResidualizer {
    pub fn new(
        model: NuisanceModel,
        role: NuisanceRole,
        featurizer: Option<Box<dyn Featurizer>>,
        linear_first_stage: bool,
        discrete_treatment: bool,
    ) -> Result<Self, EstimationError> {
        match (&model, role, discrete_treatment) {
            (NuisanceModel::Classify(_), NuisanceRole::Treatment, true) => {}
            (NuisanceModel::Classify(_), _, _) => {
                return Err(EstimationError::InfeasibleConfiguration(
                    "a classifier can only model a discrete treatment".into(),
                ));
            }
            (NuisanceModel::Regress(_), NuisanceRole::Treatment, true) => {
                return Err(EstimationError::InfeasibleConfiguration(
                    "a discrete treatment must be modeled by a classifier".into(),
                ));
            }
            (NuisanceModel::Regress(_), _, _) => {}
        }
        Ok(Self {
            model,
            role,
            featurizer,
            linear_first_stage,
            discrete_treatment,
        })
    }

    /// Whether the wrapped learner models a categorical treatment.
    pub fn models_discrete_treatment(&self) -> bool {
        self.discrete_treatment && self.role == NuisanceRole::Treatment
    }

    /// Assembles the input block the underlying model sees while fitting.
    /// The outcome model under a linear first stage is expanded with the
    /// cross product of the controls and the featurized heterogeneity
    /// features plus an intercept; every other configuration consumes the
    /// plain concatenation of `X` and `W`.
    fn fit_inputs(
        &mut self,
        x: Option<ArrayView2<f64>>,
        w: Option<ArrayView2<f64>>,
        n_samples: usize,
    ) -> Result<Array2<f64>, EstimationError> {
        match x {
            None => Ok(combined_inputs(None, w, n_samples)),
            Some(x_block) => {
                let xw = combined_inputs(Some(x_block), w, n_samples);
                if self.role == NuisanceRole::Outcome && self.linear_first_stage {
                    let f = match &mut self.featurizer {
                        Some(featurizer) => featurizer.fit_transform(x_block)?,
                        None => x_block.to_owned(),
                    };
                    Ok(cross_product(xw.view(), add_intercept(f.view()).view()))
                } else {
                    Ok(xw)
                }
            }
        }
    }

    /// The prediction-time twin of [`Self::fit_inputs`]: identical block
    /// layout, but the featurizer is only applied, never refit.
    fn predict_inputs(
        &self,
        x: Option<ArrayView2<f64>>,
        w: Option<ArrayView2<f64>>,
        n_samples: usize,
    ) -> Result<Array2<f64>, EstimationError> {
        match x {
            None => Ok(combined_inputs(None, w, n_samples)),
            Some(x_block) => {
                let xw = combined_inputs(Some(x_block), w, n_samples);
                if self.role == NuisanceRole::Outcome && self.linear_first_stage {
                    let f = match &self.featurizer {
                        Some(featurizer) => featurizer.transform(x_block)?,
                        None => x_block.to_owned(),
                    };
                    Ok(cross_product(xw.view(), add_intercept(f.view()).view()))
                } else {
                    Ok(xw)
                }
            }
        }
    }

    /// Fits the nuisance model on one fold's training rows.
    ///
    /// For a discrete treatment the target is a full one-hot block; it is
    /// converted to labels first, and a fold that does not cover every
    /// category fails with [`EstimationError::InvalidFoldSplit`]. `groups`
    /// is forwarded opaquely to the underlying model's group-aware fit
    /// capability.
    pub fn fit(
        &mut self,
        x: Option<ArrayView2<f64>>,
        w: Option<ArrayView2<f64>>,
        target: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
        groups: Option<ArrayView1<usize>>,
    ) -> Result<(), EstimationError> {
        let n_samples = target.nrows();
        check_rows(x, n_samples)?;
        check_rows(w, n_samples)?;
        if let Some(weights) = sample_weight {
            if weights.len() != n_samples {
                return Err(EstimationError::SampleCountMismatch {
                    expected: n_samples,
                    found: weights.len(),
                });
            }
        }
        let inputs = self.fit_inputs(x, w, n_samples)?;
        log::debug!(
            "fitting {:?} nuisance model on {} samples with {} input columns",
            self.role,
            n_samples,
            inputs.ncols()
        );
        match &mut self.model {
            NuisanceModel::Classify(model) => {
                let labels = treatment::to_label(target)?;
                model.fit_grouped(inputs.view(), labels.view(), sample_weight, groups)?;
            }
            NuisanceModel::Regress(model) => {
                model.fit_grouped(inputs.view(), target, sample_weight, groups)?;
            }
        }
        Ok(())
    }

    /// Predicts the nuisance function on held-out rows. For a discrete
    /// treatment this returns the per-category probabilities with the
    /// baseline category dropped; otherwise the regressor's point
    /// prediction. A single implicit row is used when both `X` and `W`
    /// are absent.
    pub fn predict(
        &self,
        x: Option<ArrayView2<f64>>,
        w: Option<ArrayView2<f64>>,
    ) -> Result<Array2<f64>, EstimationError> {
        let n_samples = x
            .map(|block| block.nrows())
            .or_else(|| w.map(|block| block.nrows()))
            .unwrap_or(1);
        let inputs = self.predict_inputs(x, w, n_samples)?;
        match &self.model {
            NuisanceModel::Classify(model) => Ok(treatment::to_proba_residual(
                model.predict_proba(inputs.view())?.view(),
            )),
            NuisanceModel::Regress(model) => Ok(model.predict(inputs.view())?),
        }
    }

    /// Delegates to the underlying model's scoring capability. `Ok(None)`
    /// means the model does not score; malformed inputs still fail.
    pub fn score(
        &self,
        x: Option<ArrayView2<f64>>,
        w: Option<ArrayView2<f64>>,
        target: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Result<Option<f64>, EstimationError> {
        let inputs = self.predict_inputs(x, w, target.nrows())?;
        match &self.model {
            NuisanceModel::Classify(model) => {
                let labels = treatment::to_label(target)?;
                Ok(model.score(inputs.view(), labels.view(), sample_weight))
            }
            NuisanceModel::Regress(model) => Ok(model.score(inputs.view(), target, sample_weight)),
        }
    }
}

fn check_rows(block: Option<ArrayView2<f64>>, expected: usize) -> Result<(), EstimationError> {
    if let Some(block) = block {
        if block.nrows() != expected {
            return Err(EstimationError::SampleCountMismatch {
                expected,
                found: block.nrows(),
            });
        }
    }
    Ok(())
}

struct FittedFinal {
    d_t: usize,
    d_y: usize,
    intercept: Option<Array1<f64>>,
}

/// Fits the heterogeneous coefficient function on pooled residuals and owns
/// the learned model together with its intercept correction.
pub struct FinalStageRegressor {
    model: Box<dyn Regressor>,
    fit_cate_intercept: bool,
    featurizer: Option<Box<dyn Featurizer>>,
    use_weight_trick: bool,
    fitted: Option<FittedFinal>,
}

impl FinalStageRegressor {
    /// The weighting trick implies an intercept-free design, so requesting
    /// both is rejected up front.
    pub fn new(
        model: Box<dyn Regressor>,
        fit_cate_intercept: bool,
        featurizer: Option<Box<dyn Featurizer>>,
        use_weight_trick: bool,
    ) -> Result<Self, EstimationError> {
        if use_weight_trick && fit_cate_intercept {
            return Err(EstimationError::InfeasibleConfiguration(
                "the weighting trick cannot honor an explicit CATE intercept".into(),
            ));
        }
        Ok(Self {
            model,
            fit_cate_intercept,
            featurizer,
            use_weight_trick,
            fitted: None,
        })
    }

    /// Featurized heterogeneity block, with the explicit intercept column
    /// when configured. Fails when `X` is absent and no intercept is allowed
    /// to stand in for it.
    fn features_fitting(
        &mut self,
        x: Option<ArrayView2<f64>>,
        n_samples: usize,
    ) -> Result<Array2<f64>, EstimationError> {
        match x {
            Some(x_block) => {
                let f = match &mut self.featurizer {
                    Some(featurizer) => featurizer.fit_transform(x_block)?,
                    None => x_block.to_owned(),
                };
                Ok(if self.fit_cate_intercept {
                    add_intercept(f.view())
                } else {
                    f
                })
            }
            None => self.features_absent(n_samples),
        }
    }

    fn features(
        &self,
        x: Option<ArrayView2<f64>>,
        n_samples: usize,
    ) -> Result<Array2<f64>, EstimationError> {
        match x {
            Some(x_block) => {
                let f = match &self.featurizer {
                    Some(featurizer) => featurizer.transform(x_block)?,
                    None => x_block.to_owned(),
                };
                Ok(if self.fit_cate_intercept {
                    add_intercept(f.view())
                } else {
                    f
                })
            }
            None => self.features_absent(n_samples),
        }
    }

    fn features_absent(&self, n_samples: usize) -> Result<Array2<f64>, EstimationError> {
        if !self.fit_cate_intercept {
            if self.use_weight_trick {
                return Err(EstimationError::InfeasibleConfiguration(
                    "the weighting trick cannot be used without heterogeneity features; consider a linear final stage".into(),
                ));
            }
            return Err(EstimationError::InfeasibleConfiguration(
                "cannot have absent heterogeneity features and also disallow a CATE intercept"
                    .into(),
            ));
        }
        Ok(Array2::ones((n_samples, 1)))
    }

    /// Fits the final model on pooled residuals.
    ///
    /// Standard mode regresses the residual outcome on
    /// `cross_product(Features(X), T_res)`. Weighting-trick mode divides the
    /// residual outcome by the (clipped) residual treatment and fits a
    /// weighted regression with weights `T_res^2`, which minimizes the same
    /// residual-on-residual loss while keeping the design non-parametric
    /// friendly.
    pub fn fit(
        &mut self,
        x: Option<ArrayView2<f64>>,
        t_res: ArrayView2<f64>,
        y_res: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
        sample_var: Option<ArrayView2<f64>>,
    ) -> Result<(), EstimationError> {
        let n_samples = t_res.nrows();
        if y_res.nrows() != n_samples {
            return Err(EstimationError::SampleCountMismatch {
                expected: n_samples,
                found: y_res.nrows(),
            });
        }
        check_rows(x, n_samples)?;
        if let Some(weights) = sample_weight {
            if weights.len() != n_samples {
                return Err(EstimationError::SampleCountMismatch {
                    expected: n_samples,
                    found: weights.len(),
                });
            }
        }
        let d_t = t_res.ncols();
        let d_y = y_res.ncols();
        log::info!(
            "fitting final stage on {} pooled residual samples (d_t={}, d_y={}, weight_trick={})",
            n_samples,
            d_t,
            d_y,
            self.use_weight_trick
        );

        let intercept = if !self.use_weight_trick {
            let features = self.features_fitting(x, n_samples)?;
            let design = cross_product(features.view(), t_res);
            self.model
                .fit_with_variance(design.view(), y_res, sample_weight, sample_var)?;
            self.probe_intercept(design.ncols())?
        } else {
            if d_t > 1 {
                return Err(EstimationError::UnsupportedTreatmentDimension { d_t });
            }
            let features = self.features_fitting(x, n_samples)?;
            let t = t_res.column(0);
            // sign(T_res) with zero mapped to +1, then clip the magnitude
            // away from zero before dividing.
            let clipped = t.mapv(|v| {
                let sign = if v < 0.0 { -1.0 } else { 1.0 };
                sign * v.abs().max(MIN_TREATMENT_RESIDUAL)
            });
            let clipped_column = clipped.view().insert_axis(Axis(1));
            let target = &y_res / &clipped_column;
            let t_squared = t.mapv(|v| v * v);
            let effective_weight = match sample_weight {
                Some(weights) => &weights * &t_squared,
                None => t_squared,
            };
            let target_var =
                sample_var.map(|var| &var / &clipped_column.mapv(|c| c * c));
            self.model.fit_with_variance(
                features.view(),
                target.view(),
                Some(effective_weight.view()),
                target_var.as_ref().map(|var| var.view()),
            )?;
            None
        };

        self.fitted = Some(FittedFinal {
            d_t,
            d_y,
            intercept,
        });
        Ok(())
    }

    /// Evaluates the fitted model at an all-zero design row. A linear model
    /// with no implicit baseline predicts exactly zero there; anything else
    /// is an intercept that should have been an explicit design column, so
    /// it is recorded and subtracted from every prediction. The probe is
    /// gated to models whose zero-input behavior is meaningful.
    fn probe_intercept(
        &self,
        design_columns: usize,
    ) -> Result<Option<Array1<f64>>, EstimationError> {
        if !self.model.linear_in_features() {
            return Ok(None);
        }
        let zero_row = Array2::zeros((1, design_columns));
        let baseline = self.model.predict(zero_row.view())?;
        let intercept = baseline.row(0).to_owned();
        if intercept.iter().any(|&v| v != 0.0) {
            log::warn!(
                "the final model has a nonzero intercept for at least one outcome; it will be subtracted, but consider fitting a model without an intercept if possible"
            );
            Ok(Some(intercept))
        } else {
            Ok(None)
        }
    }

    /// The constant-marginal CATE tensor at the requested feature rows; see
    /// [`CatePredictor`].
    pub fn predict(&self, x: Option<ArrayView2<f64>>) -> Result<Array3<f64>, EstimationError> {
        CatePredictor::new(self).predict(x)
    }
}

/// Recovers the coefficient function from a final model trained on
/// cross-product features by probing it with every unit treatment vector at
/// each requested feature row.
pub struct CatePredictor<'a> {
    final_stage: &'a FinalStageRegressor,
}

impl<'a> CatePredictor<'a> {
    pub fn new(final_stage: &'a FinalStageRegressor) -> Self {
        Self { final_stage }
    }

    /// Entry `[i, y, t]` of the result is the effect of a unit increase in
    /// treatment `t` on outcome `y` for row `i` of `x`. When `x` is absent a
    /// single implicit row is used and the effect is constant across the
    /// population.
    pub fn predict(&self, x: Option<ArrayView2<f64>>) -> Result<Array3<f64>, EstimationError> {
        let final_stage = self.final_stage;
        let fitted = final_stage
            .fitted
            .as_ref()
            .ok_or(EstimationError::NotFitted)?;

        let probe_block;
        let x_probe = match x {
            Some(block) => block,
            None => {
                probe_block = Array2::zeros((1, 0));
                probe_block.view()
            }
        };
        let (x_broadcast, unit_treatments) = broadcast_unit_treatments(x_probe, fitted.d_t);
        let features = match x {
            Some(_) => final_stage.features(Some(x_broadcast.view()), x_broadcast.nrows())?,
            None => final_stage.features(None, unit_treatments.nrows())?,
        };
        // The same cross product serves both fitting modes: the probes are
        // unit treatment vectors, and under the weighting trick the
        // treatment is single-dimensional, so the probe block is a ones
        // column and the design reduces to the features themselves.
        let design = cross_product(features.view(), unit_treatments.view());
        let mut prediction = final_stage.model.predict(design.view())?;
        if let Some(intercept) = &fitted.intercept {
            prediction = prediction - intercept;
        }
        Ok(reshape_treatmentwise_effects(
            prediction.view(),
            fitted.d_t,
            fitted.d_y,
        ))
    }
}
