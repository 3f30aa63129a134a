//! Learner capability traits and the stock learners shipped with the crate.
//!
//! The estimation wrappers accept any model through the [`Regressor`] and
//! [`Classifier`] traits. Optional capabilities (scoring, variance-aware
//! fitting, group-aware fitting) are default trait methods with explicit
//! absent behavior, so a wrapper never has to probe a model at runtime to
//! discover what it supports.
//!
//! Three learners cover the presets: a weighted multi-output linear regressor
//! with an optional ridge penalty, a logistic classifier fit by iteratively
//! reweighted least squares, and a Nadaraya-Watson kernel smoother for the
//! non-parametric final stage.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::Solve;
use thiserror::Error;

const MIN_IRLS_WEIGHT: f64 = 1e-6;
const PROB_EPS: f64 = 1e-8;

/// Failures inside a stock learner's fit or predict.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model has not been fitted yet")]
    NotFitted,
    #[error("input has {found} feature columns, but the model was fitted with {expected}")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("input blocks disagree on the number of samples: expected {expected}, found {found}")]
    SampleCountMismatch { expected: usize, found: usize },
    #[error("a linear system solve failed; the normal equations may be singular: {0}")]
    LinearSystemSolveFailed(#[from] ndarray_linalg::error::LinalgError),
    #[error(
        "IRLS did not converge within {max_iterations} iterations; last deviance change was {last_change:.6e}"
    )]
    IrlsDidNotConverge {
        max_iterations: usize,
        last_change: f64,
    },
    #[error("classification requires at least two categories; the training labels contain {found}")]
    InsufficientCategories { found: usize },
}

/// A regression model the estimation wrappers can adapt.
///
/// `fit` and `predict` are required; everything else is an optional
/// capability with an explicit default. Targets are always two-dimensional
/// (`n` rows by `d_y` outputs), including the single-output case.
pub trait Regressor: Send {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Result<(), ModelError>;

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError>;

    /// Variance-aware fit. The default ignores the variances; models that can
    /// exploit per-sample variances override this.
    fn fit_with_variance(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
        _sample_var: Option<ArrayView2<f64>>,
    ) -> Result<(), ModelError> {
        self.fit(x, y, sample_weight)
    }

    /// Group-aware fit. Groups are forwarded opaquely by the wrappers; the
    /// default ignores them.
    fn fit_grouped(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
        _groups: Option<ArrayView1<usize>>,
    ) -> Result<(), ModelError> {
        self.fit(x, y, sample_weight)
    }

    /// Optional scoring capability. `None` means the model does not score;
    /// this is an absent value, not an error.
    fn score(
        &self,
        _x: ArrayView2<f64>,
        _y: ArrayView2<f64>,
        _sample_weight: Option<ArrayView1<f64>>,
    ) -> Option<f64> {
        None
    }

    /// Whether predictions are a linear function of the design columns, so
    /// that the model's output at an all-zero input is a meaningful baseline.
    /// Gates the final stage's implicit-intercept probe.
    fn linear_in_features(&self) -> bool {
        false
    }
}

/// A classification model for categorical treatments.
pub trait Classifier: Send {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Result<(), ModelError>;

    /// Per-category probabilities, one column per category.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError>;

    /// Group-aware fit with the same default as [`Regressor::fit_grouped`].
    fn fit_grouped(
        &mut self,
        x: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        sample_weight: Option<ArrayView1<f64>>,
        _groups: Option<ArrayView1<usize>>,
    ) -> Result<(), ModelError> {
        self.fit(x, labels, sample_weight)
    }

    /// Optional scoring capability; see [`Regressor::score`].
    fn score(
        &self,
        _x: ArrayView2<f64>,
        _labels: ArrayView1<usize>,
        _sample_weight: Option<ArrayView1<f64>>,
    ) -> Option<f64> {
        None
    }
}

fn ones_column(n: usize) -> Array2<f64> {
    Array2::ones((n, 1))
}

fn prepend_ones(x: ArrayView2<f64>) -> Array2<f64> {
    ndarray::concatenate(Axis(1), &[ones_column(x.nrows()).view(), x])
        .expect("intercept column must match the design row count")
}

fn weights_or_ones(sample_weight: Option<ArrayView1<f64>>, n: usize) -> Array1<f64> {
    match sample_weight {
        Some(w) => w.to_owned(),
        None => Array1::ones(n),
    }
}

/// Weighted multi-output linear regression solved through the normal
/// equations, with an optional ridge penalty.
#[derive(Debug, Clone, Default)]
pub struct LinearRegressor {
    fit_intercept: bool,
    l2_penalty: f64,
    coef: Option<Array2<f64>>,
}

impl LinearRegressor {
    /// A plain least-squares fit through the origin. This is the form the
    /// final CATE stage expects, where the design already carries any
    /// intercept column explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Least squares with an internal intercept term.
    pub fn with_intercept() -> Self {
        Self {
            fit_intercept: true,
            ..Self::default()
        }
    }

    /// Ridge regression through the origin with the given penalty.
    pub fn with_penalty(l2_penalty: f64) -> Self {
        assert!(l2_penalty >= 0.0, "ridge penalty must be non-negative");
        Self {
            l2_penalty,
            ..Self::default()
        }
    }

    /// Ridge regression with an internal intercept term. The expanded
    /// first-stage design contains exactly collinear columns, so the stock
    /// nuisance learner carries a light penalty to keep the normal
    /// equations solvable.
    pub fn with_intercept_and_penalty(l2_penalty: f64) -> Self {
        assert!(l2_penalty >= 0.0, "ridge penalty must be non-negative");
        Self {
            fit_intercept: true,
            l2_penalty,
            ..Self::default()
        }
    }

    /// The fitted coefficient matrix (including the intercept row when the
    /// model fits one), or `None` before `fit`.
    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coef.as_ref()
    }

    fn design(&self, x: ArrayView2<f64>) -> Array2<f64> {
        if self.fit_intercept {
            prepend_ones(x)
        } else {
            x.to_owned()
        }
    }
}

impl Regressor for LinearRegressor {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Result<(), ModelError> {
        let n = x.nrows();
        if y.nrows() != n {
            return Err(ModelError::SampleCountMismatch {
                expected: n,
                found: y.nrows(),
            });
        }
        let design = self.design(x);
        let weights = weights_or_ones(sample_weight, n);
        let weighted = &design * &weights.view().insert_axis(Axis(1));
        let mut gram = weighted.t().dot(&design);
        if self.l2_penalty > 0.0 {
            // The intercept row, when present, stays unpenalized.
            let start = usize::from(self.fit_intercept);
            for i in start..gram.nrows() {
                gram[[i, i]] += self.l2_penalty;
            }
        }
        let moment = weighted.t().dot(&y);
        let mut coef = Array2::zeros((design.ncols(), y.ncols()));
        for j in 0..y.ncols() {
            let rhs = moment.column(j).to_owned();
            let beta = gram.solve(&rhs)?;
            coef.column_mut(j).assign(&beta);
        }
        self.coef = Some(coef);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        let coef = self.coef.as_ref().ok_or(ModelError::NotFitted)?;
        let expected = coef.nrows() - usize::from(self.fit_intercept);
        if x.ncols() != expected {
            return Err(ModelError::FeatureCountMismatch {
                expected,
                found: x.ncols(),
            });
        }
        Ok(self.design(x).dot(coef))
    }

    fn score(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Option<f64> {
        let prediction = self.predict(x).ok()?;
        if y.dim() != prediction.dim() {
            return None;
        }
        let weights = weights_or_ones(sample_weight, y.nrows());
        let total_weight: f64 = weights.sum();
        if total_weight <= 0.0 {
            return None;
        }
        // Uniform average of the per-output weighted coefficients of
        // determination.
        let mut r2_sum = 0.0;
        for j in 0..y.ncols() {
            let observed = y.column(j);
            let fitted = prediction.column(j);
            let mean: f64 = observed.dot(&weights) / total_weight;
            let mut ss_res = 0.0;
            let mut ss_tot = 0.0;
            for ((&yi, &fi), &wi) in observed.iter().zip(fitted.iter()).zip(weights.iter()) {
                ss_res += wi * (yi - fi) * (yi - fi);
                ss_tot += wi * (yi - mean) * (yi - mean);
            }
            if ss_tot > f64::EPSILON {
                r2_sum += 1.0 - ss_res / ss_tot;
            } else if ss_res <= f64::EPSILON {
                r2_sum += 1.0;
            }
        }
        Some(r2_sum / y.ncols() as f64)
    }

    fn linear_in_features(&self) -> bool {
        true
    }
}

/// Logistic regression fit by iteratively reweighted least squares. Binary
/// problems get a single IRLS fit; more categories are handled one-vs-rest
/// with row-normalized probabilities.
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    fit_intercept: bool,
    l2_penalty: f64,
    max_iterations: usize,
    tolerance: f64,
    state: Option<LogisticState>,
}

#[derive(Debug, Clone)]
struct LogisticState {
    coef: Array2<f64>,
    n_categories: usize,
}

impl Default for LogisticClassifier {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            l2_penalty: 1e-6,
            max_iterations: 100,
            tolerance: 1e-8,
            state: None,
        }
    }
}

impl LogisticClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the default (tiny) ridge penalty. A small penalty keeps the
    /// IRLS step solvable under quasi-perfect separation.
    pub fn with_penalty(l2_penalty: f64) -> Self {
        assert!(l2_penalty >= 0.0, "ridge penalty must be non-negative");
        Self {
            l2_penalty,
            ..Self::default()
        }
    }

    fn design(&self, x: ArrayView2<f64>) -> Array2<f64> {
        if self.fit_intercept {
            prepend_ones(x)
        } else {
            x.to_owned()
        }
    }
}

impl Classifier for LogisticClassifier {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Result<(), ModelError> {
        let n = x.nrows();
        if labels.len() != n {
            return Err(ModelError::SampleCountMismatch {
                expected: n,
                found: labels.len(),
            });
        }
        let n_categories = labels.iter().max().map_or(0, |&m| m + 1);
        if n_categories < 2 {
            return Err(ModelError::InsufficientCategories {
                found: n_categories,
            });
        }
        let design = self.design(x);
        let prior_weights = weights_or_ones(sample_weight, n);
        let penalize_from = usize::from(self.fit_intercept);

        // Binary fits need one column of coefficients, one-vs-rest fits need
        // one per category.
        let fitted_columns = if n_categories == 2 { 1 } else { n_categories };
        let mut coef = Array2::zeros((design.ncols(), fitted_columns));
        for k in 0..fitted_columns {
            let target_category = if n_categories == 2 { 1 } else { k };
            let indicator = labels.mapv(|label| f64::from(u8::from(label == target_category)));
            let beta = irls_binary(
                design.view(),
                indicator.view(),
                &prior_weights,
                self.l2_penalty,
                penalize_from,
                self.max_iterations,
                self.tolerance,
            )?;
            coef.column_mut(k).assign(&beta);
        }
        self.state = Some(LogisticState { coef, n_categories });
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotFitted)?;
        let expected = state.coef.nrows() - usize::from(self.fit_intercept);
        if x.ncols() != expected {
            return Err(ModelError::FeatureCountMismatch {
                expected,
                found: x.ncols(),
            });
        }
        let design = self.design(x);
        let eta = design.dot(&state.coef);
        let sigmoid = eta.mapv(|e| {
            let clamped: f64 = e.clamp(-700.0, 700.0);
            (1.0 / (1.0 + (-clamped).exp())).clamp(PROB_EPS, 1.0 - PROB_EPS)
        });
        let mut proba = Array2::zeros((x.nrows(), state.n_categories));
        if state.n_categories == 2 {
            for i in 0..x.nrows() {
                proba[[i, 1]] = sigmoid[[i, 0]];
                proba[[i, 0]] = 1.0 - sigmoid[[i, 0]];
            }
        } else {
            for i in 0..x.nrows() {
                let row_sum: f64 = sigmoid.row(i).sum().max(PROB_EPS);
                for k in 0..state.n_categories {
                    proba[[i, k]] = sigmoid[[i, k]] / row_sum;
                }
            }
        }
        Ok(proba)
    }

    fn score(
        &self,
        x: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Option<f64> {
        let proba = self.predict_proba(x).ok()?;
        if labels.len() != proba.nrows() {
            return None;
        }
        let weights = weights_or_ones(sample_weight, labels.len());
        let total: f64 = weights.sum();
        if total <= 0.0 {
            return None;
        }
        // Weighted accuracy of the most probable category.
        let mut correct = 0.0;
        for (i, &label) in labels.iter().enumerate() {
            let mut best = 0;
            for k in 1..proba.ncols() {
                if proba[[i, k]] > proba[[i, best]] {
                    best = k;
                }
            }
            if best == label {
                correct += weights[i];
            }
        }
        Some(correct / total)
    }
}

/// One binary IRLS fit. The eta and probability clamps keep the working
/// response finite under quasi-perfect separation; convergence is judged on
/// the change in binomial deviance.
fn irls_binary(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    prior_weights: &Array1<f64>,
    l2_penalty: f64,
    penalize_from: usize,
    max_iterations: usize,
    tolerance: f64,
) -> Result<Array1<f64>, ModelError> {
    let mut beta = Array1::zeros(x.ncols());
    let mut last_deviance = f64::INFINITY;
    let mut last_change = f64::INFINITY;
    for iteration in 0..max_iterations {
        let eta = x.dot(&beta).mapv(|e: f64| e.clamp(-700.0, 700.0));
        let mut mu = eta.mapv(|e| 1.0 / (1.0 + (-e).exp()));
        mu.mapv_inplace(|v| v.clamp(PROB_EPS, 1.0 - PROB_EPS));

        let deviance = binomial_deviance(y, &mu, prior_weights);
        let change = (last_deviance - deviance).abs();
        if iteration > 0 && change < tolerance * (deviance.abs() + 0.1) {
            return Ok(beta);
        }
        last_deviance = deviance;
        last_change = change;

        let variance = (&mu * &mu.mapv(|v| 1.0 - v)).mapv(|v| v.max(MIN_IRLS_WEIGHT));
        let weights = prior_weights * &variance;
        let residual = &y - &mu;
        let z = &eta + &(&residual / &variance);

        let weighted = &x * &weights.view().insert_axis(Axis(1));
        let mut gram = weighted.t().dot(&x);
        if l2_penalty > 0.0 {
            for i in penalize_from..gram.nrows() {
                gram[[i, i]] += l2_penalty;
            }
        }
        let rhs = weighted.t().dot(&z);
        beta = gram.solve(&rhs)?;
    }
    Err(ModelError::IrlsDidNotConverge {
        max_iterations,
        last_change,
    })
}

fn binomial_deviance(y: ArrayView1<f64>, mu: &Array1<f64>, weights: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-8;
    let mut total = 0.0;
    for ((&yi, &mui), &wi) in y.iter().zip(mu.iter()).zip(weights.iter()) {
        let mui_c = mui.clamp(EPS, 1.0 - EPS);
        let term1 = if yi > EPS {
            yi * (yi.ln() - mui_c.ln())
        } else {
            0.0
        };
        let term2 = if yi < 1.0 - EPS {
            (1.0 - yi) * ((1.0 - yi).ln() - (1.0 - mui_c).ln())
        } else {
            0.0
        };
        total += wi * (term1 + term2);
    }
    2.0 * total
}

/// Nadaraya-Watson kernel smoother: predictions are Gaussian-kernel weighted
/// means of the training targets. Sample weights multiply the kernel weights,
/// which is what the weighting-trick final stage requires.
#[derive(Debug, Clone)]
pub struct KernelSmoother {
    bandwidth: f64,
    state: Option<SmootherState>,
}

#[derive(Debug, Clone)]
struct SmootherState {
    x: Array2<f64>,
    y: Array2<f64>,
    weights: Array1<f64>,
}

impl KernelSmoother {
    pub fn new(bandwidth: f64) -> Self {
        assert!(
            bandwidth > 0.0 && bandwidth.is_finite(),
            "bandwidth must be positive and finite"
        );
        Self {
            bandwidth,
            state: None,
        }
    }
}

impl Regressor for KernelSmoother {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sample_weight: Option<ArrayView1<f64>>,
    ) -> Result<(), ModelError> {
        if y.nrows() != x.nrows() {
            return Err(ModelError::SampleCountMismatch {
                expected: x.nrows(),
                found: y.nrows(),
            });
        }
        self.state = Some(SmootherState {
            x: x.to_owned(),
            y: y.to_owned(),
            weights: weights_or_ones(sample_weight, x.nrows()),
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotFitted)?;
        if x.ncols() != state.x.ncols() {
            return Err(ModelError::FeatureCountMismatch {
                expected: state.x.ncols(),
                found: x.ncols(),
            });
        }
        let two_h_sq = 2.0 * self.bandwidth * self.bandwidth;
        let d_y = state.y.ncols();
        let mut out = Array2::zeros((x.nrows(), d_y));
        for (q, query) in x.rows().into_iter().enumerate() {
            let mut numerator = Array1::zeros(d_y);
            let mut denominator = 0.0;
            for (i, point) in state.x.rows().into_iter().enumerate() {
                let mut dist_sq = 0.0;
                for (a, b) in query.iter().zip(point.iter()) {
                    dist_sq += (a - b) * (a - b);
                }
                let kernel = state.weights[i] * (-dist_sq / two_h_sq).exp();
                numerator.scaled_add(kernel, &state.y.row(i));
                denominator += kernel;
            }
            if denominator <= f64::MIN_POSITIVE {
                // No mass near this query; fall back to the global weighted
                // mean so the prediction stays finite.
                let total = state.weights.sum().max(f64::MIN_POSITIVE);
                numerator.fill(0.0);
                for (i, row) in state.y.rows().into_iter().enumerate() {
                    numerator.scaled_add(state.weights[i], &row);
                }
                denominator = total;
            }
            out.row_mut(q).assign(&(&numerator / denominator));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn least_squares_recovers_exact_coefficients() {
        let x = array![
            [1.0, 2.0],
            [2.0, 1.0],
            [3.0, 4.0],
            [-1.0, 0.5],
            [0.0, 1.0]
        ];
        let coefs = array![[2.0], [-1.0]];
        let y = x.dot(&coefs);
        let mut model = LinearRegressor::new();
        model.fit(x.view(), y.view(), None).unwrap();
        let fitted = model.coefficients().unwrap();
        assert_abs_diff_eq!(fitted[[0, 0]], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fitted[[1, 0]], -1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(
            model.score(x.view(), y.view(), None).unwrap(),
            1.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn intercept_variant_recovers_offset() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![[5.0], [7.0], [9.0], [11.0]]; // 5 + 2 x
        let mut model = LinearRegressor::with_intercept();
        model.fit(x.view(), y.view(), None).unwrap();
        let fitted = model.coefficients().unwrap();
        assert_abs_diff_eq!(fitted[[0, 0]], 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fitted[[1, 0]], 2.0, epsilon = 1e-10);
        // Zero input exposes the implicit baseline.
        let at_zero = model.predict(array![[0.0]].view()).unwrap();
        assert_abs_diff_eq!(at_zero[[0, 0]], 5.0, epsilon = 1e-10);
    }

    #[test]
    fn sample_weights_tilt_the_fit() {
        // Two inconsistent points; the heavier one dominates.
        let x = array![[1.0], [1.0]];
        let y = array![[0.0], [10.0]];
        let weights = array![1.0, 9.0];
        let mut model = LinearRegressor::new();
        model.fit(x.view(), y.view(), Some(weights.view())).unwrap();
        let fitted = model.coefficients().unwrap();
        assert_abs_diff_eq!(fitted[[0, 0]], 9.0, epsilon = 1e-10);
    }

    #[test]
    fn ridge_penalty_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![[2.0], [4.0], [6.0]];
        let mut plain = LinearRegressor::new();
        plain.fit(x.view(), y.view(), None).unwrap();
        let mut ridge = LinearRegressor::with_penalty(10.0);
        ridge.fit(x.view(), y.view(), None).unwrap();
        let b0 = plain.coefficients().unwrap()[[0, 0]];
        let b1 = ridge.coefficients().unwrap()[[0, 0]];
        assert!(b1 < b0);
        assert!(b1 > 0.0);
    }

    #[test]
    fn predict_before_fit_is_an_error() {
        let model = LinearRegressor::new();
        match model.predict(array![[1.0]].view()) {
            Err(ModelError::NotFitted) => {}
            other => panic!("expected NotFitted, got {other:?}"),
        }
    }

    #[test]
    fn feature_count_mismatch_is_reported() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = array![[1.0], [2.0], [3.0]];
        let mut model = LinearRegressor::new();
        model.fit(x.view(), y.view(), None).unwrap();
        match model.predict(array![[1.0]].view()) {
            Err(ModelError::FeatureCountMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected FeatureCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn logistic_recovers_a_monotone_response() {
        // Eight replicates at each of five design points, with overlapping
        // labels so the likelihood has a finite optimum.
        let ones_per_level = [0usize, 1, 4, 7, 8];
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (level, &ones) in ones_per_level.iter().enumerate() {
            for replicate in 0..8 {
                rows.push(level as f64);
                labels.push(usize::from(replicate < ones));
            }
        }
        let n = rows.len();
        let x = Array2::from_shape_vec((n, 1), rows).unwrap();
        let labels = Array1::from_vec(labels);
        let mut model = LogisticClassifier::new();
        model.fit(x.view(), labels.view(), None).unwrap();
        let proba = model.predict_proba(x.view()).unwrap();
        // Far from the boundary the fitted probabilities are decisive.
        assert!(proba[[0, 1]] < 0.1);
        assert!(proba[[n - 1, 1]] > 0.9);
        let accuracy = Classifier::score(&model, x.view(), labels.view(), None).unwrap();
        assert!(accuracy > 0.8);
    }

    #[test]
    fn logistic_handles_three_categories() {
        let n = 90;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64 * 0.1);
        let mut labels = Array1::from_shape_fn(n, |i| (i / 30).min(2));
        // Swap a few points across the band edges so no one-vs-rest problem
        // is perfectly separable.
        labels[28] = 1;
        labels[31] = 0;
        labels[58] = 2;
        labels[61] = 1;
        let mut model = LogisticClassifier::new();
        model.fit(x.view(), labels.view(), None).unwrap();
        let proba = model.predict_proba(x.view()).unwrap();
        assert_eq!(proba.ncols(), 3);
        for i in 0..n {
            assert_abs_diff_eq!(proba.row(i).sum(), 1.0, epsilon = 1e-9);
        }
        // The dominant category tracks the true band.
        assert!(proba[[5, 0]] > proba[[5, 2]]);
        assert!(proba[[85, 2]] > proba[[85, 0]]);
    }

    #[test]
    fn logistic_rejects_single_category() {
        let x = array![[1.0], [2.0]];
        let labels = array![0usize, 0];
        let mut model = LogisticClassifier::new();
        match model.fit(x.view(), labels.view(), None) {
            Err(ModelError::InsufficientCategories { found }) => assert_eq!(found, 1),
            other => panic!("expected InsufficientCategories, got {other:?}"),
        }
    }

    #[test]
    fn kernel_smoother_interpolates_locally() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let mut model = KernelSmoother::new(0.3);
        model.fit(x.view(), y.view(), None).unwrap();
        let prediction = model.predict(array![[2.0]].view()).unwrap();
        assert_abs_diff_eq!(prediction[[0, 0]], 2.0, epsilon = 0.05);
        // The smoother does not advertise a score.
        assert!(Regressor::score(&model, x.view(), y.view(), None).is_none());
        assert!(!model.linear_in_features());
    }
}
