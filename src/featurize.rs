//! Feature maps applied to the heterogeneity features before the
//! cross-product design is assembled.
//!
//! A featurizer is refit on every `fit` call of the wrapper that owns it and
//! reused without refitting at prediction time, so the transform records
//! whatever state it needs (input dimension, random projection) during
//! `fit_transform`.

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeaturizeError {
    #[error("featurizer has not been fitted yet")]
    NotFitted,
    #[error("input has {found} feature columns, but the featurizer was fitted with {expected}")]
    FeatureCountMismatch { expected: usize, found: usize },
}

/// A feature transform with fit state.
pub trait Featurizer: Send {
    /// Fits the transform to the given block and returns the transformed
    /// features.
    fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, FeaturizeError>;

    /// Applies the already-fitted transform.
    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, FeaturizeError>;
}

/// All monomials of the input columns up to the given degree, without a bias
/// column. The intercept, when wanted, is an explicit design column owned by
/// the final stage.
#[derive(Debug, Clone)]
pub struct PolynomialFeatures {
    degree: usize,
    n_inputs: Option<usize>,
}

impl PolynomialFeatures {
    pub fn new(degree: usize) -> Self {
        assert!(degree >= 1, "polynomial degree must be at least 1");
        Self {
            degree,
            n_inputs: None,
        }
    }

    fn expand(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let k = x.ncols();
        let combos: Vec<Vec<usize>> = (1..=self.degree)
            .flat_map(|d| (0..k).combinations_with_replacement(d))
            .collect();
        let mut out = Array2::ones((x.nrows(), combos.len()));
        for (c, combo) in combos.iter().enumerate() {
            for &idx in combo {
                let col = x.column(idx);
                let mut target = out.column_mut(c);
                target *= &col;
            }
        }
        out
    }
}

impl Featurizer for PolynomialFeatures {
    fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, FeaturizeError> {
        self.n_inputs = Some(x.ncols());
        Ok(self.expand(x))
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, FeaturizeError> {
        let expected = self.n_inputs.ok_or(FeaturizeError::NotFitted)?;
        if x.ncols() != expected {
            return Err(FeaturizeError::FeatureCountMismatch {
                expected,
                found: x.ncols(),
            });
        }
        Ok(self.expand(x))
    }
}

/// Random Fourier features approximating a Gaussian kernel: frequencies drawn
/// from N(0, 1/bandwidth), phases from U(0, 2 pi), features
/// sqrt(2/dim) * cos(X omega + b).
///
/// The seed is required; the same seed and input dimension always reproduce
/// the same projection.
#[derive(Debug, Clone)]
pub struct RandomFourierFeatures {
    dim: usize,
    bandwidth: f64,
    seed: u64,
    projection: Option<Projection>,
}

#[derive(Debug, Clone)]
struct Projection {
    omegas: Array2<f64>,
    biases: Array1<f64>,
}

impl RandomFourierFeatures {
    pub fn new(dim: usize, bandwidth: f64, seed: u64) -> Self {
        assert!(dim >= 1, "the number of random features must be at least 1");
        assert!(
            bandwidth > 0.0 && bandwidth.is_finite(),
            "bandwidth must be positive and finite"
        );
        Self {
            dim,
            bandwidth,
            seed,
            projection: None,
        }
    }
}

impl Featurizer for RandomFourierFeatures {
    fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, FeaturizeError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let normal = Normal::new(0.0, 1.0 / self.bandwidth)
            .expect("bandwidth was validated at construction");
        let omegas =
            Array2::from_shape_simple_fn((x.ncols(), self.dim), || normal.sample(&mut rng));
        let uniform = Uniform::new(0.0, 2.0 * std::f64::consts::PI);
        let biases = Array1::from_shape_simple_fn(self.dim, || uniform.sample(&mut rng));
        self.projection = Some(Projection { omegas, biases });
        self.transform(x)
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, FeaturizeError> {
        let projection = self.projection.as_ref().ok_or(FeaturizeError::NotFitted)?;
        if x.ncols() != projection.omegas.nrows() {
            return Err(FeaturizeError::FeatureCountMismatch {
                expected: projection.omegas.nrows(),
                found: x.ncols(),
            });
        }
        let scale = (2.0 / self.dim as f64).sqrt();
        let mut features = x.dot(&projection.omegas);
        features += &projection.biases;
        Ok(features.mapv(|v| scale * v.cos()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn polynomial_degree_two_produces_all_monomials() {
        let x = array![[2.0, 3.0]];
        let mut featurizer = PolynomialFeatures::new(2);
        let out = featurizer.fit_transform(x.view()).unwrap();
        // x0, x1, x0^2, x0 x1, x1^2
        assert_eq!(out.ncols(), 5);
        assert_abs_diff_eq!(out[[0, 0]], 2.0);
        assert_abs_diff_eq!(out[[0, 1]], 3.0);
        assert_abs_diff_eq!(out[[0, 2]], 4.0);
        assert_abs_diff_eq!(out[[0, 3]], 6.0);
        assert_abs_diff_eq!(out[[0, 4]], 9.0);
    }

    #[test]
    fn polynomial_transform_requires_fit() {
        let featurizer = PolynomialFeatures::new(2);
        match featurizer.transform(array![[1.0]].view()) {
            Err(FeaturizeError::NotFitted) => {}
            other => panic!("expected NotFitted, got {other:?}"),
        }
    }

    #[test]
    fn polynomial_checks_input_width() {
        let x = array![[1.0, 2.0]];
        let mut featurizer = PolynomialFeatures::new(2);
        featurizer.fit_transform(x.view()).unwrap();
        match featurizer.transform(array![[1.0]].view()) {
            Err(FeaturizeError::FeatureCountMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected FeatureCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn random_fourier_features_are_seed_deterministic() {
        let x = array![[0.1, -0.4], [0.8, 0.2], [-1.0, 0.5]];
        let mut a = RandomFourierFeatures::new(16, 1.0, 42);
        let mut b = RandomFourierFeatures::new(16, 1.0, 42);
        let fa = a.fit_transform(x.view()).unwrap();
        let fb = b.fit_transform(x.view()).unwrap();
        assert_eq!(fa, fb);

        let mut c = RandomFourierFeatures::new(16, 1.0, 43);
        let fc = c.fit_transform(x.view()).unwrap();
        assert_ne!(fa, fc);
    }

    #[test]
    fn random_fourier_transform_matches_fit_transform() {
        let x = array![[0.3], [0.6]];
        let mut featurizer = RandomFourierFeatures::new(8, 0.5, 7);
        let fitted = featurizer.fit_transform(x.view()).unwrap();
        let transformed = featurizer.transform(x.view()).unwrap();
        assert_eq!(fitted, transformed);
        assert_eq!(fitted.ncols(), 8);
        // Features are bounded by the cosine scale.
        let bound = (2.0f64 / 8.0).sqrt();
        assert!(fitted.iter().all(|v| v.abs() <= bound + 1e-12));
    }
}
