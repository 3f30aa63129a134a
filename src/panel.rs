//! Panel-data reshape helpers.
//!
//! Panel inputs arrive either in wide format, one row per unit with periods
//! side by side, or in long format, one row per unit-period pair. These
//! conversions keep the unit-major ordering, so `long` followed by `wide`
//! is the identity.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, s};

/// Reshapes wide panel observations `(n_units, n_periods)` into a long
/// vector of length `n_units * n_periods`.
pub fn long(x: ArrayView2<f64>) -> Array1<f64> {
    Array1::from_iter(x.iter().copied())
}

/// Reshapes a wide panel block `(n_units, n_periods, d)` into a long matrix
/// `(n_units * n_periods, d)`.
pub fn long_panel(x: ArrayView3<f64>) -> Array2<f64> {
    let (n_units, n_periods, d) = x.dim();
    let mut out = Array2::zeros((n_units * n_periods, d));
    for i in 0..n_units {
        for j in 0..n_periods {
            out.row_mut(i * n_periods + j).assign(&x.slice(s![i, j, ..]));
        }
    }
    out
}

/// Inverse of [`long`]: reshapes a long vector back into `(n_units,
/// n_periods)`.
pub fn wide(x: ArrayView1<f64>, n_units: usize) -> Array2<f64> {
    assert!(
        n_units > 0 && x.len() % n_units == 0,
        "long vector length must be a multiple of the unit count"
    );
    let n_periods = x.len() / n_units;
    Array2::from_shape_vec((n_units, n_periods), x.to_vec())
        .expect("shape was derived from the input length")
}

/// Inverse of [`long_panel`]: reshapes a long matrix back into `(n_units,
/// n_periods, d)`.
pub fn wide_panel(x: ArrayView2<f64>, n_units: usize) -> Array3<f64> {
    assert!(
        n_units > 0 && x.nrows() % n_units == 0,
        "long matrix rows must be a multiple of the unit count"
    );
    let n_periods = x.nrows() / n_units;
    let d = x.ncols();
    let mut out = Array3::zeros((n_units, n_periods, d));
    for i in 0..n_units {
        for j in 0..n_periods {
            out.slice_mut(s![i, j, ..]).assign(&x.row(i * n_periods + j));
        }
    }
    out
}
