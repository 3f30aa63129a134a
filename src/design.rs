//! Row-wise feature-combination algebra for design matrices.
//!
//! Both estimation stages express "a coefficient that varies with one feature
//! block per unit of another" through the same construction: the row-wise
//! cross product of two matrices, flattened into a single design matrix that
//! an ordinary regressor can consume. Prediction later probes that regressor
//! with unit treatment vectors and undoes the flattening, so the column order
//! chosen here is a contract shared by fit and predict.

use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Row-wise cross product of two feature blocks.
///
/// The result has one row per input row and `a.ncols() * b.ncols()` columns.
/// Column `i * b.ncols() + j` holds the element-wise product of column `i` of
/// `a` and column `j` of `b` (feature-major flattening). Fit and predict must
/// build their designs with the same orientation or the learned coefficients
/// silently misalign.
pub fn cross_product(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    assert_eq!(
        a.nrows(),
        b.nrows(),
        "cross-product blocks must have matching row counts"
    );
    let (n, ka, kb) = (a.nrows(), a.ncols(), b.ncols());
    let mut out = Array2::zeros((n, ka * kb));
    for i in 0..ka {
        for j in 0..kb {
            let prod = &a.column(i) * &b.column(j);
            out.column_mut(i * kb + j).assign(&prod);
        }
    }
    out
}

/// Horizontal concatenation of feature blocks.
pub fn hstack(blocks: &[ArrayView2<f64>]) -> Array2<f64> {
    ndarray::concatenate(Axis(1), blocks).expect("stacked blocks must have matching row counts")
}

/// Concatenates whichever of the two optional blocks are present.
///
/// When both are absent the result degenerates to a single constant column of
/// ones, so that models without features or controls can still fit an
/// intercept-only baseline.
pub fn combined_inputs(
    x: Option<ArrayView2<f64>>,
    w: Option<ArrayView2<f64>>,
    n_samples: usize,
) -> Array2<f64> {
    match (x, w) {
        (Some(x), Some(w)) => hstack(&[x, w]),
        (Some(x), None) => x.to_owned(),
        (None, Some(w)) => w.to_owned(),
        (None, None) => Array2::ones((n_samples, 1)),
    }
}

/// Prepends a constant column of ones.
pub fn add_intercept(m: ArrayView2<f64>) -> Array2<f64> {
    let ones = Array2::ones((m.nrows(), 1));
    hstack(&[ones.view(), m])
}

/// Generates the unit-treatment probe block used to read the coefficient
/// function back out of a fitted cross-product model.
///
/// Each row of `x` is repeated `d_t` consecutive times while the second block
/// cycles through the rows of the `d_t` identity, so that row `i * d_t + j`
/// pairs sample `i` with unit treatment `j`.
pub fn broadcast_unit_treatments(x: ArrayView2<f64>, d_t: usize) -> (Array2<f64>, Array2<f64>) {
    let n = x.nrows();
    let mut xs = Array2::zeros((n * d_t, x.ncols()));
    let mut t = Array2::zeros((n * d_t, d_t));
    for i in 0..n {
        for j in 0..d_t {
            xs.row_mut(i * d_t + j).assign(&x.row(i));
            t[[i * d_t + j, j]] = 1.0;
        }
    }
    (xs, t)
}

/// Reshapes a flat `(n * d_t, d_y)` prediction block, as produced by probing
/// with [`broadcast_unit_treatments`], into an `(n, d_y, d_t)` tensor whose
/// entry `[i, y, t]` is the effect of a unit increase in treatment `t` on
/// outcome `y` for sample `i`.
pub fn reshape_treatmentwise_effects(
    flat: ArrayView2<f64>,
    d_t: usize,
    d_y: usize,
) -> Array3<f64> {
    assert_eq!(flat.ncols(), d_y, "prediction block must have d_y columns");
    assert_eq!(
        flat.nrows() % d_t,
        0,
        "prediction block rows must be a multiple of d_t"
    );
    let n = flat.nrows() / d_t;
    let mut effects = Array3::zeros((n, d_y, d_t));
    for i in 0..n {
        for j in 0..d_t {
            for k in 0..d_y {
                effects[[i, k, j]] = flat[[i * d_t + j, k]];
            }
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};

    #[test]
    fn cross_product_is_feature_major() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[10.0, 100.0], [10.0, 100.0]];
        let m = cross_product(a.view(), b.view());
        // Columns: a0*b0, a0*b1, a1*b0, a1*b1.
        assert_eq!(m, array![[10.0, 100.0, 20.0, 200.0], [30.0, 300.0, 40.0, 400.0]]);
    }

    #[test]
    fn combined_inputs_falls_back_to_ones() {
        let m = combined_inputs(None, None, 3);
        assert_eq!(m, array![[1.0], [1.0], [1.0]]);

        let w = array![[2.0], [3.0], [4.0]];
        let m = combined_inputs(None, Some(w.view()), 3);
        assert_eq!(m, w);
    }

    #[test]
    fn add_intercept_prepends_ones() {
        let m = add_intercept(array![[5.0], [6.0]].view());
        assert_eq!(m, array![[1.0, 5.0], [1.0, 6.0]]);
    }

    #[test]
    fn broadcast_repeats_rows_and_tiles_identity() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let (xs, t) = broadcast_unit_treatments(x.view(), 3);
        assert_eq!(xs.nrows(), 6);
        assert_eq!(xs.row(0), xs.row(2));
        assert_eq!(xs.row(3).to_owned(), array![3.0, 4.0]);
        assert_eq!(t.row(0).to_owned(), array![1.0, 0.0, 0.0]);
        assert_eq!(t.row(5).to_owned(), array![0.0, 0.0, 1.0]);
    }

    #[test]
    fn reshape_orders_effects_by_outcome_then_treatment() {
        // Two samples, two treatments, one outcome.
        let flat = array![[1.0], [2.0], [3.0], [4.0]];
        let effects = reshape_treatmentwise_effects(flat.view(), 2, 1);
        assert_eq!(effects.dim(), (2, 1, 2));
        assert_abs_diff_eq!(effects[[0, 0, 0]], 1.0);
        assert_abs_diff_eq!(effects[[0, 0, 1]], 2.0);
        assert_abs_diff_eq!(effects[[1, 0, 0]], 3.0);
        assert_abs_diff_eq!(effects[[1, 0, 1]], 4.0);
    }

    #[test]
    fn cross_product_probe_recovers_coefficients() {
        // Generate a target from a known coefficient matrix through the
        // flattened design, then probe with unit vectors of the second block
        // and check that the original per-column coefficients come back.
        let a = array![[0.5, -1.0], [2.0, 0.25], [1.5, 3.0]];
        let b = array![[1.0, 0.3], [-0.5, 2.0], [0.7, -1.2]];
        let c = array![[2.0, -3.0], [0.5, 4.0]]; // c[[i, j]] weights a_i * b_j
        let coefs: Array1<f64> = Array1::from_iter(c.iter().copied());

        // The documented flattening order must make the flat inner product
        // agree with the explicit double sum.
        let y = cross_product(a.view(), b.view()).dot(&coefs);
        for (row, &value) in y.iter().enumerate() {
            let mut expected = 0.0;
            for i in 0..2 {
                for j in 0..2 {
                    expected += a[[row, i]] * b[[row, j]] * c[[i, j]];
                }
            }
            assert_abs_diff_eq!(value, expected, epsilon = 1e-12);
        }

        // Probing with the unit vectors of the second block divides b back
        // out: the probe at e_j equals a_row dotted with column j of c.
        let (xs, t) = broadcast_unit_treatments(a.view(), 2);
        let probe = cross_product(xs.view(), t.view()).dot(&coefs);
        for row in 0..a.nrows() {
            for j in 0..2 {
                let expected = a.row(row).dot(&c.column(j));
                assert_abs_diff_eq!(probe[row * 2 + j], expected, epsilon = 1e-12);
            }
        }
    }
}
