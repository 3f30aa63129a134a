//! One-hot treatment encoding and fold-coverage validation.
//!
//! A categorical treatment enters the estimator as a full one-hot block with
//! one column per category. Classifiers consume the label representation, so
//! the conversion back from one-hot happens here, together with the check
//! that the current training fold actually covers every category. A fold that
//! silently dropped a category would bias the fitted propensities, so the
//! conversion is strict and the failure is fatal to the fit call.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use thiserror::Error;

/// Validation failures when converting a one-hot treatment block to labels.
///
/// Every variant indicates a defect in the fold generation upstream, never a
/// condition worth retrying.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error(
        "treatment category {column} never occurs in this training fold; every crossfit fold must contain all treatments"
    )]
    MissingCategory { column: usize },
    #[error("row {row} of the one-hot treatment block has no active category")]
    UnassignedRow { row: usize },
    #[error(
        "row {row} of the one-hot treatment block has {active} active categories; exactly one is required"
    )]
    AmbiguousRow { row: usize, active: usize },
}

/// Inverts a one-hot encoding into category labels.
///
/// Used only when fitting a classifier against a categorical treatment.
/// Fails if some column is always zero (a category absent from the fold) or
/// some row does not have exactly one active column.
pub fn to_label(onehot: ArrayView2<f64>) -> Result<Array1<usize>, EncodingError> {
    for (column, col) in onehot.columns().into_iter().enumerate() {
        if col.iter().all(|&v| v == 0.0) {
            return Err(EncodingError::MissingCategory { column });
        }
    }
    let mut labels = Array1::zeros(onehot.nrows());
    for (row, values) in onehot.rows().into_iter().enumerate() {
        let mut active = values.iter().enumerate().filter(|&(_, &v)| v != 0.0);
        let first = active.next();
        let extra = active.count();
        match (first, extra) {
            (Some((j, _)), 0) => labels[row] = j,
            (None, _) => return Err(EncodingError::UnassignedRow { row }),
            (Some(_), extra) => {
                return Err(EncodingError::AmbiguousRow {
                    row,
                    active: extra + 1,
                });
            }
        }
    }
    Ok(labels)
}

/// Drops the baseline (first) category's column from a per-category
/// probability block.
///
/// The probabilities sum to one across categories, so one column is redundant
/// and the residual treatment is defined against the remaining categories.
pub fn to_proba_residual(proba: ArrayView2<f64>) -> Array2<f64> {
    proba.slice(s![.., 1..]).to_owned()
}

/// Forward one-hot encoding convenience for callers assembling treatment
/// blocks.
pub fn to_onehot(labels: ArrayView1<usize>, n_categories: usize) -> Array2<f64> {
    let mut out = Array2::zeros((labels.len(), n_categories));
    for (i, &label) in labels.iter().enumerate() {
        assert!(
            label < n_categories,
            "label {label} is out of range for {n_categories} categories"
        );
        out[[i, label]] = 1.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn labels_round_trip_through_onehot() {
        let labels = array![0usize, 2, 1, 0];
        let onehot = to_onehot(labels.view(), 3);
        let recovered = to_label(onehot.view()).unwrap();
        assert_eq!(recovered, labels);
    }

    #[test]
    fn all_zero_column_is_rejected() {
        // Category 2 never occurs.
        let onehot = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
        match to_label(onehot.view()) {
            Err(EncodingError::MissingCategory { column }) => assert_eq!(column, 2),
            other => panic!("expected MissingCategory, got {other:?}"),
        }
    }

    #[test]
    fn unassigned_row_is_rejected() {
        let onehot = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        match to_label(onehot.view()) {
            Err(EncodingError::UnassignedRow { row }) => assert_eq!(row, 2),
            other => panic!("expected UnassignedRow, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_row_is_rejected() {
        let onehot = array![[1.0, 1.0], [0.0, 1.0], [1.0, 0.0]];
        match to_label(onehot.view()) {
            Err(EncodingError::AmbiguousRow { row, active }) => {
                assert_eq!(row, 0);
                assert_eq!(active, 2);
            }
            other => panic!("expected AmbiguousRow, got {other:?}"),
        }
    }

    #[test]
    fn well_formed_block_is_accepted() {
        let onehot = array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0], [1.0, 0.0]];
        let labels = to_label(onehot.view()).unwrap();
        assert_eq!(labels, array![1usize, 0, 1, 0]);
    }

    #[test]
    fn proba_residual_drops_baseline_column() {
        let proba = array![[0.2, 0.5, 0.3], [0.1, 0.6, 0.3]];
        let residual = to_proba_residual(proba.view());
        assert_eq!(residual, array![[0.5, 0.3], [0.6, 0.3]]);
    }
}
