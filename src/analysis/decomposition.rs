// Batch decomposition of feature vectors
//
// Rows are feature vectors, columns are frequency bins. These run offline on a
// recorded batch, never on the live window path.
//
// - standardize: per-column z-score (population std, zero variance -> divisor 1)
// - pca:         standardize, then projection onto the top-n eigenvectors of the covariance matrix
// - ica:         standardize, then FastICA, logcosh contrast, symmetric decorrelation, PCA whitening

use log::warn;
use nalgebra::{DMatrix, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::FeatureVector;
use crate::error::ProcessingError;

const VARIANCE_EPSILON: f64 = 1e-12;
const ICA_MAX_ITERATIONS: usize = 200;
const ICA_TOLERANCE: f64 = 1e-4;
const ICA_SEED: u64 = 0x1ca;

/// Z-score every column of `batch`
pub fn standardize(batch: &[FeatureVector]) -> Result<Vec<FeatureVector>, ProcessingError> {
    Ok(from_matrix(&zscore(&to_matrix(batch)?)))
}

/// Standardize `batch`, then project it onto its first `n_components`
/// principal components
///
/// Component signs are fixed so the largest loading of each is positive.
///
/// # Errors
/// `InvalidBatch` for ragged or too-small batches, or `n_components` outside
/// `1..=min(rows, columns)`
pub fn pca(batch: &[FeatureVector], n_components: usize) -> Result<Vec<FeatureVector>, ProcessingError> {
    let matrix = to_matrix(batch)?;
    check_components(&matrix, n_components)?;

    let scaled = zscore(&matrix);
    let (axes, _) = principal_axes(&scaled, n_components);
    Ok(from_matrix(&(scaled * axes)))
}

/// Standardize `batch`, then estimate `n_components` statistically independent
/// sources in it
///
/// Deterministic: the unmixing matrix is seeded from a fixed value. A run that
/// does not converge within the iteration limit logs a warning and returns the
/// last estimate.
///
/// # Errors
/// `InvalidBatch` for unusable shapes, `DecompositionFailed` if the whitened
/// space is degenerate
pub fn ica(batch: &[FeatureVector], n_components: usize) -> Result<Vec<FeatureVector>, ProcessingError> {
    let matrix = to_matrix(batch)?;
    check_components(&matrix, n_components)?;

    let whitened = whiten(&zscore(&matrix), n_components)?;
    let rows = whitened.nrows() as f64;

    let mut rng = StdRng::seed_from_u64(ICA_SEED);
    let initial = DMatrix::from_fn(n_components, n_components, |_, _| rng.gen::<f64>() * 2.0 - 1.0);
    let mut unmixing = symmetric_decorrelation(&initial)?;

    let mut converged = false;
    for _ in 0..ICA_MAX_ITERATIONS {
        let projected = &whitened * unmixing.transpose();
        let g = projected.map(f64::tanh);
        let g_prime_mean: Vec<f64> = g
            .column_iter()
            .map(|column| column.iter().map(|v| 1.0 - v * v).sum::<f64>() / rows)
            .collect();

        let mut next = (g.transpose() * &whitened) / rows;
        for (j, mean) in g_prime_mean.iter().enumerate() {
            let scaled = unmixing.row(j) * *mean;
            let mut row = next.row_mut(j);
            row -= scaled;
        }
        let next = symmetric_decorrelation(&next)?;

        let limit = (&next * unmixing.transpose())
            .diagonal()
            .iter()
            .map(|d| (d.abs() - 1.0).abs())
            .fold(0.0, f64::max);
        unmixing = next;

        if limit < ICA_TOLERANCE {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "[Decomposition] FastICA did not converge in {} iterations",
            ICA_MAX_ITERATIONS
        );
    }

    Ok(from_matrix(&(whitened * unmixing.transpose())))
}

fn to_matrix(batch: &[FeatureVector]) -> Result<DMatrix<f64>, ProcessingError> {
    let Some(first) = batch.first() else {
        return Err(ProcessingError::InvalidBatch {
            reason: "batch is empty".to_string(),
        });
    };
    let columns = first.len();
    if columns == 0 {
        return Err(ProcessingError::InvalidBatch {
            reason: "feature vectors are empty".to_string(),
        });
    }
    if let Some(row) = batch.iter().position(|row| row.len() != columns) {
        return Err(ProcessingError::InvalidBatch {
            reason: format!(
                "row {} has {} values, expected {}",
                row,
                batch[row].len(),
                columns
            ),
        });
    }

    Ok(DMatrix::from_fn(batch.len(), columns, |r, c| f64::from(batch[r][c])))
}

fn from_matrix(matrix: &DMatrix<f64>) -> Vec<FeatureVector> {
    matrix
        .row_iter()
        .map(|row| row.iter().map(|&v| v as f32).collect())
        .collect()
}

fn check_components(matrix: &DMatrix<f64>, n_components: usize) -> Result<(), ProcessingError> {
    if matrix.nrows() < 2 {
        return Err(ProcessingError::InvalidBatch {
            reason: "need at least 2 rows".to_string(),
        });
    }
    let max = matrix.nrows().min(matrix.ncols());
    if n_components == 0 || n_components > max {
        return Err(ProcessingError::InvalidBatch {
            reason: format!("n_components must be in 1..={}, got {}", max, n_components),
        });
    }
    Ok(())
}

/// Centre every column and divide by its population std (1 for constant columns)
fn zscore(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let rows = matrix.nrows() as f64;
    let mut scaled = matrix.clone();
    for mut column in scaled.column_iter_mut() {
        let mean = column.mean();
        column.add_scalar_mut(-mean);
        let std = (column.norm_squared() / rows).sqrt();
        if std > VARIANCE_EPSILON {
            column /= std;
        }
    }
    scaled
}

/// Top eigenvectors (as columns) and eigenvalues of the sample covariance
fn principal_axes(centered: &DMatrix<f64>, n_components: usize) -> (DMatrix<f64>, Vec<f64>) {
    let dof = (centered.nrows() - 1) as f64;
    let covariance = (centered.transpose() * centered) / dof;
    let eigen = SymmetricEigen::new(covariance);

    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    order.truncate(n_components);

    let mut axes = DMatrix::zeros(centered.ncols(), n_components);
    let mut values = Vec::with_capacity(n_components);
    for (target, &source) in order.iter().enumerate() {
        let mut axis = eigen.eigenvectors.column(source).clone_owned();
        let dominant = axis.iter().fold(0.0_f64, |acc, &v| if v.abs() > acc.abs() { v } else { acc });
        if dominant < 0.0 {
            axis.neg_mut();
        }
        axes.set_column(target, &axis);
        values.push(eigen.eigenvalues[source]);
    }
    (axes, values)
}

fn whiten(centered: &DMatrix<f64>, n_components: usize) -> Result<DMatrix<f64>, ProcessingError> {
    let (mut axes, variances) = principal_axes(centered, n_components);
    for (j, variance) in variances.iter().enumerate() {
        if *variance <= VARIANCE_EPSILON {
            return Err(ProcessingError::DecompositionFailed {
                reason: format!("component {} has no variance", j),
            });
        }
        let mut column = axes.column_mut(j);
        column /= variance.sqrt();
    }
    Ok(centered * axes)
}

/// W <- (W W^T)^(-1/2) W
fn symmetric_decorrelation(w: &DMatrix<f64>) -> Result<DMatrix<f64>, ProcessingError> {
    let eigen = SymmetricEigen::new(w * w.transpose());
    if eigen.eigenvalues.iter().any(|&d| d <= VARIANCE_EPSILON) {
        return Err(ProcessingError::DecompositionFailed {
            reason: "unmixing matrix became singular".to_string(),
        });
    }
    let inv_sqrt = DMatrix::from_diagonal(&eigen.eigenvalues.map(|d| 1.0 / d.sqrt()));
    let vectors = &eigen.eigenvectors;
    Ok(vectors * inv_sqrt * vectors.transpose() * w)
}
