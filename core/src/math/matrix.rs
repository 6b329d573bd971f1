use ndarray::{Array2, ArrayView2, Axis};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Multiply two 2D arrays.
    pub fn multiply(lhs: ArrayView2<f64>, rhs: ArrayView2<f64>) -> Array2<f64> {
        lhs.dot(&rhs)
    }

    /// Covariance of the rows of `observations` (one variable per row, one
    /// observation per column). Rows are assumed to be zero-mean.
    pub fn covariance(observations: ArrayView2<f64>) -> Array2<f64> {
        let count = observations.len_of(Axis(1)).max(1) as f64;
        Self::multiply(observations, observations.t()) / count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn covariance_of_identical_rows_is_uniform() {
        let rows = array![[1.0, -1.0, 1.0, -1.0], [1.0, -1.0, 1.0, -1.0]];
        let cov = MatrixHelper::covariance(rows.view());
        assert_eq!(cov, array![[1.0, 1.0], [1.0, 1.0]]);
    }
}
