use nalgebra as na;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Principal component projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Pca {
    mean: Array1<f32>,
    /// One axis per row, `components x dim`
    components: Array2<f32>,
}

impl Pca {
    /// Fits `n_components` principal axes ordered by explained variance.
    ///
    /// Axes beyond the data dimension (or the data rank) are zero, so their
    /// coordinates are always zero.
    pub fn fit(data: ArrayView2<'_, f32>, n_components: usize) -> Result<Self> {
        let (rows, dim) = data.dim();
        if rows == 0 {
            return Err(Error::EmptyFit);
        }

        let mean = data.mean_axis(Axis(0)).ok_or(Error::EmptyFit)?;
        let centered = &data - &mean;

        let cov = na::DMatrix::<f64>::from_fn(dim, dim, |i, j| {
            centered
                .column(i)
                .iter()
                .zip(centered.column(j).iter())
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum::<f64>()
                / rows as f64
        });

        let mut components = Array2::zeros((n_components, dim));

        if dim > 0 {
            let eigen = na::SymmetricEigen::new(cov);

            let mut order: Vec<usize> = (0..dim).collect();
            order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

            for (row, &axis) in order.iter().take(n_components).enumerate() {
                if eigen.eigenvalues[axis] <= f64::EPSILON {
                    continue;
                }

                for j in 0..dim {
                    components[[row, j]] = eigen.eigenvectors[(j, axis)] as f32;
                }
            }
        }

        Ok(Self { mean, components })
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if data.ncols() != self.input_dim() {
            return Err(Error::DimensionMismatch {
                expected: self.input_dim(),
                got: data.ncols(),
            });
        }

        let centered = &data - &self.mean;

        Ok(centered.dot(&self.components.t()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn first_axis_follows_the_spread() {
        let data = array![
            [0.0f32, 1.0, 5.0],
            [2.0, 1.0, 5.0],
            [4.0, 1.0, 5.0],
            [6.0, 1.0, 5.0],
        ];
        let pca = Pca::fit(data.view(), 2).unwrap();
        let out = pca.transform(data.view()).unwrap();

        assert_eq!(out.dim(), (4, 2));
        assert_relative_eq!((out[[3, 0]] - out[[0, 0]]).abs(), 6.0, epsilon = 1e-4);
        for row in out.rows() {
            assert_relative_eq!(row[1], 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn single_sample_maps_to_origin() {
        let data = array![[0.3f32, 0.2, 0.9, 0.1]];
        let pca = Pca::fit(data.view(), 3).unwrap();
        let out = pca.transform(data.view()).unwrap();

        assert_eq!(out.dim(), (1, 3));
        assert!(out.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn more_components_than_dims() {
        let data = array![[1.0f32, 0.0], [0.0, 1.0], [2.0, 2.0]];
        let pca = Pca::fit(data.view(), 3).unwrap();
        assert_eq!(pca.n_components(), 3);
        assert_eq!(pca.transform(data.view()).unwrap().ncols(), 3);
    }

    #[test]
    fn rejects_empty_and_mismatched_input() {
        let empty = Array2::<f32>::zeros((0, 4));
        assert!(matches!(Pca::fit(empty.view(), 3), Err(Error::EmptyFit)));

        let pca = Pca::fit(array![[1.0f32, 2.0]].view(), 3).unwrap();
        let wrong = array![[1.0f32, 2.0, 3.0]];
        assert!(matches!(
            pca.transform(wrong.view()),
            Err(Error::DimensionMismatch { expected: 2, got: 3 })
        ));
    }
}
