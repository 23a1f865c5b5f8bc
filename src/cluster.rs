use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::math::argmin;

/// Lloyd's k-means with k-means++ seeding.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    centroids: Array2<f32>,
}

#[inline]
fn sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl KMeans {
    pub fn from_centroids(centroids: Array2<f32>) -> Self {
        Self { centroids }
    }

    /// Deterministic for a given `seed`. With fewer distinct points than
    /// `k` some centroids coincide, which is valid and stable.
    pub fn fit(data: ArrayView2<'_, f32>, k: usize, max_iter: usize, seed: u64) -> Result<Self> {
        let (rows, dim) = data.dim();
        if rows == 0 || k == 0 {
            return Err(Error::EmptyFit);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut centroids = Array2::zeros((k, dim));
        centroids.row_mut(0).assign(&data.row(rng.gen_range(0..rows)));

        let mut nearest = vec![f32::INFINITY; rows];
        for c in 1..k {
            let prev = centroids.row(c - 1);
            for (d, row) in nearest.iter_mut().zip(data.rows()) {
                *d = d.min(sq_dist(row, prev));
            }

            let pick = match WeightedIndex::new(&nearest) {
                Ok(dist) => dist.sample(&mut rng),
                // every point already coincides with a centroid
                Err(_) => rng.gen_range(0..rows),
            };
            centroids.row_mut(c).assign(&data.row(pick));
        }

        let mut model = Self { centroids };
        let mut labels = model.predict_batch(data);

        for _ in 0..max_iter {
            let mut sums = Array2::<f32>::zeros((k, dim));
            let mut counts = vec![0usize; k];

            for (row, &label) in data.rows().into_iter().zip(&labels) {
                let mut acc = sums.row_mut(label);
                acc += &row;
                counts[label] += 1;
            }

            for (c, count) in counts.into_iter().enumerate() {
                if count > 0 {
                    let mean = sums.row(c).mapv(|v| v / count as f32);
                    model.centroids.row_mut(c).assign(&mean);
                }
            }

            let next = model.predict_batch(data);
            if next == labels {
                break;
            }
            labels = next;
        }

        Ok(model)
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }

    #[inline]
    pub fn centroids(&self) -> &Array2<f32> {
        &self.centroids
    }

    /// Nearest centroid, lowest index on ties.
    pub fn predict(&self, point: ArrayView1<'_, f32>) -> usize {
        argmin(self.centroids.rows().into_iter().map(|c| sq_dist(point, c))).unwrap_or(0)
    }

    pub fn predict_batch(&self, data: ArrayView2<'_, f32>) -> Vec<usize> {
        data.axis_iter(Axis(0)).map(|row| self.predict(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> Array2<f32> {
        array![
            [0.0, 0.1, 0.0],
            [0.1, 0.0, 0.0],
            [0.0, 0.0, 0.1],
            [5.0, 5.1, 5.0],
            [5.1, 5.0, 5.0],
            [5.0, 5.0, 4.9],
        ]
    }

    #[test]
    fn separates_two_blobs() {
        let data = blobs();
        let km = KMeans::fit(data.view(), 2, 100, 0).unwrap();
        let labels = km.predict_batch(data.view());

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn seed_makes_it_deterministic() {
        let data = blobs();
        let a = KMeans::fit(data.view(), 2, 100, 42).unwrap();
        let b = KMeans::fit(data.view(), 2, 100, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_point_collapses_centroids() {
        let data = array![[1.0f32, 2.0, 3.0]];
        let km = KMeans::fit(data.view(), 2, 10, 0).unwrap();

        assert_eq!(km.centroids().row(0), km.centroids().row(1));
        assert_eq!(km.predict(array![9.0f32, 9.0, 9.0].view()), 0);
    }

    #[test]
    fn empty_input_is_rejected() {
        let data = Array2::<f32>::zeros((0, 3));
        assert!(matches!(KMeans::fit(data.view(), 2, 10, 0), Err(Error::EmptyFit)));
    }
}
