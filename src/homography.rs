//! Planar homography between image pixels and field coordinates.
//!
//! Normalized DLT for an exact or least-squares fit and a seeded RANSAC
//! wrapper for keypoint sets with gross outliers.

use nalgebra as na;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use thiserror::Error;

pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HomographyError {
    #[error("at least {needed} correspondences required, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("source and target sets differ in length ({src} vs {dst})")]
    LengthMismatch { src: usize, dst: usize },

    #[error("numerical failure: {0}")]
    NumericalFailure(&'static str),

    #[error("only {found} inliers, {needed} required")]
    InsufficientInliers { needed: usize, found: usize },
}

/// Applies `h` with perspective divide. `None` for points mapped to infinity.
#[inline]
pub fn project(h: &na::Matrix3<f64>, p: &na::Point2<f64>) -> Option<na::Point2<f64>> {
    let q = h * p.to_homogeneous();

    if q.z.abs() < 1e-12 {
        None
    } else {
        Some(na::Point2::new(q.x / q.z, q.y / q.z))
    }
}

#[inline]
pub fn reprojection_error(h: &na::Matrix3<f64>, src: &na::Point2<f64>, dst: &na::Point2<f64>) -> f64 {
    project(h, src).map_or(f64::INFINITY, |p| na::distance(&p, dst))
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2).
fn conditioner(pts: &[na::Point2<f64>]) -> na::Matrix3<f64> {
    let n = pts.len() as f64;
    let c = pts.iter().fold(na::Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let spread = pts.iter().map(|p| (p.coords - c).norm()).sum::<f64>() / n;

    let s = if spread > 1e-12 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };

    na::Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0)
}

/// Direct linear transform over all pairs, returns `h` with `dst ~ h * src`.
pub fn estimate_dlt(
    src: &[na::Point2<f64>],
    dst: &[na::Point2<f64>],
) -> Result<na::Matrix3<f64>, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }

    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }

    let t_src = conditioner(src);
    let t_dst = conditioner(dst);

    let mut a = na::DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let s = t_src.transform_point(s);
        let d = t_dst.transform_point(d);

        let r = 2 * i;
        a[(r, 0)] = s.x;
        a[(r, 1)] = s.y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -d.x * s.x;
        a[(r, 7)] = -d.x * s.y;
        a[(r, 8)] = -d.x;

        a[(r + 1, 3)] = s.x;
        a[(r + 1, 4)] = s.y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -d.y * s.x;
        a[(r + 1, 7)] = -d.y * s.y;
        a[(r + 1, 8)] = -d.y;
    }

    // null vector of A is the eigenvector of AᵀA with the smallest eigenvalue
    let eigen = na::SymmetricEigen::new(a.transpose() * &a);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .ok_or(HomographyError::NumericalFailure("empty eigen decomposition"))?;

    let v = eigen.eigenvectors.column(min_idx);
    let h_cond = na::Matrix3::from_fn(|r, c| v[3 * r + c]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(HomographyError::NumericalFailure("degenerate target points"))?;
    let h = t_dst_inv * h_cond * t_src;

    let scale = h[(2, 2)];
    if !h.iter().all(|v| v.is_finite()) {
        return Err(HomographyError::NumericalFailure("non-finite homography"));
    }

    if scale.abs() < 1e-12 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RansacConfig {
    pub iterations: usize,
    /// Max reprojection distance of an inlier, in target units
    pub threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            iterations: 500,
            threshold: 50.0,
            min_inliers: 6,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub h: na::Matrix3<f64>,
    pub inliers: Vec<bool>,
}

impl RansacFit {
    #[inline]
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&x| x).count()
    }
}

fn inlier_mask(
    h: &na::Matrix3<f64>,
    src: &[na::Point2<f64>],
    dst: &[na::Point2<f64>],
    threshold: f64,
) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(h, s, d) < threshold)
        .collect()
}

/// Best minimal-sample model refitted on its inliers.
pub fn estimate_ransac(
    src: &[na::Point2<f64>],
    dst: &[na::Point2<f64>],
    config: &RansacConfig,
) -> Result<RansacFit, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }

    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(usize, Vec<bool>)> = None;

    for _ in 0..config.iterations {
        let sample = index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let s: Vec<_> = sample.iter().map(|i| src[i]).collect();
        let d: Vec<_> = sample.iter().map(|i| dst[i]).collect();

        let h = match estimate_dlt(&s, &d) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let mask = inlier_mask(&h, src, dst, config.threshold);
        let count = mask.iter().filter(|&&x| x).count();

        if best.as_ref().map_or(true, |(c, _)| count > *c) {
            best = Some((count, mask));

            if count == n {
                break;
            }
        }
    }

    let (count, mask) = best.unwrap_or((0, vec![false; n]));
    let needed = config.min_inliers.max(MIN_CORRESPONDENCES);
    if count < needed {
        return Err(HomographyError::InsufficientInliers {
            needed,
            found: count,
        });
    }

    let (s, d): (Vec<_>, Vec<_>) = src
        .iter()
        .zip(dst)
        .zip(&mask)
        .filter(|(_, keep)| **keep)
        .map(|((s, d), _)| (*s, *d))
        .unzip();

    let h = estimate_dlt(&s, &d)?;
    let inliers = inlier_mask(&h, src, dst, config.threshold);

    Ok(RansacFit { h, inliers })
}
