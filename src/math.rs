use nalgebra as na;

use crate::Float;

/// Mean of a point set, `None` when there is nothing to average.
pub fn centroid<F: Float>(points: &[na::Point2<F>]) -> Option<na::Point2<F>> {
    if points.is_empty() {
        return None;
    }

    let n = F::from_usize(points.len())?;
    let sum = points
        .iter()
        .fold(na::Vector2::zeros(), |acc, p| acc + p.coords);

    Some(na::Point2::from(sum / n))
}

#[inline]
pub fn sq_dist<F: Float>(a: &na::Point2<F>, b: &na::Point2<F>) -> F {
    (a - b).norm_squared()
}

/// Index of the smallest value, lowest index wins ties.
pub fn argmin<I: IntoIterator<Item = f32>>(values: I) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (idx, v) in values.into_iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((idx, v)),
        }
    }

    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn centroid_of_square() {
        let pts = [
            na::Point2::new(0.0f32, 0.0),
            na::Point2::new(2.0, 0.0),
            na::Point2::new(2.0, 2.0),
            na::Point2::new(0.0, 2.0),
        ];
        let c = centroid(&pts).unwrap();

        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 1.0);
    }

    #[test]
    fn centroid_of_nothing() {
        assert!(centroid::<f64>(&[]).is_none());
    }

    #[test]
    fn argmin_prefers_first() {
        assert_eq!(argmin(vec![3.0, 1.0, 1.0, 2.0]), Some(1));
        assert_eq!(argmin(Vec::new()), None);
        assert_eq!(argmin(vec![f32::INFINITY, f32::INFINITY]), Some(0));
    }
}
