use image::RgbImage;
use nalgebra as na;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ProjectorConfig;
use crate::detector::{KeyPoints, KeypointSource};
use crate::error::Result;
use crate::homography::{self, RansacConfig, MIN_CORRESPONDENCES};
use crate::pitch::PitchConfig;

/// Maps image points onto the reference field through a per-frame homography
/// estimated from detected field landmarks.
pub struct PitchProjector<K> {
    source: K,
    pitch: Arc<PitchConfig>,
    config: ProjectorConfig,
}

impl<K: KeypointSource> PitchProjector<K> {
    pub fn new(source: K, pitch: Arc<PitchConfig>, config: ProjectorConfig) -> Self {
        Self {
            source,
            pitch,
            config,
        }
    }

    #[inline]
    pub fn pitch(&self) -> &PitchConfig {
        &self.pitch
    }

    /// Image to field homography, `None` with fewer than four confident
    /// landmarks or when the fit degenerates.
    pub fn homography(&self, keypoints: &KeyPoints) -> Option<na::Matrix3<f64>> {
        let vertices = self.pitch.vertices();

        let (src, dst): (Vec<_>, Vec<_>) = keypoints
            .confident(self.config.keypoint_confidence)
            .filter_map(|(idx, kp)| vertices.get(idx).map(|v| (kp.xy, *v)))
            .map(|(s, d)| (s.cast::<f64>(), d.cast::<f64>()))
            .unzip();

        if src.len() < MIN_CORRESPONDENCES {
            debug!(landmarks = src.len(), "not enough landmarks for a homography");
            return None;
        }

        if src.len() >= self.config.ransac_min_points {
            let ransac = RansacConfig {
                iterations: self.config.ransac_iters,
                threshold: self.config.ransac_threshold,
                min_inliers: MIN_CORRESPONDENCES,
                seed: 0,
            };

            match homography::estimate_ransac(&src, &dst, &ransac) {
                Ok(fit) => return Some(fit.h),
                Err(err) => warn!(%err, "ransac failed, falling back to a plain fit"),
            }
        }

        match homography::estimate_dlt(&src, &dst) {
            Ok(h) => Some(h),
            Err(err) => {
                debug!(%err, "homography fit failed");
                None
            }
        }
    }

    /// Projects every category of image points onto the field, keeping the
    /// input order within each category.
    ///
    /// Without a usable homography every category maps to an empty list.
    /// A homography that sends any query point to infinity counts as
    /// unusable for the whole frame.
    pub fn project(
        &mut self,
        frame: &RgbImage,
        points: &HashMap<String, Vec<na::Point2<f32>>>,
    ) -> Result<HashMap<String, Vec<na::Point2<f32>>>> {
        let h = if points.values().any(|v| !v.is_empty()) {
            let keypoints = self.source.keypoints(frame)?;
            self.homography(&keypoints)
        } else {
            None
        };

        Ok(project_categories(h.as_ref(), points))
    }
}

fn project_categories(
    h: Option<&na::Matrix3<f64>>,
    points: &HashMap<String, Vec<na::Point2<f32>>>,
) -> HashMap<String, Vec<na::Point2<f32>>> {
    let empty = || points.keys().map(|name| (name.clone(), Vec::new())).collect();

    let h = match h {
        Some(h) => h,
        None => return empty(),
    };

    let mut projected = HashMap::with_capacity(points.len());
    for (name, pts) in points {
        match transform_points(h, pts) {
            Some(field) => {
                projected.insert(name.clone(), field);
            }
            None => {
                debug!(category = %name, "homography sends a point to infinity");
                return empty();
            }
        }
    }

    projected
}

/// Perspective transform of `pts`, same length and order as the input.
///
/// `None` when any point lands on the line at infinity.
pub fn transform_points(
    h: &na::Matrix3<f64>,
    pts: &[na::Point2<f32>],
) -> Option<Vec<na::Point2<f32>>> {
    pts.iter()
        .map(|p| homography::project(h, &p.cast::<f64>()).map(|q| q.cast::<f32>()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::KeyPoint;
    use crate::error::Error;

    struct FixedKeypoints {
        kps: KeyPoints,
        calls: usize,
    }

    impl KeypointSource for FixedKeypoints {
        fn keypoints(&mut self, _frame: &RgbImage) -> Result<KeyPoints> {
            self.calls += 1;
            Ok(self.kps.clone())
        }
    }

    struct Broken;

    impl KeypointSource for Broken {
        fn keypoints(&mut self, _frame: &RgbImage) -> Result<KeyPoints> {
            Err(Error::Inference("session lost".into()))
        }
    }

    // field -> image
    #[rustfmt::skip]
    fn camera() -> na::Matrix3<f64> {
        na::Matrix3::new(
            0.08, 0.01, 120.0,
            0.0, 0.09, 80.0,
            0.0, 0.00001, 1.0,
        )
    }

    /// Landmarks as the camera would see them; `visible` selects confident ones.
    fn landmarks(visible: &[usize]) -> KeyPoints {
        let cam = camera();
        let points = PitchConfig::default()
            .vertices()
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let p = homography::project(&cam, &v.cast::<f64>()).unwrap();
                KeyPoint {
                    xy: p.cast::<f32>(),
                    confidence: if visible.contains(&idx) { 0.9 } else { 0.2 },
                }
            })
            .collect();

        KeyPoints::new(points)
    }

    fn projector(kps: KeyPoints) -> PitchProjector<FixedKeypoints> {
        PitchProjector::new(
            FixedKeypoints { kps, calls: 0 },
            Arc::new(PitchConfig::default()),
            ProjectorConfig::default(),
        )
    }

    fn query(pts: Vec<na::Point2<f32>>) -> HashMap<String, Vec<na::Point2<f32>>> {
        let mut map = HashMap::new();
        map.insert("players".to_string(), pts);
        map.insert("ball".to_string(), Vec::new());
        map
    }

    #[test]
    fn three_landmarks_give_empty_projections() {
        let mut proj = projector(landmarks(&[0, 5, 13]));
        let out = proj
            .project(&RgbImage::new(4, 4), &query(vec![na::Point2::new(10.0, 10.0)]))
            .unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.values().all(|v| v.is_empty()));
    }

    #[test]
    fn four_landmarks_round_trip() {
        let visible = [0, 5, 24, 29];
        let kps = landmarks(&visible);
        let mut proj = projector(kps.clone());

        let image_pts: Vec<_> = visible.iter().map(|&i| kps.points[i].xy).collect();
        let out = proj.project(&RgbImage::new(4, 4), &query(image_pts)).unwrap();

        let vertices = PitchConfig::default().vertices();
        for (got, &idx) in out["players"].iter().zip(&visible) {
            assert!(na::distance(got, &vertices[idx]) < 1.0, "{:?} vs {:?}", got, vertices[idx]);
        }
        assert!(out["ball"].is_empty());
    }

    #[test]
    fn many_landmarks_use_ransac() {
        let visible: Vec<usize> = (0..32).step_by(3).collect();
        let mut kps = landmarks(&visible);
        kps.points[visible[2]].xy += na::Vector2::new(40.0, -30.0);

        let proj = projector(kps);
        let h = proj.homography(&proj.source.kps).unwrap();

        let centre = na::Point2::new(6000.0f32, 3500.0);
        let seen = homography::project(&camera(), &centre.cast::<f64>()).unwrap();
        let back = transform_points(&h, &[seen.cast::<f32>()]).unwrap();

        assert!(na::distance(&back[0], &centre) < 5.0);
    }

    #[rustfmt::skip]
    fn horizon_through(x: f64) -> na::Matrix3<f64> {
        // w = 1 - x / x0 vanishes on the vertical line through x0
        na::Matrix3::new(
            1.0,      0.0, 0.0,
            0.0,      1.0, 0.0,
            -1.0 / x, 0.0, 1.0,
        )
    }

    #[test]
    fn transform_keeps_length_and_order() {
        let h = horizon_through(1024.0);
        let pts = [na::Point2::new(1.0, 1.0), na::Point2::new(-1000.0, 5.0), na::Point2::new(3.0, 3.0)];

        let out = transform_points(&h, &pts).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[1].x < 0.0 && out[2].x > out[0].x);
    }

    #[test]
    fn point_at_infinity_rejects_the_transform() {
        let h = horizon_through(1024.0);
        let pts = [na::Point2::new(1.0, 1.0), na::Point2::new(1024.0, 5.0), na::Point2::new(3.0, 3.0)];

        assert!(transform_points(&h, &pts).is_none());
        assert_eq!(transform_points(&h, &[]), Some(Vec::new()));
    }

    #[test]
    fn degenerate_projection_empties_every_category() {
        let h = horizon_through(1024.0);

        let mut points = query(vec![na::Point2::new(10.0, 10.0), na::Point2::new(1024.0, 5.0)]);
        points.insert("ball".to_string(), vec![na::Point2::new(20.0, 20.0)]);

        let out = project_categories(Some(&h), &points);
        assert_eq!(out.len(), 2);
        assert!(out.values().all(|v| v.is_empty()));

        points.insert("players".to_string(), vec![na::Point2::new(10.0, 10.0)]);
        let out = project_categories(Some(&h), &points);
        assert_eq!(out["players"].len(), 1);
        assert_eq!(out["ball"].len(), 1);
    }

    #[test]
    fn empty_query_skips_the_keypoint_model() {
        let mut proj = projector(landmarks(&[0, 5, 24, 29]));
        let out = proj.project(&RgbImage::new(4, 4), &query(Vec::new())).unwrap();

        assert_eq!(proj.source.calls, 0);
        assert!(out.values().all(|v| v.is_empty()));
    }

    #[test]
    fn keypoint_errors_propagate() {
        let mut proj = PitchProjector::new(Broken, Arc::new(PitchConfig::default()), ProjectorConfig::default());
        let res = proj.project(&RgbImage::new(4, 4), &query(vec![na::Point2::new(1.0, 1.0)]));

        assert!(matches!(res, Err(Error::Inference(_))));
    }
}
