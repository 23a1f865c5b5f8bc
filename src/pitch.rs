use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Field line segments as 1-based vertex index pairs.
const EDGES: [(usize, usize); 30] = [
    (1, 2), (2, 3), (3, 4), (4, 5), (5, 6),
    (7, 8),
    (10, 11), (11, 12), (12, 13),
    (14, 15), (15, 16), (16, 17),
    (18, 19), (19, 20), (20, 21),
    (23, 24),
    (25, 26), (26, 27), (27, 28), (28, 29), (29, 30),
    (1, 14), (14, 25),
    (2, 10), (3, 7), (4, 8), (5, 13), (6, 17),
    (21, 29), (17, 30),
];

/// Reference field in centimeters, `x` along the length and `y` across.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PitchConfig {
    pub width: i32,
    pub length: i32,
    pub penalty_box_width: i32,
    pub penalty_box_length: i32,
    pub goal_box_width: i32,
    pub goal_box_length: i32,
    pub centre_circle_radius: i32,
    pub penalty_spot_distance: i32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            width: 7000,
            length: 12000,
            penalty_box_width: 4100,
            penalty_box_length: 2015,
            goal_box_width: 1832,
            goal_box_length: 550,
            centre_circle_radius: 915,
            penalty_spot_distance: 1100,
        }
    }
}

impl PitchConfig {
    /// The 32 landmark points, in keypoint model order.
    pub fn vertices(&self) -> Vec<na::Point2<f32>> {
        let (w, l) = (self.width, self.length);
        let (pbw, pbl) = (self.penalty_box_width, self.penalty_box_length);
        let (gbw, gbl) = (self.goal_box_width, self.goal_box_length);
        let (ccr, psd) = (self.centre_circle_radius, self.penalty_spot_distance);

        let pb_lo = (w - pbw) / 2;
        let pb_hi = (w + pbw) / 2;
        let gb_lo = (w - gbw) / 2;
        let gb_hi = (w + gbw) / 2;

        [
            (0, 0),
            (0, pb_lo),
            (0, gb_lo),
            (0, gb_hi),
            (0, pb_hi),
            (0, w),
            (gbl, gb_lo),
            (gbl, gb_hi),
            (psd, w / 2),
            (pbl, pb_lo),
            (pbl, gb_lo),
            (pbl, gb_hi),
            (pbl, pb_hi),
            (l / 2, 0),
            (l / 2, w / 2 - ccr),
            (l / 2, w / 2 + ccr),
            (l / 2, w),
            (l - pbl, pb_lo),
            (l - pbl, gb_lo),
            (l - pbl, gb_hi),
            (l - pbl, pb_hi),
            (l - psd, w / 2),
            (l - gbl, gb_lo),
            (l - gbl, gb_hi),
            (l, 0),
            (l, pb_lo),
            (l, gb_lo),
            (l, gb_hi),
            (l, pb_hi),
            (l, w),
            (l / 2 - ccr, w / 2),
            (l / 2 + ccr, w / 2),
        ]
        .iter()
        .map(|&(x, y)| na::Point2::new(x as f32, y as f32))
        .collect()
    }

    #[inline]
    pub fn edges(&self) -> &'static [(usize, usize)] {
        &EDGES
    }

    /// Line segments as point pairs, ready for drawing.
    pub fn segments(&self) -> Vec<(na::Point2<f32>, na::Point2<f32>)> {
        let vertices = self.vertices();

        EDGES
            .iter()
            .map(|&(a, b)| (vertices[a - 1], vertices[b - 1]))
            .collect()
    }

    #[inline]
    pub fn contains(&self, p: &na::Point2<f32>) -> bool {
        (0.0..=self.length as f32).contains(&p.x) && (0.0..=self.width as f32).contains(&p.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sizes() {
        let pitch = PitchConfig::default();
        assert_eq!(pitch.vertices().len(), 32);
        assert_eq!(pitch.edges().len(), 30);
        assert_eq!(pitch.segments().len(), 30);
    }

    #[test]
    fn edges_reference_existing_vertices() {
        let pitch = PitchConfig::default();
        let n = pitch.vertices().len();

        for &(a, b) in pitch.edges() {
            assert!(a >= 1 && a <= n && b >= 1 && b <= n && a != b);
        }
    }

    #[test]
    fn known_landmarks() {
        let v = PitchConfig::default().vertices();

        assert_eq!(v[1], na::Point2::new(0.0, 1450.0));
        assert_eq!(v[2], na::Point2::new(0.0, 2584.0));
        assert_eq!(v[8], na::Point2::new(1100.0, 3500.0));
        assert_eq!(v[14], na::Point2::new(6000.0, 2585.0));
        assert_eq!(v[31], na::Point2::new(6915.0, 3500.0));
    }

    #[test]
    fn halves_mirror_each_other() {
        let pitch = PitchConfig::default();
        let v = pitch.vertices();
        let l = pitch.length as f32;

        // left half landmark -> its right half twin
        for (left, right) in [(0, 24), (1, 25), (5, 29), (6, 22), (7, 23), (8, 21), (9, 17), (12, 20)] {
            assert_eq!(v[left].x, l - v[right].x, "{} vs {}", left + 1, right + 1);
            assert_eq!(v[left].y, v[right].y);
        }
    }

    #[test]
    fn every_vertex_is_on_the_field() {
        let pitch = PitchConfig::default();
        assert!(pitch.vertices().iter().all(|p| pitch.contains(p)));
    }
}
