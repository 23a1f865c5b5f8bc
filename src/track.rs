use nalgebra as na;

use crate::bbox::{Anchor, BBox, Ltrb};
use crate::circular_queue::CircularQueue;
use crate::detection::{Class, Detection};

/// One physical entity followed by the identity tracker.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: BBox<Ltrb>,
    pub class: Class,
    pub confidence: f32,

    // frames since the last matched detection
    pub age: u32,
    pub hits: u32,

    // (frame number, box) pairs, newest first
    history: CircularQueue<(u64, BBox<Ltrb>)>,
    velocity: na::Vector2<f32>,
}

impl Track {
    pub fn new(id: u32, frame: u64, det: &Detection, history_len: usize) -> Self {
        let mut history = CircularQueue::with_capacity(history_len);
        history.push((frame, det.bbox));

        Self {
            id,
            bbox: det.bbox,
            class: det.class,
            confidence: det.confidence,
            age: 0,
            hits: 1,
            history,
            velocity: na::Vector2::zeros(),
        }
    }

    /// Center displacement per frame, averaged over the kept history.
    #[inline]
    pub fn velocity(&self) -> &na::Vector2<f32> {
        &self.velocity
    }

    /// Last box moved along the velocity for the frames elapsed since it was seen.
    pub fn predicted(&self) -> BBox<Ltrb> {
        self.bbox.translate(self.velocity * (self.age + 1) as f32)
    }

    pub fn update(&mut self, frame: u64, det: &Detection) {
        self.history.push((frame, det.bbox));
        self.bbox = det.bbox;
        self.class = det.class;
        self.confidence = det.confidence;
        self.age = 0;
        self.hits += 1;

        if let (Some((f1, newest)), Some((f0, oldest))) =
            (self.history.newest(), self.history.oldest())
        {
            let frames = f1.saturating_sub(*f0);

            if frames > 0 {
                let shift =
                    newest.anchor(Anchor::Center).coords - oldest.anchor(Anchor::Center).coords;
                self.velocity = shift / frames as f32;
            }
        }
    }

    /// Kept `(frame, box)` observations, newest first.
    pub fn history(&self) -> impl Iterator<Item = &(u64, BBox<Ltrb>)> {
        self.history.iter()
    }

    #[inline]
    pub fn mark_missed(&mut self) {
        self.age += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det_at(x: f32) -> Detection {
        Detection::new(BBox::ltrb(x, 10.0, x + 20.0, 50.0), Class::Player, 0.9)
    }

    #[test]
    fn stationary_track_predicts_its_own_box() {
        let mut t = Track::new(1, 0, &det_at(10.0), 8);
        t.update(1, &det_at(10.0));

        assert_eq!(t.predicted(), t.bbox);
        assert_eq!(t.hits, 2);
    }

    #[test]
    fn constant_motion_is_extrapolated() {
        let mut t = Track::new(1, 0, &det_at(0.0), 8);
        t.update(1, &det_at(5.0));
        t.update(2, &det_at(10.0));

        assert_relative_eq!(t.velocity().x, 5.0);
        assert_relative_eq!(t.predicted().left(), 15.0);

        t.mark_missed();
        assert_relative_eq!(t.predicted().left(), 20.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut t = Track::new(1, 0, &det_at(0.0), 2);
        t.update(1, &det_at(1.0));
        t.update(2, &det_at(2.0));

        let frames: Vec<u64> = t.history().map(|(f, _)| *f).collect();
        assert_eq!(frames, vec![2, 1]);
    }
}
