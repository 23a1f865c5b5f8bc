use munkres::{solve_assignment, WeightMatrix};
use ndarray::Array2;
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::detection::{Class, Detections};
use crate::track::Track;
use crate::Tracking;

const PADDING_COST: f32 = 1.0;

/// IoU based multi-object tracker.
///
/// Detections are matched one-to-one against the motion-predicted boxes of
/// the active tracks. Unmatched detections open new tracks, unmatched tracks
/// age and are dropped after `max_age` frames without a match. Identities
/// grow monotonically and are never reused until [`IdentityTracker::reset`].
pub struct IdentityTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
    frame: u64,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(64),
            next_id: 1,
            frame: 0,
        }
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn affinity(&self, track: &Track, dets: &Detections, candidates: &[usize]) -> Vec<f32> {
        let predicted = track.predicted();

        candidates
            .iter()
            .map(|&c| {
                let det = &dets.detections[c];
                let iou = predicted.iou(&det.bbox);

                if self.config.fuse_score {
                    iou * det.confidence
                } else {
                    iou
                }
            })
            .collect()
    }

    /// Returns `(track, candidate)` position pairs whose affinity passes `min_iou`.
    fn assignment(&self, affinity: &Array2<f32>) -> Vec<(usize, usize)> {
        let (rows, cols) = affinity.dim();
        if rows == 0 || cols == 0 {
            return Vec::new();
        }

        let n = rows.max(cols);
        let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
            if r < rows && c < cols {
                1.0 - affinity[[r, c]]
            } else {
                PADDING_COST
            }
        });

        let pairs: Vec<(usize, usize)> = match solve_assignment(&mut weights) {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| p.row < rows && p.column < cols)
                .map(|p| (p.row, p.column))
                .collect(),
            Err(err) => {
                warn!("assignment could not be solved ({:?}), falling back to greedy", err);
                greedy_assignment(affinity)
            }
        };

        pairs
            .into_iter()
            .filter(|&(r, c)| affinity[[r, c]] >= self.config.min_iou)
            .collect()
    }
}

/// Best-first matching used when the optimal solver fails.
fn greedy_assignment(affinity: &Array2<f32>) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(f32, usize, usize)> = affinity
        .indexed_iter()
        .map(|((r, c), &a)| (a, r, c))
        .collect();
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (rows, cols) = affinity.dim();
    let mut used_row = vec![false; rows];
    let mut used_col = vec![false; cols];
    let mut pairs = Vec::new();

    for (_, r, c) in candidates {
        if !used_row[r] && !used_col[c] {
            used_row[r] = true;
            used_col[c] = true;
            pairs.push((r, c));
        }
    }

    pairs
}

impl Default for IdentityTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracking for IdentityTracker {
    fn update(&mut self, mut dets: Detections) -> Detections {
        self.frame += 1;

        // the ball is never tracked
        let candidates: Vec<usize> = dets
            .iter()
            .enumerate()
            .filter(|(_, d)| d.class != Class::Ball)
            .map(|(i, _)| i)
            .collect();

        for det in dets.iter_mut() {
            det.track_id = None;
        }

        let mut affinity = Array2::zeros((self.tracks.len(), candidates.len()));
        for (r, track) in self.tracks.iter().enumerate() {
            for (c, a) in self.affinity(track, &dets, &candidates).into_iter().enumerate() {
                affinity[[r, c]] = a;
            }
        }

        let pairs = self.assignment(&affinity);

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; candidates.len()];

        for (r, c) in pairs {
            let det = &mut dets.detections[candidates[c]];
            let track = &mut self.tracks[r];

            track.update(self.frame, det);
            det.track_id = Some(track.id);

            track_matched[r] = true;
            det_matched[c] = true;
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.mark_missed();
            }
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|t| t.age <= max_age);

        for (c, matched) in det_matched.into_iter().enumerate() {
            let det = &mut dets.detections[candidates[c]];

            if matched || det.confidence < self.config.new_track_confidence {
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;

            self.tracks
                .push(Track::new(id, self.frame, det, self.config.history));
            det.track_id = Some(id);
        }

        debug!(
            frame = dets.index,
            detections = candidates.len(),
            tracks = self.tracks.len(),
            "tracker updated"
        );

        dets
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.frame = 0;
    }
}
