use nalgebra as na;
use ndarray::Array2;

use crate::detection::Team;
use crate::math::sq_dist;
use crate::pitch::PitchConfig;

const UNOWNED: u8 = u8::MAX;

/// Nearest-player partition of the field between the two teams.
///
/// Cells are `1 / scale` field units wide; rows run across the field (`y`)
/// and columns along it (`x`).
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryMap {
    cells: Array2<u8>,
    scale: f32,
}

fn nearest(points: &[na::Point2<f32>], p: &na::Point2<f32>) -> Option<f32> {
    points
        .iter()
        .map(|q| sq_dist(p, q))
        .min_by(|a, b| a.total_cmp(b))
}

impl TerritoryMap {
    /// `team_a` and `team_b` are field positions; team A wins ties.
    pub fn compute(
        pitch: &PitchConfig,
        team_a: &[na::Point2<f32>],
        team_b: &[na::Point2<f32>],
        scale: f32,
    ) -> Self {
        let cols = ((pitch.length as f32 * scale).round() as usize).max(1);
        let rows = ((pitch.width as f32 * scale).round() as usize).max(1);

        let cells = Array2::from_shape_fn((rows, cols), |(r, c)| {
            // sample at the cell center
            let p = na::Point2::new((c as f32 + 0.5) / scale, (r as f32 + 0.5) / scale);

            match (nearest(team_a, &p), nearest(team_b, &p)) {
                (Some(a), Some(b)) if b < a => Team::B.index() as u8,
                (Some(_), _) => Team::A.index() as u8,
                (None, Some(_)) => Team::B.index() as u8,
                (None, None) => UNOWNED,
            }
        });

        Self { cells, scale }
    }

    #[inline]
    pub fn dim(&self) -> (usize, usize) {
        self.cells.dim()
    }

    #[inline]
    pub fn cells(&self) -> &Array2<u8> {
        &self.cells
    }

    /// Owner of the cell covering field point `(x, y)`.
    pub fn owner(&self, x: f32, y: f32) -> Option<Team> {
        if x < 0.0 || y < 0.0 {
            return None;
        }

        let c = (x * self.scale) as usize;
        let r = (y * self.scale) as usize;

        match self.cells.get((r, c)) {
            Some(&v) if v != UNOWNED => Some(Team::from_index(v as usize)),
            _ => None,
        }
    }

    /// Fraction of the field owned by each team, `(A, B)`.
    pub fn control_share(&self) -> (f32, f32) {
        let total = self.cells.len().max(1) as f32;
        let a = self.cells.iter().filter(|&&v| v == 0).count() as f32;
        let b = self.cells.iter().filter(|&&v| v == 1).count() as f32;

        (a / total, b / total)
    }
}
