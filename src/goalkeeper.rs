use nalgebra as na;

use crate::bbox::Anchor;
use crate::detection::{Detections, Team};
use crate::math::centroid;

/// Attributes goalkeepers to the team whose players stand closest on average.
///
/// Stateless; freezing the answer per goalkeeper identity is left to the caller.
pub struct GoalkeeperResolver;

impl GoalkeeperResolver {
    /// Mean bottom-center anchor of the players labeled `team`.
    pub fn team_centroid(players: &Detections, team: Team) -> Option<na::Point2<f32>> {
        let anchors: Vec<_> = players
            .iter()
            .filter(|d| d.team == Some(team))
            .map(|d| d.anchor(Anchor::BottomCenter))
            .collect();

        centroid(&anchors)
    }

    /// One team per goalkeeper, in goalkeeper order.
    ///
    /// With both teams on screen the nearer centroid wins and `Team::B` is
    /// chosen only when strictly closer. When one team has no players every
    /// goalkeeper goes to that missing team; with no players at all the
    /// answer is `Team::A`.
    pub fn resolve(players: &Detections, goalkeepers: &Detections) -> Vec<Team> {
        let c0 = Self::team_centroid(players, Team::A);
        let c1 = Self::team_centroid(players, Team::B);

        goalkeepers
            .iter()
            .map(|gk| match (&c0, &c1) {
                (Some(_), None) => Team::B,
                (None, Some(_)) | (None, None) => Team::A,
                (Some(c0), Some(c1)) => {
                    let p = gk.anchor(Anchor::BottomCenter);

                    if na::distance(&p, c1) < na::distance(&p, c0) {
                        Team::B
                    } else {
                        Team::A
                    }
                }
            })
            .collect()
    }
}
