use image::{imageops, RgbImage};
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{Anchor, BBox, Ltrb};

/// Detector classes, ids follow the detection model's label order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Class {
    Ball,
    Goalkeeper,
    Player,
    Referee,
}

impl Class {
    pub const ALL: [Class; 4] = [Class::Ball, Class::Goalkeeper, Class::Player, Class::Referee];

    #[inline]
    pub fn from_id(id: i32) -> Option<Class> {
        match id {
            0 => Some(Class::Ball),
            1 => Some(Class::Goalkeeper),
            2 => Some(Class::Player),
            3 => Some(Class::Referee),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> i32 {
        match self {
            Class::Ball => 0,
            Class::Goalkeeper => 1,
            Class::Player => 2,
            Class::Referee => 3,
        }
    }
}

/// Cluster label produced by the team classifier. Which physical team is `A`
/// is arbitrary, the mapping is only stable within one run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Team {
    A,
    B,
}

impl Team {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Team::A => 0,
            Team::B => 1,
        }
    }

    #[inline]
    pub fn from_index(idx: usize) -> Team {
        if idx == 0 {
            Team::A
        } else {
            Team::B
        }
    }

    #[inline]
    pub fn other(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }
}

/// What an entity means for downstream consumers.
///
/// This is the single place where detector classes and team labels are mapped
/// to render categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Ball,
    TeamMember(Team),
    Referee,
    /// Player or goalkeeper whose team is not resolved yet
    Unassigned,
}

impl Role {
    pub fn of(class: Class, team: Option<Team>) -> Role {
        match (class, team) {
            (Class::Ball, _) => Role::Ball,
            (Class::Referee, _) => Role::Referee,
            (Class::Player | Class::Goalkeeper, Some(team)) => Role::TeamMember(team),
            (Class::Player | Class::Goalkeeper, None) => Role::Unassigned,
        }
    }

    /// Palette slot: both teams first, then referees.
    pub fn palette_index(self) -> Option<usize> {
        match self {
            Role::TeamMember(team) => Some(team.index()),
            Role::Referee => Some(2),
            Role::Ball | Role::Unassigned => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "c")]
    pub class: Class,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, class: Class, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
            track_id: None,
            team: None,
        }
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    #[inline]
    pub fn anchor(&self, anchor: Anchor) -> na::Point2<f32> {
        self.bbox.anchor(anchor)
    }

    #[inline]
    pub fn role(&self) -> Role {
        Role::of(self.class, self.team)
    }
}

/// All detections of a single frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Detections {
    pub index: u64,
    pub detections: Vec<Detection>,
}

impl Detections {
    #[inline]
    pub fn new(index: u64, detections: Vec<Detection>) -> Self {
        Self { index, detections }
    }

    #[inline]
    pub fn empty(index: u64) -> Self {
        Self::new(index, Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Detection> {
        self.detections.iter_mut()
    }

    pub fn filter<P: FnMut(&Detection) -> bool>(&self, mut pred: P) -> Detections {
        Detections::new(
            self.index,
            self.detections.iter().filter(|d| pred(d)).cloned().collect(),
        )
    }

    /// Keeps detections with `confidence >= threshold`.
    pub fn filter_by_confidence(&self, threshold: f32) -> Detections {
        self.filter(|d| d.confidence >= threshold)
    }

    pub fn of_class(&self, class: Class) -> Detections {
        self.filter(|d| d.class == class)
    }

    /// Splits the set into `(ball, everything else)`, keeping the order.
    pub fn split_ball(self) -> (Detections, Detections) {
        let (ball, others) = self
            .detections
            .into_iter()
            .partition(|d| d.class == Class::Ball);

        (
            Detections::new(self.index, ball),
            Detections::new(self.index, others),
        )
    }

    pub fn pad_boxes(mut self, px: f32) -> Detections {
        for det in &mut self.detections {
            det.bbox = det.bbox.pad(px);
        }

        self
    }

    pub fn anchors(&self, anchor: Anchor) -> Vec<na::Point2<f32>> {
        self.detections.iter().map(|d| d.anchor(anchor)).collect()
    }

    /// Greedy non-maximum suppression. Survivors keep their original order.
    pub fn with_nms(self, iou_threshold: f32, class_agnostic: bool) -> Detections {
        if self.detections.len() < 2 {
            return self;
        }

        let dets = &self.detections;
        let mut order: Vec<usize> = (0..dets.len()).collect();
        order.sort_by(|&a, &b| dets[b].confidence.total_cmp(&dets[a].confidence));

        let mut retain = vec![true; dets.len()];
        for (pos, &idx) in order.iter().enumerate() {
            if !retain[idx] {
                continue;
            }

            for &other in &order[pos + 1..] {
                if retain[other]
                    && (class_agnostic || dets[idx].class == dets[other].class)
                    && dets[idx].iou(&dets[other]) > iou_threshold
                {
                    retain[other] = false;
                }
            }
        }

        let index = self.index;
        let detections = self
            .detections
            .into_iter()
            .zip(retain)
            .filter_map(|(det, keep)| if keep { Some(det) } else { None })
            .collect();

        Detections::new(index, detections)
    }

    pub fn merge<I: IntoIterator<Item = Detections>>(index: u64, sets: I) -> Detections {
        let detections = sets.into_iter().flat_map(|s| s.detections).collect();

        Detections::new(index, detections)
    }

    pub fn crops(&self, frame: &RgbImage) -> Vec<RgbImage> {
        self.detections
            .iter()
            .map(|d| crop_image(frame, &d.bbox))
            .collect()
    }
}

impl IntoIterator for Detections {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.into_iter()
    }
}

/// Copies the part of `frame` covered by `bbox`; boxes outside the frame give
/// an empty image.
pub fn crop_image(frame: &RgbImage, bbox: &BBox<Ltrb>) -> RgbImage {
    let b = bbox.clamp(frame.width(), frame.height());
    let (x, y) = (b.left().floor() as u32, b.top().floor() as u32);
    let w = (b.right().ceil() as u32).saturating_sub(x);
    let h = (b.bottom().ceil() as u32).saturating_sub(y);

    imageops::crop_imm(frame, x, y, w, h).to_image()
}
