use image::RgbImage;
use nalgebra as na;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::annotate::Annotator;
use crate::bbox::Anchor;
use crate::classifier::TeamClassifier;
use crate::config::{Config, DetectionConfig};
use crate::detection::{Class, Detections, Team};
use crate::detector::{Detector, KeypointSource};
use crate::encoder::ImageEncoder;
use crate::error::{Error, Result};
use crate::goalkeeper::GoalkeeperResolver;
use crate::pitch::PitchConfig;
use crate::projector::PitchProjector;
use crate::source::FrameSource;
use crate::territory::TerritoryMap;
use crate::tracker::IdentityTracker;
use crate::Tracking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Required parts are still missing
    Uninitialized,
    Ready,
    Streaming,
    /// Terminal, the frame source has no more frames
    Exhausted,
}

/// Result of one pipeline step.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub index: u64,
    pub frame: RgbImage,
    /// Ball detections with padded boxes, never tracked
    pub ball: Detections,
    /// Players, goalkeepers and referees, in that order
    pub others: Detections,
    pub annotated: Option<RgbImage>,
}

/// Field positions of one frame, grouped for a tactical view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadarView {
    pub ball: Vec<na::Point2<f32>>,
    pub team_a: Vec<na::Point2<f32>>,
    pub team_b: Vec<na::Point2<f32>>,
    pub referees: Vec<na::Point2<f32>>,
}

const BALL: &str = "ball";
const TEAM_A: &str = "team_a";
const TEAM_B: &str = "team_b";
const REFEREES: &str = "referees";

impl ProcessedFrame {
    /// Projects the ground anchors of every entity onto the field.
    pub fn radar<K: KeypointSource>(&self, projector: &mut PitchProjector<K>) -> Result<RadarView> {
        let mut groups: HashMap<String, Vec<na::Point2<f32>>> = [BALL, TEAM_A, TEAM_B, REFEREES]
            .iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();

        groups.insert(BALL.to_string(), self.ball.anchors(Anchor::BottomCenter));

        for det in self.others.iter() {
            let key = match (det.class, det.team) {
                (Class::Referee, _) => REFEREES,
                (_, Some(Team::A)) => TEAM_A,
                (_, Some(Team::B)) => TEAM_B,
                _ => continue,
            };

            if let Some(points) = groups.get_mut(key) {
                points.push(det.anchor(Anchor::BottomCenter));
            }
        }

        let mut projected = projector.project(&self.frame, &groups)?;
        let mut take = |key: &str| projected.remove(key).unwrap_or_default();

        Ok(RadarView {
            ball: take(BALL),
            team_a: take(TEAM_A),
            team_b: take(TEAM_B),
            referees: take(REFEREES),
        })
    }
}

impl RadarView {
    #[inline]
    pub fn territory(&self, pitch: &PitchConfig, scale: f32) -> TerritoryMap {
        TerritoryMap::compute(pitch, &self.team_a, &self.team_b, scale)
    }
}

/// Per-frame tracking and team attribution over a frame stream.
pub struct Processor<S, D, E, T = IdentityTracker> {
    source: S,
    detector: D,
    tracker: T,
    classifier: TeamClassifier<E>,
    config: DetectionConfig,
    annotator: Option<Box<dyn Annotator>>,
    // goalkeeper track id -> team, frozen on first sighting
    goalkeeper_teams: HashMap<u32, Team>,
    state: ProcessorState,
    frame_index: u64,
}

impl<S, D, E> Processor<S, D, E>
where
    S: FrameSource,
    D: Detector,
    E: ImageEncoder,
{
    pub fn new(source: S, detector: D, classifier: TeamClassifier<E>, config: &Config) -> Self {
        Self::with_tracker(
            source,
            detector,
            IdentityTracker::new(config.tracker.clone()),
            classifier,
            config.detection.clone(),
        )
    }

    pub fn builder() -> ProcessorBuilder<S, D, E> {
        ProcessorBuilder::new()
    }
}

impl<S, D, E, T> Processor<S, D, E, T>
where
    S: FrameSource,
    D: Detector,
    E: ImageEncoder,
    T: Tracking,
{
    pub fn with_tracker(
        source: S,
        detector: D,
        tracker: T,
        classifier: TeamClassifier<E>,
        config: DetectionConfig,
    ) -> Self {
        info!(
            fitted = classifier.is_fitted(),
            confidence = config.confidence,
            "frame processor ready"
        );

        Self {
            source,
            detector,
            tracker,
            classifier,
            config,
            annotator: None,
            goalkeeper_teams: HashMap::new(),
            state: ProcessorState::Ready,
            frame_index: 0,
        }
    }

    pub fn with_annotator<A: Annotator + 'static>(mut self, annotator: A) -> Self {
        self.annotator = Some(Box::new(annotator));
        self
    }

    #[inline]
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    #[inline]
    pub fn classifier(&self) -> &TeamClassifier<E> {
        &self.classifier
    }

    #[inline]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Frozen team of a goalkeeper identity, if it was seen already.
    #[inline]
    pub fn goalkeeper_team(&self, track_id: u32) -> Option<Team> {
        self.goalkeeper_teams.get(&track_id).copied()
    }

    /// Fits the team model before the first frame is processed.
    pub fn fit_classifier(&mut self, crops: &[RgbImage]) -> Result<()> {
        if self.state != ProcessorState::Ready {
            return Err(Error::NotReady(self.state));
        }

        self.classifier.fit(crops)
    }

    /// Forgets identities and frozen goalkeeper teams. The fitted team model
    /// and the position in the frame source are kept.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.goalkeeper_teams.clear();

        if self.state != ProcessorState::Exhausted {
            self.state = ProcessorState::Ready;
        }
    }

    /// Pulls and processes the next frame.
    ///
    /// Fails with [`Error::StreamExhausted`] once the source is drained and
    /// on every call after that.
    pub fn process_next(&mut self) -> Result<ProcessedFrame> {
        if self.state == ProcessorState::Exhausted {
            return Err(Error::StreamExhausted);
        }

        let frame = match self.source.next_frame()? {
            Some(frame) => frame,
            None => {
                self.state = ProcessorState::Exhausted;
                info!(frames = self.frame_index, "frame source exhausted");

                return Err(Error::StreamExhausted);
            }
        };

        self.state = ProcessorState::Streaming;
        let index = self.frame_index;
        self.frame_index += 1;

        let mut dets = self
            .detector
            .infer(&frame, self.config.confidence)?
            .filter_by_confidence(self.config.confidence);
        dets.index = index;

        let (ball, others) = dets.split_ball();
        let ball = ball.pad_boxes(self.config.ball_padding);

        let others = others.with_nms(self.config.nms_iou, true);
        let others = self.tracker.update(others);

        let mut players = others.of_class(Class::Player);
        let goalkeepers = others.of_class(Class::Goalkeeper);
        let mut referees = others.of_class(Class::Referee);

        let teams = self.classifier.predict(&players.crops(&frame))?;
        for (det, team) in players.iter_mut().zip(teams) {
            det.team = Some(team);
        }

        let goalkeepers = self.assign_goalkeepers(&players, goalkeepers);

        for det in referees.iter_mut() {
            det.team = None;
        }

        let others = Detections::merge(index, vec![players, goalkeepers, referees]);
        let annotated = self
            .annotator
            .as_ref()
            .map(|a| a.annotate(&frame, &ball, &others));

        debug!(
            frame = index,
            ball = ball.len(),
            others = others.len(),
            goalkeepers_known = self.goalkeeper_teams.len(),
            "frame processed"
        );

        Ok(ProcessedFrame {
            index,
            frame,
            ball,
            others,
            annotated,
        })
    }

    fn assign_goalkeepers(&mut self, players: &Detections, mut goalkeepers: Detections) -> Detections {
        let cache = &self.goalkeeper_teams;
        let pending: Vec<usize> = goalkeepers
            .iter()
            .enumerate()
            .filter(|(_, d)| d.track_id.map_or(true, |id| !cache.contains_key(&id)))
            .map(|(i, _)| i)
            .collect();

        if !pending.is_empty() {
            let unresolved = Detections::new(
                goalkeepers.index,
                pending.iter().map(|&i| goalkeepers.detections[i].clone()).collect(),
            );

            let teams = GoalkeeperResolver::resolve(players, &unresolved);
            for (&i, team) in pending.iter().zip(teams) {
                let det = &mut goalkeepers.detections[i];
                det.team = Some(team);

                if let Some(id) = det.track_id {
                    self.goalkeeper_teams.entry(id).or_insert(team);
                    debug!(track_id = id, ?team, "goalkeeper team frozen");
                }
            }
        }

        for det in goalkeepers.iter_mut() {
            if let Some(team) = det.track_id.and_then(|id| self.goalkeeper_teams.get(&id)) {
                det.team = Some(*team);
            }
        }

        goalkeepers
    }
}

impl<S, D, E, T> Iterator for Processor<S, D, E, T>
where
    S: FrameSource,
    D: Detector,
    E: ImageEncoder,
    T: Tracking,
{
    type Item = Result<ProcessedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.process_next() {
            Err(Error::StreamExhausted) => None,
            res => Some(res),
        }
    }
}

/// Step by step construction of a [`Processor`].
pub struct ProcessorBuilder<S, D, E> {
    source: Option<S>,
    detector: Option<D>,
    classifier: Option<TeamClassifier<E>>,
    annotator: Option<Box<dyn Annotator>>,
    config: Config,
}

impl<S, D, E> Default for ProcessorBuilder<S, D, E> {
    fn default() -> Self {
        Self {
            source: None,
            detector: None,
            classifier: None,
            annotator: None,
            config: Config::default(),
        }
    }
}

impl<S, D, E> ProcessorBuilder<S, D, E>
where
    S: FrameSource,
    D: Detector,
    E: ImageEncoder,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    pub fn detector(mut self, detector: D) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn classifier(mut self, classifier: TeamClassifier<E>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn annotator<A: Annotator + 'static>(mut self, annotator: A) -> Self {
        self.annotator = Some(Box::new(annotator));
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> ProcessorState {
        if self.source.is_some() && self.detector.is_some() && self.classifier.is_some() {
            ProcessorState::Ready
        } else {
            ProcessorState::Uninitialized
        }
    }

    pub fn build(self) -> Result<Processor<S, D, E>> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| Error::InvalidConfig("frame source is missing".into()))?;
        let detector = self
            .detector
            .ok_or_else(|| Error::InvalidConfig("detector is missing".into()))?;
        let classifier = self
            .classifier
            .ok_or_else(|| Error::InvalidConfig("team classifier is missing".into()))?;

        let mut processor = Processor::new(source, detector, classifier, &self.config);
        processor.annotator = self.annotator;

        Ok(processor)
    }
}

/// Player crops from every `classifier.fit_stride`-th frame, for fitting the
/// team model.
///
/// Drains the source.
pub fn collect_player_crops<S: FrameSource, D: Detector>(
    source: &mut S,
    detector: &mut D,
    config: &Config,
) -> Result<Vec<RgbImage>> {
    let stride = config.classifier.fit_stride.max(1);
    let detection = &config.detection;
    let mut crops = Vec::new();
    let mut index = 0usize;

    while let Some(frame) = source.next_frame()? {
        if index % stride == 0 {
            let players = detector
                .infer(&frame, detection.confidence)?
                .filter_by_confidence(detection.confidence)
                .with_nms(detection.nms_iou, true)
                .of_class(Class::Player);

            crops.extend(players.crops(&frame));
        }

        index += 1;
    }

    info!(frames = index, stride, crops = crops.len(), "player crops collected");

    Ok(crops)
}
