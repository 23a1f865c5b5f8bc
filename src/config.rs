use serde_derive::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub tracker: TrackerConfig,
    pub classifier: ClassifierConfig,
    pub projector: ProjectorConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum detector score kept by the pipeline
    pub confidence: f32,
    /// IoU for the class-agnostic suppression before tracking
    pub nms_iou: f32,
    /// Pixels added on every side of the ball box
    pub ball_padding: f32,
    /// IoU for per-class suppression inside the detector backends
    pub class_iou: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence: 0.3,
            nms_iou: 0.5,
            ball_padding: 10.0,
            class_iou: 0.7,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum affinity for a track/detection pair to be matched
    pub min_iou: f32,
    /// Frames a track survives without a match
    pub max_age: u32,
    /// Boxes kept per track for velocity estimation
    pub history: usize,
    /// Multiply IoU by detection confidence
    pub fuse_score: bool,
    /// Unmatched detections below this score do not open tracks
    pub new_track_confidence: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            max_age: 30,
            history: 16,
            fuse_score: false,
            new_track_confidence: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub batch_size: usize,
    /// Dimensions kept by the reduction step
    pub components: usize,
    pub max_iter: usize,
    pub seed: u64,
    /// Take player crops from every n-th frame when sampling for `fit`
    pub fit_stride: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            components: 3,
            max_iter: 100,
            seed: 0,
            fit_stride: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Keypoints at or below this score are ignored
    pub keypoint_confidence: f32,
    /// Below this many correspondences a plain DLT fit is used
    pub ransac_min_points: usize,
    pub ransac_iters: usize,
    /// Inlier distance in field units (cm)
    pub ransac_threshold: f64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            keypoint_confidence: 0.5,
            ransac_min_points: 6,
            ransac_iters: 500,
            ransac_threshold: 50.0,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn unit(name: &str, v: f32) -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{} must be in [0, 1], got {}", name, v)))
            }
        }

        unit("detection.confidence", self.detection.confidence)?;
        unit("detection.nms_iou", self.detection.nms_iou)?;
        unit("detection.class_iou", self.detection.class_iou)?;
        unit("tracker.min_iou", self.tracker.min_iou)?;
        unit("tracker.new_track_confidence", self.tracker.new_track_confidence)?;
        unit("projector.keypoint_confidence", self.projector.keypoint_confidence)?;

        if self.detection.ball_padding < 0.0 {
            return Err(Error::InvalidConfig("detection.ball_padding must be >= 0".into()));
        }

        if self.classifier.batch_size == 0 {
            return Err(Error::InvalidConfig("classifier.batch_size must be > 0".into()));
        }

        if self.classifier.components == 0 {
            return Err(Error::InvalidConfig("classifier.components must be > 0".into()));
        }

        if self.classifier.fit_stride == 0 {
            return Err(Error::InvalidConfig("classifier.fit_stride must be > 0".into()));
        }

        if self.projector.ransac_min_points < 4 {
            return Err(Error::InvalidConfig("projector.ransac_min_points must be >= 4".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.confidence, 0.3);
        assert_eq!(config.detection.ball_padding, 10.0);
        assert_eq!(config.classifier.components, 3);
        assert_eq!(config.projector.keypoint_confidence, 0.5);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str(
            "detection:\n  confidence: 0.45\ntracker:\n  max_age: 12\n",
        )
        .unwrap();

        assert_eq!(config.detection.confidence, 0.45);
        assert_eq!(config.detection.nms_iou, 0.5);
        assert_eq!(config.tracker.max_age, 12);
        assert_eq!(config.tracker.min_iou, 0.3);
        assert_eq!(config.classifier, ClassifierConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = Config::from_yaml_str("detection:\n  confidence: 1.5\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Config::from_yaml_str("classifier:\n  batch_size: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = Config::from_yaml_str("detection: [1, 2").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
