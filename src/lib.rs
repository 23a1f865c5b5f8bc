pub mod annotate;
pub mod bbox;
pub mod classifier;
pub mod cluster;
pub mod config;
pub mod detection;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod goalkeeper;
pub mod homography;
pub mod math;
pub mod pitch;
pub mod processor;
pub mod projector;
pub mod reduction;
pub mod source;
pub mod territory;
pub mod tracker;

mod circular_queue;
mod track;

pub use annotate::{Annotator, EllipseAnnotator};
pub use classifier::TeamClassifier;
pub use config::Config;
pub use detection::{Class, Detection, Detections, Role, Team};
pub use error::{Error, Result};
pub use processor::{ProcessedFrame, Processor, ProcessorBuilder, ProcessorState, RadarView};
pub use track::Track;
pub use tracker::IdentityTracker;

use nalgebra as na;
use std::fmt;

pub trait Float: num_traits::FromPrimitive + na::RealField + Copy + fmt::Debug + 'static {}

impl<T> Float for T where T: num_traits::FromPrimitive + na::RealField + Copy + fmt::Debug + 'static {}

/// Frame to frame identity assignment.
pub trait Tracking {
    /// Returns `dets` with `track_id` set on every tracked entity.
    fn update(&mut self, dets: Detections) -> Detections;

    /// Drops all tracks and restarts id numbering.
    fn reset(&mut self);
}
