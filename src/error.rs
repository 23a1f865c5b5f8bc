use thiserror::Error;

use crate::homography::HomographyError;
use crate::processor::ProcessorState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("frame source is exhausted")]
    StreamExhausted,

    #[error("team classifier is not fitted, call `fit` first")]
    NotFitted,

    #[error("cannot fit a model on an empty sample")]
    EmptyFit,

    #[error("team classifier is already fitted")]
    AlreadyFitted,

    #[error("processor is {0:?}, expected Ready")]
    NotReady(ProcessorState),

    #[error("unknown detector kind: {0:?}")]
    UnknownDetectorKind(String),

    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Homography Error: {0}")]
    Homography(#[from] HomographyError),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config Error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
