use crate::algorithm::{DescriptorType, Detector, DistanceMetric, Stage};
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while benchmarking a feature pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The algorithm name is not known, or the backend does not implement it.
    #[error("unsupported {stage} algorithm `{name}`")]
    UnsupportedAlgorithm { stage: Stage, name: String },
    /// The descriptor could not be computed for the keypoints it was given.
    #[error("descriptor {descriptor} cannot describe keypoints from detector {detector}: {reason}")]
    DescriptorIncompatibility {
        detector: Detector,
        descriptor: DescriptorType,
        reason: String,
    },
    #[error("failed to load image {path:?}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{metric} distance cannot compare {kind} descriptors")]
    MetricMismatch {
        metric: DistanceMetric,
        kind: &'static str,
    },
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("malformed report on line {line}: {reason}")]
    Report { line: usize, reason: String },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn unsupported(stage: Stage, name: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm {
            stage,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
