//! Benchmarks combinations of keypoint detectors, descriptors and matchers.
//!
//! Every configuration runs over an image sequence through a window of the two
//! most recent frames. Each image is detected and described, and every image
//! after the first is matched against its predecessor. The timings and counts
//! of every image end up as one row of a CSV report.
//!
//! The vision algorithms themselves come from a [`FeatureBackend`]. The
//! default [`RustCvBackend`] is built on the pure Rust crates of the rust-cv
//! ecosystem and covers a subset of the algorithms. With the `opencv` feature
//! the `OpenCvBackend` covers all of them.
//!
//! ```no_run
//! use feature_bench::{driver, Pipeline, RustCvBackend, Settings, TestConfiguration};
//! use feature_bench::algorithm::{DescriptorType, Detector};
//! use std::path::Path;
//!
//! let settings = Settings::default();
//! let configurations = driver::enumerate_configurations(
//!     &[Detector::Fast, Detector::Akaze],
//!     &DescriptorType::CROSSED,
//!     &TestConfiguration::default(),
//! );
//! let mut pipeline = Pipeline::new(RustCvBackend::default(), settings.sequence);
//! let summary = driver::run_benchmark(&mut pipeline, &configurations, Path::new(".")).unwrap();
//! println!("{} rows in {}", summary.rows, summary.report.display());
//! ```

pub mod algorithm;
pub mod backend;
pub mod config;
pub mod driver;
mod error;
pub mod filter;
pub mod frame;
mod keypoint;
pub mod matching;
pub mod pipeline;
pub mod report;
pub mod summary;

pub use backend::{FeatureBackend, RustCvBackend};
#[cfg(feature = "opencv")]
pub use backend::OpenCvBackend;
pub use config::{ImageSequence, Settings, TestConfiguration};
pub use error::{Error, Result};
pub use frame::{Frame, FrameWindow};
pub use keypoint::*;
pub use pipeline::{Pipeline, RunOutcome};
pub use report::{RecordSink, ReportWriter, ResultRecord};
