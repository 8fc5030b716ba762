use crate::algorithm::{DescriptorType, Detector, MatchStrategy, MatcherKind, SelectorKind};
use log::*;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// The environment variable naming the directory that holds `images/`.
pub const DATA_ROOT_VAR: &str = "FEATURE_BENCH_DATA_ROOT";

/// Resolves the data root when none was given on the command line.
///
/// The variable is read at run time first and then as it was when the crate
/// was built. Without either the current directory is used.
pub fn default_data_root() -> PathBuf {
    std::env::var_os(DATA_ROOT_VAR)
        .map(PathBuf::from)
        .or_else(|| option_env!("FEATURE_BENCH_DATA_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// One combination of algorithms to benchmark.
///
/// A configuration is identified by its position in the enumerated list, see
/// [`crate::driver::enumerate_configurations`].
#[derive(Debug, Clone, PartialEq)]
pub struct TestConfiguration {
    pub detector: Detector,
    pub descriptor: DescriptorType,
    pub matcher: MatcherKind,
    pub selector: SelectorKind,
    /// Only keep keypoints on the preceding vehicle.
    pub restrict_to_roi: bool,
    /// Keep at most [`crate::filter::MAX_KEYPOINTS`] keypoints per frame.
    pub limit_keypoints: bool,
    /// Render the matches of every frame pair to an image file.
    pub visualize: bool,
    pub data_root: PathBuf,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            detector: Detector::Brisk,
            descriptor: DescriptorType::Brisk,
            matcher: MatcherKind::BruteForce,
            selector: SelectorKind::KNearestNeighbor,
            restrict_to_roi: true,
            limit_keypoints: false,
            visualize: false,
            data_root: default_data_root(),
        }
    }
}

impl TestConfiguration {
    pub fn strategy(&self) -> MatchStrategy {
        MatchStrategy::for_descriptor(self.descriptor, self.matcher, self.selector)
    }
}

/// The file name template of the image sequence.
///
/// Image `i` lives at `<data root>/<images_dir>/<prefix><i zero padded><extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSequence {
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// The number of digits the index is padded to.
    #[serde(default = "default_fill_width")]
    pub fill_width: usize,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub first: usize,
    /// The last index, inclusive.
    #[serde(default = "default_last")]
    pub last: usize,
}

impl Default for ImageSequence {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            prefix: default_prefix(),
            fill_width: default_fill_width(),
            extension: default_extension(),
            first: 0,
            last: default_last(),
        }
    }
}

impl ImageSequence {
    pub fn indices(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }

    pub fn len(&self) -> usize {
        (self.last + 1).saturating_sub(self.first)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self, data_root: &Path, index: usize) -> PathBuf {
        data_root.join(&self.images_dir).join(format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.extension,
            width = self.fill_width
        ))
    }
}

fn default_images_dir() -> String {
    "images".to_owned()
}

fn default_prefix() -> String {
    "KITTI/2011_09_26/image_00/data/000000".to_owned()
}

fn default_fill_width() -> usize {
    4
}

fn default_extension() -> String {
    ".png".to_owned()
}

fn default_last() -> usize {
    9
}

/// Tuning that is read from the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sequence: ImageSequence,
    /// The intensity difference threshold of the FAST detector.
    #[serde(default = "default_fast_threshold")]
    pub fast_threshold: u8,
    /// The detector response threshold of AKAZE in the pure Rust backend.
    #[serde(default = "default_akaze_threshold")]
    pub akaze_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sequence: ImageSequence::default(),
            fast_threshold: default_fast_threshold(),
            akaze_threshold: default_akaze_threshold(),
        }
    }
}

fn default_fast_threshold() -> u8 {
    30
}

fn default_akaze_threshold() -> f64 {
    0.001
}

impl Settings {
    /// Reads the settings file, falling back to the defaults if it is missing or invalid.
    pub fn load(path: &Path) -> Self {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(_) => {
                info!("used default settings");
                return Self::default();
            }
        };
        match serde_json::from_reader(std::io::BufReader::new(file)) {
            Ok(settings) => {
                info!("loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!(
                    "ignoring invalid settings file {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}
