//! Closed sets of the algorithms that can be benchmarked.
//!
//! Names are only parsed at the configuration boundary. Everything past that
//! point dispatches on the enums, so an unknown name can never reach a backend.

use crate::{Error, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The pipeline stage an algorithm or a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Detection,
    Description,
    Matching,
    Visualization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Detection => "detection",
            Self::Description => "description",
            Self::Matching => "matching",
            Self::Visualization => "visualization",
        })
    }
}

/// Keypoint detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detector {
    ShiTomasi,
    Harris,
    Fast,
    Brisk,
    Orb,
    Akaze,
    Sift,
}

impl Detector {
    /// Every detector in the order the benchmark enumerates them.
    pub const ALL: [Detector; 7] = [
        Self::ShiTomasi,
        Self::Harris,
        Self::Fast,
        Self::Brisk,
        Self::Orb,
        Self::Akaze,
        Self::Sift,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ShiTomasi => "SHITOMASI",
            Self::Harris => "HARRIS",
            Self::Fast => "FAST",
            Self::Brisk => "BRISK",
            Self::Orb => "ORB",
            Self::Akaze => "AKAZE",
            Self::Sift => "SIFT",
        }
    }

    /// Detectors whose output carries no usable response.
    ///
    /// Their keypoints come out sorted by quality already, so capping keeps
    /// the leading keypoints instead of asking the backend for the best ones.
    pub fn ranked_by_detection_order(self) -> bool {
        matches!(self, Self::ShiTomasi)
    }
}

/// Keypoint descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Brisk,
    Brief,
    Orb,
    Freak,
    Akaze,
    Sift,
}

impl DescriptorType {
    /// The descriptors crossed with every detector.
    ///
    /// `AKAZE` is missing on purpose, see [`DescriptorType::required_detector`].
    pub const CROSSED: [DescriptorType; 5] =
        [Self::Brisk, Self::Brief, Self::Orb, Self::Freak, Self::Sift];

    pub const ALL: [DescriptorType; 6] = [
        Self::Brisk,
        Self::Brief,
        Self::Orb,
        Self::Freak,
        Self::Akaze,
        Self::Sift,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Brisk => "BRISK",
            Self::Brief => "BRIEF",
            Self::Orb => "ORB",
            Self::Freak => "FREAK",
            Self::Akaze => "AKAZE",
            Self::Sift => "SIFT",
        }
    }

    /// The distance metric used to compare two descriptors of this type.
    pub fn metric(self) -> DistanceMetric {
        match self {
            Self::Sift => DistanceMetric::L2,
            Self::Brisk | Self::Brief | Self::Orb | Self::Freak | Self::Akaze => {
                DistanceMetric::Hamming
            }
        }
    }

    /// The only detector this descriptor can describe keypoints of, if any.
    ///
    /// AKAZE descriptors need the scale space information that only the
    /// AKAZE detector attaches to its keypoints.
    pub fn required_detector(self) -> Option<Detector> {
        match self {
            Self::Akaze => Some(Detector::Akaze),
            _ => None,
        }
    }

    pub fn pairs_with(self, detector: Detector) -> bool {
        self.required_detector().map_or(true, |d| d == detector)
    }
}

/// How candidate neighbours are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    /// Exhaustive comparison against every train descriptor.
    BruteForce,
    /// Approximate search through an index.
    Flann,
}

impl MatcherKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::BruteForce => "BF",
            Self::Flann => "FLANN",
        }
    }
}

/// How correspondences are picked from the candidate neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    /// Keep the single nearest neighbour of every query.
    NearestNeighbor,
    /// Keep the nearest of two neighbours when it passes the ratio test.
    KNearestNeighbor,
}

impl SelectorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::NearestNeighbor => "NN",
            Self::KNearestNeighbor => "KNN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    /// Bit difference count between binary descriptors.
    Hamming,
    /// Euclidean distance between gradient histogram descriptors.
    L2,
}

impl DistanceMetric {
    pub fn name(self) -> &'static str {
        match self {
            Self::Hamming => "HAMMING",
            Self::L2 => "L2",
        }
    }
}

/// The three choices that together decide how two frames are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchStrategy {
    pub metric: DistanceMetric,
    pub matcher: MatcherKind,
    pub selector: SelectorKind,
}

impl MatchStrategy {
    pub fn for_descriptor(
        descriptor: DescriptorType,
        matcher: MatcherKind,
        selector: SelectorKind,
    ) -> Self {
        Self {
            metric: descriptor.metric(),
            matcher,
            selector,
        }
    }
}

macro_rules! named {
    ($ty:ident, $stage:expr, [$($variant:ident),*]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let upper = s.trim().to_ascii_uppercase();
                [$($ty::$variant),*]
                    .into_iter()
                    .find(|v| v.name() == upper)
                    .ok_or_else(|| Error::unsupported($stage, s))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                name.parse().map_err(de::Error::custom)
            }
        }
    };
}

named!(
    Detector,
    Stage::Detection,
    [ShiTomasi, Harris, Fast, Brisk, Orb, Akaze, Sift]
);
named!(
    DescriptorType,
    Stage::Description,
    [Brisk, Brief, Orb, Freak, Akaze, Sift]
);
named!(MatcherKind, Stage::Matching, [BruteForce, Flann]);
named!(
    SelectorKind,
    Stage::Matching,
    [NearestNeighbor, KNearestNeighbor]
);
named!(DistanceMetric, Stage::Matching, [Hamming, L2]);
