use super::FeatureBackend;
use crate::algorithm::{DescriptorType, Detector, DistanceMetric, MatchStrategy, MatcherKind, Stage};
use crate::matching::{self, L2};
use crate::{BinaryDescriptor, Correspondence, Descriptors, Error, FeatureView, Keypoint, Result};
use akaze::Akaze;
use bitarray::Hamming;
use image::{DynamicImage, GrayImage};
use log::*;
use std::collections::HashMap;

/// The diameter OpenCV assigns to FAST keypoints.
const FAST_KEYPOINT_SIZE: f32 = 7.0;

/// A backend built on the pure Rust computer vision crates.
///
/// Supports the `FAST` and `AKAZE` detectors and the `AKAZE` descriptor.
/// Brute force matching is a linear k-NN search, approximate matching goes
/// through an HNSW index.
#[derive(Debug)]
pub struct RustCvBackend {
    akaze: Akaze,
    fast_threshold: u8,
    /// The last AKAZE extraction, reused when the same image is described.
    akaze_cache: Option<AkazeExtraction>,
}

#[derive(Debug)]
struct AkazeExtraction {
    image: GrayImage,
    descriptors: HashMap<KeypointKey, BinaryDescriptor>,
}

/// Identifies an AKAZE keypoint exactly.
type KeypointKey = (u32, u32, i32, i32);

fn key(keypoint: &Keypoint) -> KeypointKey {
    (
        keypoint.point.0.to_bits(),
        keypoint.point.1.to_bits(),
        keypoint.octave,
        keypoint.class_id,
    )
}

impl Default for RustCvBackend {
    fn default() -> Self {
        Self::new(30, 0.001)
    }
}

impl RustCvBackend {
    pub fn new(fast_threshold: u8, akaze_threshold: f64) -> Self {
        Self {
            akaze: Akaze::new(akaze_threshold),
            fast_threshold,
            akaze_cache: None,
        }
    }

    fn extract_akaze(&mut self, image: &GrayImage) -> Vec<Keypoint> {
        let (akaze_keypoints, descriptors) = self
            .akaze
            .extract(&DynamicImage::ImageLuma8(image.clone()));
        let keypoints: Vec<Keypoint> = akaze_keypoints
            .iter()
            .map(|kp| Keypoint {
                point: kp.point,
                size: kp.size,
                response: kp.response,
                angle: kp.angle.to_degrees(),
                octave: kp.octave as i32,
                class_id: kp.class_id as i32,
            })
            .collect();
        self.akaze_cache = Some(AkazeExtraction {
            image: image.clone(),
            descriptors: keypoints.iter().map(key).zip(descriptors).collect(),
        });
        keypoints
    }

    fn describe_akaze(
        &mut self,
        image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        detector: Detector,
    ) -> Result<Descriptors> {
        if let Some(kp) = keypoints.iter().find(|kp| kp.class_id < 0) {
            return Err(Error::DescriptorIncompatibility {
                detector,
                descriptor: DescriptorType::Akaze,
                reason: format!(
                    "keypoint at ({}, {}) carries no AKAZE scale space level",
                    kp.x(),
                    kp.y()
                ),
            });
        }
        let cached = self
            .akaze_cache
            .as_ref()
            .map_or(false, |cache| cache.image.as_raw() == image.as_raw());
        if !cached {
            trace!("AKAZE cache miss, extracting again");
            self.extract_akaze(image);
        }
        let cache = match &self.akaze_cache {
            Some(cache) => cache,
            None => return Err(Error::Backend("AKAZE extraction produced no cache".into())),
        };
        let before = keypoints.len();
        let mut rows = Vec::with_capacity(before);
        keypoints.retain(|kp| match cache.descriptors.get(&key(kp)) {
            Some(&descriptor) => {
                rows.push(descriptor);
                true
            }
            None => false,
        });
        if keypoints.len() < before {
            debug!(
                "dropped {} keypoints without an AKAZE descriptor",
                before - keypoints.len()
            );
        }
        Ok(Descriptors::Binary(rows))
    }
}

impl FeatureBackend for RustCvBackend {
    fn name(&self) -> &'static str {
        "rustcv"
    }

    fn detect_shi_tomasi(&mut self, _image: &GrayImage) -> Result<Vec<Keypoint>> {
        Err(Error::unsupported(Stage::Detection, Detector::ShiTomasi.name()))
    }

    fn detect_harris(&mut self, _image: &GrayImage) -> Result<Vec<Keypoint>> {
        Err(Error::unsupported(Stage::Detection, Detector::Harris.name()))
    }

    fn detect_fast(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        let corners = imageproc::corners::corners_fast9(image, self.fast_threshold);
        trace!("FAST found {} corners", corners.len());
        Ok(corners
            .into_iter()
            .map(|corner| {
                Keypoint::new(
                    corner.x as f32,
                    corner.y as f32,
                    FAST_KEYPOINT_SIZE,
                    corner.score,
                )
            })
            .collect())
    }

    fn detect_modern(&mut self, image: &GrayImage, detector: Detector) -> Result<Vec<Keypoint>> {
        match detector {
            Detector::Akaze => Ok(self.extract_akaze(image)),
            other => Err(Error::unsupported(Stage::Detection, other.name())),
        }
    }

    fn describe(
        &mut self,
        image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        detector: Detector,
        descriptor: DescriptorType,
    ) -> Result<Descriptors> {
        match descriptor {
            DescriptorType::Akaze => self.describe_akaze(image, keypoints, detector),
            other => Err(Error::unsupported(Stage::Description, other.name())),
        }
    }

    fn match_descriptors(
        &mut self,
        query: FeatureView<'_>,
        train: FeatureView<'_>,
        strategy: MatchStrategy,
    ) -> Result<Vec<Correspondence>> {
        matching::check_rows(query.keypoints.len(), query.descriptors.len())?;
        matching::check_rows(train.keypoints.len(), train.descriptors.len())?;
        let k = matching::neighbors_for(strategy.selector);
        let candidates = match (strategy.metric, query.descriptors, train.descriptors) {
            (DistanceMetric::Hamming, Descriptors::Binary(q), Descriptors::Binary(t)) => {
                match strategy.matcher {
                    MatcherKind::BruteForce => {
                        matching::linear_candidates(Hamming, q, t, k, |d| d as f32)
                    }
                    MatcherKind::Flann => matching::hnsw_hamming_candidates(q, t, k),
                }
            }
            (DistanceMetric::L2, Descriptors::Float(q), Descriptors::Float(t)) => {
                match strategy.matcher {
                    MatcherKind::BruteForce => {
                        matching::linear_candidates(L2, q, t, k, f32::from_bits)
                    }
                    MatcherKind::Flann => matching::hnsw_l2_candidates(q, t, k),
                }
            }
            (metric, q, t) => {
                return Err(Error::MetricMismatch {
                    metric,
                    kind: if q.kind() == t.kind() {
                        q.kind()
                    } else {
                        "mixed"
                    },
                })
            }
        };
        Ok(matching::select(strategy.selector, candidates))
    }
}
