//! The capability set the benchmark delegates all vision work to.

#[cfg(feature = "opencv")]
mod opencv;
mod rustcv;

#[cfg(feature = "opencv")]
pub use self::opencv::OpenCvBackend;
pub use rustcv::RustCvBackend;

use crate::algorithm::{DescriptorType, Detector, MatchStrategy};
use crate::{filter, Correspondence, Descriptors, FeatureView, Keypoint, Result};
use image::GrayImage;

/// An external vision library seen through the three pipeline stages.
///
/// Classical corner detectors have their own entry points, every other
/// detector goes through [`FeatureBackend::detect_modern`]. Backends return
/// [`Error::UnsupportedAlgorithm`](crate::Error::UnsupportedAlgorithm) for
/// anything they do not implement.
pub trait FeatureBackend {
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    fn detect_shi_tomasi(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>>;

    fn detect_harris(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>>;

    fn detect_fast(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>>;

    /// Runs one of the scale space detectors (`BRISK`, `ORB`, `AKAZE`, `SIFT`).
    fn detect_modern(&mut self, image: &GrayImage, detector: Detector) -> Result<Vec<Keypoint>>;

    /// Keeps the `count` best keypoints by this backend's notion of quality.
    fn retain_best(&self, keypoints: &mut Vec<Keypoint>, count: usize) {
        filter::retain_best(keypoints, count);
    }

    /// Computes one descriptor row per keypoint.
    ///
    /// Keypoints that cannot be described may be removed from `keypoints`, so
    /// that rows and keypoints stay aligned.
    fn describe(
        &mut self,
        image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        detector: Detector,
        descriptor: DescriptorType,
    ) -> Result<Descriptors>;

    /// Matches the `query` features (previous frame) against `train` (current frame).
    fn match_descriptors(
        &mut self,
        query: FeatureView<'_>,
        train: FeatureView<'_>,
        strategy: MatchStrategy,
    ) -> Result<Vec<Correspondence>>;
}

impl<B: FeatureBackend + ?Sized> FeatureBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect_shi_tomasi(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        (**self).detect_shi_tomasi(image)
    }

    fn detect_harris(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        (**self).detect_harris(image)
    }

    fn detect_fast(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        (**self).detect_fast(image)
    }

    fn detect_modern(&mut self, image: &GrayImage, detector: Detector) -> Result<Vec<Keypoint>> {
        (**self).detect_modern(image, detector)
    }

    fn retain_best(&self, keypoints: &mut Vec<Keypoint>, count: usize) {
        (**self).retain_best(keypoints, count)
    }

    fn describe(
        &mut self,
        image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        detector: Detector,
        descriptor: DescriptorType,
    ) -> Result<Descriptors> {
        (**self).describe(image, keypoints, detector, descriptor)
    }

    fn match_descriptors(
        &mut self,
        query: FeatureView<'_>,
        train: FeatureView<'_>,
        strategy: MatchStrategy,
    ) -> Result<Vec<Correspondence>> {
        (**self).match_descriptors(query, train, strategy)
    }
}

/// Runs `detector` through the matching entry point of `backend`.
pub fn detect<B: FeatureBackend + ?Sized>(
    backend: &mut B,
    image: &GrayImage,
    detector: Detector,
) -> Result<Vec<Keypoint>> {
    match detector {
        Detector::ShiTomasi => backend.detect_shi_tomasi(image),
        Detector::Harris => backend.detect_harris(image),
        Detector::Fast => backend.detect_fast(image),
        Detector::Brisk | Detector::Orb | Detector::Akaze | Detector::Sift => {
            backend.detect_modern(image, detector)
        }
    }
}
