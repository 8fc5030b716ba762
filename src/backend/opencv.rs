use super::FeatureBackend;
use crate::algorithm::{
    DescriptorType, Detector, DistanceMetric, MatchStrategy, MatcherKind, Stage,
};
use crate::{filter, matching, Correspondence, Descriptors, Error, FeatureView, Keypoint, Result};
use image::GrayImage;
use log::*;
use opencv::{
    core::{self, DMatch, KeyPoint as CvKeyPoint, Mat, Point2f, Vector},
    features2d::{self, BFMatcher, FlannBasedMatcher, KeyPointsFilter},
    imgproc,
    prelude::*,
    xfeatures2d,
};

const SHI_TOMASI_BLOCK_SIZE: i32 = 4;
const HARRIS_BLOCK_SIZE: i32 = 2;
/// Minimal accepted corner quality relative to the best corner.
const CORNER_QUALITY: f64 = 0.01;
const HARRIS_K: f64 = 0.04;

/// Runs a `Feature2D` detector over `mat`.
macro_rules! run_detector {
    ($algorithm:expr, $mat:expr) => {{
        let mut algorithm = $algorithm;
        let mut keypoints = Vector::<CvKeyPoint>::new();
        algorithm.detect($mat, &mut keypoints, &Mat::default())?;
        keypoints
    }};
}

/// Runs a `Feature2D` extractor, which may drop keypoints it cannot describe.
macro_rules! run_extractor {
    ($algorithm:expr, $mat:expr, $keypoints:expr, $descriptors:expr) => {{
        let mut algorithm = $algorithm;
        algorithm.compute($mat, $keypoints, $descriptors)?;
    }};
}

/// A backend covering every algorithm through OpenCV and its contrib modules.
#[derive(Debug, Clone)]
pub struct OpenCvBackend {
    fast_threshold: u8,
}

impl Default for OpenCvBackend {
    fn default() -> Self {
        Self::new(30)
    }
}

impl OpenCvBackend {
    pub fn new(fast_threshold: u8) -> Self {
        Self { fast_threshold }
    }

    fn good_features(
        &self,
        image: &GrayImage,
        block_size: i32,
        use_harris: bool,
    ) -> opencv::Result<Vec<Keypoint>> {
        let mat = to_mat(image)?;
        // Corners may not overlap.
        let min_distance = f64::from(block_size);
        let max_corners = f64::from(image.width() * image.height()) / min_distance.max(1.0);
        let mut corners = Vector::<Point2f>::new();
        imgproc::good_features_to_track(
            &mat,
            &mut corners,
            max_corners as i32,
            CORNER_QUALITY,
            min_distance,
            &Mat::default(),
            block_size,
            use_harris,
            HARRIS_K,
        )?;
        Ok(corners
            .iter()
            .map(|corner| Keypoint::new(corner.x, corner.y, block_size as f32, 0.0))
            .collect())
    }

    fn detect_scale_space(
        &self,
        image: &GrayImage,
        detector: Detector,
    ) -> opencv::Result<Option<Vector<CvKeyPoint>>> {
        let mat = to_mat(image)?;
        Ok(Some(match detector {
            Detector::Fast => run_detector!(
                features2d::FastFeatureDetector::create(
                    i32::from(self.fast_threshold),
                    true,
                    features2d::FastFeatureDetector_DetectorType::TYPE_9_16,
                )?,
                &mat
            ),
            Detector::Brisk => run_detector!(features2d::BRISK::create_def()?, &mat),
            Detector::Orb => run_detector!(features2d::ORB::create_def()?, &mat),
            Detector::Akaze => run_detector!(features2d::AKAZE::create_def()?, &mat),
            Detector::Sift => run_detector!(features2d::SIFT::create_def()?, &mat),
            Detector::ShiTomasi | Detector::Harris => return Ok(None),
        }))
    }

    fn compute(
        &self,
        image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        descriptor: DescriptorType,
    ) -> opencv::Result<Mat> {
        let mat = to_mat(image)?;
        let mut cv_keypoints = keypoints
            .iter()
            .map(to_cv)
            .collect::<opencv::Result<Vector<CvKeyPoint>>>()?;
        let mut descriptors = Mat::default();
        match descriptor {
            DescriptorType::Brisk => run_extractor!(
                features2d::BRISK::create_def()?,
                &mat,
                &mut cv_keypoints,
                &mut descriptors
            ),
            DescriptorType::Brief => run_extractor!(
                xfeatures2d::BriefDescriptorExtractor::create_def()?,
                &mat,
                &mut cv_keypoints,
                &mut descriptors
            ),
            DescriptorType::Orb => run_extractor!(
                features2d::ORB::create_def()?,
                &mat,
                &mut cv_keypoints,
                &mut descriptors
            ),
            DescriptorType::Freak => run_extractor!(
                xfeatures2d::FREAK::create_def()?,
                &mat,
                &mut cv_keypoints,
                &mut descriptors
            ),
            DescriptorType::Akaze => run_extractor!(
                features2d::AKAZE::create_def()?,
                &mat,
                &mut cv_keypoints,
                &mut descriptors
            ),
            DescriptorType::Sift => run_extractor!(
                features2d::SIFT::create_def()?,
                &mat,
                &mut cv_keypoints,
                &mut descriptors
            ),
        }
        *keypoints = cv_keypoints.iter().map(|kp| from_cv(&kp)).collect();
        Ok(descriptors)
    }
}

fn backend_error(error: opencv::Error) -> Error {
    Error::Backend(error.to_string())
}

fn to_mat(image: &GrayImage) -> opencv::Result<Mat> {
    if image.width() == 0 {
        return Ok(Mat::default());
    }
    let rows: Vec<&[u8]> = image.as_raw().chunks(image.width() as usize).collect();
    Mat::from_slice_2d(&rows[..])
}

fn from_cv(keypoint: &CvKeyPoint) -> Keypoint {
    let point = keypoint.pt();
    Keypoint {
        point: (point.x, point.y),
        size: keypoint.size(),
        response: keypoint.response(),
        angle: keypoint.angle(),
        octave: keypoint.octave(),
        class_id: keypoint.class_id(),
    }
}

fn to_cv(keypoint: &Keypoint) -> opencv::Result<CvKeyPoint> {
    CvKeyPoint::new_coords(
        keypoint.x(),
        keypoint.y(),
        keypoint.size,
        keypoint.angle,
        keypoint.response,
        keypoint.octave,
        keypoint.class_id,
    )
}

/// Reads descriptor rows out of an OpenCV matrix.
///
/// An empty matrix carries no element type, so its kind follows `descriptor`.
fn from_mat(mat: &Mat, descriptor: DescriptorType) -> Result<Descriptors> {
    if mat.empty() {
        return Ok(match descriptor.metric() {
            DistanceMetric::L2 => Descriptors::Float(vec![]),
            DistanceMetric::Hamming => Descriptors::Binary(vec![]),
        });
    }
    match mat.typ() {
        core::CV_8U => (0..mat.rows())
            .map(|row| {
                let bytes = mat.at_row::<u8>(row).map_err(backend_error)?;
                Descriptors::binary_row(bytes).ok_or_else(|| {
                    Error::Backend(format!("{} byte descriptor rows are too wide", bytes.len()))
                })
            })
            .collect::<Result<_>>()
            .map(Descriptors::Binary),
        core::CV_32F => (0..mat.rows())
            .map(|row| {
                mat.at_row::<f32>(row)
                    .map(<[f32]>::to_vec)
                    .map_err(backend_error)
            })
            .collect::<Result<_>>()
            .map(Descriptors::Float),
        other => Err(Error::Backend(format!(
            "unexpected descriptor matrix type {}",
            other
        ))),
    }
}

fn to_mat_rows(descriptors: &Descriptors) -> opencv::Result<Mat> {
    match descriptors {
        Descriptors::Binary(rows) => {
            let rows: Vec<&[u8]> = rows.iter().map(|row| &row.bytes()[..]).collect();
            Mat::from_slice_2d(&rows[..])
        }
        Descriptors::Float(rows) => Mat::from_slice_2d(&rows[..]),
    }
}

/// FLANN indexes only work on float data.
fn as_f32(mat: &Mat) -> opencv::Result<Mat> {
    let mut converted = Mat::default();
    mat.convert_to(&mut converted, core::CV_32F, 1.0, 0.0)?;
    Ok(converted)
}

fn knn_candidates(
    query: &Mat,
    train: &Mat,
    strategy: MatchStrategy,
) -> opencv::Result<Vec<Vec<Correspondence>>> {
    let k = matching::neighbors_for(strategy.selector) as i32;
    let mut knn = Vector::<Vector<DMatch>>::new();
    match strategy.matcher {
        MatcherKind::BruteForce => {
            let norm = match strategy.metric {
                DistanceMetric::Hamming => core::NORM_HAMMING,
                DistanceMetric::L2 => core::NORM_L2,
            };
            let matcher = BFMatcher::create(norm, false)?;
            matcher.knn_train_match(query, train, &mut knn, k, &Mat::default(), false)?;
        }
        MatcherKind::Flann => {
            let (query, train) = (as_f32(query)?, as_f32(train)?);
            let matcher = FlannBasedMatcher::create()?;
            matcher.knn_train_match(&query, &train, &mut knn, k, &Mat::default(), false)?;
        }
    }
    Ok(knn
        .iter()
        .map(|neighbors| {
            neighbors
                .iter()
                .map(|m| Correspondence::new(m.query_idx as usize, m.train_idx as usize, m.distance))
                .collect()
        })
        .collect())
}

impl FeatureBackend for OpenCvBackend {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn detect_shi_tomasi(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        self.good_features(image, SHI_TOMASI_BLOCK_SIZE, false)
            .map_err(backend_error)
    }

    fn detect_harris(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        self.good_features(image, HARRIS_BLOCK_SIZE, true)
            .map_err(backend_error)
    }

    fn detect_fast(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        self.detect_modern(image, Detector::Fast)
    }

    fn detect_modern(&mut self, image: &GrayImage, detector: Detector) -> Result<Vec<Keypoint>> {
        match self.detect_scale_space(image, detector) {
            Ok(Some(keypoints)) => {
                trace!("OpenCV {} found {} keypoints", detector, keypoints.len());
                Ok(keypoints.iter().map(|kp| from_cv(&kp)).collect())
            }
            Ok(None) => Err(Error::unsupported(Stage::Detection, detector.name())),
            Err(e) => Err(backend_error(e)),
        }
    }

    /// Ranks through `KeyPointsFilter::retain_best`.
    ///
    /// OpenCV keeps every keypoint tied with the weakest survivor, so the
    /// result is cut back to `count` afterwards.
    fn retain_best(&self, keypoints: &mut Vec<Keypoint>, count: usize) {
        if keypoints.len() <= count {
            return;
        }
        let ranked = keypoints
            .iter()
            .map(to_cv)
            .collect::<opencv::Result<Vector<CvKeyPoint>>>()
            .and_then(|mut cv_keypoints| {
                KeyPointsFilter::retain_best(&mut cv_keypoints, count as i32)?;
                Ok(cv_keypoints)
            });
        match ranked {
            Ok(cv_keypoints) => {
                *keypoints = cv_keypoints
                    .iter()
                    .take(count)
                    .map(|kp| from_cv(&kp))
                    .collect();
            }
            Err(e) => {
                warn!("OpenCV could not rank keypoints, ranking by response: {}", e);
                filter::retain_best(keypoints, count);
            }
        }
    }

    fn describe(
        &mut self,
        image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        detector: Detector,
        descriptor: DescriptorType,
    ) -> Result<Descriptors> {
        let mat = self
            .compute(image, keypoints, descriptor)
            .map_err(|e| Error::DescriptorIncompatibility {
                detector,
                descriptor,
                reason: e.message,
            })?;
        from_mat(&mat, descriptor)
    }

    fn match_descriptors(
        &mut self,
        query: FeatureView<'_>,
        train: FeatureView<'_>,
        strategy: MatchStrategy,
    ) -> Result<Vec<Correspondence>> {
        matching::check_rows(query.keypoints.len(), query.descriptors.len())?;
        matching::check_rows(train.keypoints.len(), train.descriptors.len())?;
        let fits = |descriptors: &Descriptors| {
            matches!(
                (strategy.metric, descriptors),
                (DistanceMetric::Hamming, Descriptors::Binary(_))
                    | (DistanceMetric::L2, Descriptors::Float(_))
            )
        };
        for descriptors in [query.descriptors, train.descriptors] {
            if !fits(descriptors) {
                return Err(Error::MetricMismatch {
                    metric: strategy.metric,
                    kind: descriptors.kind(),
                });
            }
        }
        if query.descriptors.is_empty() || train.descriptors.is_empty() {
            return Ok(vec![]);
        }
        let query = to_mat_rows(query.descriptors).map_err(backend_error)?;
        let train = to_mat_rows(train.descriptors).map_err(backend_error)?;
        let candidates = knn_candidates(&query, &train, strategy).map_err(backend_error)?;
        Ok(matching::select(strategy.selector, candidates))
    }
}
