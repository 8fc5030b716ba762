use feature_bench::algorithm::{
    DescriptorType, Detector, MatchStrategy, MatcherKind, SelectorKind, Stage,
};
use feature_bench::backend::FeatureBackend;
use feature_bench::{
    driver, matching, report, summary, Correspondence, Descriptors, Error, FeatureView, ImageSequence,
    Keypoint, Pipeline, Result, ResultRecord, RunOutcome, RustCvBackend, TestConfiguration,
};
use bitarray::Hamming;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use std::path::Path;
use std::time::Duration;

/// A backend that derives its keypoints from the image index stored in the pixels.
///
/// Image `i` yields `base + i` keypoints inside the vehicle region and five
/// outside of it. Keypoint `j` has the same position and descriptor in every
/// image, so consecutive frames match.
struct ScriptedBackend {
    base: usize,
    failing_descriptor: Option<DescriptorType>,
    /// The keypoints of every describe call.
    described: Vec<Vec<Keypoint>>,
}

impl ScriptedBackend {
    fn new(base: usize) -> Self {
        Self {
            base,
            failing_descriptor: None,
            described: vec![],
        }
    }

    fn keypoints(&self, image: &GrayImage) -> Vec<Keypoint> {
        let index = image.get_pixel(0, 0).0[0] as usize / 10;
        let inside = (0..self.base + index).map(|j| {
            Keypoint::new(
                540.0 + (j % 20) as f32 * 8.0,
                190.0 + (j / 20) as f32 * 10.0,
                2.0 + (j % 3) as f32,
                j as f32,
            )
        });
        let outside = (0..5).map(|j| Keypoint::new(10.0 + j as f32, 10.0, 3.0, 1000.0));
        inside.chain(outside).collect()
    }
}

impl FeatureBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect_shi_tomasi(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        Ok(self.keypoints(image))
    }

    fn detect_harris(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        Ok(self.keypoints(image))
    }

    fn detect_fast(&mut self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        Ok(self.keypoints(image))
    }

    fn detect_modern(&mut self, image: &GrayImage, _detector: Detector) -> Result<Vec<Keypoint>> {
        Ok(self.keypoints(image))
    }

    fn describe(
        &mut self,
        _image: &GrayImage,
        keypoints: &mut Vec<Keypoint>,
        detector: Detector,
        descriptor: DescriptorType,
    ) -> Result<Descriptors> {
        if self.failing_descriptor == Some(descriptor) {
            return Err(Error::DescriptorIncompatibility {
                detector,
                descriptor,
                reason: "scripted failure".to_owned(),
            });
        }
        self.described.push(keypoints.clone());
        let rows = keypoints
            .iter()
            .map(|kp| {
                let id = kp.x() as u32 * 1000 + kp.y() as u32;
                Descriptors::binary_row(&id.to_le_bytes()).unwrap()
            })
            .collect();
        Ok(Descriptors::Binary(rows))
    }

    fn match_descriptors(
        &mut self,
        query: FeatureView<'_>,
        train: FeatureView<'_>,
        strategy: MatchStrategy,
    ) -> Result<Vec<Correspondence>> {
        std::thread::sleep(Duration::from_micros(50));
        match (query.descriptors, train.descriptors) {
            (Descriptors::Binary(q), Descriptors::Binary(t)) => {
                let k = matching::neighbors_for(strategy.selector);
                let candidates = match strategy.matcher {
                    MatcherKind::BruteForce => {
                        matching::linear_candidates(Hamming, q, t, k, |d| d as f32)
                    }
                    MatcherKind::Flann => matching::hnsw_hamming_candidates(q, t, k),
                };
                Ok(matching::select(strategy.selector, candidates))
            }
            _ => Err(Error::Backend("float descriptors".to_owned())),
        }
    }
}

/// Writes ten tiny images whose pixels hold ten times their index.
fn write_sequence(data_root: &Path, sequence: &ImageSequence) {
    for index in sequence.indices() {
        let path = sequence.path(data_root, index);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_pixel(4, 4, Luma([index as u8 * 10]))
            .save(&path)
            .unwrap();
    }
}

/// Writes a sequence of bright discs drifting to the right by two pixels per image.
fn write_disc_sequence(data_root: &Path, sequence: &ImageSequence) {
    for index in sequence.indices() {
        let path = sequence.path(data_root, index);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut image = GrayImage::from_pixel(160, 120, Luma([20]));
        for (ix, &(x, y)) in [(30, 30), (90, 40), (50, 85), (120, 90)].iter().enumerate() {
            let radius = 5 + 2 * ix as i32;
            draw_filled_circle_mut(&mut image, (x + 2 * index as i32, y), radius, Luma([230]));
        }
        image.save(&path).unwrap();
    }
}

fn configuration(data_root: &Path, detector: Detector, descriptor: DescriptorType) -> TestConfiguration {
    TestConfiguration {
        detector,
        descriptor,
        matcher: MatcherKind::BruteForce,
        selector: SelectorKind::KNearestNeighbor,
        restrict_to_roi: true,
        limit_keypoints: false,
        visualize: false,
        data_root: data_root.to_owned(),
    }
}

#[test]
fn shi_tomasi_brisk_writes_nine_rows() {
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sequence = ImageSequence::default();
    write_sequence(data.path(), &sequence);

    let mut pipeline = Pipeline::new(ScriptedBackend::new(20), sequence);
    let configurations = [configuration(
        data.path(),
        Detector::ShiTomasi,
        DescriptorType::Brisk,
    )];
    let benchmark = driver::run_benchmark(&mut pipeline, &configurations, output.path()).unwrap();
    assert_eq!(benchmark.completed, 1);
    assert_eq!(benchmark.aborted, 0);
    assert_eq!(benchmark.rows, 9);

    let text = std::fs::read_to_string(&benchmark.report).unwrap();
    assert!(text.starts_with("'Case','Image',"));
    for line in text.lines() {
        assert_eq!(line.split(',').count(), 13);
    }

    let totals = summary::summarize(&benchmark.report).unwrap();
    assert_eq!(totals.cases.len(), 1);
    assert_eq!(totals.detectors[0].images, 9);
    let rows = report::read_records(text.as_bytes()).unwrap();
    assert_eq!(
        rows.iter().map(|r| r.image).collect::<Vec<_>>(),
        (1..=9).collect::<Vec<_>>()
    );
    for row in &rows {
        assert_eq!(row.case, 0);
        assert_eq!(row.detector, Detector::ShiTomasi);
        assert_eq!(row.descriptor, DescriptorType::Brisk);
        assert!(row.matching_ms > 0.0);
        // Only the keypoints on the vehicle survive.
        let previous_keypoints = 20 + row.image - 1;
        assert_eq!(row.keypoints, 20 + row.image);
        assert!(row.matches > 0);
        assert!(row.matches <= previous_keypoints.min(row.keypoints));
    }
}

#[test]
fn failing_descriptor_aborts_only_its_configuration() {
    let data = tempfile::tempdir().unwrap();
    let sequence = ImageSequence::default();
    write_sequence(data.path(), &sequence);

    let mut backend = ScriptedBackend::new(20);
    backend.failing_descriptor = Some(DescriptorType::Freak);
    let mut pipeline = Pipeline::new(backend, sequence);
    let configurations = [
        configuration(data.path(), Detector::Fast, DescriptorType::Brisk),
        configuration(data.path(), Detector::Fast, DescriptorType::Freak),
        configuration(data.path(), Detector::Orb, DescriptorType::Brief),
    ];
    let mut records: Vec<ResultRecord> = vec![];
    let (completed, aborted) =
        driver::run_configurations(&mut pipeline, &configurations, &mut records).unwrap();
    assert_eq!((completed, aborted), (2, 1));
    assert_eq!(records.len(), 18);
    assert!(records.iter().all(|r| r.case != 1));
    assert!(records.iter().any(|r| r.case == 2));
}

#[test]
fn missing_image_aborts_the_run() {
    let data = tempfile::tempdir().unwrap();
    let sequence = ImageSequence::default();
    write_sequence(data.path(), &sequence);
    std::fs::remove_file(sequence.path(data.path(), 4)).unwrap();

    let mut pipeline = Pipeline::new(ScriptedBackend::new(20), sequence);
    let config = configuration(data.path(), Detector::Brisk, DescriptorType::Orb);
    let mut records: Vec<ResultRecord> = vec![];
    match pipeline.run(0, &config, &mut records).unwrap() {
        RunOutcome::Aborted {
            image_index,
            stage,
            error,
        } => {
            assert_eq!(image_index, 4);
            assert_eq!(stage, Stage::Load);
            assert!(matches!(error, Error::ImageLoad { .. }));
        }
        other => panic!("expected an aborted run, got {:?}", other),
    }
    assert_eq!(records.len(), 3);
}

#[test]
fn capping_depends_on_the_detector() {
    let data = tempfile::tempdir().unwrap();
    let sequence = ImageSequence {
        last: 1,
        ..ImageSequence::default()
    };
    write_sequence(data.path(), &sequence);

    let mut config = configuration(data.path(), Detector::ShiTomasi, DescriptorType::Brisk);
    config.limit_keypoints = true;
    let mut pipeline = Pipeline::new(ScriptedBackend::new(80), sequence.clone());
    let mut records: Vec<ResultRecord> = vec![];
    assert!(pipeline.run(0, &config, &mut records).unwrap().is_completed());
    assert_eq!(records[0].keypoints, 50);
    // Shi-Tomasi keeps the leading keypoints.
    let leading = &pipeline.backend().described[0];
    assert!(leading.iter().all(|kp| kp.response < 50.0));

    config.detector = Detector::Fast;
    let mut pipeline = Pipeline::new(ScriptedBackend::new(80), sequence);
    assert!(pipeline.run(0, &config, &mut records).unwrap().is_completed());
    // Everything else keeps the strongest, first image has 80 on the vehicle.
    let strongest = &pipeline.backend().described[0];
    assert_eq!(strongest.len(), 50);
    assert!(strongest.iter().all(|kp| kp.response >= 30.0));
}

#[test]
fn visualization_writes_one_image_per_pair() {
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sequence = ImageSequence {
        last: 2,
        ..ImageSequence::default()
    };
    write_sequence(data.path(), &sequence);

    let mut config = configuration(data.path(), Detector::Orb, DescriptorType::Orb);
    config.visualize = true;
    let vis = output.path().join("matches");
    let mut pipeline =
        Pipeline::new(ScriptedBackend::new(10), sequence).visualization_dir(&vis);
    let mut records: Vec<ResultRecord> = vec![];
    assert!(pipeline.run(7, &config, &mut records).unwrap().is_completed());
    assert!(!vis.join("case_7_image_0.png").exists());
    assert!(vis.join("case_7_image_1.png").exists());
    assert!(vis.join("case_7_image_2.png").exists());
}

#[test]
fn akaze_descriptor_never_meets_other_detectors() {
    let configurations = driver::enumerate_configurations(
        &Detector::ALL,
        &DescriptorType::ALL,
        &TestConfiguration::default(),
    );
    for c in &configurations {
        if c.descriptor == DescriptorType::Akaze {
            assert_eq!(c.detector, Detector::Akaze);
        }
    }
    assert_eq!(configurations.len(), 36);
}

#[test]
fn rust_cv_backend_rejects_missing_algorithms() {
    let data = tempfile::tempdir().unwrap();
    let sequence = ImageSequence::default();
    write_sequence(data.path(), &sequence);

    let mut pipeline = Pipeline::new(RustCvBackend::default(), sequence);
    let config = configuration(data.path(), Detector::Fast, DescriptorType::Brisk);
    let mut records: Vec<ResultRecord> = vec![];
    match pipeline.run(0, &config, &mut records).unwrap() {
        RunOutcome::Aborted {
            image_index, stage, ..
        } => {
            assert_eq!(image_index, 0);
            assert_eq!(stage, Stage::Description);
        }
        other => panic!("expected an aborted run, got {:?}", other),
    }
    assert!(records.is_empty());
}

#[test]
fn rust_cv_backend_runs_akaze_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    let sequence = ImageSequence::default();
    write_disc_sequence(data.path(), &sequence);

    let mut pipeline = Pipeline::new(RustCvBackend::default(), sequence);
    let mut config = configuration(data.path(), Detector::Akaze, DescriptorType::Akaze);
    config.restrict_to_roi = false;
    let mut records: Vec<ResultRecord> = vec![];
    match pipeline.run(0, &config, &mut records).unwrap() {
        RunOutcome::Completed { records: count } => assert_eq!(count, 9),
        other => panic!("expected a completed run, got {:?}", other),
    }
    assert_eq!(records.len(), 9);
    assert!(records.iter().any(|r| r.keypoints > 0));
    assert_eq!(
        records.iter().map(|r| r.image).collect::<Vec<_>>(),
        (1..=9).collect::<Vec<_>>()
    );
}

#[test]
fn approximate_nearest_neighbor_matches_every_keypoint() {
    let data = tempfile::tempdir().unwrap();
    let sequence = ImageSequence {
        last: 3,
        ..ImageSequence::default()
    };
    write_sequence(data.path(), &sequence);

    let mut config = configuration(data.path(), Detector::Orb, DescriptorType::Orb);
    config.matcher = MatcherKind::Flann;
    config.selector = SelectorKind::NearestNeighbor;
    let mut pipeline = Pipeline::new(ScriptedBackend::new(20), sequence);
    let mut records: Vec<ResultRecord> = vec![];
    assert!(pipeline.run(0, &config, &mut records).unwrap().is_completed());
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.matcher, MatcherKind::Flann);
        assert_eq!(record.selector, SelectorKind::NearestNeighbor);
        // Every keypoint of the previous image reappears in the current one.
        assert_eq!(record.matches, 20 + record.image - 1);
    }
}
