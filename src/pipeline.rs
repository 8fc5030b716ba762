use crate::algorithm::Stage;
use crate::backend::{self, FeatureBackend};
use crate::config::{ImageSequence, TestConfiguration};
use crate::filter::{self, MAX_KEYPOINTS, VEHICLE_ROI};
use crate::frame::{Frame, FrameWindow};
use crate::report::{KeypointSizeStats, RecordSink, ResultRecord};
use crate::{Error, FeatureView, Result};
use log::*;
use matchdraw::Mark;
use std::path::PathBuf;
use std::time::Instant;

/// How the run of one configuration ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every image was processed and `records` rows were emitted.
    Completed { records: usize },
    /// The run stopped at `image_index` because `stage` failed.
    Aborted {
        image_index: usize,
        stage: Stage,
        error: Error,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// An error inside a run, tagged with the stage it came from.
struct Failure {
    stage: Stage,
    error: Error,
}

fn at(stage: Stage) -> impl FnOnce(Error) -> Failure {
    move |error| Failure { stage, error }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Feeds an image sequence through detection, description and matching.
#[derive(Debug)]
pub struct Pipeline<B> {
    backend: B,
    sequence: ImageSequence,
    visualization_dir: PathBuf,
}

impl<B: FeatureBackend> Pipeline<B> {
    pub fn new(backend: B, sequence: ImageSequence) -> Self {
        Self {
            backend,
            sequence,
            visualization_dir: PathBuf::from("."),
        }
    }

    /// Sets where match images go for configurations that visualize.
    pub fn visualization_dir(self, visualization_dir: impl Into<PathBuf>) -> Self {
        Self {
            visualization_dir: visualization_dir.into(),
            ..self
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sequence(&self) -> &ImageSequence {
        &self.sequence
    }

    /// Runs configuration `case` over the whole sequence, appending a record
    /// for every image that has a predecessor.
    ///
    /// Failures of the backend or of image input end the run with
    /// [`RunOutcome::Aborted`]. Only errors of `sink` are returned as `Err`.
    pub fn run<S: RecordSink + ?Sized>(
        &mut self,
        case: usize,
        config: &TestConfiguration,
        sink: &mut S,
    ) -> Result<RunOutcome> {
        info!(
            "case {}: running {}/{} with {}/{} on the {} backend",
            case,
            config.detector,
            config.descriptor,
            config.matcher,
            config.selector,
            self.backend.name()
        );
        let mut window = FrameWindow::default();
        let mut records = 0;
        for image_index in self.sequence.indices() {
            match self.process(case, image_index, config, &mut window) {
                Ok(Some(record)) => {
                    sink.append(&record)?;
                    records += 1;
                }
                Ok(None) => {}
                Err(Failure { stage, error }) => {
                    warn!(
                        "case {} aborted at image {} in the {} stage",
                        case, image_index, stage
                    );
                    return Ok(RunOutcome::Aborted {
                        image_index,
                        stage,
                        error,
                    });
                }
            }
        }
        Ok(RunOutcome::Completed { records })
    }

    fn process(
        &mut self,
        case: usize,
        image_index: usize,
        config: &TestConfiguration,
        window: &mut FrameWindow,
    ) -> std::result::Result<Option<ResultRecord>, Failure> {
        let path = self.sequence.path(&config.data_root, image_index);
        let image = image::open(&path)
            .map_err(|source| Error::ImageLoad {
                path: path.clone(),
                source,
            })
            .map_err(at(Stage::Load))?
            .to_luma8();
        let mut frame = Frame::new(image);

        let start = Instant::now();
        let mut keypoints = backend::detect(&mut self.backend, &frame.image, config.detector)
            .map_err(at(Stage::Detection))?;
        let detector_ms = elapsed_ms(start);
        debug!(
            "{} detected {} keypoints in {:.3} ms",
            config.detector,
            keypoints.len(),
            detector_ms
        );

        if config.restrict_to_roi {
            filter::restrict_to_region(&mut keypoints, &VEHICLE_ROI);
        }
        if config.limit_keypoints {
            if config.detector.ranked_by_detection_order() {
                filter::keep_leading(&mut keypoints, MAX_KEYPOINTS);
            } else {
                self.backend.retain_best(&mut keypoints, MAX_KEYPOINTS);
            }
        }

        let start = Instant::now();
        let descriptors = self
            .backend
            .describe(&frame.image, &mut keypoints, config.detector, config.descriptor)
            .map_err(at(Stage::Description))?;
        let descriptor_ms = elapsed_ms(start);
        debug!(
            "{} described {} keypoints in {:.3} ms",
            config.descriptor,
            keypoints.len(),
            descriptor_ms
        );
        frame.keypoints = keypoints;
        frame.descriptors = Some(descriptors);
        window.push(frame);

        let (matches, matching_ms) = match window.pair() {
            Some((previous, current)) => match (&previous.descriptors, &current.descriptors) {
                (Some(previous_descriptors), Some(current_descriptors)) => {
                    let start = Instant::now();
                    let matches = self
                        .backend
                        .match_descriptors(
                            FeatureView::new(&previous.keypoints, previous_descriptors),
                            FeatureView::new(&current.keypoints, current_descriptors),
                            config.strategy(),
                        )
                        .map_err(at(Stage::Matching))?;
                    (matches, elapsed_ms(start))
                }
                _ => return Ok(None),
            },
            None => return Ok(None),
        };
        debug!("matched {} keypoints in {:.3} ms", matches.len(), matching_ms);

        let current = match window.newest_mut() {
            Some(current) => current,
            None => return Ok(None),
        };
        current.matches = matches;

        if config.visualize {
            if let Some((previous, current)) = window.pair() {
                self.visualize(case, image_index, previous, current)
                    .map_err(at(Stage::Visualization))?;
            }
        }

        Ok(window.newest().map(|current| ResultRecord {
            case,
            image: image_index,
            detector: config.detector,
            descriptor: config.descriptor,
            matcher: config.matcher,
            selector: config.selector,
            detector_ms,
            descriptor_ms,
            matching_ms,
            keypoints: current.keypoints.len(),
            size: KeypointSizeStats::from_keypoints(&current.keypoints),
            matches: current.matches.len(),
        }))
    }

    fn visualize(
        &self,
        case: usize,
        image_index: usize,
        previous: &Frame,
        current: &Frame,
    ) -> Result<()> {
        let marks = |frame: &Frame| -> Vec<Mark> {
            frame
                .keypoints
                .iter()
                .map(|kp| Mark {
                    point: kp.point,
                    size: kp.size,
                })
                .collect()
        };
        let pairs: Vec<(usize, usize)> = current
            .matches
            .iter()
            .map(|m| (m.query, m.train))
            .collect();
        let canvas = matchdraw::render_matches(
            &previous.image,
            &marks(previous),
            &current.image,
            &marks(current),
            &pairs,
        );
        std::fs::create_dir_all(&self.visualization_dir)?;
        let path = self
            .visualization_dir
            .join(format!("case_{}_image_{}.png", case, image_index));
        canvas.save(&path)?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}
