use crate::algorithm::{DescriptorType, Detector};
use crate::backend::FeatureBackend;
use crate::config::TestConfiguration;
use crate::pipeline::{Pipeline, RunOutcome};
use crate::report::{RecordSink, ReportWriter};
use crate::Result;
use chrono::{DateTime, Local, TimeZone};
use log::*;
use std::fmt;
use std::path::{Path, PathBuf};

/// Crosses every detector with every descriptor it can pair with.
///
/// `template` provides everything but the algorithms. The `AKAZE` descriptor
/// is only paired with the `AKAZE` detector, and that pairing is appended at
/// the end whenever `AKAZE` is among the detectors and the pairing is not
/// already in the list.
pub fn enumerate_configurations(
    detectors: &[Detector],
    descriptors: &[DescriptorType],
    template: &TestConfiguration,
) -> Vec<TestConfiguration> {
    let with = &|detector: Detector, descriptor: DescriptorType| TestConfiguration {
        detector,
        descriptor,
        ..template.clone()
    };
    let mut configurations: Vec<TestConfiguration> = detectors
        .iter()
        .flat_map(|&detector| {
            descriptors
                .iter()
                .filter(move |descriptor| descriptor.pairs_with(detector))
                .map(move |&descriptor| with(detector, descriptor))
        })
        .collect();
    let forced = (Detector::Akaze, DescriptorType::Akaze);
    let present = configurations
        .iter()
        .any(|c| (c.detector, c.descriptor) == forced);
    if detectors.contains(&Detector::Akaze) && !present {
        configurations.push(with(forced.0, forced.1));
    }
    configurations
}

/// The report name for a benchmark started at `time`, like `output_2024-03-01_14h05m09s.csv`.
pub fn report_file_name<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.format("output_%Y-%m-%d_%Hh%Mm%Ss.csv").to_string()
}

/// What happened over a whole benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkSummary {
    pub configurations: usize,
    pub completed: usize,
    pub aborted: usize,
    pub rows: usize,
    pub report: PathBuf,
}

/// Runs every configuration in order, numbering cases from 0.
///
/// Returns the number of completed and aborted runs. Aborted runs are logged
/// and do not stop the remaining configurations.
pub fn run_configurations<B, S>(
    pipeline: &mut Pipeline<B>,
    configurations: &[TestConfiguration],
    sink: &mut S,
) -> Result<(usize, usize)>
where
    B: FeatureBackend,
    S: RecordSink + ?Sized,
{
    let mut completed = 0;
    let mut aborted = 0;
    for (case, config) in configurations.iter().enumerate() {
        match pipeline.run(case, config, sink)? {
            RunOutcome::Completed { records } => {
                info!("case {} completed with {} records", case, records);
                completed += 1;
            }
            RunOutcome::Aborted {
                image_index,
                stage,
                error,
            } => {
                error!(
                    "{}/{}: case {} aborted in the {} stage at image {}: {}",
                    config.detector, config.descriptor, case, stage, image_index, error
                );
                aborted += 1;
            }
        }
    }
    Ok((completed, aborted))
}

/// Runs every configuration into a fresh timestamped report in `output_dir`.
pub fn run_benchmark<B: FeatureBackend>(
    pipeline: &mut Pipeline<B>,
    configurations: &[TestConfiguration],
    output_dir: &Path,
) -> Result<BenchmarkSummary> {
    std::fs::create_dir_all(output_dir)?;
    let report = output_dir.join(report_file_name(&Local::now()));
    info!(
        "writing {} configurations to {}",
        configurations.len(),
        report.display()
    );
    let mut writer = ReportWriter::create(&report)?;
    let (completed, aborted) = run_configurations(pipeline, configurations, &mut writer)?;
    let rows = writer.rows();
    writer.into_inner()?;
    Ok(BenchmarkSummary {
        configurations: configurations.len(),
        completed,
        aborted,
        rows,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn full_enumeration() {
        let configurations = enumerate_configurations(
            &Detector::ALL,
            &DescriptorType::CROSSED,
            &TestConfiguration::default(),
        );
        assert_eq!(configurations.len(), 36);
        assert_eq!(configurations[0].detector, Detector::ShiTomasi);
        assert_eq!(configurations[0].descriptor, DescriptorType::Brisk);
        let last = configurations.last().unwrap();
        assert_eq!(
            (last.detector, last.descriptor),
            (Detector::Akaze, DescriptorType::Akaze)
        );
        assert!(configurations
            .iter()
            .all(|c| c.descriptor.pairs_with(c.detector)));
    }

    #[test]
    fn akaze_pairing_is_not_duplicated() {
        let configurations = enumerate_configurations(
            &[Detector::Fast, Detector::Akaze],
            &DescriptorType::ALL,
            &TestConfiguration::default(),
        );
        let akaze = configurations
            .iter()
            .filter(|c| c.descriptor == DescriptorType::Akaze)
            .count();
        assert_eq!(akaze, 1);
        assert_eq!(configurations.len(), 5 + 6);
    }

    #[test]
    fn no_akaze_detector_no_forced_pairing() {
        let configurations = enumerate_configurations(
            &[Detector::Orb],
            &[DescriptorType::Orb],
            &TestConfiguration::default(),
        );
        assert_eq!(configurations.len(), 1);
    }

    #[test]
    fn file_name_uses_minutes() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
        assert_eq!(report_file_name(&time), "output_2024-03-01_14h05m09s.csv");
    }
}
