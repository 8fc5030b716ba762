//! Aggregates over a finished report, per detector and per case.

use crate::algorithm::{DescriptorType, Detector, MatcherKind, SelectorKind};
use crate::report::{read_records, ResultRecord};
use crate::{Error, Result};
use float_ord::FloatOrd;
use itertools::Itertools;
use std::fmt;
use std::hash::Hash;
use std::path::Path;

/// Keypoint statistics of one detector over every case that used it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSummary {
    pub detector: Detector,
    /// The number of records, one per image.
    pub images: usize,
    pub total_keypoints: usize,
    pub mean_keypoints: f64,
    pub min_keypoints: usize,
    pub max_keypoints: usize,
    /// Keypoint size mean over all keypoints of all images, -1 without keypoints.
    pub mean_size: f64,
    /// Population standard deviation pooled from the per image statistics.
    pub std_dev_size: f64,
}

/// Timing and match statistics of one case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSummary {
    pub case: usize,
    pub detector: Detector,
    pub descriptor: DescriptorType,
    pub matcher: MatcherKind,
    pub selector: SelectorKind,
    pub mean_detector_ms: f64,
    pub mean_descriptor_ms: f64,
    /// The sum of the mean detector and descriptor durations.
    pub total_ms: f64,
    pub mean_matches: f64,
    pub min_matches: usize,
    pub max_matches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    /// In order of first appearance in the report.
    pub detectors: Vec<DetectorSummary>,
    /// In case order.
    pub cases: Vec<CaseSummary>,
}

/// Reads the report at `path` and aggregates it.
pub fn summarize(path: &Path) -> Result<ReportSummary> {
    let records = read_records(std::fs::File::open(path)?)?;
    if records.is_empty() {
        return Err(Error::Report {
            line: 1,
            reason: format!("{} holds no records", path.display()),
        });
    }
    Ok(ReportSummary::from_records(&records))
}

/// Groups `records` by `key`, keeping the order in which keys first appear.
fn group_by<K: Hash + Eq + Copy>(
    records: &[ResultRecord],
    key: impl Fn(&ResultRecord) -> K,
) -> Vec<(K, Vec<&ResultRecord>)> {
    let mut groups = records.iter().into_group_map_by(|r| key(*r));
    records
        .iter()
        .map(&key)
        .unique()
        .filter_map(|k| groups.remove(&k).map(|members| (k, members)))
        .collect()
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    values.sum::<f64>() / n as f64
}

fn detector_summary(detector: Detector, records: &[&ResultRecord]) -> DetectorSummary {
    let counts = || records.iter().map(|r| r.keypoints);
    let total_keypoints: usize = counts().sum();
    // Images without keypoints carry the sentinel statistics and no weight.
    let described = || records.iter().filter(|r| r.keypoints > 0);
    let (mean_size, std_dev_size) = if total_keypoints == 0 {
        (-1.0, -1.0)
    } else {
        let n = total_keypoints as f64;
        let mean_size = described()
            .map(|r| r.keypoints as f64 * r.size.mean)
            .sum::<f64>()
            / n;
        let variance = described()
            .map(|r| {
                r.keypoints as f64 * (r.size.std_dev.powi(2) + (r.size.mean - mean_size).powi(2))
            })
            .sum::<f64>()
            / n;
        (mean_size, variance.sqrt())
    };
    DetectorSummary {
        detector,
        images: records.len(),
        total_keypoints,
        mean_keypoints: mean(counts().map(|c| c as f64)),
        min_keypoints: counts().min().unwrap_or(0),
        max_keypoints: counts().max().unwrap_or(0),
        mean_size,
        std_dev_size,
    }
}

fn case_summary(case: usize, records: &[&ResultRecord]) -> Option<CaseSummary> {
    let first = records.first()?;
    let mean_detector_ms = mean(records.iter().map(|r| r.detector_ms));
    let mean_descriptor_ms = mean(records.iter().map(|r| r.descriptor_ms));
    let matches = || records.iter().map(|r| r.matches);
    Some(CaseSummary {
        case,
        detector: first.detector,
        descriptor: first.descriptor,
        matcher: first.matcher,
        selector: first.selector,
        mean_detector_ms,
        mean_descriptor_ms,
        total_ms: mean_detector_ms + mean_descriptor_ms,
        mean_matches: mean(matches().map(|m| m as f64)),
        min_matches: matches().min().unwrap_or(0),
        max_matches: matches().max().unwrap_or(0),
    })
}

impl ReportSummary {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let detectors = group_by(records, |r| r.detector)
            .into_iter()
            .map(|(detector, members)| detector_summary(detector, &members))
            .collect();
        let mut cases: Vec<CaseSummary> = group_by(records, |r| r.case)
            .into_iter()
            .filter_map(|(case, members)| case_summary(case, &members))
            .collect();
        cases.sort_by_key(|c| c.case);
        Self { detectors, cases }
    }

    /// The cases from the fastest to the slowest combined detection and description.
    pub fn cases_by_duration(&self) -> Vec<&CaseSummary> {
        let mut cases: Vec<&CaseSummary> = self.cases.iter().collect();
        cases.sort_by_key(|c| FloatOrd(c.total_ms));
        cases
    }
}

fn write_cases<'a>(
    f: &mut fmt::Formatter<'_>,
    cases: impl IntoIterator<Item = &'a CaseSummary>,
) -> fmt::Result {
    writeln!(
        f,
        "{:>4} {:<10} {:<10} {:<6} {:<4} {:>10} {:>10} {:>10} {:>8} {:>5} {:>5}",
        "case", "detector", "descriptor", "match", "sel", "det ms", "desc ms", "total ms", "matches",
        "min", "max"
    )?;
    for c in cases {
        writeln!(
            f,
            "{:>4} {:<10} {:<10} {:<6} {:<4} {:>10.3} {:>10.3} {:>10.3} {:>8.1} {:>5} {:>5}",
            c.case,
            c.detector,
            c.descriptor,
            c.matcher,
            c.selector,
            c.mean_detector_ms,
            c.mean_descriptor_ms,
            c.total_ms,
            c.mean_matches,
            c.min_matches,
            c.max_matches
        )?;
    }
    Ok(())
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Keypoints per detector")?;
        writeln!(
            f,
            "{:<10} {:>6} {:>8} {:>8} {:>6} {:>6} {:>9} {:>9}",
            "detector", "images", "total", "mean", "min", "max", "mean size", "std size"
        )?;
        for d in &self.detectors {
            writeln!(
                f,
                "{:<10} {:>6} {:>8} {:>8.1} {:>6} {:>6} {:>9.3} {:>9.3}",
                d.detector,
                d.images,
                d.total_keypoints,
                d.mean_keypoints,
                d.min_keypoints,
                d.max_keypoints,
                d.mean_size,
                d.std_dev_size
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Cases")?;
        write_cases(f, &self.cases)?;
        writeln!(f)?;
        writeln!(f, "Cases by duration")?;
        write_cases(f, self.cases_by_duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{KeypointSizeStats, RecordSink, ReportWriter};
    use approx::assert_relative_eq;

    fn record(case: usize, detector: Detector, keypoints: usize, mean: f64, std_dev: f64) -> ResultRecord {
        ResultRecord {
            case,
            image: 1,
            detector,
            descriptor: DescriptorType::Brief,
            matcher: MatcherKind::BruteForce,
            selector: SelectorKind::NearestNeighbor,
            detector_ms: case as f64 + 1.0,
            descriptor_ms: 0.5,
            matching_ms: 0.1,
            keypoints,
            size: KeypointSizeStats { mean, std_dev },
            matches: keypoints / 2,
        }
    }

    #[test]
    fn pooled_size_statistics() {
        let records = vec![
            record(0, Detector::Fast, 2, 7.0, 0.0),
            record(0, Detector::Fast, 4, 10.0, 2.0),
            record(1, Detector::Orb, 0, -1.0, -1.0),
        ];
        let summary = ReportSummary::from_records(&records);
        let fast = &summary.detectors[0];
        assert_eq!(fast.detector, Detector::Fast);
        assert_eq!(fast.total_keypoints, 6);
        assert_eq!((fast.min_keypoints, fast.max_keypoints), (2, 4));
        assert_relative_eq!(fast.mean_keypoints, 3.0);
        assert_relative_eq!(fast.mean_size, 9.0);
        assert_relative_eq!(fast.std_dev_size, (28.0f64 / 6.0).sqrt());
        let orb = &summary.detectors[1];
        assert_eq!(orb.total_keypoints, 0);
        assert_eq!((orb.mean_size, orb.std_dev_size), (-1.0, -1.0));
    }

    #[test]
    fn case_statistics_and_ordering() {
        let records = vec![
            record(1, Detector::Orb, 10, 5.0, 0.0),
            record(0, Detector::Fast, 2, 7.0, 0.0),
            record(0, Detector::Fast, 4, 7.0, 0.0),
        ];
        let summary = ReportSummary::from_records(&records);
        assert_eq!(summary.cases.len(), 2);
        let first = &summary.cases[0];
        assert_eq!(first.case, 0);
        assert_relative_eq!(first.total_ms, 1.5);
        assert_relative_eq!(first.mean_matches, 1.5);
        assert_eq!((first.min_matches, first.max_matches), (1, 2));
        let by_duration: Vec<usize> = summary.cases_by_duration().iter().map(|c| c.case).collect();
        assert_eq!(by_duration, vec![0, 1]);
    }

    #[test]
    fn summarizes_written_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut writer = ReportWriter::create(&path).unwrap();
        writer.append(&record(0, Detector::Fast, 2, 7.0, 0.0)).unwrap();
        writer.append(&record(0, Detector::Fast, 4, 7.0, 0.0)).unwrap();
        writer.into_inner().unwrap();
        let summary = summarize(&path).unwrap();
        assert_eq!(summary.detectors[0].images, 2);
        assert_eq!(summary.cases.len(), 1);

        let empty = dir.path().join("empty.csv");
        ReportWriter::create(&empty).unwrap().into_inner().unwrap();
        assert!(matches!(summarize(&empty), Err(Error::Report { .. })));
    }

    #[test]
    fn groups_keep_first_appearance() {
        let records = vec![
            record(2, Detector::Orb, 1, 7.0, 0.0),
            record(0, Detector::Fast, 1, 7.0, 0.0),
            record(1, Detector::Orb, 1, 7.0, 0.0),
        ];
        let groups = group_by(&records, |r| r.detector);
        let order: Vec<(Detector, usize)> = groups.iter().map(|(d, m)| (*d, m.len())).collect();
        assert_eq!(order, vec![(Detector::Orb, 2), (Detector::Fast, 1)]);
        assert_eq!(groups[0].1[1].case, 1);
    }
}
