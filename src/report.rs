//! The CSV report written while benchmarking.

use crate::algorithm::{DescriptorType, Detector, MatcherKind, SelectorKind};
use crate::{Error, Keypoint, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// The column names, in row order.
pub const COLUMNS: [&str; 13] = [
    "Case",
    "Image",
    "Detector",
    "Descriptor",
    "Matcher",
    "Selector",
    "Detector Duration (ms)",
    "Descriptor Duration (ms)",
    "Matching Duration (ms)",
    "Keypoints",
    "Mean Size",
    "StdDev Size",
    "Matches",
];

/// The header line, with every column name in single quotes.
pub fn header() -> String {
    COLUMNS
        .iter()
        .map(|column| format!("'{}'", column))
        .collect::<Vec<_>>()
        .join(",")
}

/// Mean and population standard deviation of keypoint diameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeypointSizeStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl KeypointSizeStats {
    /// Reported when there are no keypoints.
    pub const EMPTY: Self = Self {
        mean: -1.0,
        std_dev: -1.0,
    };

    pub fn from_sizes(sizes: impl IntoIterator<Item = f32>) -> Self {
        let sizes: Vec<f64> = sizes.into_iter().map(f64::from).collect();
        if sizes.is_empty() {
            return Self::EMPTY;
        }
        let n = sizes.len() as f64;
        let mean = sizes.iter().sum::<f64>() / n;
        let variance = sizes.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }

    pub fn from_keypoints(keypoints: &[Keypoint]) -> Self {
        Self::from_sizes(keypoints.iter().map(|kp| kp.size))
    }
}

/// The measurements of one image of one configuration.
///
/// Every value is copied out of the frames when the record is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ReportRow", from = "ReportRow")]
pub struct ResultRecord {
    pub case: usize,
    pub image: usize,
    pub detector: Detector,
    pub descriptor: DescriptorType,
    pub matcher: MatcherKind,
    pub selector: SelectorKind,
    pub detector_ms: f64,
    pub descriptor_ms: f64,
    pub matching_ms: f64,
    pub keypoints: usize,
    pub size: KeypointSizeStats,
    pub matches: usize,
}

/// The flat shape of a record in the report, named by the quoted columns.
#[derive(Serialize, Deserialize)]
struct ReportRow {
    #[serde(rename = "'Case'")]
    case: usize,
    #[serde(rename = "'Image'")]
    image: usize,
    #[serde(rename = "'Detector'")]
    detector: Detector,
    #[serde(rename = "'Descriptor'")]
    descriptor: DescriptorType,
    #[serde(rename = "'Matcher'")]
    matcher: MatcherKind,
    #[serde(rename = "'Selector'")]
    selector: SelectorKind,
    #[serde(rename = "'Detector Duration (ms)'")]
    detector_ms: f64,
    #[serde(rename = "'Descriptor Duration (ms)'")]
    descriptor_ms: f64,
    #[serde(rename = "'Matching Duration (ms)'")]
    matching_ms: f64,
    #[serde(rename = "'Keypoints'")]
    keypoints: usize,
    #[serde(rename = "'Mean Size'")]
    mean_size: f64,
    #[serde(rename = "'StdDev Size'")]
    std_dev_size: f64,
    #[serde(rename = "'Matches'")]
    matches: usize,
}

impl From<ResultRecord> for ReportRow {
    fn from(record: ResultRecord) -> Self {
        Self {
            case: record.case,
            image: record.image,
            detector: record.detector,
            descriptor: record.descriptor,
            matcher: record.matcher,
            selector: record.selector,
            detector_ms: record.detector_ms,
            descriptor_ms: record.descriptor_ms,
            matching_ms: record.matching_ms,
            keypoints: record.keypoints,
            mean_size: record.size.mean,
            std_dev_size: record.size.std_dev,
            matches: record.matches,
        }
    }
}

impl From<ReportRow> for ResultRecord {
    fn from(row: ReportRow) -> Self {
        Self {
            case: row.case,
            image: row.image,
            detector: row.detector,
            descriptor: row.descriptor,
            matcher: row.matcher,
            selector: row.selector,
            detector_ms: row.detector_ms,
            descriptor_ms: row.descriptor_ms,
            matching_ms: row.matching_ms,
            keypoints: row.keypoints,
            size: KeypointSizeStats {
                mean: row.mean_size,
                std_dev: row.std_dev_size,
            },
            matches: row.matches,
        }
    }
}

/// Somewhere complete records go.
pub trait RecordSink {
    fn append(&mut self, record: &ResultRecord) -> Result<()>;
}

impl RecordSink for Vec<ResultRecord> {
    fn append(&mut self, record: &ResultRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes the header once and then one row per record.
#[derive(Debug)]
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl ReportWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        writer.write_record(COLUMNS.iter().map(|column| format!("'{}'", column)))?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    /// The number of rows written so far, not counting the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl<W: Write> RecordSink for ReportWriter<W> {
    fn append(&mut self, record: &ResultRecord) -> Result<()> {
        // The row is buffered in full before it reaches the file.
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

/// Reads the records of a report, skipping the quoted header and blank lines.
pub fn read_records(reader: impl Read) -> Result<Vec<ResultRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    reader
        .deserialize::<ResultRecord>()
        .map(|record| {
            record.map_err(|e| Error::Report {
                line: e.position().map_or(0, |position| position.line() as usize),
                reason: e.to_string(),
            })
        })
        .collect()
}
