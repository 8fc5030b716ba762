use feature_bench::algorithm::{DescriptorType, Detector, MatcherKind, SelectorKind};
use feature_bench::config::default_data_root;
use feature_bench::{
    driver, summary, FeatureBackend, Pipeline, Result, RustCvBackend, Settings,
    TestConfiguration,
};
use log::*;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "feature-bench",
    about = "A tool to benchmark keypoint detectors, descriptors and matchers",
    rename_all = "kebab-case"
)]
enum Opt {
    /// Runs every configuration over the image sequence and writes a CSV report.
    Run(RunOpt),
    /// Prints keypoint statistics per detector and timings per case of a report.
    Summarize {
        /// The report written by `run`.
        #[structopt(parse(from_os_str))]
        report: PathBuf,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct RunOpt {
    /// The directory holding the `images` directory.
    ///
    /// Defaults to the FEATURE_BENCH_DATA_ROOT environment variable, then to the
    /// current directory.
    #[structopt(long, parse(from_os_str))]
    data_root: Option<PathBuf>,
    /// The directory the report is written to.
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    output_dir: PathBuf,
    /// The file where settings are specified.
    ///
    /// This is in the format of `feature_bench::Settings`.
    #[structopt(short, long, default_value = "feature-bench-settings.json", parse(from_os_str))]
    settings: PathBuf,
    /// Comma separated detectors to run, all of them if not given.
    #[structopt(long, use_delimiter = true)]
    detectors: Vec<Detector>,
    /// Comma separated descriptors to cross with the detectors.
    ///
    /// AKAZE descriptors are always run on AKAZE keypoints.
    #[structopt(long, use_delimiter = true)]
    descriptors: Vec<DescriptorType>,
    /// BF or FLANN.
    #[structopt(long, default_value = "BF")]
    matcher: MatcherKind,
    /// NN or KNN.
    #[structopt(long, default_value = "KNN")]
    selector: SelectorKind,
    /// Keep keypoints outside of the preceding vehicle.
    #[structopt(long)]
    no_roi: bool,
    /// Keep at most 50 keypoints per image.
    #[structopt(long)]
    limit_keypoints: bool,
    /// Write an image of the matches of every frame pair to this directory.
    #[structopt(long, parse(from_os_str))]
    visualize: Option<PathBuf>,
    /// rustcv or opencv.
    #[structopt(long, default_value = "rustcv")]
    backend: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    RustCv,
    OpenCv,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "rustcv" => Ok(Self::RustCv),
            "opencv" => Ok(Self::OpenCv),
            other => Err(format!("unknown backend `{}`", other)),
        }
    }
}

fn make_backend(kind: BackendKind, settings: &Settings) -> Result<Box<dyn FeatureBackend>> {
    match kind {
        BackendKind::RustCv => Ok(Box::new(RustCvBackend::new(
            settings.fast_threshold,
            settings.akaze_threshold,
        ))),
        #[cfg(feature = "opencv")]
        BackendKind::OpenCv => Ok(Box::new(feature_bench::OpenCvBackend::new(
            settings.fast_threshold,
        ))),
        #[cfg(not(feature = "opencv"))]
        BackendKind::OpenCv => Err(feature_bench::Error::Backend(
            "feature-bench was built without the opencv feature".to_owned(),
        )),
    }
}

fn run(opt: RunOpt) -> Result<()> {
    let settings = Settings::load(&opt.settings);
    let template = TestConfiguration {
        matcher: opt.matcher,
        selector: opt.selector,
        restrict_to_roi: !opt.no_roi,
        limit_keypoints: opt.limit_keypoints,
        visualize: opt.visualize.is_some(),
        data_root: opt.data_root.unwrap_or_else(default_data_root),
        ..TestConfiguration::default()
    };
    let detectors = if opt.detectors.is_empty() {
        Detector::ALL.to_vec()
    } else {
        opt.detectors
    };
    let descriptors = if opt.descriptors.is_empty() {
        DescriptorType::CROSSED.to_vec()
    } else {
        opt.descriptors
    };
    let configurations = driver::enumerate_configurations(&detectors, &descriptors, &template);
    info!(
        "reading images from {}",
        settings.sequence.path(&template.data_root, settings.sequence.first).display()
    );

    let backend = make_backend(opt.backend, &settings)?;
    let mut pipeline = Pipeline::new(backend, settings.sequence);
    if let Some(dir) = opt.visualize {
        pipeline = pipeline.visualization_dir(dir);
    }
    let summary = driver::run_benchmark(&mut pipeline, &configurations, &opt.output_dir)?;
    info!(
        "{} of {} configurations completed, {} aborted",
        summary.completed, summary.configurations, summary.aborted
    );
    println!("{} rows written to {}", summary.rows, summary.report.display());
    Ok(())
}

fn summarize(report: &Path) -> Result<()> {
    let summary = summary::summarize(report)?;
    print!("{}", summary);
    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    let result = match opt {
        Opt::Run(opt) => run(opt),
        Opt::Summarize { report } => summarize(&report),
    };
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
