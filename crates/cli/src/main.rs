mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;

use deepfake_scan_core::pipeline::infrastructure::sequential_pipeline_executor::SequentialPipelineExecutor;
use deepfake_scan_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use deepfake_scan_core::pipeline::pipeline_executor::PipelineExecutor;
use deepfake_scan_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use deepfake_scan_core::pipeline::scan_options::{ScanOptions, ScoringPolicy};
use deepfake_scan_core::pipeline::scan_video_use_case::ScanVideoUseCase;
use deepfake_scan_core::scoring::domain::frame_preprocessor::{
    ChannelOrder, FramePreprocessor, PreprocessConfig,
};
use deepfake_scan_core::scoring::infrastructure::scorer_cache::ScorerCache;
use deepfake_scan_core::shared::constants::SCORER_MODEL_NAME;
use deepfake_scan_core::shared::model_resolver::ModelResolver;
use deepfake_scan_core::verdict::domain::detection_result::DetectionResult;
use deepfake_scan_core::video::domain::video_reader::VideoReader;
use deepfake_scan_core::video::infrastructure::ffmpeg_reader::FfmpegReader;

use settings::Settings;

/// Scores a video with a deepfake frame classifier and reports whether it
/// looks real or fake.
#[derive(Parser, Debug)]
#[command(name = "deepfake-scan")]
struct Cli {
    /// Input video (mp4, mov, avi or mpeg).
    input: PathBuf,

    /// ONNX classifier to use instead of the cached one.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Where to download the classifier from when it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Channel order the classifier expects: rgb or bgr.
    #[arg(long)]
    channel_order: Option<ChannelOrder>,

    /// Element of the model output read as the fake probability.
    #[arg(long)]
    output_index: Option<usize>,

    /// Frames scored per inference call.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Give up after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip frames the classifier fails on instead of aborting.
    #[arg(long)]
    best_effort: bool,

    /// Decode and score on one thread.
    #[arg(long)]
    sequential: bool,

    /// Write the full result as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the result as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = merge(Settings::load(cli.config.as_deref())?, &cli);
    validate(&cli, &settings)?;

    let model_path = resolve_model(&settings)?;
    let cache = ScorerCache::onnx(&model_path, settings.output_index);
    let scorer = cache.get()?;

    let executor: Box<dyn PipelineExecutor> = if settings.sequential {
        Box::new(SequentialPipelineExecutor)
    } else {
        Box::new(ThreadedPipelineExecutor::new())
    };
    let preprocessor = FramePreprocessor::new(PreprocessConfig {
        channel_order: settings.channel_order,
        ..PreprocessConfig::default()
    });

    let mut use_case = ScanVideoUseCase::new(
        Box::new(|| Box::new(FfmpegReader::new()) as Box<dyn VideoReader>),
        Box::new(scorer),
        executor,
    )
    .with_preprocessor(preprocessor)
    .with_logger(Box::new(StdoutPipelineLogger::default()));

    let show_progress = !cli.json;
    let options = ScanOptions {
        timeout: settings.timeout_secs.map(Duration::from_secs),
        scoring_policy: if settings.best_effort {
            ScoringPolicy::BestEffort
        } else {
            ScoringPolicy::Strict
        },
        batch_size: settings.batch_size,
        on_progress: Some(Box::new(move |current: usize, total: usize| {
            if show_progress {
                if total > 0 {
                    eprint!("\rScoring frame {current}/{total}");
                } else {
                    eprint!("\rScoring frame {current}");
                }
            }
            true
        })),
        ..ScanOptions::default()
    };

    let result = use_case.run(&cli.input, &options);
    if show_progress {
        eprintln!();
    }
    cache.shutdown();

    if let Some(report) = &cli.report {
        write_report(&result, report)?;
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    match result.error() {
        Some(e) => Err(e.clone().into()),
        None => Ok(()),
    }
}

/// Flags win over the settings file.
fn merge(mut settings: Settings, cli: &Cli) -> Settings {
    if cli.model.is_some() {
        settings.model_path = cli.model.clone();
    }
    if cli.model_url.is_some() {
        settings.model_url = cli.model_url.clone();
    }
    if let Some(order) = cli.channel_order {
        settings.channel_order = order;
    }
    if let Some(index) = cli.output_index {
        settings.output_index = index;
    }
    if let Some(size) = cli.batch_size {
        settings.batch_size = size;
    }
    if cli.timeout_secs.is_some() {
        settings.timeout_secs = cli.timeout_secs;
    }
    settings.best_effort |= cli.best_effort;
    settings.sequential |= cli.sequential;
    settings
}

fn validate(cli: &Cli, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if settings.batch_size == 0 {
        return Err("Batch size must be at least 1".into());
    }
    if settings.timeout_secs == Some(0) {
        return Err("Timeout must be at least 1 second".into());
    }
    if let Some(report) = &cli.report {
        if report.is_dir() {
            return Err(format!("Report path is a directory: {}", report.display()).into());
        }
    }
    Ok(())
}

fn resolve_model(settings: &Settings) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {SCORER_MODEL_NAME}");
    let mut resolver = ModelResolver::new()?;
    if let Some(dir) = bundled_model_dir() {
        resolver = resolver.with_bundled_dir(dir);
    }
    let path = resolver.resolve(
        settings.model_path.as_deref(),
        SCORER_MODEL_NAME,
        settings.model_url.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    log::info!("Using model {}", path.display());
    Ok(path)
}

/// `models/` next to the executable, for packaged installs.
fn bundled_model_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
}

fn write_report(result: &DetectionResult, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, serde_json::to_string_pretty(result)?)?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

fn print_result(result: &DetectionResult) {
    if let (Some(label), Some(confidence)) = (result.label(), result.confidence_percent()) {
        println!("Detection:  {label}");
        println!("Confidence: {confidence:.2}%");
        println!("Frames:     {}", result.frame_scores().len());
        if !result.skipped_frames().is_empty() {
            println!(
                "Skipped:    {} frames the classifier could not score",
                result.skipped_frames().len()
            );
        }
        if let Some(interpretation) = result.interpretation() {
            println!();
            println!("{}", interpretation.describe());
        }
    } else if !result.frame_scores().is_empty() {
        println!(
            "No verdict; {} frames were scored before the scan stopped.",
            result.frame_scores().len()
        );
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading deepfake classifier... {pct}%");
    } else {
        eprint!("\rDownloading deepfake classifier... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
