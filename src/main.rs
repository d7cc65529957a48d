//! Vibration Monitor CLI
//!
//! Command-line front end for capturing vibration data from a network
//! camera and querying machine health from the recorded series.

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use vibration_monitor::{
    analysis::{HealthAssessment, HealthEvaluator, ScoringPolicy},
    capture::{FileConfig, FrameSource, MockSource},
    metrics::{MetricsRegistry, MetricsSink},
    monitor::{CancelToken, CaptureRequest, Monitor, Outcome, SampleSink, SinkError},
    series::{SeriesLog, SeriesRead, SeriesSummary, HEADER_FIELDS, TIMESTAMP_FORMAT},
};

const EXIT_ERROR: u8 = 1;
const EXIT_NO_DATA: u8 = 2;

#[derive(Parser)]
#[command(name = "vibration-monitor", version, about = "Camera-based machine vibration monitoring")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Series log file (overrides the config file).
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture vibration samples from the camera stream.
    Capture(CaptureArgs),
    /// Evaluate machine health from the recorded series.
    Health(HealthArgs),
    /// Print the most recent samples.
    Tail {
        /// Number of samples to print.
        #[arg(short, default_value_t = 20)]
        n: usize,
    },
    /// Summary statistics, health and recent health trend.
    Report(HealthArgs),
    /// Discard all recorded samples.
    Reset,
}

#[derive(Args)]
struct CaptureArgs {
    /// Camera IP/host or full stream URL.
    #[arg(long)]
    address: Option<String>,
    /// Capture duration in seconds.
    #[arg(long)]
    duration: Option<u64>,
    /// Minimum delay between samples in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Use synthetic frames instead of a camera.
    #[arg(long)]
    mock: bool,
    /// Do not print each sample.
    #[arg(long)]
    quiet: bool,
    /// Serve Prometheus metrics on this port while capturing (0 disables).
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[derive(Args)]
struct HealthArgs {
    /// Intensity above which the latest sample is a fault.
    #[arg(long)]
    threshold: Option<f64>,
    /// Samples averaged by the windowed policy.
    #[arg(long)]
    window: Option<usize>,
    /// Scoring policy: windowed-ratio or linear.
    #[arg(long)]
    policy: Option<ScoringPolicy>,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid configuration {}: {}", path.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(path) = cli.log {
        config.log.path = path;
    }

    match cli.command {
        Command::Capture(args) => capture(config, args),
        Command::Health(args) => health(config, args),
        Command::Tail { n } => tail(&config, n),
        Command::Report(args) => report(config, args),
        Command::Reset => reset(&config),
    }
}

fn capture(mut config: FileConfig, args: CaptureArgs) -> ExitCode {
    if let Some(address) = args.address {
        config.capture.address = address;
    }
    if let Some(duration) = args.duration {
        config.capture.duration_secs = duration;
    }
    if let Some(interval) = args.interval_ms {
        config.capture.min_interval_ms = interval;
    }
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }
    if args.quiet {
        config.output.print_samples = false;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid capture settings: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    info!("Vibration Monitor v{}", vibration_monitor::VERSION);

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to set up metrics: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    serve_metrics(config.output.metrics_port, &registry);

    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Ctrl-C handler unavailable: {}", e);
    }

    let mut source: Box<dyn FrameSource> = if args.mock {
        info!("Using synthetic frames");
        Box::new(MockSource::new(160, 120))
    } else {
        match network_source(&config) {
            Some(source) => source,
            None => {
                eprintln!("This build has no network camera support; use --mock");
                return ExitCode::from(EXIT_ERROR);
            }
        }
    };

    let request = CaptureRequest::from_config(&config);
    let mut monitor = Monitor::from_config(&config).with_cancel_token(token);
    let history = match monitor.log().read_all() {
        Ok(read) => read.series,
        Err(e) => {
            warn!(error = %e, "Starting health metrics without history");
            Default::default()
        }
    };
    let mut sink = CliSink {
        print: config.output.print_samples,
        metrics: registry.health_sink(history, &config.health),
    };

    println!(
        "Capturing from {} for {} s...",
        request.address, config.capture.duration_secs
    );
    let report = monitor.run(&mut source, &request, &mut sink);
    registry.record_run(&report);
    if let Some(health) = registry.refresh_health(monitor.log(), &config.health) {
        info!(
            score = health.score,
            classification = %health.classification,
            "Health after capture"
        );
    }

    match &report.outcome {
        Outcome::Completed(how) => {
            println!(
                "Capture complete ({:?}): {} samples saved to {}",
                how,
                report.samples_written,
                config.log.path.display()
            );
            ExitCode::SUCCESS
        }
        Outcome::Aborted(e) => {
            eprintln!("Capture failed: {}", e);
            if report.samples_written > 0 {
                eprintln!(
                    "{} samples captured before the failure were kept in {}",
                    report.samples_written,
                    config.log.path.display()
                );
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(feature = "mjpeg")]
fn network_source(config: &FileConfig) -> Option<Box<dyn FrameSource>> {
    Some(Box::new(vibration_monitor::capture::MjpegSource::new(
        &config.capture,
    )))
}

#[cfg(not(feature = "mjpeg"))]
fn network_source(_config: &FileConfig) -> Option<Box<dyn FrameSource>> {
    None
}

#[cfg(feature = "metrics")]
fn serve_metrics(port: u16, registry: &MetricsRegistry) {
    use vibration_monitor::metrics::{MetricsServer, MetricsServerConfig};

    if port != 0 {
        MetricsServer::new(MetricsServerConfig::with_port(port), registry.clone()).spawn();
    }
}

#[cfg(not(feature = "metrics"))]
fn serve_metrics(port: u16, _registry: &MetricsRegistry) {
    if port != 0 {
        warn!(port, "Built without the metrics feature; not serving metrics");
    }
}

/// Prints samples and forwards them to the metrics registry.
struct CliSink {
    print: bool,
    metrics: MetricsSink,
}

impl SampleSink for CliSink {
    fn notify(&mut self, timestamp: NaiveDateTime, intensity: f64) -> Result<(), SinkError> {
        if self.print {
            println!(
                "{} - Intensity: {:.2}",
                timestamp.format(TIMESTAMP_FORMAT),
                intensity
            );
        }
        self.metrics.notify(timestamp, intensity)
    }
}

/// Reads the log, mapping "nothing yet" and read errors to exit codes.
fn load(log: &SeriesLog) -> Result<SeriesRead, ExitCode> {
    match log.read_all() {
        Ok(read) if read.has_no_data() => {
            println!(
                "No vibration data found in {} yet. Run a capture first.",
                log.path().display()
            );
            Err(ExitCode::from(EXIT_NO_DATA))
        }
        Ok(read) => Ok(read),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(ExitCode::from(EXIT_ERROR))
        }
    }
}

fn assess(
    config: &mut FileConfig,
    args: HealthArgs,
    read: &SeriesRead,
) -> Result<HealthAssessment, ExitCode> {
    if let Some(threshold) = args.threshold {
        config.health.threshold = threshold;
    }
    if let Some(window) = args.window {
        config.health.window = window;
    }
    if let Some(policy) = args.policy {
        config.health.policy = policy;
    }

    HealthEvaluator::new(config.health.policy)
        .evaluate(&read.series, config.health.threshold, config.health.window)
        .map_err(|e| {
            eprintln!("Health evaluation failed: {}", e);
            ExitCode::from(EXIT_ERROR)
        })
}

fn print_assessment(health: &HealthAssessment) {
    println!("Avg vibration:     {:.2}", health.summary.mean);
    println!("Peak vibration:    {:.2}", health.summary.peak);
    println!("Current intensity: {:.2}", health.summary.current);
    println!("Health score:      {:.1} % ({})", health.score, health.policy);
    println!(
        "Status:            {} - {}",
        health.classification,
        health.classification.status()
    );
    if let Some(spike) = &health.spike {
        println!("ALERT: {}", spike);
    }
}

fn health(mut config: FileConfig, args: HealthArgs) -> ExitCode {
    let log = SeriesLog::new(&config.log.path);
    let read = match load(&log) {
        Ok(read) => read,
        Err(code) => return code,
    };
    match assess(&mut config, args, &read) {
        Ok(health) => {
            print_assessment(&health);
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn tail(config: &FileConfig, n: usize) -> ExitCode {
    let log = SeriesLog::new(&config.log.path);
    let read = match load(&log) {
        Ok(read) => read,
        Err(code) => return code,
    };
    let mut out = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(std::io::stdout().lock());
    let written = out.write_record(HEADER_FIELDS).and_then(|_| {
        read.series
            .tail(n)
            .iter()
            .try_for_each(|sample| out.write_record(sample.to_record()))
    });
    match written.map_err(std::io::Error::from).and_then(|_| out.flush()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn report(mut config: FileConfig, args: HealthArgs) -> ExitCode {
    let log = SeriesLog::new(&config.log.path);
    let read = match load(&log) {
        Ok(read) => read,
        Err(code) => return code,
    };
    let health = match assess(&mut config, args, &read) {
        Ok(health) => health,
        Err(code) => return code,
    };

    print_assessment(&health);
    print_summary(&health.summary);

    println!();
    println!("Health trend (last 50 readings):");
    for (timestamp, score) in HealthEvaluator::trend(read.series.tail(50)) {
        println!("  {}  {:>5.1}", timestamp.format(TIMESTAMP_FORMAT), score);
    }
    if read.skipped_rows > 0 {
        println!("({} unreadable rows ignored)", read.skipped_rows);
    }
    ExitCode::SUCCESS
}

fn print_summary(summary: &SeriesSummary) {
    println!();
    println!("Statistical summary:");
    println!("  count  {}", summary.count);
    println!("  mean   {:.2}", summary.mean);
    println!("  std    {:.2}", summary.std_dev);
    println!("  min    {:.2}", summary.min);
    println!("  25%    {:.2}", summary.p25);
    println!("  50%    {:.2}", summary.median);
    println!("  75%    {:.2}", summary.p75);
    println!("  max    {:.2}", summary.peak);
}

fn reset(config: &FileConfig) -> ExitCode {
    match SeriesLog::new(&config.log.path).reset() {
        Ok(()) => {
            println!("Cleared {}", config.log.path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
