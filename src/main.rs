use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use helmwatch::config::HelmwatchConfig;
use helmwatch::detector::DetectionClient;
use helmwatch::frame;
use helmwatch::pipeline;
use helmwatch::ui::{AlertOptions, ConsoleUi};
use helmwatch::watch::CaptureLoop;

#[derive(Parser, Debug)]
#[command(name = "helmwatch")]
#[command(about = "Helmet-compliance detection client")]
#[command(version)]
#[command(long_about = "Submits images or live camera frames to a remote \
object-detection service, renders the annotated result, and raises an alert \
when a missing helmet is inferred from the response.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "helmwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a single image file to the detection service
    Detect {
        /// Image file to submit
        file: PathBuf,

        /// Re-encode through the frame-capture path before submitting
        #[arg(long, help = "Decode and re-encode the image at the configured target width")]
        reencode: bool,

        /// Write the annotated response image to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Watch the configured camera and alert on violations until Ctrl-C
    Watch {
        /// Write the latest annotated image to this path on each capture
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args);

    let config = match HelmwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate()?;

    match args.command {
        Some(Command::Detect {
            file,
            reencode,
            output,
        }) => run_detect(&config, &file, reencode, output).await,
        Some(Command::Watch { output }) => run_watch(&config, output).await,
        None => {
            eprintln!("No command given; try `helmwatch detect <file>` or `helmwatch watch`");
            std::process::exit(2);
        }
    }
}

/// One-shot detection of a still image file.
async fn run_detect(
    config: &HelmwatchConfig,
    file: &PathBuf,
    reencode: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let bytes = tokio::fs::read(file).await?;
    info!("Submitting {} ({} bytes)", file.display(), bytes.len());

    let payload = if reencode {
        let captured = frame::decode_to_raw(&bytes)
            .and_then(|raw| frame::capture_video_frame(&raw, config.capture.target_width));
        match captured {
            Some(payload) => payload,
            None => {
                // Capture failure falls back to the original file bytes
                warn!("Frame capture failed; sending the original file");
                frame::still_payload(bytes)
            }
        }
    } else {
        frame::still_payload(bytes)
    };

    let client = DetectionClient::from_config(&config.detector)?;
    let ui = ConsoleUi::new(output);
    pipeline::submit_and_report(
        &client,
        &ui,
        payload,
        AlertOptions::from_config(&config.alert),
    )
    .await;

    Ok(())
}

/// Camera watch mode: run the capture loop until Ctrl-C.
async fn run_watch(config: &HelmwatchConfig, output: Option<PathBuf>) -> Result<()> {
    let client = Arc::new(DetectionClient::from_config(&config.detector)?);
    let ui = Arc::new(ConsoleUi::new(output));

    let mut capture = CaptureLoop::new(
        client,
        ui,
        Duration::from_millis(config.camera.interval_ms),
        AlertOptions::from_config(&config.alert),
    );

    capture.start_camera(&config.camera).await;
    if !capture.is_running() {
        // Acquisition failure was already reported through the UI
        std::process::exit(1);
    }

    info!("Watching {} - press Ctrl-C to stop", config.camera.url);
    tokio::signal::ctrl_c().await?;

    capture.stop().await;
    info!("Watch stopped");
    Ok(())
}

fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helmwatch={}", level)));

    fmt().with_env_filter(filter).init();
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Helmwatch Configuration File");
    println!("# Default configuration with all available options");
    println!();
    match toml::to_string_pretty(&HelmwatchConfig::default()) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => eprintln!("Failed to render default configuration: {}", e),
    }
}
