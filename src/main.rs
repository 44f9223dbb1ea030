//! Heart Sound Classifier CLI Application

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use heartsound_rs::config::OutputFormat;
use heartsound_rs::{
    load_model, Config, FeaturePipeline, JsonFileStore, OutputWriter, Pipeline, ReportStore,
};

/// Heart Sound Classifier
#[derive(Parser)]
#[command(name = "heartsound")]
#[command(about = "Classify stethoscope recordings into heart sound categories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a raw PCM capture ("-" reads stdin)
    Classify {
        /// Headerless little-endian 16-bit PCM
        input: String,

        /// Path to the XGBoost JSON model
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Where the last result is stored
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Gain applied before clipping
        #[arg(short, long)]
        gain: Option<f32>,

        /// Also write the amplified capture as a WAV file
        #[arg(long)]
        wav: Option<PathBuf>,
    },

    /// Print the last stored result
    Last {
        /// Where the last result is stored
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },

    /// Print the feature vector of a capture as JSON
    Features {
        /// Headerless little-endian 16-bit PCM ("-" reads stdin)
        input: String,
    },

    /// Convert a raw capture into a WAV file
    Convert {
        /// Headerless little-endian 16-bit PCM ("-" reads stdin)
        input: String,

        /// Output WAV file path
        output: PathBuf,

        /// Gain applied before clipping
        #[arg(short, long)]
        gain: Option<f32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging - quiet by default, use -v for more
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    // Load configuration
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Classify {
            input,
            model,
            state,
            format,
            gain,
            wav,
        } => {
            // Apply CLI overrides
            if let Some(model) = model {
                config.classifier.model_path = model;
            }
            if let Some(state) = state {
                config.output.state_path = state;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            if let Some(gain) = gain {
                config.capture.gain = gain;
            }
            if let Some(wav) = wav {
                config.output.wav_path = Some(wav);
            }
            classify_capture(config, &input)
        }
        Commands::Last { state, format } => {
            if let Some(state) = state {
                config.output.state_path = state;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            print_last(config)
        }
        Commands::Features { input } => print_features(config, &input),
        Commands::Convert {
            input,
            output,
            gain,
        } => {
            if let Some(gain) = gain {
                config.capture.gain = gain;
            }
            convert_capture(config, &input, &output)
        }
    }
}

/// Read the whole capture from a file, or from stdin for "-"
fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Failed to read capture from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(input).with_context(|| format!("Failed to read capture from {}", input))
    }
}

/// Classify one capture, store and print the result
fn classify_capture(config: Config, input: &str) -> Result<()> {
    let pcm = read_input(input)?;

    info!(
        "Loading model from: {}",
        config.classifier.model_path.display()
    );
    let model = load_model(&config.classifier.model_path).context("Failed to load model")?;
    let pipeline = Pipeline::new(&config, Arc::new(model)).context("Failed to build pipeline")?;

    let waveform = pipeline
        .encode(&pcm)
        .with_context(|| format!("Failed to decode {}", input))?;
    if let Some(ref wav_path) = config.output.wav_path {
        waveform
            .write_wav(wav_path)
            .with_context(|| format!("Failed to write WAV to {}", wav_path.display()))?;
    }

    let store = JsonFileStore::new(&config.output.state_path);
    let prediction = pipeline
        .classify_waveform_and_record(&waveform, &store)
        .with_context(|| format!("Failed to classify {}", input))?;

    OutputWriter::new(config.output).write(&prediction.report)?;
    Ok(())
}

/// Print the last stored result
fn print_last(config: Config) -> Result<()> {
    let store = JsonFileStore::new(&config.output.state_path);
    let latest = store.latest().with_context(|| {
        format!(
            "Failed to read last result from {}",
            config.output.state_path.display()
        )
    })?;

    match latest {
        Some(record) => OutputWriter::new(config.output).write(&record.to_report())?,
        None => println!("No result recorded yet"),
    }
    Ok(())
}

/// Print the feature vector as a JSON array
fn print_features(config: Config, input: &str) -> Result<()> {
    let pcm = read_input(input)?;
    let front = FeaturePipeline::new(&config).context("Failed to build feature pipeline")?;
    let features = front
        .features(&pcm)
        .with_context(|| format!("Failed to extract features from {}", input))?;

    println!("{}", serde_json::to_string(&features)?);
    Ok(())
}

/// Write the canonical waveform of a capture as WAV
fn convert_capture(config: Config, input: &str, output: &Path) -> Result<()> {
    let pcm = read_input(input)?;
    let front = FeaturePipeline::new(&config).context("Failed to build feature pipeline")?;
    let waveform = front.encode(&pcm)?;

    waveform
        .write_wav(output)
        .with_context(|| format!("Failed to write WAV to {}", output.display()))?;

    info!(
        "Wrote {} samples ({:.2}s) to {}",
        waveform.len(),
        waveform.duration(),
        output.display()
    );
    Ok(())
}
