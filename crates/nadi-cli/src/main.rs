use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};
use nadi_lib::{
    classify, condition,
    detectors::EstimatorSet,
    fuse,
    io::{recording, text as text_io},
    plot::{figure_from_window, Figure, Series},
    synth::{synthetic_frames, SynthConfig},
    FrameReading, MeasurementSession, PulseMetrics, SessionConfig, SessionState,
};
use plotters::prelude::*;
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "nadi",
    version,
    about = "Nadi: camera PPG pulse measurement tools"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Recording CSV (timestamp_ms,brightness[,finger]); stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,
    /// Bare brightness values (whitespace or comma separated) stamped at --fps
    #[arg(long, conflicts_with = "input")]
    series: Option<PathBuf>,
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recording through a measurement session and print the outcome
    Measure {
        #[command(flatten)]
        input: InputArgs,
        /// Session configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the three rate estimators and the fusion over a whole recording
    Estimate {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Score pulse metrics onto Vata/Pitta/Kapha
    Dosha {
        #[arg(long)]
        hr: u32,
        #[arg(long)]
        hrv_ms: f64,
        #[arg(long)]
        strength: f64,
        #[arg(long)]
        regularity: f64,
    },
    /// Write a synthetic fingertip recording as CSV
    Simulate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 20_000)]
        duration_ms: i64,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        /// Uniform noise half-width as a fraction of the pulse amplitude
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render the conditioned waveform and detected beats to a PNG via plotters
    Plot {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str())).init();
    match cli.command {
        Commands::Measure { input, config } => cmd_measure(&input, config.as_deref())?,
        Commands::Estimate { input } => cmd_estimate(&input)?,
        Commands::Dosha {
            hr,
            hrv_ms,
            strength,
            regularity,
        } => cmd_dosha(hr, hrv_ms, strength, regularity)?,
        Commands::Simulate {
            bpm,
            duration_ms,
            fps,
            noise,
            seed,
            out,
        } => cmd_simulate(
            SynthConfig {
                bpm,
                duration_ms,
                fps,
                noise,
                seed,
                ..SynthConfig::default()
            },
            out.as_deref(),
        )?,
        Commands::Plot { input, out } => cmd_plot(&input, &out)?,
    }
    Ok(())
}

fn load_frames(args: &InputArgs) -> Result<Vec<FrameReading>> {
    if let Some(path) = &args.series {
        let values = text_io::read_brightness_series(path)?;
        return Ok(text_io::frames_from_series(&values, args.fps));
    }
    match &args.input {
        Some(path) => recording::read_recording(path),
        None => recording::parse_recording(io::stdin().lock()).context("reading stdin"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_measure(input: &InputArgs, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let frames = load_frames(input)?;
    let mut session = MeasurementSession::new(config)?;
    loop {
        replay(&mut session, &frames);
        let outcome = session.complete_session();
        if outcome.state != SessionState::InsufficientData {
            return print_json(&outcome);
        }
        warn!(
            "retrying capture ({} of {} attempts used)",
            outcome.attempt,
            session.config().max_attempts
        );
        session.reset_session(true);
    }
}

/// Feed a recording through one capture window, ticking at every frame.
fn replay(session: &mut MeasurementSession, frames: &[FrameReading]) {
    let start = frames.first().map(|f| f.timestamp_ms).unwrap_or(0);
    session.start_session(start);
    for frame in frames {
        if session.is_window_elapsed(frame.timestamp_ms) {
            info!("capture window closed at {} ms", frame.timestamp_ms);
            break;
        }
        session.ingest_frame(*frame);
        session.tick(frame.timestamp_ms);
    }
}

#[derive(Serialize)]
struct EstimateReport {
    sample_count: usize,
    sample_rate: f64,
    spectral: nadi_lib::RateEstimate,
    autocorrelation: nadi_lib::RateEstimate,
    peaks: nadi_lib::detectors::PeakAnalysis,
    fused: nadi_lib::FusedEstimate,
}

fn cmd_estimate(input: &InputArgs) -> Result<()> {
    let frames = load_frames(input)?;
    let samples: Vec<_> = frames.iter().map(FrameReading::sample).collect();
    let window = condition(&samples, input.fps);
    let estimates = EstimatorSet::default().run(&window);
    let fused = fuse(&estimates);
    print_json(&EstimateReport {
        sample_count: window.len(),
        sample_rate: window.sample_rate,
        spectral: estimates.spectral,
        autocorrelation: estimates.autocorrelation,
        peaks: estimates.peaks,
        fused,
    })
}

fn cmd_dosha(hr: u32, hrv_ms: f64, strength: f64, regularity: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&strength) || !(0.0..=1.0).contains(&regularity) {
        bail!("strength and regularity must lie in [0, 1]");
    }
    let metrics = PulseMetrics {
        heart_rate_bpm: hr,
        hrv_ms,
        pulse_strength: strength,
        regularity,
    };
    print_json(&classify(&metrics))
}

fn cmd_simulate(cfg: SynthConfig, out: Option<&Path>) -> Result<()> {
    if cfg.fps <= 0.0 || cfg.duration_ms <= 0 {
        bail!("fps and duration must be positive");
    }
    let frames = synthetic_frames(&cfg);
    match out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            recording::write_recording(file, &frames)
        }
        None => recording::write_recording(io::stdout().lock(), &frames),
    }
}

fn cmd_plot(input: &InputArgs, out: &Path) -> Result<()> {
    let frames = load_frames(input)?;
    let samples: Vec<_> = frames.iter().map(FrameReading::sample).collect();
    let window = condition(&samples, input.fps);
    let peaks = EstimatorSet::default().peaks.analyze(&window);
    let fig = figure_from_window(&window, &peaks.peak_timestamps_ms, 2048);
    draw_plotters_figure(out, &fig)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let (x_min, x_max, y_min, y_max) = fig.bounds().context("nothing to plot")?;
    let (x_max, y_max) = (x_max.max(x_min + 1e-6), y_max.max(y_min + 1e-6));
    let backend = BitMapBackend::new(path, (1000, 420));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    &RGBColor(r, g, b),
                ))?;
            }
            Series::Markers(markers) => {
                let (r, g, b) = markers.style.color.rgb();
                let size = markers.style.width.round() as i32;
                chart.draw_series(
                    markers
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), size, RGBColor(r, g, b).filled())),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
