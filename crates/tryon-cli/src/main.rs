use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tryon_core::presets::{self, find_nail_preset, resolve_hair_color, resolve_nail_color};
use tryon_core::{FrameClock, HairSettings, NailPattern, NailSettings};
use tryon_engine::preload::{self, PreloadState};
use tryon_engine::{
    ActiveModality, Config, DetectionMonitor, DetectionStatus, FrameDriver, FrameProcessor,
    Modality, Providers,
};
use tryon_hw::{Camera, FrameSource, StillSource};
use tryon_render::Canvas;

#[derive(Parser)]
#[command(name = "tryon", about = "Real-time hair color and nail polish try-on")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Look {
    /// Preset name or hex color (e.g. "Ruby Red", "#DC143C")
    #[arg(short, long)]
    color: Option<String>,
    /// Nail pattern; defaults to the preset's pattern or solid
    #[arg(long, value_enum)]
    pattern: Option<PatternArg>,
    /// Overlay opacity, 0..=1
    #[arg(long)]
    opacity: Option<f32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the camera loop until Ctrl-C
    Live {
        /// hair or nails
        modality: Modality,
        #[command(flatten)]
        look: Look,
        /// Write a PNG of the last frame on exit
        #[arg(long)]
        capture: bool,
    },
    /// Render onto a single image and write a PNG
    Still {
        /// hair or nails
        modality: Modality,
        /// Input image path
        input: PathBuf,
        /// Output PNG path (default: capture directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        look: Look,
    },
    /// List built-in color presets
    Presets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load the models a modality needs and report progress
    Models {
        /// hair or nails
        modality: Modality,
    },
    /// Show configuration, model files and cameras
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum PatternArg {
    Solid,
    French,
    Glitter,
    Ombre,
}

impl From<PatternArg> for NailPattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Solid => NailPattern::Solid,
            PatternArg::French => NailPattern::French,
            PatternArg::Glitter => NailPattern::Glitter,
            PatternArg::Ombre => NailPattern::Ombre,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Live {
            modality,
            look,
            capture,
        } => live(&config, modality, &look, capture).await,
        Commands::Still {
            modality,
            input,
            output,
            look,
        } => still(&config, modality, &input, output, &look).await,
        Commands::Presets { json } => list_presets(json),
        Commands::Models { modality } => {
            let providers = Providers::onnx(&config.model_dir);
            preload::preload(&providers, modality, print_progress).await?;
            Ok(())
        }
        Commands::Status => {
            print_status(&config);
            Ok(())
        }
    }
}

fn hair_settings(look: &Look) -> HairSettings {
    let defaults = HairSettings::default();
    HairSettings {
        color: look
            .color
            .as_deref()
            .map_or(defaults.color, resolve_hair_color),
        opacity: look.opacity.unwrap_or(defaults.opacity),
        ..defaults
    }
}

fn nail_settings(look: &Look) -> NailSettings {
    let mut settings = match look.color.as_deref() {
        Some(name) => match find_nail_preset(name) {
            Some(preset) => preset.settings(),
            None => NailSettings {
                color: resolve_nail_color(name),
                ..NailSettings::default()
            },
        },
        None => NailSettings::default(),
    };
    if let Some(pattern) = look.pattern {
        settings.pattern = pattern.into();
    }
    if let Some(opacity) = look.opacity {
        settings.opacity = opacity;
    }
    settings
}

fn active_modality(
    providers: &Providers,
    config: &Config,
    modality: Modality,
    look: &Look,
) -> ActiveModality {
    match modality {
        Modality::Hair => ActiveModality::Hair {
            pipeline: providers.hair_pipeline(config),
            settings: hair_settings(look),
        },
        Modality::Nails => ActiveModality::Nails {
            pipeline: providers.nail_pipeline(config),
            settings: nail_settings(look),
        },
    }
}

fn print_progress(state: &PreloadState) {
    match state {
        PreloadState::Loading { model, progress } => println!("[{progress:>3}%] loading {model}"),
        PreloadState::Ready => println!("[100%] all models loaded"),
        PreloadState::Failed {
            model,
            progress,
            error,
        } => println!("[{progress:>3}%] {model} failed: {error}"),
    }
}

/// `<dir>/tryon-<unix millis>.png`
fn capture_path(dir: &Path) -> PathBuf {
    dir.join(format!("tryon-{}.png", chrono::Utc::now().timestamp_millis()))
}

fn write_png(path: &Path, png: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = png.len(), "capture written");
    println!("Saved {}", path.display());
    Ok(())
}

async fn live(config: &Config, modality: Modality, look: &Look, capture: bool) -> Result<()> {
    let providers = Providers::onnx(&config.model_dir);
    if let Err(e) = preload::preload(&providers, modality, print_progress).await {
        // Hair can still fall back to the tiers that did load.
        tracing::warn!(error = %e, "continuing with models loaded on demand");
    }

    let camera = Camera::open(
        &config.camera_device,
        config.camera_width,
        config.camera_height,
    )?;

    let processor: Arc<dyn FrameProcessor> =
        Arc::new(active_modality(&providers, config, modality, look));
    let mut driver = FrameDriver::new(camera, processor).with_budget(config.frame_budget());
    let mut events = driver.subscribe(16);
    let canvas = driver.canvas();

    let not_detected_after = config.not_detected_after;
    let status_task = tokio::spawn(async move {
        let mut monitor = DetectionMonitor::new(not_detected_after);
        while let Some(event) = events.recv().await {
            if let Some(status) = monitor.observe(event.status.is_detected(), Instant::now()) {
                tracing::info!(?status, sequence = event.sequence, "detection status changed");
                match status {
                    DetectionStatus::Detected => println!("{modality} detected"),
                    DetectionStatus::NotDetected => println!("no {modality} detected"),
                    DetectionStatus::Searching => {}
                }
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = driver.run(shutdown_rx);
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(true);
            run.await;
        }
    }
    status_task.abort();

    if capture {
        let png = canvas.lock().await.encode_png()?;
        write_png(&capture_path(&config.capture_dir), &png)?;
    }
    providers.dispose_all();
    Ok(())
}

async fn still(
    config: &Config,
    modality: Modality,
    input: &Path,
    output: Option<PathBuf>,
    look: &Look,
) -> Result<()> {
    let mut source =
        StillSource::open(input).with_context(|| format!("opening {}", input.display()))?;
    let frame = source.next_frame()?;
    let mut canvas = Canvas::from_image(frame.image.clone());

    let providers = Providers::onnx(&config.model_dir);
    let processor = active_modality(&providers, config, modality, look);
    let timestamp = FrameClock::new().at(frame.timestamp);

    match processor
        .process_frame(&mut canvas, &frame.image, timestamp)
        .await
    {
        Ok(rendered) => tracing::info!(?rendered, "frame rendered"),
        Err(e) if e.is_not_detected() => println!("{e}; writing the unmodified image"),
        Err(e) => return Err(e.into()),
    }

    let png = canvas.encode_png()?;
    let path = output.unwrap_or_else(|| capture_path(&config.capture_dir));
    write_png(&path, &png)?;
    providers.dispose_all();
    Ok(())
}

fn list_presets(json: bool) -> Result<()> {
    let nails = presets::nail_presets();
    let hair = presets::hair_styles();

    if json {
        let value = serde_json::json!({ "nails": nails, "hair": hair });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Nail polish:");
    for preset in nails {
        println!("  {:<18} {}  {:?}", preset.name, preset.hex, preset.pattern);
    }
    println!("Hair styles:");
    for style in hair {
        let premium = if style.premium { "  (premium)" } else { "" };
        println!(
            "  {:<18} {}  {:?}{premium}",
            style.name, style.color, style.category
        );
    }
    Ok(())
}

fn print_status(config: &Config) {
    println!("model dir:    {}", config.model_dir.display());
    for path in [
        config.hand_model_path(),
        config.face_model_path(),
        config.selfie_model_path(),
        config.body_parts_model_path(),
    ] {
        let state = if path.exists() { "ok" } else { "missing" };
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("  {name:<28} {state}");
    }
    println!("capture dir:  {}", config.capture_dir.display());
    println!(
        "frame budget: {} ms ({} fps)",
        config.frame_budget().as_millis(),
        config.target_fps
    );

    let cameras = Camera::list_devices();
    if cameras.is_empty() {
        println!("cameras:      none found");
    }
    for cam in cameras {
        let marker = if cam.path == config.camera_device { "*" } else { " " };
        println!("{marker} {}  {} ({})", cam.path, cam.name, cam.driver);
    }
}
