use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use signet_capture::{spawn_capture_worker, CameraState, FacingMode, V4lBackend};
use signet_core::{geometry, FaceLandmarkSet};
use signet_session::{SessionManager, SqliteKvStore};
use std::path::PathBuf;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "signet", about = "Signet identity-verification capture CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Facing {
    Front,
    Back,
}

impl From<Facing> for FacingMode {
    fn from(f: Facing) -> Self {
        match f {
            Facing::Front => FacingMode::Front,
            Facing::Back => FacingMode::Back,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture devices
    Devices,
    /// Capture a still from the camera and record it as the session selfie
    Capture {
        /// Output PNG path
        #[arg(short, long, default_value = "selfie.png")]
        output: PathBuf,
        /// Which camera to use
        #[arg(long, value_enum, default_value = "front")]
        facing: Facing,
    },
    /// Align a face image offline using detector landmarks
    Align {
        /// Input image (PNG or JPEG)
        input: PathBuf,
        /// JSON file with the detector's 68-point contour: [[x, y], ...]
        landmarks: PathBuf,
        /// Output PNG path
        #[arg(short, long, default_value = "aligned.png")]
        output: PathBuf,
        /// Capture sequence number of the source frame, recorded as provenance
        #[arg(long)]
        frame_id: Option<u64>,
    },
    /// Print stored session history
    History,
    /// Clear the current session's persisted metadata
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Devices => {
            let devices = V4lBackend::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for d in devices {
                println!("{}  {} ({})", d.path, d.name, d.driver);
            }
        }
        Commands::Capture { output, facing } => {
            run_capture(&config, output, facing.into()).await?;
        }
        Commands::Align {
            input,
            landmarks,
            output,
            frame_id,
        } => {
            run_align(&config, input, landmarks, output, frame_id)?;
        }
        Commands::History => {
            let manager = open_manager(&config)?;
            println!("{}", serde_json::to_string_pretty(manager.history())?);
        }
        Commands::Reset => {
            let mut manager = open_manager(&config)?;
            manager.reset_session();
            println!("Current session cleared");
        }
    }

    Ok(())
}

fn open_manager(config: &Config) -> Result<SessionManager<SqliteKvStore>> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data dir {}", parent.display()))?;
    }
    let store = SqliteKvStore::open(&config.db_path)
        .with_context(|| format!("opening session store {}", config.db_path.display()))?;
    Ok(SessionManager::new(store))
}

async fn run_capture(config: &Config, output: PathBuf, facing: FacingMode) -> Result<()> {
    let backend = V4lBackend::new(&config.front_device, &config.back_device);
    let handle = spawn_capture_worker(backend, facing);

    let status = handle.start_camera().await?;
    if status.state != CameraState::Ready {
        let kind = status.last_error.context("camera not ready with no error recorded")?;
        bail!("{}", kind.user_message());
    }
    tracing::info!(tier = ?status.tier_used, "camera ready");

    let frame = handle
        .capture_image()
        .await?
        .context("frame capture failed")?;
    let bytes = frame.raster.to_encoded_bytes()?;

    let mut manager = open_manager(config)?;
    let id = manager.start_session().id.clone();
    manager.save_selfie(bytes.clone());
    manager.go_to_step(signet_session::Step::DocumentCapture);

    std::fs::write(&output, &bytes)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Captured {}x{} frame {} -> {} (session {id})",
        frame.raster.width(),
        frame.raster.height(),
        frame.sequence,
        output.display()
    );

    handle.stop_camera().await?;
    Ok(())
}

fn run_align(
    config: &Config,
    input: PathBuf,
    landmarks_path: PathBuf,
    output: PathBuf,
    frame_id: Option<u64>,
) -> Result<()> {
    let image_bytes =
        std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
    let landmarks_json = std::fs::read_to_string(&landmarks_path)
        .with_context(|| format!("reading {}", landmarks_path.display()))?;

    let points: Vec<(f64, f64)> = serde_json::from_str(&landmarks_json)
        .context("landmarks file must be a JSON array of [x, y] pairs")?;
    let landmarks = FaceLandmarkSet::from_points68(&points)
        .context("landmarks file does not hold a usable 68-point contour")?;

    let size = config.output_size;
    let roll = geometry::calculate_eye_angle(&landmarks).to_degrees();

    match frame_id {
        // Best-effort path: an undecodable input passes through unchanged.
        None => {
            let aligned = geometry::align_face_bytes(&image_bytes, &landmarks, size)?;
            std::fs::write(&output, &aligned)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Aligned to {0}x{0} (eye roll {1:.1} deg) -> {2}",
                size.side(),
                roll,
                output.display()
            );
        }
        // Provenance path: decode strictly and record the source frame.
        Some(id) => {
            let image = geometry::decode_for_alignment(&image_bytes)?;
            let aligned = geometry::align_face(&image, &landmarks, size)?.with_source_frame(id);
            std::fs::write(&output, aligned.raster.to_encoded_bytes()?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Aligned to {0}x{0} (scale {1:.3}, eye roll {2:.1} deg, frame {3}) -> {4}",
                size.side(),
                aligned.transform.scale,
                roll,
                id,
                output.display()
            );
        }
    }
    Ok(())
}
