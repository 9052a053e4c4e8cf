use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rollcall_core::ledger::{name_session_file, LedgerError};
use rollcall_core::{Annotator, EnrollmentStore, FacePipeline, ImageLibrary, Ledger, Recognizer};
use rollcall_hw::{FrameSource, StillSource};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod prompt;
mod session;

use config::Config;
use engine::{render_loop, Engine, Snapshot};
use prompt::LinePrompt;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from a photo
    Enroll {
        /// Name to enroll under (must be unique)
        #[arg(short, long)]
        name: String,
        /// Clear frontal photo of the person
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Remove an enrolled person
    Remove {
        name: String,
    },
    /// List enrolled people
    List {
        #[arg(long)]
        json: bool,
    },
    /// Manage the enrollment photo library
    Library {
        #[command(subcommand)]
        command: LibraryCommands,
    },
    /// Enroll every library photo that is not enrolled yet
    Sync,
    /// Identify the face in a photo
    Identify {
        image: PathBuf,
        /// Write the annotated photo here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run a live attendance session
    Session {
        /// Replay a still image instead of reading the camera
        #[arg(long)]
        still: Option<PathBuf>,
    },
    /// List capture devices
    Devices,
}

#[derive(Subcommand)]
enum LibraryCommands {
    /// Copy a photo into the library
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Delete a photo from the library
    Remove { name: String },
    /// List library photos
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Enroll { name, image } => {
            let mut store = open_store(&config)?;
            let mut pipeline = load_pipeline(&config)?;
            let record = store
                .add_person_from_path(&name, &image, &mut pipeline)
                .with_context(|| format!("failed to enroll {name}"))?;
            println!(
                "Enrolled {} ({} signatures)",
                record.name,
                record.signatures.len()
            );
        }
        Commands::Remove { name } => {
            let mut store = open_store(&config)?;
            if store.remove_person(&name)? {
                println!("Removed {name}");
            } else {
                println!("{name} is not enrolled");
            }
        }
        Commands::List { json } => {
            let store = open_store(&config)?;
            if json {
                let people: Vec<_> = store
                    .records()
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "name": r.name,
                            "signatures": r.signatures.len(),
                            "dimension": r.signatures.first().map_or(0, |s| s.dimension()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&people)?);
            } else if store.is_empty() {
                println!("No one enrolled");
            } else {
                for name in store.names() {
                    println!("{name}");
                }
            }
        }
        Commands::Library { command } => {
            let library = ImageLibrary::open(&config.library_dir)?;
            match command {
                LibraryCommands::Add { name, image } => {
                    let path = library.add(&image, &name)?;
                    println!("Added {}", path.display());
                }
                LibraryCommands::Remove { name } => {
                    if library.remove(&name)? {
                        println!("Removed {name} from the library");
                    } else {
                        println!("No photo named {name}");
                    }
                }
                LibraryCommands::List => {
                    for entry in library.entries()? {
                        println!("{}\t{}", entry.name, entry.path.display());
                    }
                }
            }
        }
        Commands::Sync => {
            let library = ImageLibrary::open(&config.library_dir)?;
            let mut store = open_store(&config)?;
            let mut pipeline = load_pipeline(&config)?;
            let report = store.sync_from_library(&library, &mut pipeline)?;
            println!(
                "Enrolled {}, already known {}, failed {}",
                report.enrolled.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (name, reason) in &report.failed {
                println!("  {name}: {reason}");
            }
        }
        Commands::Identify { image, out } => {
            let frame = image::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?
                .to_rgb8();
            let store = open_store(&config)?;
            let mut recognizer = Recognizer::new(load_pipeline(&config)?, config.recognizer_config());
            let decision = recognizer.identify(&frame, store.records())?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            if let Some(out) = out {
                load_annotator(&config)?
                    .annotate(&frame, &decision)
                    .save(&out)
                    .with_context(|| format!("failed to write {}", out.display()))?;
            }
        }
        Commands::Session { still } => run_session(config, still).await?,
        Commands::Devices => list_devices(),
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<EnrollmentStore> {
    EnrollmentStore::open(&config.store_path, config.retry_policy()).with_context(|| {
        format!("failed to open enrollment store {}", config.store_path.display())
    })
}

#[cfg(feature = "onnx")]
fn load_pipeline(config: &Config) -> Result<FacePipeline> {
    let pipeline = rollcall_core::pipeline::load_onnx_pipeline(&config.model_dir)
        .with_context(|| format!("failed to load face models from {}", config.model_dir.display()))?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");
    Ok(pipeline)
}

#[cfg(not(feature = "onnx"))]
fn load_pipeline(_config: &Config) -> Result<FacePipeline> {
    anyhow::bail!("built without the `onnx` feature; face models are unavailable")
}

fn load_annotator(config: &Config) -> Result<Annotator> {
    match &config.label_font {
        Some(font) => Ok(Annotator::with_font(font)?),
        None => Ok(Annotator::new()),
    }
}

fn open_source(config: &Config, still: Option<&Path>) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = still {
        let source = StillSource::open(path)?.with_interval(config.render_interval);
        return Ok(Box::new(source));
    }
    open_camera(config)
}

#[cfg(feature = "v4l")]
fn open_camera(config: &Config) -> Result<Box<dyn FrameSource>> {
    let camera = rollcall_hw::Camera::open(
        &config.camera_device,
        config.camera_width,
        config.camera_height,
    )
    .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "v4l"))]
fn open_camera(_config: &Config) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without the `v4l` feature; use --still to replay an image")
}

#[cfg(feature = "v4l")]
fn list_devices() {
    let devices = rollcall_hw::Camera::list_devices();
    if devices.is_empty() {
        println!("No capture devices found");
    }
    for device in devices {
        println!("{}\t{} ({}, {})", device.path, device.name, device.driver, device.bus);
    }
}

#[cfg(not(feature = "v4l"))]
fn list_devices() {
    println!("Built without the `v4l` feature; no camera support");
}

async fn run_session(config: Config, still: Option<PathBuf>) -> Result<()> {
    let store = open_store(&config)?;
    let library = ImageLibrary::open(&config.library_dir)?;
    let recognizer = Recognizer::new(load_pipeline(&config)?, config.recognizer_config());
    let annotator = load_annotator(&config)?;
    let source = open_source(&config, still.as_deref())?;

    let named = tokio::task::spawn_blocking(|| {
        name_session_file(Local::now().naive_local(), &mut LinePrompt::stdio())
    })
    .await?;
    let session_file = match named {
        Ok(file) => file,
        Err(LedgerError::UserCancelled) => {
            println!("Session cancelled");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let ledger = Ledger::new(&config.attendance_dir, &session_file, config.retry_policy());
    tracing::info!(window = %session_file.window, path = %ledger.path().display(), "session started");

    tracing::info!(
        min_confidence = recognizer.min_confidence(),
        strategy = ?config.match_strategy,
        "recognizer ready"
    );
    let engine = Engine::start(source, recognizer, store, annotator)?;
    let mut render = tokio::spawn(render_loop(
        engine.slot(),
        config.render_interval,
        engine.shutdown_token(),
        preview_writer(config.preview_path.clone()),
    ));
    let engine = Arc::new(Mutex::new(Some(engine)));

    // Stdin stays blocked on a plain thread so Ctrl-C can end the session without it.
    let (done_tx, done_rx) = oneshot::channel();
    let commands = Arc::clone(&engine);
    std::thread::Builder::new()
        .name("rollcall-commands".into())
        .spawn(move || {
            let result = session::command_loop(
                &commands,
                &ledger,
                &library,
                &mut LinePrompt::stdio(),
                || Local::now().time(),
            );
            let _ = done_tx.send(result);
        })
        .context("failed to spawn command thread")?;

    let mut render_finished = false;
    let outcome: Result<()> = tokio::select! {
        done = done_rx => done
            .context("command thread exited")
            .and_then(|result| result.map_err(anyhow::Error::from)),
        rendered = &mut render => {
            render_finished = true;
            rendered
                .map_err(anyhow::Error::from)
                .and_then(|result| result.map_err(anyhow::Error::from))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };

    let stopped = tokio::task::spawn_blocking(move || session::shutdown_engine(&engine)).await?;
    if !render_finished {
        if let Err(err) = render.await? {
            tracing::warn!(error = %err, "render loop ended with an error");
        }
    }
    tracing::info!("session ended");
    outcome?;
    stopped?;
    Ok(())
}

fn preview_writer(path: PathBuf) -> impl FnMut(&Snapshot) {
    let mut last_label = None;
    move |snapshot: &Snapshot| {
        let tmp = path.with_extension("tmp.png");
        if let Err(err) = snapshot
            .annotated
            .save(&tmp)
            .map_err(anyhow::Error::from)
            .and_then(|_| std::fs::rename(&tmp, &path).map_err(anyhow::Error::from))
        {
            tracing::warn!(path = %path.display(), error = %err, "failed to write preview");
        }

        let label = snapshot.decision.face.as_ref().map(|_| snapshot.decision.label());
        if label != last_label {
            if let Some(label) = &label {
                println!("{label}");
            }
            last_label = label;
        }
    }
}
