//! Webcam pose overlay: PoseNet keypoints and skeleton drawn over live video.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use posenet_overlay::{
    app::{PoseNetApp, Presenter},
    capture::{CameraDevice, OpenCvCamera},
    config::{Algorithm, Config},
    draw::MatSurface,
    host::{self, HighGuiPresenter, HostMode, WINDOW_TITLE},
    posenet::PoseNetLoader,
    render_loop::FixedRateScheduler,
};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Camera index to use
    #[arg(long)]
    cam: Option<i32>,

    /// Video file to replay instead of the camera
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// Estimation algorithm (single-pose, multi-pose)
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Path to the PoseNet ONNX model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Development mode: windowed with an FPS overlay instead of fullscreen
    #[arg(long)]
    dev: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Classify the client from this user-agent string
    #[arg(long)]
    user_agent: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config file: {}. Using defaults.", e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    if let Some(cam) = args.cam {
        config.video.camera_index = cam;
    }
    if let Some(algorithm) = args.algorithm {
        config.detection.algorithm = algorithm;
    }
    if let Some(model) = &args.model {
        config.model.path.clone_from(model);
    }
    if let Some(user_agent) = &args.user_agent {
        config.client.user_agent = Some(user_agent.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Mount the overlay in a fresh main window and run it until the window closes
fn run_session(config: &Config, args: &Args, mode: HostMode) -> Result<()> {
    let (width, height) = (config.video.width, config.video.height);
    let device = match &args.video {
        Some(path) => CameraDevice::File(path.clone()),
        None => CameraDevice::Index(config.video.camera_index),
    };

    let surface = MatSurface::new(width, height)?;
    let mut app = PoseNetApp::new(config.clone(), PoseNetLoader, OpenCvCamera::new(device), surface)?;

    host::activate(WINDOW_TITLE, mode, width, height)?;
    let mut presenter = HighGuiPresenter::new(WINDOW_TITLE, mode, app.active_flag());
    if let Some(label) = app.loading_label() {
        presenter.show_loading(label)?;
    }

    if let Err(e) = app.mount() {
        host::on_window_closed();
        return Err(e).context("Failed to start the pose overlay");
    }

    let mut scheduler = FixedRateScheduler::new(config.video.target_fps);
    let result = app.run_until_stopped(&mut scheduler, &mut presenter);
    app.unmount();
    host::on_window_closed();
    result?;
    Ok(())
}

/// Block until the user asks to reopen the window; false on end of input
fn wait_for_relaunch() -> Result<bool> {
    info!("Window closed. Press Enter to reopen it, or Ctrl-D to quit.");
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    Ok(read > 0)
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("PoseNet overlay");

    let config = load_config(&args)?;
    let mode = HostMode::from_dev_flag(args.dev);

    loop {
        if let Err(e) = run_session(&config, &args, mode) {
            error!("{:#}", e);
            return Err(e);
        }
        if host::should_quit_when_all_closed(std::env::consts::OS) || !wait_for_relaunch()? {
            break;
        }
    }

    Ok(())
}
