//! Lifecycle shell for the pose overlay.
//!
//! [`PoseNetApp`] owns the configuration and orders startup: load the model,
//! acquire the camera, clear the loading flag whatever happened, then start
//! the render loop. Teardown goes through [`PoseNetApp::unmount`].

use crate::{
    capture::{setup_camera, CameraBackend, VideoSource},
    config::Config,
    constants::CAMERA_METADATA_TIMEOUT_SECS,
    draw::Surface,
    inference::ModelLoader,
    render_loop::{ActiveFlag, CycleOutcome, FrameScheduler, InferenceLoop, LoopState, LoopStats, RenderSettings},
    Error, Result,
};
use log::{error, info, warn};
use std::time::Duration;

/// Puts a finished surface in front of the user
pub trait Presenter<S: ?Sized> {
    /// Show the loading label while the model and camera start
    fn show_loading(&mut self, label: &str) -> Result<()>;

    /// Show the surface after a cycle
    fn present(&mut self, surface: &S) -> Result<()>;
}

/// The pose overlay component
pub struct PoseNetApp<L: ModelLoader, C: CameraBackend, S: Surface> {
    config: Config,
    loader: L,
    camera: C,
    surface: S,
    model: Option<L::Model>,
    video: VideoSource<C::Stream>,
    loading: bool,
    active: ActiveFlag,
    render_loop: InferenceLoop,
    metadata_timeout: Duration,
}

impl<L: ModelLoader, C: CameraBackend, S: Surface> PoseNetApp<L, C, S> {
    /// Create an unmounted app
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration fails validation
    /// - The surface size differs from the configured video size
    pub fn new(config: Config, loader: L, camera: C, surface: S) -> Result<Self> {
        config.validate()?;

        let expected = (config.video.width, config.video.height);
        if surface.size() != expected {
            return Err(Error::InvalidInput(format!(
                "Surface is {:?}, configured video is {:?}",
                surface.size(),
                expected
            )));
        }

        let active = ActiveFlag::new();
        let render_loop = InferenceLoop::new(RenderSettings::from_config(&config)?, active.clone());
        let video = VideoSource::new(config.video.width, config.video.height);

        Ok(Self {
            config,
            loader,
            camera,
            surface,
            model: None,
            video,
            loading: true,
            active,
            render_loop,
            metadata_timeout: Duration::from_secs(CAMERA_METADATA_TIMEOUT_SECS),
        })
    }

    /// Override how long to wait for the first camera frame
    #[must_use]
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Load the model, start the camera and the render loop
    ///
    /// The loading flag is cleared whether or not setup succeeds.
    ///
    /// # Errors
    ///
    /// Returns the model loading error, or `CaptureUnavailable` when the
    /// camera cannot be started. The render loop stays idle in both cases.
    pub fn mount(&mut self) -> Result<()> {
        if !self.active.is_active() {
            return Err(Error::InvalidInput("App has been unmounted".to_string()));
        }
        if self.render_loop.state() != LoopState::Idle {
            return Err(Error::InvalidInput("App is already mounted".to_string()));
        }

        let setup = self.setup();
        self.loading = false;

        if let Err(e) = setup {
            error!("Startup failed: {}", e);
            return Err(e);
        }

        self.render_loop.start();
        info!("Pose overlay running ({:?})", self.config.detection.algorithm);
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        self.model = Some(self.loader.load(&self.config)?);

        setup_camera(
            &mut self.camera,
            &mut self.video,
            self.config.client_kind(),
            self.metadata_timeout,
        )
        .map_err(|e| {
            warn!("Camera setup failed: {}", e);
            Error::capture_unavailable()
        })
    }

    /// Run a single cycle
    ///
    /// # Errors
    ///
    /// Propagates drawing errors.
    pub fn cycle(&mut self) -> Result<CycleOutcome> {
        self.render_loop
            .cycle(self.model.as_mut(), Some(&mut self.video), &mut self.surface)
    }

    /// Run cycles until the active flag is cleared
    ///
    /// Every cycle is presented so window events keep flowing; a skipped
    /// cycle presents a cleared surface.
    ///
    /// # Errors
    ///
    /// Returns `InferenceUnavailable` if the app was never mounted, and
    /// propagates drawing and presentation errors.
    pub fn run_until_stopped<F, P>(&mut self, scheduler: &mut F, presenter: &mut P) -> Result<LoopStats>
    where
        F: FrameScheduler,
        P: Presenter<S>,
    {
        if self.render_loop.state() == LoopState::Idle {
            return Err(Error::InferenceUnavailable("App has not been mounted".to_string()));
        }

        loop {
            match self.cycle()? {
                CycleOutcome::Stopped => break,
                // Never present the last frame's poses as if they were live
                CycleOutcome::Skipped(_) => self.surface.clear()?,
                CycleOutcome::Drawn { .. } => {}
            }
            presenter.present(&self.surface)?;
            scheduler.wait_for_next_frame();
        }

        let stats = self.render_loop.stats();
        info!(
            "Render loop finished: {} cycles, {} drawn, {} skipped",
            stats.cycles, stats.drawn, stats.skipped
        );
        Ok(stats)
    }

    /// Stop the loop and release the camera and model
    pub fn unmount(&mut self) {
        self.active.deactivate();
        self.video.release();
        self.model = None;
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Label to show while loading, `None` once loading has finished
    #[must_use]
    pub fn loading_label(&self) -> Option<&str> {
        self.loading.then_some(self.config.display.loading_text.as_str())
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.render_loop.state()
    }

    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.render_loop.stats()
    }

    /// Token that stops the loop when cleared; hand it to the host window
    #[must_use]
    pub fn active_flag(&self) -> ActiveFlag {
        self.active.clone()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[must_use]
    pub fn camera(&self) -> &C {
        &self.camera
    }
}

impl<L: ModelLoader, C: CameraBackend, S: Surface> Drop for PoseNetApp<L, C, S> {
    fn drop(&mut self) {
        self.unmount();
    }
}
