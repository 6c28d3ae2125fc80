//! Top-level window management.
//!
//! A single main window exists per process. It is registered by
//! [`create_main_window`], cleared by [`on_window_closed`] and recreated on
//! demand by [`activate`]; nothing else touches the registry.

use crate::{
    app::Presenter,
    draw::MatSurface,
    render_loop::ActiveFlag,
    utils::safe_cast::u32_to_i32,
    Error, Result,
};
use log::{debug, info, warn};
use opencv::{
    core::{Mat, Point, Scalar, CV_8UC3},
    highgui::{self, WINDOW_FULLSCREEN, WINDOW_NORMAL, WND_PROP_FULLSCREEN, WND_PROP_VISIBLE},
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_AA},
    prelude::*,
};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Window title used for the overlay
pub const WINDOW_TITLE: &str = "PoseNet";

/// Key codes that close the window
const ESCAPE_KEY: i32 = 27;
const QUIT_KEY: i32 = b'q' as i32;

/// How the window is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMode {
    /// Windowed, with an FPS overlay
    Development,
    /// Fullscreen kiosk
    Production,
}

impl HostMode {
    #[must_use]
    pub fn from_dev_flag(dev: bool) -> Self {
        if dev {
            Self::Development
        } else {
            Self::Production
        }
    }

    #[must_use]
    pub fn shows_fps(self) -> bool {
        self == Self::Development
    }
}

/// The process's main window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainWindow {
    pub title: String,
    pub mode: HostMode,
    pub width: u32,
    pub height: u32,
}

static MAIN_WINDOW: Mutex<Option<MainWindow>> = Mutex::new(None);

fn registry() -> MutexGuard<'static, Option<MainWindow>> {
    // A panic while holding the lock leaves the Option intact
    MAIN_WINDOW.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Store `window` unless one is already registered; returns whether it was stored
fn register(window: MainWindow) -> bool {
    let mut slot = registry();
    if slot.is_some() {
        return false;
    }
    *slot = Some(window);
    true
}

fn unregister() -> Option<MainWindow> {
    registry().take()
}

/// The registered main window, if any
#[must_use]
pub fn main_window() -> Option<MainWindow> {
    registry().clone()
}

/// Open and register the main window
///
/// Does nothing if a main window already exists.
///
/// # Errors
///
/// Returns a `Window` error if `HighGUI` cannot create the window.
pub fn create_main_window(title: &str, mode: HostMode, width: u32, height: u32) -> Result<()> {
    let window = MainWindow {
        title: title.to_string(),
        mode,
        width,
        height,
    };
    if !register(window) {
        debug!("Main window already open");
        return Ok(());
    }

    let opened = open_window(title, mode, width, height);
    if opened.is_err() {
        unregister();
    }
    opened
}

fn open_window(title: &str, mode: HostMode, width: u32, height: u32) -> Result<()> {
    highgui::named_window(title, WINDOW_NORMAL)
        .map_err(|e| Error::Window(format!("Failed to create window '{}': {}", title, e)))?;

    match mode {
        HostMode::Production => {
            highgui::set_window_property(title, WND_PROP_FULLSCREEN, f64::from(WINDOW_FULLSCREEN))?;
        }
        HostMode::Development => {
            highgui::resize_window(title, u32_to_i32(width)?, u32_to_i32(height)?)?;
        }
    }
    info!("Opened {:?} window '{}'", mode, title);
    Ok(())
}

/// Clear the registry and destroy the window; safe to call twice
pub fn on_window_closed() {
    if let Some(window) = unregister() {
        if let Err(e) = highgui::destroy_window(&window.title) {
            debug!("Window '{}' was already gone: {}", window.title, e);
        }
        info!("Main window closed");
    }
}

/// Recreate the main window if none is open
///
/// # Errors
///
/// Propagates window creation errors.
pub fn activate(title: &str, mode: HostMode, width: u32, height: u32) -> Result<()> {
    if main_window().is_some() {
        return Ok(());
    }
    create_main_window(title, mode, width, height)
}

/// Whether the process should exit once its last window closes
///
/// macOS apps stay alive so they can be reopened.
#[must_use]
pub fn should_quit_when_all_closed(os: &str) -> bool {
    os != "macos"
}

/// Shows surfaces in the main window and watches for close requests
pub struct HighGuiPresenter {
    title: String,
    active: ActiveFlag,
    show_fps: bool,
    last_frame: Option<Instant>,
    fps: f64,
}

impl HighGuiPresenter {
    #[must_use]
    pub fn new(title: &str, mode: HostMode, active: ActiveFlag) -> Self {
        Self {
            title: title.to_string(),
            active,
            show_fps: mode.shows_fps(),
            last_frame: None,
            fps: 0.0,
        }
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                // Smoothed so the overlay is readable
                self.fps = 0.9 * self.fps + 0.1 / dt;
            }
        }
        self.last_frame = Some(now);
    }

    /// Pump window events; close on Esc/q or when the user closed the window
    fn poll_close(&mut self) -> Result<()> {
        let key = highgui::wait_key(1)?;
        // Backends without the property report a negative value
        let closed_by_user = highgui::get_window_property(&self.title, WND_PROP_VISIBLE)
            .is_ok_and(|visible| (0.0..0.5).contains(&visible));

        if key == ESCAPE_KEY || key == QUIT_KEY || closed_by_user {
            debug!("Close requested (key {}, closed by user {})", key, closed_by_user);
            self.active.deactivate();
            on_window_closed();
        }
        Ok(())
    }
}

fn put_label(image: &mut Mat, text: &str, origin: Point, scale: f64) -> Result<()> {
    imgproc::put_text(
        image,
        text,
        origin,
        FONT_HERSHEY_SIMPLEX,
        scale,
        Scalar::new(255.0, 255.0, 255.0, 0.0),
        2,
        LINE_AA,
        false,
    )?;
    Ok(())
}

impl Presenter<MatSurface> for HighGuiPresenter {
    fn show_loading(&mut self, label: &str) -> Result<()> {
        let Some(window) = main_window() else {
            return Ok(());
        };
        let mut splash = Mat::new_rows_cols_with_default(
            u32_to_i32(window.height)?,
            u32_to_i32(window.width)?,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        put_label(&mut splash, label, Point::new(20, 40), 1.0)?;
        highgui::imshow(&self.title, &splash)?;
        highgui::wait_key(1)?;
        Ok(())
    }

    fn present(&mut self, surface: &MatSurface) -> Result<()> {
        if main_window().is_none() {
            warn!("No main window to present to");
            self.active.deactivate();
            return Ok(());
        }

        if self.show_fps {
            self.update_fps();
            let mut frame = surface.canvas().try_clone()?;
            put_label(&mut frame, &format!("FPS: {:.1}", self.fps), Point::new(10, 30), 0.7)?;
            highgui::imshow(&self.title, &frame)?;
        } else {
            highgui::imshow(&self.title, surface.canvas())?;
        }

        self.poll_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_policy() {
        assert!(should_quit_when_all_closed("linux"));
        assert!(should_quit_when_all_closed("windows"));
        assert!(!should_quit_when_all_closed("macos"));
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(HostMode::from_dev_flag(true), HostMode::Development);
        assert_eq!(HostMode::from_dev_flag(false), HostMode::Production);
        assert!(HostMode::Development.shows_fps());
        assert!(!HostMode::Production.shows_fps());
    }

    #[test]
    fn test_registry_holds_one_window() {
        let window = |title: &str| MainWindow {
            title: title.to_string(),
            mode: HostMode::Development,
            width: 600,
            height: 500,
        };

        unregister();
        assert!(register(window("first")));
        assert!(!register(window("second")));
        assert_eq!(main_window().map(|w| w.title), Some("first".to_string()));

        assert_eq!(unregister().map(|w| w.title), Some("first".to_string()));
        assert!(main_window().is_none());
        assert!(unregister().is_none());
    }
}
