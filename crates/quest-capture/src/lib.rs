mod frame;
mod geometry;

pub use frame::Frame;
pub use geometry::{FrameSpace, Point, Rect, RoiSpace, ScreenOffset, ScreenRect, ScreenSpace};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use xcap::{Monitor, Window};

/// Upstream capture failure. Only `SourceNotFound` is polled for again by the capture loop.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("invalid capture geometry: {0}")]
    InvalidGeometry(String),
    #[error("no capture source matching {0:?}")]
    SourceNotFound(String),
    #[error("capture backend failed: {0}")]
    Backend(String),
}

/// Something that can grab a [`Frame`] of the screen.
///
/// `region` is screen-absolute; `None` captures the whole source surface.
pub trait FrameSource {
    fn capture(&self, region: Option<ScreenRect>) -> Result<Frame, CaptureError>;

    /// Human-readable name of the surface being captured.
    fn describe(&self) -> String;
}

/// Status of the capture loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub source_found: bool,
    pub source_title: Option<String>,
    pub fps: f64,
    pub last_capture_time: Option<u64>,
    pub resolution: Option<(u32, u32)>,
}

/// Captures the game client window via `xcap`, falling back to the primary monitor
/// when no window title filter is configured.
pub struct XcapSource {
    window_title: Option<String>,
}

impl XcapSource {
    /// `window_title` is matched case-insensitively as a substring.
    pub fn new(window_title: Option<String>) -> Self {
        Self {
            window_title: window_title
                .filter(|t| !t.is_empty())
                .map(|t| t.to_lowercase()),
        }
    }

    fn find_window(&self, needle: &str) -> Result<Window, CaptureError> {
        let windows = Window::all()
            .map_err(|e| CaptureError::Backend(format!("failed to enumerate windows: {e}")))?;

        for window in windows {
            let title = match window.title() {
                Ok(t) => t.to_lowercase(),
                Err(_) => continue,
            };
            if window.is_minimized().unwrap_or(false) {
                continue;
            }
            if title.contains(needle) {
                debug!("Found game window: {}", title);
                return Ok(window);
            }
        }
        Err(CaptureError::SourceNotFound(needle.to_string()))
    }

    /// Grab the full surface and its screen origin.
    fn grab_surface(&self) -> Result<(RgbaImage, ScreenOffset), CaptureError> {
        match &self.window_title {
            Some(needle) => {
                let window = self.find_window(needle)?;
                let origin = ScreenOffset::new(
                    window.x().map_err(backend)?,
                    window.y().map_err(backend)?,
                );
                let image = window.capture_image().map_err(backend)?;
                Ok((image, origin))
            }
            None => {
                let monitors = Monitor::all().map_err(backend)?;
                let monitor = monitors
                    .into_iter()
                    .find(|m| m.is_primary().unwrap_or(false))
                    .ok_or_else(|| CaptureError::SourceNotFound("primary monitor".to_string()))?;
                let origin = ScreenOffset::new(
                    monitor.x().map_err(backend)?,
                    monitor.y().map_err(backend)?,
                );
                let image = monitor.capture_image().map_err(backend)?;
                Ok((image, origin))
            }
        }
    }
}

impl FrameSource for XcapSource {
    fn capture(&self, region: Option<ScreenRect>) -> Result<Frame, CaptureError> {
        let (surface, origin) = self.grab_surface()?;
        match region {
            None => Frame::new(surface, origin),
            Some(region) => {
                let cropped = crop_screen_region(&surface, origin, &region)?;
                Frame::new(cropped, ScreenOffset::new(region.x(), region.y()))
            }
        }
    }

    fn describe(&self) -> String {
        match &self.window_title {
            Some(t) => format!("window matching {t:?}"),
            None => "primary monitor".to_string(),
        }
    }
}

fn backend(e: xcap::XCapError) -> CaptureError {
    CaptureError::Backend(e.to_string())
}

/// Crop a screen-absolute region out of a surface captured at `surface_origin`.
///
/// Unlike a clamping crop, a region that does not lie fully on the surface is an error.
pub fn crop_screen_region(
    surface: &RgbaImage,
    surface_origin: ScreenOffset,
    region: &ScreenRect,
) -> Result<RgbaImage, CaptureError> {
    let local_x = region.x() as i64 - surface_origin.x as i64;
    let local_y = region.y() as i64 - surface_origin.y as i64;
    let (w, h) = (surface.width() as i64, surface.height() as i64);

    if local_x < 0
        || local_y < 0
        || local_x + region.width() as i64 > w
        || local_y + region.height() as i64 > h
    {
        return Err(CaptureError::InvalidGeometry(format!(
            "region {} is not inside the {}x{} surface at ({}, {})",
            region, w, h, surface_origin.x, surface_origin.y
        )));
    }

    Ok(image::imageops::crop_imm(
        surface,
        local_x as u32,
        local_y as u32,
        region.width(),
        region.height(),
    )
    .to_image())
}

/// The capture loop that runs as a background task.
/// Sends frames through the watch channel and status updates through the status channel.
/// A missing source is polled for again; any other capture failure ends the loop with the error.
pub async fn capture_loop(
    source: Arc<dyn FrameSource + Send + Sync>,
    region: Option<ScreenRect>,
    frame_tx: watch::Sender<Option<Arc<Frame>>>,
    status_tx: watch::Sender<CaptureStatus>,
    capture_interval: Duration,
    stop: Arc<AtomicBool>,
) -> Result<(), CaptureError> {
    info!(
        "Capture loop started on {}, interval: {:?}",
        source.describe(),
        capture_interval
    );

    let mut last_capture = Instant::now();
    let mut frame_count = 0u64;
    let mut fps_timer = Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("Capture loop stopping (stop signal received)");
            break;
        }

        let title = source.describe();
        let src = source.clone();
        // xcap is sync
        let capture_result = tokio::task::spawn_blocking(move || src.capture(region)).await;

        match capture_result {
            Ok(Ok(frame)) => {
                let resolution = (frame.width(), frame.height());
                frame_count += 1;

                let elapsed = fps_timer.elapsed().as_secs_f64();
                let fps = if elapsed > 0.0 {
                    frame_count as f64 / elapsed
                } else {
                    0.0
                };

                // Reset FPS counter every 5 seconds
                if elapsed > 5.0 {
                    frame_count = 0;
                    fps_timer = Instant::now();
                }

                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;

                let _ = status_tx.send(CaptureStatus {
                    is_capturing: true,
                    source_found: true,
                    source_title: Some(title),
                    fps,
                    last_capture_time: Some(now),
                    resolution: Some(resolution),
                });

                let _ = frame_tx.send(Some(Arc::new(frame)));
                last_capture = Instant::now();
            }
            Ok(Err(CaptureError::SourceNotFound(needle))) => {
                debug!("Capture source {:?} not found", needle);
                let _ = status_tx.send(CaptureStatus::default());
            }
            Ok(Err(e)) => {
                warn!("Capture failed: {}", e);
                let _ = status_tx.send(CaptureStatus {
                    source_found: true,
                    source_title: Some(title),
                    ..CaptureStatus::default()
                });
                return Err(e);
            }
            Err(e) => {
                warn!("Capture task panicked: {}", e);
                return Err(CaptureError::Backend(format!("capture task failed: {e}")));
            }
        }

        // Sleep until next capture interval
        let elapsed = last_capture.elapsed();
        if elapsed < capture_interval {
            tokio::time::sleep(capture_interval - elapsed).await;
        } else {
            // Yield to prevent busy loop
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    let _ = status_tx.send(CaptureStatus::default());
    info!("Capture loop stopped");
    Ok(())
}
