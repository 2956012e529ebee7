use crate::input::{DryRunInput, InputSink, XdotoolInput};
use crate::pipeline::{Pipeline, PipelineOptions};
use anyhow::{Context, Result};
use quest_capture::{FrameSource, ScreenRect, XcapSource};
use quest_data::{CaptureSettings, QuestConfig};
use quest_vision::{QuestAnalyzer, VisionContext};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Load the configuration and bring up the vision context on a blocking thread.
async fn load_context(config_path: &Path) -> Result<Arc<VisionContext>> {
    let config = QuestConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let ctx = tokio::task::spawn_blocking(move || VisionContext::init(config))
        .await
        .context("Vision init task failed")?
        .context("Failed to initialise vision")?;
    Ok(Arc::new(ctx))
}

fn frame_source(capture: &CaptureSettings) -> Arc<dyn FrameSource + Send + Sync> {
    let window_title = capture.window_title.clone().filter(|t| !t.is_empty());
    Arc::new(XcapSource::new(window_title))
}

fn capture_region(capture: &CaptureSettings) -> Option<ScreenRect> {
    capture
        .region
        .and_then(|r| ScreenRect::new(r.x, r.y, r.width, r.height))
}

fn input_sink(click: bool) -> Result<Arc<dyn InputSink>> {
    if click {
        Ok(Arc::new(XdotoolInput::new()?))
    } else {
        Ok(Arc::new(DryRunInput))
    }
}

fn release(ctx: Arc<VisionContext>) {
    match Arc::try_unwrap(ctx) {
        Ok(ctx) => ctx.shutdown(),
        Err(_) => warn!("Vision context still shared at exit"),
    }
}

/// Single capture + analysis cycle.
pub async fn once(config_path: &Path, click: bool) -> Result<()> {
    let ctx = load_context(config_path).await?;
    let input = input_sink(click)?;
    let source = frame_source(&ctx.config().capture);
    let region = capture_region(&ctx.config().capture);
    info!("Capturing from {}", source.describe());

    let frame = {
        let source = source.clone();
        tokio::task::spawn_blocking(move || source.capture(region))
            .await
            .context("Capture task failed")??
    };

    let analysis_ctx = ctx.clone();
    let result =
        tokio::task::spawn_blocking(move || QuestAnalyzer::new(&analysis_ctx).analyze(&frame, 1))
            .await
            .context("Analysis task failed")?
            .context("Analysis failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(target) = result.click_target {
        if let Err(e) = input.click(target) {
            warn!("Click at {} failed: {:#}", target, e);
        }
    }

    release(ctx);
    Ok(())
}

/// Paced capture + analysis loop. Ctrl-C stops it after the cycle in flight.
pub async fn run(config_path: &Path, interval_ms: u64, max_cycles: u64, click: bool) -> Result<()> {
    let ctx = load_context(config_path).await?;
    let input = input_sink(click)?;
    let capture = ctx.config().capture.clone();
    let source = frame_source(&capture);

    let pipeline = Pipeline::start(
        ctx.clone(),
        source,
        input,
        PipelineOptions {
            interval: Duration::from_millis(interval_ms),
            max_cycles,
            region: capture_region(&capture),
            wait_after_action: capture.wait_after_action(),
        },
    );

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            stop.store(true, Ordering::Relaxed);
        }
    });

    let outcome = pipeline.wait().await;
    release(ctx);
    let summary = outcome?;
    info!("Analysed {} frame(s)", summary.cycles);
    if let Some(result) = summary.last_result {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}
