use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::input::InputSink;
use quest_capture::{CaptureError, CaptureStatus, Frame, FrameSource, ScreenRect};
use quest_vision::{AnalysisResult, CycleError, QuestAnalyzer, VisionContext};

/// Manages the capture → perception → input pipeline
pub struct Pipeline {
    stop: Arc<AtomicBool>,
    result_rx: watch::Receiver<Option<AnalysisResult>>,
    capture_task: JoinHandle<Result<(), CaptureError>>,
    analysis_task: JoinHandle<Result<u64, CycleError>>,
}

#[derive(Debug)]
pub struct PipelineSummary {
    /// Number of analysed frames.
    pub cycles: u64,
    pub last_result: Option<AnalysisResult>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub interval: Duration,
    /// Stop after this many analysed frames; 0 runs until stopped.
    pub max_cycles: u64,
    pub region: Option<ScreenRect>,
    /// Frames arriving this long after a click are not analysed.
    pub wait_after_action: Duration,
}

impl Pipeline {
    /// Start the capture loop and the analysis loop that consumes its frames.
    pub fn start(
        ctx: Arc<VisionContext>,
        source: Arc<dyn FrameSource + Send + Sync>,
        input: Arc<dyn InputSink>,
        options: PipelineOptions,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let (frame_tx, frame_rx) = watch::channel::<Option<Arc<Frame>>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());
        let (result_tx, result_rx) = watch::channel::<Option<AnalysisResult>>(None);

        let capture_task = tokio::spawn(quest_capture::capture_loop(
            source,
            options.region,
            frame_tx,
            status_tx,
            options.interval,
            stop.clone(),
        ));

        // Log capture status transitions
        let mut status_rx_clone = status_rx.clone();
        tokio::spawn(async move {
            let mut was_capturing = false;
            loop {
                if status_rx_clone.changed().await.is_err() {
                    break;
                }
                let status = status_rx_clone.borrow().clone();
                if status.is_capturing != was_capturing {
                    info!(
                        "Capture {} ({:?}, {:?})",
                        if status.is_capturing { "active" } else { "idle" },
                        status.source_title,
                        status.resolution
                    );
                    was_capturing = status.is_capturing;
                }
                debug!("Capture fps {:.1}", status.fps);
            }
        });

        let analysis_task = tokio::spawn(analysis_loop(
            ctx,
            frame_rx,
            result_tx,
            input,
            options.max_cycles,
            options.wait_after_action,
            stop.clone(),
        ));

        info!(
            "Pipeline started (interval {:?}, wait after click {:?}, max cycles {})",
            options.interval, options.wait_after_action, options.max_cycles
        );

        Self {
            stop,
            result_rx,
            capture_task,
            analysis_task,
        }
    }

    /// Flag that stops both loops once set; the cycle in flight still completes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Wait for both loops to finish.
    pub async fn wait(self) -> Result<PipelineSummary> {
        let analysed = self.analysis_task.await.context("Analysis task failed")?;
        // Whatever ended the analysis loop, the capture loop has no consumer left.
        self.stop.store(true, Ordering::Relaxed);
        let captured = self.capture_task.await.context("Capture task failed")?;

        let cycles = analysed.context("Pipeline stopped on a fatal cycle error")?;
        captured.context("Pipeline stopped on a capture failure")?;
        let last_result = self.result_rx.borrow().clone();
        Ok(PipelineSummary {
            cycles,
            last_result,
        })
    }
}

async fn analysis_loop(
    ctx: Arc<VisionContext>,
    mut frame_rx: watch::Receiver<Option<Arc<Frame>>>,
    result_tx: watch::Sender<Option<AnalysisResult>>,
    input: Arc<dyn InputSink>,
    max_cycles: u64,
    wait_after_action: Duration,
    stop: Arc<AtomicBool>,
) -> Result<u64, CycleError> {
    let mut cycle = 0u64;
    let mut resume_at: Option<Instant> = None;

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        // Sender dropped: the capture loop has ended.
        if frame_rx.changed().await.is_err() {
            break;
        }

        let frame = frame_rx.borrow_and_update().clone();
        let Some(frame) = frame else {
            continue;
        };
        if let Some(deadline) = resume_at {
            if Instant::now() < deadline {
                continue;
            }
            resume_at = None;
        }
        cycle += 1;

        let ctx = ctx.clone();
        let outcome =
            tokio::task::spawn_blocking(move || QuestAnalyzer::new(&ctx).analyze(&frame, cycle))
                .await;

        match outcome {
            Ok(Ok(result)) => {
                if let Some(target) = result.click_target {
                    if let Err(e) = input.click(target) {
                        warn!("Click at {} failed: {:#}", target, e);
                    }
                    debug!("Cycle {}: pausing analysis for {:?}", cycle, wait_after_action);
                    resume_at = Some(Instant::now() + wait_after_action);
                }
                let _ = result_tx.send(Some(result));
            }
            Ok(Err(e)) if e.is_fatal() => {
                error!("Cycle {}: {}", cycle, e);
                stop.store(true, Ordering::Relaxed);
                return Err(e);
            }
            Ok(Err(e)) if e.is_not_found() => {
                debug!("Cycle {}: {}", cycle, e);
            }
            Ok(Err(e)) => {
                warn!("Cycle {}: {}", cycle, e);
            }
            Err(e) => {
                warn!("Analysis task panicked: {}", e);
            }
        }

        if max_cycles > 0 && cycle >= max_cycles {
            info!("Reached {} cycle(s), stopping", max_cycles);
            stop.store(true, Ordering::Relaxed);
            break;
        }
    }

    Ok(cycle)
}
