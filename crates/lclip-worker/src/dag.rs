//! Stage DAG executor.
//!
//! The pipeline DAG is fixed:
//!
//! ```text
//! SilenceDetect ─┐
//!                ├─► Transcribe ──────┐
//! LayoutDetect ──┴─► ImageExtract* ───┴─► ContentAnalyze ─► SegmentSelect ─► CompileClips
//!                     (vision mode)
//! ```
//!
//! SilenceDetect/LayoutDetect run concurrently, as do Transcribe and
//! ImageExtract; the rest are sequential. Every stage attempt runs under a
//! timeout; transient failures are retried with exponential backoff; fatal
//! failures terminate the job while degradable failures fall back to a safe
//! default and let the pipeline continue. A cancelled stage gets a
//! ten-second grace period to release scoped resources before its future is
//! abandoned.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use lclip_models::{LayoutAnalysis, ProcessingMode, Stage};

use crate::context::StageContext;
use crate::error::{ErrorClass, StageError, StageResult};
use crate::stages;

/// Grace period after cancellation before a stage future is abandoned.
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a stage may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Failure propagates to job failure
    Fatal,
    /// Failure is absorbed; the pipeline continues with a safe default
    Degradable,
}

/// Outcome of a stage run under policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// The stage failed but was absorbed; carries the failure description
    Degraded(String),
}

/// Per-attempt policy for one stage.
#[derive(Debug, Clone)]
pub struct StagePolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub severity: Severity,
}

/// Run one stage under timeout/retry/degrade policy.
///
/// `f` is invoked once per attempt. Transient failures retry up to
/// `max_retries` times with exponential backoff; non-transient failures
/// resolve immediately. Degradable stages convert their final failure into
/// [`StageOutcome::Degraded`], except cancellation and credential failures,
/// which always propagate.
pub async fn run_stage<F, Fut>(
    stage: Stage,
    policy: &StagePolicy,
    cancel: &watch::Receiver<bool>,
    f: F,
) -> StageResult<StageOutcome>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StageResult<()>>,
{
    let mut attempt = 0u32;

    loop {
        if *cancel.borrow() {
            return Err(StageError::Canceled);
        }

        let started = std::time::Instant::now();
        let result = run_attempt(policy.timeout, cancel.clone(), f()).await;
        metrics::histogram!(
            "lclip_stage_duration_seconds",
            "stage" => stage.as_str(),
            "outcome" => if result.is_ok() { "ok" } else { "err" }
        )
        .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => return Ok(StageOutcome::Completed),
            Err(e) => match e.class() {
                ErrorClass::Canceled | ErrorClass::Credential => return Err(e),
                ErrorClass::Transient if attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.backoff_base * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        stage = %stage,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Stage attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    let exhausted = if e.is_transient() {
                        StageError::RetriesExhausted {
                            attempts: attempt + 1,
                            message: e.to_string(),
                        }
                    } else {
                        e
                    };
                    return match policy.severity {
                        Severity::Fatal => Err(exhausted),
                        Severity::Degradable => {
                            // NoAudioTrack is the one hard failure of an
                            // otherwise degradable stage
                            if matches!(exhausted, StageError::NoAudioTrack) {
                                Err(exhausted)
                            } else {
                                warn!(
                                    stage = %stage,
                                    error = %exhausted,
                                    "Degradable stage failed, continuing with safe default"
                                );
                                Ok(StageOutcome::Degraded(exhausted.to_string()))
                            }
                        }
                    };
                }
            },
        }
    }
}

/// Drive one attempt with timeout and cancellation-with-grace.
async fn run_attempt<Fut>(
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
    fut: Fut,
) -> StageResult<()>
where
    Fut: Future<Output = StageResult<()>>,
{
    tokio::pin!(fut);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    tokio::select! {
        result = &mut fut => result,
        _ = &mut deadline => Err(StageError::Timeout(timeout.as_secs())),
        _ = wait_cancelled(&mut cancel) => {
            // Grace window: let the stage observe the signal and release
            // temp files and child processes before the future is dropped
            match tokio::time::timeout(CANCEL_GRACE_PERIOD, &mut fut).await {
                Ok(_) => Err(StageError::Canceled),
                Err(_) => {
                    warn!("Stage did not stop within the grace period, abandoning");
                    Err(StageError::Canceled)
                }
            }
        }
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run the full pipeline DAG for one job.
///
/// Progress bands, stage policies, and degrade fallbacks are applied here;
/// the stage implementations stay pure.
pub async fn run_pipeline(ctx: &StageContext) -> StageResult<()> {
    let config = &ctx.config;
    let cancel = &ctx.cancel;

    let policy = |stage: Stage, severity: Severity| StagePolicy {
        timeout: config.stage_timeout(stage),
        max_retries: config.stage_max_retries,
        backoff_base: Duration::from_secs(config.stage_retry_backoff_base_seconds),
        severity,
    };

    // Stage one: silence and layout analysis in parallel
    let silence_policy = policy(Stage::SilenceDetect, Severity::Degradable);
    let layout_policy = policy(Stage::LayoutDetect, Severity::Degradable);
    let (silence_result, layout_result) = tokio::join!(
        run_stage(
            Stage::SilenceDetect,
            &silence_policy,
            cancel,
            || stages::silence::run(ctx),
        ),
        run_stage(
            Stage::LayoutDetect,
            &layout_policy,
            cancel,
            || stages::layout::run(ctx),
        ),
    );

    if let StageOutcome::Degraded(reason) = silence_result? {
        // Degraded silence detection means "no silence found": transcription
        // runs over the whole audio
        info!(job_id = %ctx.job.job_id, reason, "Silence detection degraded");
        ctx.artifacts.replace_silence_regions(Vec::new()).await?;
    }
    if let StageOutcome::Degraded(reason) = layout_result? {
        info!(job_id = %ctx.job.job_id, reason, "Layout detection degraded");
        let fallback = LayoutAnalysis::safe_default(ctx.video_info.width, ctx.video_info.height);
        ctx.artifacts.put_layout(&fallback).await?;
    }

    // Stage two: transcription, with slide extraction alongside in vision
    // mode (it only depends on LayoutDetect, which has finished)
    let vision = ctx.job.config.processing_mode == ProcessingMode::Vision;
    let transcribe_policy = policy(Stage::Transcribe, Severity::Fatal);
    let image_extract_policy = policy(Stage::ImageExtract, Severity::Degradable);
    let (transcribe_result, image_result) = tokio::join!(
        run_stage(
            Stage::Transcribe,
            &transcribe_policy,
            cancel,
            || stages::transcribe::run(ctx),
        ),
        async {
            if vision {
                run_stage(
                    Stage::ImageExtract,
                    &image_extract_policy,
                    cancel,
                    || stages::image_extract::run(ctx),
                )
                .await
            } else {
                Ok(StageOutcome::Completed)
            }
        },
    );

    transcribe_result?;
    if let StageOutcome::Degraded(reason) = image_result? {
        info!(job_id = %ctx.job.job_id, reason, "Slide extraction degraded");
        ctx.artifacts.replace_slide_content(Vec::new()).await?;
    }

    // Sequential tail: analyze, select, compile
    run_stage(
        Stage::ContentAnalyze,
        &policy(Stage::ContentAnalyze, Severity::Fatal),
        cancel,
        || stages::content::run(ctx),
    )
    .await?;

    run_stage(
        Stage::SegmentSelect,
        &policy(Stage::SegmentSelect, Severity::Fatal),
        cancel,
        || stages::select::run(ctx),
    )
    .await?;

    run_stage(
        Stage::CompileClips,
        &policy(Stage::CompileClips, Severity::Fatal),
        cancel,
        || stages::compile::run(ctx),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(severity: Severity) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_secs(60),
            severity,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the test duration
        std::mem::forget(tx);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = no_cancel();

        let calls_in = Arc::clone(&calls);
        let outcome = run_stage(
            Stage::Transcribe,
            &fast_policy(Severity::Fatal),
            &cancel,
            move || {
                let calls = Arc::clone(&calls_in);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StageError::Store(lclip_store::StoreError::transient(
                            "redis blip",
                        )))
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, StageOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion_is_fatal() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = no_cancel();

        let calls_in = Arc::clone(&calls);
        let err = run_stage(
            Stage::Transcribe,
            &fast_policy(Severity::Fatal),
            &cancel,
            move || {
                calls_in.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(StageError::Store(lclip_store::StoreError::transient(
                        "still down",
                    )))
                }
            },
        )
        .await
        .unwrap_err();

        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, StageError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = no_cancel();

        let calls_in = Arc::clone(&calls);
        let err = run_stage(
            Stage::ContentAnalyze,
            &fast_policy(Severity::Fatal),
            &cancel,
            move || {
                calls_in.fetch_add(1, Ordering::SeqCst);
                async { Err(StageError::MissingInput("transcript".into())) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, StageError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_degradable_failure_absorbs() {
        let cancel = no_cancel();
        let outcome = run_stage(
            Stage::LayoutDetect,
            &fast_policy(Severity::Degradable),
            &cancel,
            || async { Err(StageError::other("frame decode failed")) },
        )
        .await
        .unwrap();
        assert!(matches!(outcome, StageOutcome::Degraded(_)));
    }

    #[tokio::test]
    async fn test_no_audio_track_fatal_even_when_degradable() {
        let cancel = no_cancel();
        let err = run_stage(
            Stage::SilenceDetect,
            &fast_policy(Severity::Degradable),
            &cancel,
            || async { Err(StageError::NoAudioTrack) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::NoAudioTrack));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = no_cancel();
        let policy = StagePolicy {
            timeout: Duration::from_secs(5),
            max_retries: 1,
            backoff_base: Duration::from_secs(1),
            severity: Severity::Fatal,
        };

        let calls_in = Arc::clone(&calls);
        let err = run_stage(Stage::Transcribe, &policy, &cancel, move || {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, StageError::RetriesExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_waits_for_grace() {
        let (tx, rx) = watch::channel(false);
        let policy = fast_policy(Severity::Fatal);
        let released = Arc::new(AtomicU32::new(0));

        let released_in = Arc::clone(&released);
        let stage = run_stage(Stage::Transcribe, &policy, &rx, move || {
            let released = Arc::clone(&released_in);
            async move {
                // Simulate a stage that notices cancellation quickly and
                // releases its resources
                tokio::time::sleep(Duration::from_secs(2)).await;
                released.fetch_add(1, Ordering::SeqCst);
                Err(StageError::Canceled)
            }
        });

        let driver = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        };

        let (result, _) = tokio::join!(stage, driver);
        assert!(matches!(result.unwrap_err(), StageError::Canceled));
        // The stage got its grace period and finished its cleanup
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_abandons_after_grace() {
        let (tx, rx) = watch::channel(false);
        let policy = fast_policy(Severity::Fatal);

        let stage = run_stage(Stage::Transcribe, &policy, &rx, || async {
            // A stage that never observes the signal
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let driver = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        };

        let started = tokio::time::Instant::now();
        let (result, _) = tokio::join!(stage, driver);
        assert!(matches!(result.unwrap_err(), StageError::Canceled));
        // Abandoned right after the ten-second grace window
        assert!(started.elapsed() < Duration::from_secs(15));
    }
}
