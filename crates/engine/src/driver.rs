//! Step execution driver
//!
//! Replays one ordered step sequence against one live browser surface and
//! produces a complete [`ExecutionResult`]. One pass, no retries: the
//! first failing step ends the job with whatever evidence accumulated.

use crate::config::TimingConfig;
use crate::evidence::EvidenceStore;
use crate::surface::{AutomationBackend, AutomationSurface};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uireplay_common::{
    ExecutionJob, ExecutionResult, LogLevel, PerformanceMetric, Step, StepKind, LOG_NO_STEP,
};

/// Replay phases, in order of progression. Terminal phases are reported
/// through the result rather than this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayPhase {
    Initializing,
    Navigating,
    Ready,
    Replaying(usize),
}

impl std::fmt::Display for ReplayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayPhase::Initializing => write!(f, "initializing"),
            ReplayPhase::Navigating => write!(f, "navigating"),
            ReplayPhase::Ready => write!(f, "ready"),
            ReplayPhase::Replaying(i) => write!(f, "replaying step {}", i),
        }
    }
}

/// Drives step replay for one job at a time. Stateless between jobs;
/// workers share a single driver instance.
pub struct StepDriver {
    backend: Arc<dyn AutomationBackend>,
    evidence: EvidenceStore,
    timing: TimingConfig,
}

impl StepDriver {
    pub fn new(
        backend: Arc<dyn AutomationBackend>,
        evidence: EvidenceStore,
        timing: TimingConfig,
    ) -> Self {
        Self {
            backend,
            evidence,
            timing,
        }
    }

    /// Replay `job` to completion, cancellation, or deadline.
    ///
    /// The cancellation token and the deadline race every suspension
    /// point of the replay; either one interrupts mid-navigation,
    /// mid-wait, or between steps and yields a failed result carrying
    /// the partial evidence gathered so far.
    pub async fn run(&self, job: &ExecutionJob, cancel: &CancellationToken) -> ExecutionResult {
        let mut result = ExecutionResult::default();
        let deadline = self.timing.job_deadline();

        enum Outcome {
            Finished,
            Cancelled,
            TimedOut,
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep(deadline) => Outcome::TimedOut,
            _ = self.replay(job, &mut result) => Outcome::Finished,
        };

        match outcome {
            Outcome::Finished => {}
            Outcome::Cancelled => {
                result.success = false;
                result.error_message = "Execution cancelled".to_string();
                result.push_log(LogLevel::Error, "Execution cancelled", LOG_NO_STEP);
            }
            Outcome::TimedOut => {
                result.success = false;
                result.error_message = format!(
                    "Execution exceeded deadline of {}s",
                    self.timing.job_deadline_secs
                );
                result.push_log(LogLevel::Error, result.error_message.clone(), LOG_NO_STEP);
            }
        }

        result
    }

    async fn replay(&self, job: &ExecutionJob, result: &mut ExecutionResult) {
        let mut phase = ReplayPhase::Initializing;
        debug!(execution_id = job.execution_id, %phase, "replay starting");

        let surface = match self.backend.acquire(&job.device, job.visual).await {
            Ok(surface) => surface,
            Err(e) => {
                result.error_message = e.to_string();
                result.push_log(
                    LogLevel::Error,
                    format!("Failed to acquire browser instance: {}", e),
                    LOG_NO_STEP,
                );
                return;
            }
        };
        let started = Instant::now();

        result.push_log(
            LogLevel::Info,
            format!(
                "Setting up device emulation: {} ({}x{})",
                job.device.name, job.device.width, job.device.height
            ),
            LOG_NO_STEP,
        );
        match surface
            .emulate_viewport(job.device.width, job.device.height)
            .await
        {
            Ok(()) => {
                result.push_log(LogLevel::Info, "Device viewport emulation enabled", LOG_NO_STEP)
            }
            // Replay proceeds with the default viewport.
            Err(e) => result.push_log(
                LogLevel::Warn,
                format!("Failed to set viewport emulation: {}", e),
                LOG_NO_STEP,
            ),
        }

        phase = ReplayPhase::Navigating;
        debug!(execution_id = job.execution_id, %phase, url = %job.target_url, "navigating");
        result.push_log(
            LogLevel::Info,
            format!("Navigating to target URL: {}", job.target_url),
            LOG_NO_STEP,
        );
        if let Err(e) = surface.navigate(&job.target_url).await {
            result.error_message = format!("Failed to navigate to URL: {}", e);
            result.push_log(LogLevel::Error, result.error_message.clone(), LOG_NO_STEP);
            surface.close().await;
            return;
        }

        phase = ReplayPhase::Ready;
        debug!(execution_id = job.execution_id, %phase, "waiting for readiness");
        result.push_log(LogLevel::Info, "Waiting for page to load...", LOG_NO_STEP);
        tokio::time::sleep(self.timing.readiness_settle()).await;
        match surface.wait_ready(self.timing.readiness_timeout()).await {
            Ok(()) => result.push_log(LogLevel::Info, "Page loaded successfully", LOG_NO_STEP),
            // The UI under test may render asynchronously; keep going.
            Err(e) => result.push_log(
                LogLevel::Warn,
                format!("Page not fully loaded, continuing with execution ({})", e),
                LOG_NO_STEP,
            ),
        }

        self.capture(surface.as_ref(), "initial", 0, result).await;

        for (index, step) in job.steps.iter().enumerate() {
            phase = ReplayPhase::Replaying(index);
            debug!(execution_id = job.execution_id, %phase, kind = %step.kind, "executing step");
            result.push_log(
                LogLevel::Info,
                format!("Executing step {}: {}", index + 1, step.kind),
                index as i32,
            );

            if let Err(e) = self.execute_step(surface.as_ref(), step).await {
                result.error_message = format!("Step {} failed: {}", index + 1, e);
                result.push_log(LogLevel::Error, result.error_message.clone(), index as i32);
                self.capture(surface.as_ref(), "error", index, result).await;
                surface.close().await;
                return;
            }

            result.push_log(
                LogLevel::Info,
                format!("Step {} completed successfully", index + 1),
                index as i32,
            );

            if takes_screenshot(step.kind) {
                self.capture(surface.as_ref(), "step", index, result).await;
            }

            // Step-to-step pacing; absorbs UI transition latency and is
            // required for deterministic replay.
            tokio::time::sleep(self.timing.step_settle()).await;
        }

        self.capture(surface.as_ref(), "final", job.steps.len(), result)
            .await;

        let mut metrics = self.collect_metrics(surface.as_ref(), result).await;
        metrics.page_load_time_ms = started.elapsed().as_millis() as u64;
        result.metrics = Some(metrics);

        result.success = true;
        result.push_log(
            LogLevel::Info,
            "Test case execution completed successfully",
            LOG_NO_STEP,
        );
        surface.close().await;
    }

    async fn execute_step(
        &self,
        surface: &dyn AutomationSurface,
        step: &Step,
    ) -> uireplay_common::Result<()> {
        let wait = self.timing.element_wait();
        match step.kind {
            StepKind::Click | StepKind::Touchstart => {
                surface.wait_visible(&step.selector, wait).await?;
                surface.click(&step.selector).await?;
                tokio::time::sleep(self.timing.action_settle()).await;
                Ok(())
            }
            // touchend carries no replayable action of its own.
            StepKind::Touchend => Ok(()),
            StepKind::Input => {
                surface.wait_visible(&step.selector, wait).await?;
                surface.type_text(&step.selector, &step.value).await?;
                tokio::time::sleep(self.timing.action_settle()).await;
                Ok(())
            }
            StepKind::Keydown => {
                surface.key_event(&step.value).await?;
                tokio::time::sleep(self.timing.action_settle()).await;
                Ok(())
            }
            StepKind::Scroll => {
                if let Some(y) = step.coordinate("scrollY") {
                    surface.scroll_to(0.0, y).await?;
                    tokio::time::sleep(self.timing.action_settle()).await;
                }
                Ok(())
            }
            StepKind::Change => {
                surface.wait_visible(&step.selector, wait).await?;
                surface.set_value(&step.selector, &step.value).await?;
                tokio::time::sleep(self.timing.action_settle()).await;
                Ok(())
            }
            StepKind::Submit => {
                surface.wait_visible(&step.selector, wait).await?;
                surface.submit(&step.selector).await?;
                tokio::time::sleep(self.timing.submit_settle()).await;
                Ok(())
            }
        }
    }

    /// Best-effort screenshot capture; failures degrade to warn logs and
    /// never fail the job.
    async fn capture(
        &self,
        surface: &dyn AutomationSurface,
        tag: &str,
        step_index: usize,
        result: &mut ExecutionResult,
    ) {
        match surface.screenshot().await {
            Ok(bytes) => match self.evidence.store(tag, step_index, &bytes).await {
                Ok(filename) => result.screenshots.push(filename),
                Err(e) => result.push_log(
                    LogLevel::Warn,
                    format!("Failed to save screenshot: {}", e),
                    LOG_NO_STEP,
                ),
            },
            Err(e) => result.push_log(
                LogLevel::Warn,
                format!("Failed to take screenshot: {}", e),
                LOG_NO_STEP,
            ),
        }
    }

    /// Best-effort performance sample; absent metrics stay zero.
    async fn collect_metrics(
        &self,
        surface: &dyn AutomationSurface,
        result: &mut ExecutionResult,
    ) -> PerformanceMetric {
        match surface.evaluate(METRICS_SCRIPT).await {
            Ok(value) => parse_metrics(value),
            Err(e) => {
                result.push_log(
                    LogLevel::Warn,
                    format!("Failed to collect performance metrics: {}", e),
                    LOG_NO_STEP,
                );
                PerformanceMetric::default()
            }
        }
    }
}

/// Screenshots are captured after these step kinds only, bounding
/// evidence storage.
fn takes_screenshot(kind: StepKind) -> bool {
    matches!(kind, StepKind::Click | StepKind::Submit | StepKind::Change)
}

const METRICS_SCRIPT: &str = r#"({
    domContentLoaded: performance.timing.domContentLoadedEventEnd - performance.timing.navigationStart,
    memoryUsage: performance.memory ? performance.memory.usedJSHeapSize / 1024 / 1024 : 0,
    networkRequests: performance.getEntriesByType('resource').length
})"#;

/// Page-side sample shape for [`METRICS_SCRIPT`]. Every field is
/// optional; browsers without `performance.memory` simply omit data.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPerformanceSample {
    dom_content_loaded: f64,
    memory_usage: f64,
    network_requests: f64,
}

fn parse_metrics(value: serde_json::Value) -> PerformanceMetric {
    let sample: RawPerformanceSample = serde_json::from_value(value).unwrap_or_default();
    PerformanceMetric {
        dom_content_loaded_ms: sample.dom_content_loaded.max(0.0) as u64,
        memory_usage_mb: sample.memory_usage.max(0.0),
        network_request_count: sample.network_requests.max(0.0) as u64,
        page_load_time_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_metrics_full_sample() {
        let metric = parse_metrics(json!({
            "domContentLoaded": 812.0,
            "memoryUsage": 34.25,
            "networkRequests": 17
        }));
        assert_eq!(metric.dom_content_loaded_ms, 812);
        assert_eq!(metric.memory_usage_mb, 34.25);
        assert_eq!(metric.network_request_count, 17);
        assert_eq!(metric.page_load_time_ms, 0);
    }

    #[test]
    fn test_parse_metrics_missing_fields_default_to_zero() {
        let metric = parse_metrics(json!({ "networkRequests": 3 }));
        assert_eq!(metric.dom_content_loaded_ms, 0);
        assert_eq!(metric.memory_usage_mb, 0.0);
        assert_eq!(metric.network_request_count, 3);
    }

    #[test]
    fn test_parse_metrics_garbage_tolerated() {
        let metric = parse_metrics(json!("not an object"));
        assert_eq!(metric.dom_content_loaded_ms, 0);

        // Negative timing deltas (navigationStart of 0) clamp to zero
        // instead of wrapping.
        let metric = parse_metrics(json!({ "domContentLoaded": -120.0 }));
        assert_eq!(metric.dom_content_loaded_ms, 0);
    }

    #[test]
    fn test_selective_screenshot_kinds() {
        assert!(takes_screenshot(StepKind::Click));
        assert!(takes_screenshot(StepKind::Submit));
        assert!(takes_screenshot(StepKind::Change));
        assert!(!takes_screenshot(StepKind::Input));
        assert!(!takes_screenshot(StepKind::Scroll));
        assert!(!takes_screenshot(StepKind::Keydown));
    }
}
