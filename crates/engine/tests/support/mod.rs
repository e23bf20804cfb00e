//! Scripted automation backend for engine tests.
#![allow(dead_code)] // each test binary uses a different slice of this

//!
//! Each test builds a [`MockPlan`] describing how the browser should
//! behave, hands it to a [`MockBackend`], and inspects the shared state
//! afterwards. No real browser is involved.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uireplay_engine::config::{EngineConfig, TimingConfig};
use uireplay_engine::{AutomationBackend, AutomationSurface, EventSink};
use uireplay_common::{DeviceProfile, Error, Result, Step};

/// Timing with all settles collapsed so tests run in milliseconds.
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        job_deadline_secs: 60,
        readiness_settle_ms: 1,
        readiness_timeout_ms: 50,
        element_wait_ms: 50,
        step_settle_ms: 1,
        action_settle_ms: 1,
        submit_settle_ms: 1,
        poll_interval_ms: 10,
    }
}

pub fn fast_config(max_workers: usize, screenshot_dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        max_workers,
        screenshot_dir: screenshot_dir.to_path_buf(),
        timing: fast_timing(),
        ..Default::default()
    }
}

pub fn device() -> DeviceProfile {
    DeviceProfile {
        name: "Test Device".to_string(),
        width: 390,
        height: 844,
        user_agent: "uireplay-test".to_string(),
    }
}

#[derive(Default)]
pub struct MockPlan {
    /// Fail `acquire` with this message.
    pub fail_acquire: Option<String>,
    pub viewport_error: bool,
    pub navigate_error: bool,
    pub ready_error: bool,
    /// Selector-addressed actions against this selector fail.
    pub failing_selector: Option<String>,
    pub screenshot_error: bool,
    /// Value returned for the performance metrics evaluation.
    pub metrics: Option<serde_json::Value>,
    /// Batches returned by successive recorder drain evaluations.
    pub drain_batches: Mutex<VecDeque<serde_json::Value>>,
    /// When set, `navigate` parks until a permit is released.
    pub navigate_gate: Option<Arc<Semaphore>>,
    /// Ordered record of surface calls, `"method selector"` style.
    pub calls: Mutex<Vec<String>>,
    pub acquired: AtomicUsize,
    pub closed: AtomicUsize,
}

impl MockPlan {
    pub fn push_drain_batch(&self, steps: &[Step]) {
        self.drain_batches
            .lock()
            .push_back(serde_json::to_value(steps).unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[derive(Clone)]
pub struct MockBackend {
    pub plan: Arc<MockPlan>,
}

impl MockBackend {
    pub fn new(plan: MockPlan) -> Self {
        Self {
            plan: Arc::new(plan),
        }
    }
}

#[async_trait]
impl AutomationBackend for MockBackend {
    async fn acquire(
        &self,
        _device: &DeviceProfile,
        _visual: bool,
    ) -> Result<Box<dyn AutomationSurface>> {
        if let Some(message) = &self.plan.fail_acquire {
            return Err(Error::BrowserUnavailable(message.clone()));
        }
        self.plan.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSurface {
            plan: Arc::clone(&self.plan),
        }))
    }
}

pub struct MockSurface {
    plan: Arc<MockPlan>,
}

impl MockSurface {
    fn record(&self, call: impl Into<String>) {
        self.plan.calls.lock().push(call.into());
    }

    fn check_selector(&self, action: &str, selector: &str) -> Result<()> {
        if self.plan.failing_selector.as_deref() == Some(selector) {
            return Err(Error::Evaluation(format!(
                "{} {}: element detached",
                action, selector
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationSurface for MockSurface {
    async fn emulate_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.record(format!("viewport {}x{}", width, height));
        if self.plan.viewport_error {
            return Err(Error::Evaluation("emulation unsupported".to_string()));
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {}", url));
        if let Some(gate) = &self.plan.navigate_gate {
            let permit = gate.acquire().await.map_err(|_| Error::Cancelled)?;
            permit.forget();
        }
        if self.plan.navigate_error {
            return Err(Error::Navigation(format!("{}: connection refused", url)));
        }
        Ok(())
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<()> {
        self.record("wait_ready");
        if self.plan.ready_error {
            return Err(Error::ElementWait {
                selector: "body".to_string(),
            });
        }
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("wait_visible {}", selector));
        if self.plan.failing_selector.as_deref() == Some(selector) {
            return Err(Error::ElementWait {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click {}", selector));
        self.check_selector("click", selector)
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.record(format!("type {} {}", selector, text));
        self.check_selector("type", selector)
    }

    async fn key_event(&self, key: &str) -> Result<()> {
        self.record(format!("key {}", key));
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("set_value {} {}", selector, value));
        self.check_selector("set_value", selector)
    }

    async fn submit(&self, selector: &str) -> Result<()> {
        self.record(format!("submit {}", selector));
        self.check_selector("submit", selector)
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("scroll {} {}", x, y));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        if script.contains("drain()") {
            let batch = self.plan.drain_batches.lock().pop_front();
            return Ok(batch.unwrap_or(serde_json::Value::Null));
        }
        if script.starts_with("({") {
            self.record("evaluate metrics");
            return Ok(self
                .plan
                .metrics
                .clone()
                .unwrap_or(serde_json::Value::Null));
        }
        self.record("evaluate script");
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot");
        if self.plan.screenshot_error {
            return Err(Error::Screenshot("target crashed".to_string()));
        }
        Ok(b"png-bytes".to_vec())
    }

    async fn close(&self) {
        self.plan.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Event sink that buffers everything it receives.
#[derive(Default)]
pub struct CollectingSink {
    pub received: Mutex<Vec<Step>>,
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, step: &Step) -> Result<()> {
        self.received.lock().push(step.clone());
        Ok(())
    }
}
