//! Chromium process management
//!
//! Launches and drives Chromium instances over CDP, implementing the
//! [`AutomationSurface`] seam used by the replay driver and the recorder.

use crate::config::BrowserConfig as BrowserSection;
use crate::surface::{AutomationBackend, AutomationSurface};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uireplay_common::{DeviceProfile, Error, Result};

/// Launch flags carried over from the platform's replay profile. Device
/// metrics are applied per-surface through CDP emulation, not flags.
const LAUNCH_FLAGS: &[&str] = &[
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
    "--disable-dev-shm-usage",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--ignore-certificate-errors",
    "--allow-running-insecure-content",
    "--disable-blink-features=AutomationControlled",
];

/// Locate a usable Chrome/Chromium binary.
///
/// Probes the well-known install locations for the platform, then falls
/// back to a PATH lookup.
pub fn find_browser_binary() -> Result<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
            "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
            "/opt/google/chrome/google-chrome",
        ]
    };

    for path in candidates {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium-browser", "chromium"] {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    Err(Error::BrowserUnavailable(
        "no Chrome or Chromium binary found; install one or set browser.binary_path".to_string(),
    ))
}

/// Backend that launches one Chromium process per acquired surface.
#[derive(Debug, Clone)]
pub struct ChromiumBackend {
    config: BrowserSection,
}

impl ChromiumBackend {
    pub fn new(config: BrowserSection) -> Self {
        Self { config }
    }

    fn binary(&self) -> Result<PathBuf> {
        match &self.config.binary_path {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(Error::BrowserUnavailable(format!(
                "configured browser binary not accessible: {}",
                path.display()
            ))),
            None => find_browser_binary(),
        }
    }
}

#[async_trait]
impl AutomationBackend for ChromiumBackend {
    async fn acquire(
        &self,
        device: &DeviceProfile,
        visual: bool,
    ) -> Result<Box<dyn AutomationSurface>> {
        let binary = self.binary()?;
        debug!("Launching browser: {}", binary.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&binary)
            .no_sandbox()
            .window_size(device.width, device.height)
            .args(LAUNCH_FLAGS.to_vec());
        if visual {
            builder = builder.with_head();
        }
        for flag in &self.config.extra_flags {
            builder = builder.arg(flag);
        }
        let launch_config = builder.build().map_err(Error::Acquisition)?;

        let (browser, mut handler) = Browser::launch(launch_config)
            .await
            .map_err(|e| Error::Acquisition(e.to_string()))?;

        // The handler stream must be driven for the CDP connection to
        // make progress; it ends when the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Acquisition(e.to_string()))?;

        if !device.user_agent.is_empty() {
            page.set_user_agent(device.user_agent.as_str())
                .await
                .map_err(|e| Error::Acquisition(e.to_string()))?;
        }

        Ok(Box::new(CdpSurface {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
        }))
    }
}

/// One live Chromium instance plus the page being driven.
pub struct CdpSurface {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl CdpSurface {
    async fn find(&self, selector: &str) -> Result<chromiumoxide::element::Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| Error::Evaluation(format!("element {}: {}", selector, e)))
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, key: &str) -> Result<()> {
        let mut builder = DispatchKeyEventParams::builder().r#type(kind).key(key);
        // Single characters also carry text so they produce input.
        if key.chars().count() == 1 {
            builder = builder.text(key);
        }
        let params = builder.build().map_err(Error::Evaluation)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| Error::Evaluation(format!("key event {}: {}", key, e)))?;
        Ok(())
    }
}

#[async_trait]
impl AutomationSurface for CdpSurface {
    async fn emulate_viewport(&self, width: u32, height: u32) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(Error::Evaluation)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| Error::Evaluation(format!("viewport emulation: {}", e)))?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        self.wait_visible("body", timeout).await
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        // CDP has no first-class visibility wait; poll the DOM the same
        // way the daemon waits for a control socket to appear.
        let start = Instant::now();
        loop {
            match self.page.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(e) => trace!("waiting for {}: {}", selector, e),
            }
            if start.elapsed() > timeout {
                return Err(Error::ElementWait {
                    selector: selector.to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.find(selector).await?;
        element
            .click()
            .await
            .map_err(|e| Error::Evaluation(format!("click {}: {}", selector, e)))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.find(selector).await?;
        element
            .focus()
            .await
            .map_err(|e| Error::Evaluation(format!("focus {}: {}", selector, e)))?;
        // Clear any existing value before typing, as the recorder
        // captured the final value rather than individual keystrokes.
        let script = format!(
            "document.querySelector({})?.value !== undefined && (document.querySelector({}).value = '')",
            serde_json::to_string(selector)?,
            serde_json::to_string(selector)?
        );
        self.evaluate(&script).await?;
        element
            .type_str(text)
            .await
            .map_err(|e| Error::Evaluation(format!("type into {}: {}", selector, e)))?;
        Ok(())
    }

    async fn key_event(&self, key: &str) -> Result<()> {
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r#"(function() {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = serde_json::to_string(selector)?,
            val = serde_json::to_string(value)?,
        );
        let found = self.evaluate(&script).await?;
        if found.as_bool() != Some(true) {
            return Err(Error::Evaluation(format!("no element matches {}", selector)));
        }
        Ok(())
    }

    async fn submit(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(function() {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const form = el.tagName === 'FORM' ? el : el.closest('form');
                if (!form) return false;
                if (form.requestSubmit) {{ form.requestSubmit(); }} else {{ form.submit(); }}
                return true;
            }})()"#,
            sel = serde_json::to_string(selector)?,
        );
        let submitted = self.evaluate(&script).await?;
        if submitted.as_bool() != Some(true) {
            return Err(Error::Evaluation(format!("no form to submit for {}", selector)));
        }
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.evaluate(&format!("window.scrollTo({}, {})", x, y)).await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| Error::Screenshot(e.to_string()))
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
    }
}

impl Drop for CdpSurface {
    fn drop(&mut self) {
        // close() is the normal path; this only stops the handler task
        // when the surface is dropped mid-replay (cancellation).
        self.handler_task.abort();
    }
}
