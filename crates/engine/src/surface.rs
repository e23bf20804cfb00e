//! Automation surface abstraction
//!
//! One live browser instance, seen through the handful of primitives the
//! replay driver and the recorder need. The production implementation
//! drives Chromium over CDP (see [`crate::browser`]); tests substitute a
//! scripted surface.

use async_trait::async_trait;
use std::time::Duration;
use uireplay_common::{DeviceProfile, Result};

/// One exclusively-owned live browser instance.
///
/// No surface is ever shared between jobs or sessions; the owner holds it
/// for its whole lifetime and releases it through [`close`](Self::close)
/// or by dropping it.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Apply viewport emulation for the device under test.
    async fn emulate_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Navigate to a URL and wait for the load to commit.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait until the document body is ready, bounded by `timeout`.
    async fn wait_ready(&self, timeout: Duration) -> Result<()>;

    /// Wait until `selector` matches a visible element, bounded by
    /// `timeout`.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the matched element, then type `text` into it.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Dispatch a raw key event to the focused element.
    async fn key_event(&self, key: &str) -> Result<()>;

    /// Set an element's value directly and fire its change event.
    async fn set_value(&self, selector: &str, value: &str) -> Result<()>;

    /// Submit the form owning the matched element.
    async fn submit(&self, selector: &str) -> Result<()>;

    /// Scroll the window to an absolute offset.
    async fn scroll_to(&self, x: f64, y: f64) -> Result<()>;

    /// Evaluate a script in the page, returning its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Capture a full-page screenshot as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the underlying browser instance.
    async fn close(&self);
}

/// Factory for [`AutomationSurface`] instances.
///
/// `visual` requests a headed browser window; recording sessions always
/// ask for one, replay jobs only when the caller opted in.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn acquire(
        &self,
        device: &DeviceProfile,
        visual: bool,
    ) -> Result<Box<dyn AutomationSurface>>;
}

/// Outbound transport for live recorded events.
///
/// The engine pushes one message per drained step, in arrival order. The
/// wire framing belongs to the caller (the platform uses a duplex
/// WebSocket; the CLI prints JSON lines).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, step: &uireplay_common::Step) -> Result<()>;
}
