//! Recording session management
//!
//! Owns live in-browser capture sessions: one visible browser per
//! session, instrumentation injected into the page, and a fixed-interval
//! poll loop that drains captured events into the session's step buffer
//! and forwards them to an attached subscriber.
//!
//! Capture is polling-based by design: user interaction is push-shaped,
//! but draining a page-side buffer every tick keeps the instrumentation
//! self-contained, at a latency bounded by the poll interval.

use crate::config::TimingConfig;
use crate::surface::{AutomationBackend, AutomationSurface, EventSink};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uireplay_common::selector::SELECTOR_FUNCTION_JS;
use uireplay_common::{DeviceProfile, Error, RecordingStatus, Result, Step};

type SharedSink = Arc<RwLock<Option<Arc<dyn EventSink>>>>;

/// Runtime state for one recording session. Kept in the registry until
/// explicit cleanup; stopping only ends capture.
struct SessionHandle {
    is_recording: Arc<AtomicBool>,
    steps: Arc<SyncMutex<Vec<Step>>>,
    sink: SharedSink,
    cancel: CancellationToken,
}

/// Registry and life-cycle manager for recording sessions.
pub struct RecordingManager {
    backend: Arc<dyn AutomationBackend>,
    timing: TimingConfig,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl RecordingManager {
    pub fn new(backend: Arc<dyn AutomationBackend>, timing: TimingConfig) -> Self {
        Self {
            backend,
            timing,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a new recording session in a visible browser.
    ///
    /// Rejects duplicate session ids without touching the existing
    /// session.
    pub async fn start(
        &self,
        session_id: &str,
        target_url: &str,
        device: DeviceProfile,
    ) -> Result<()> {
        if self.sessions.read().contains_key(session_id) {
            return Err(Error::DuplicateSession(session_id.to_string()));
        }

        // Recording always wants a headed browser the user can interact
        // with.
        let surface = self.backend.acquire(&device, true).await?;

        if let Err(e) = surface.emulate_viewport(device.width, device.height).await {
            warn!(session_id, "viewport emulation failed: {}", e);
        }

        if let Err(e) = self.prepare_page(surface.as_ref(), target_url).await {
            surface.close().await;
            return Err(e);
        }

        let handle = SessionHandle {
            is_recording: Arc::new(AtomicBool::new(true)),
            steps: Arc::new(SyncMutex::new(Vec::new())),
            sink: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
        };

        let poll = PollLoop {
            session_id: session_id.to_string(),
            surface,
            interval: self.timing.poll_interval(),
            is_recording: Arc::clone(&handle.is_recording),
            steps: Arc::clone(&handle.steps),
            sink: Arc::clone(&handle.sink),
            cancel: handle.cancel.clone(),
        };

        {
            let mut sessions = self.sessions.write();
            // A racing start may have won while the browser launched.
            if sessions.contains_key(session_id) {
                drop(sessions);
                poll.surface.close().await;
                return Err(Error::DuplicateSession(session_id.to_string()));
            }
            sessions.insert(session_id.to_string(), handle);
        }

        tokio::spawn(poll.run());
        info!(session_id, target_url, "recording session started");
        Ok(())
    }

    async fn prepare_page(&self, surface: &dyn AutomationSurface, target_url: &str) -> Result<()> {
        surface.navigate(target_url).await?;
        surface.wait_ready(self.timing.readiness_timeout()).await?;
        // Give dynamic content a chance to attach listeners first.
        tokio::time::sleep(self.timing.readiness_settle()).await;
        surface.evaluate(&capture_script()).await?;
        Ok(())
    }

    /// End capture for a session. The session and its accumulated steps
    /// stay queryable until [`cleanup`](Self::cleanup).
    pub fn stop(&self, session_id: &str) -> Result<()> {
        let sessions = self.sessions.read();
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if !handle.is_recording.swap(false, Ordering::SeqCst) {
            return Err(Error::RecorderState("no recording in progress".to_string()));
        }
        handle.cancel.cancel();
        info!(session_id, "recording session stopped");
        Ok(())
    }

    /// Snapshot of a session's recording flag and captured steps.
    pub fn status(&self, session_id: &str) -> Result<RecordingStatus> {
        let sessions = self.sessions.read();
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        let steps = handle.steps.lock().clone();
        Ok(RecordingStatus {
            session_id: session_id.to_string(),
            is_recording: handle.is_recording.load(Ordering::SeqCst),
            steps,
        })
    }

    /// Replace the outbound transport for live event forwarding. Steps
    /// already buffered are not replayed to the new subscriber.
    pub fn attach_subscriber(&self, session_id: &str, sink: Arc<dyn EventSink>) -> Result<()> {
        let sessions = self.sessions.read();
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        *handle.sink.write() = Some(sink);
        Ok(())
    }

    /// Remove a session from the registry entirely. A second call for
    /// the same id reports [`Error::SessionNotFound`].
    pub fn cleanup(&self, session_id: &str) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        // Stops the poll loop and releases the browser if the session
        // was still live.
        handle.is_recording.store(false, Ordering::SeqCst);
        handle.cancel.cancel();
        debug!(session_id, "recording session cleaned up");
        Ok(())
    }

    /// Ids of all registered sessions, live and stopped.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

/// Fixed-interval drain of the page-side event buffer.
struct PollLoop {
    session_id: String,
    surface: Box<dyn AutomationSurface>,
    interval: std::time::Duration,
    is_recording: Arc<AtomicBool>,
    steps: Arc<SyncMutex<Vec<Step>>>,
    sink: SharedSink,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.is_recording.load(Ordering::SeqCst) {
                        break;
                    }
                    self.drain_once().await;
                }
            }
        }
        self.surface.close().await;
        debug!(session_id = %self.session_id, "poll loop ended");
    }

    async fn drain_once(&self) {
        let value = match self.surface.evaluate(DRAIN_SCRIPT).await {
            Ok(value) => value,
            Err(e) => {
                // The page may be navigating; skip this tick.
                warn!(session_id = %self.session_id, "error getting events: {}", e);
                return;
            }
        };

        let events: Vec<Step> = match value {
            serde_json::Value::Null => Vec::new(),
            value => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(session_id = %self.session_id, "undecodable event batch: {}", e);
                Vec::new()
            }),
        };
        if events.is_empty() {
            return;
        }

        self.steps.lock().extend(events.iter().cloned());

        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            for step in &events {
                if let Err(e) = sink.emit(step).await {
                    warn!(session_id = %self.session_id, "subscriber push failed: {}", e);
                }
            }
        }
    }
}

const DRAIN_SCRIPT: &str = "window.__uiReplayRecorder && window.__uiReplayRecorder.drain()";

/// Build the capture instrumentation injected into recorded pages.
///
/// The selector derivation is spliced in from
/// [`uireplay_common::selector`] so recorder output and replay share one
/// algorithm.
pub fn capture_script() -> String {
    CAPTURE_SCRIPT_TEMPLATE.replace("__SELECTOR_FN__", SELECTOR_FUNCTION_JS)
}

const CAPTURE_SCRIPT_TEMPLATE: &str = r#"
(function() {
    if (window.__uiReplayRecorder) return;

    window.__uiReplayRecorder = {
        events: [],

        addEvent: function(event) {
            this.events.push(event);
        },

        drain: function() {
            const events = [...this.events];
            this.events = [];
            return events;
        },

        getSelector: __SELECTOR_FN__,

        getCoordinates: function(event) {
            const rect = event.target.getBoundingClientRect();
            return {
                x: event.clientX - rect.left,
                y: event.clientY - rect.top,
                pageX: event.pageX,
                pageY: event.pageY
            };
        }
    };

    document.addEventListener('click', function(event) {
        if (event.isTrusted) {
            window.__uiReplayRecorder.addEvent({
                type: 'click',
                selector: window.__uiReplayRecorder.getSelector(event.target),
                coordinates: window.__uiReplayRecorder.getCoordinates(event),
                timestamp: Date.now(),
                options: {
                    button: event.button,
                    detail: event.detail
                }
            });
        }
    }, true);

    document.addEventListener('input', function(event) {
        if (event.isTrusted && event.target.tagName) {
            const tagName = event.target.tagName.toLowerCase();
            if (tagName === 'input' || tagName === 'textarea') {
                window.__uiReplayRecorder.addEvent({
                    type: 'input',
                    selector: window.__uiReplayRecorder.getSelector(event.target),
                    value: event.target.value,
                    timestamp: Date.now(),
                    options: {
                        inputType: event.inputType
                    }
                });
            }
        }
    }, true);

    document.addEventListener('keydown', function(event) {
        if (event.isTrusted) {
            window.__uiReplayRecorder.addEvent({
                type: 'keydown',
                selector: window.__uiReplayRecorder.getSelector(event.target),
                value: event.key,
                timestamp: Date.now(),
                options: {
                    keyCode: event.keyCode,
                    ctrlKey: event.ctrlKey,
                    shiftKey: event.shiftKey,
                    altKey: event.altKey,
                    metaKey: event.metaKey
                }
            });
        }
    }, true);

    document.addEventListener('touchstart', function(event) {
        if (event.isTrusted) {
            const touch = event.touches[0];
            window.__uiReplayRecorder.addEvent({
                type: 'touchstart',
                selector: window.__uiReplayRecorder.getSelector(event.target),
                coordinates: {
                    x: touch.clientX,
                    y: touch.clientY,
                    pageX: touch.pageX,
                    pageY: touch.pageY
                },
                timestamp: Date.now(),
                options: {
                    touchCount: event.touches.length
                }
            });
        }
    }, true);

    document.addEventListener('touchend', function(event) {
        if (event.isTrusted) {
            window.__uiReplayRecorder.addEvent({
                type: 'touchend',
                selector: window.__uiReplayRecorder.getSelector(event.target),
                timestamp: Date.now(),
                options: {
                    touchCount: event.changedTouches.length
                }
            });
        }
    }, true);

    document.addEventListener('scroll', function(event) {
        if (event.isTrusted) {
            window.__uiReplayRecorder.addEvent({
                type: 'scroll',
                selector: window.__uiReplayRecorder.getSelector(event.target),
                coordinates: {
                    scrollX: window.scrollX,
                    scrollY: window.scrollY
                },
                timestamp: Date.now()
            });
        }
    }, true);

    document.addEventListener('submit', function(event) {
        if (event.isTrusted) {
            window.__uiReplayRecorder.addEvent({
                type: 'submit',
                selector: window.__uiReplayRecorder.getSelector(event.target),
                timestamp: Date.now()
            });
        }
    }, true);

    document.addEventListener('change', function(event) {
        if (event.isTrusted && event.target.tagName) {
            const tagName = event.target.tagName.toLowerCase();
            if (tagName === 'select' || tagName === 'input') {
                window.__uiReplayRecorder.addEvent({
                    type: 'change',
                    selector: window.__uiReplayRecorder.getSelector(event.target),
                    value: event.target.value,
                    timestamp: Date.now(),
                    options: {
                        type: event.target.type
                    }
                });
            }
        }
    }, true);
})();
"#;
