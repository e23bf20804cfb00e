//! uireplay Engine
//!
//! Execution scheduling, step replay, and recording session management
//! for browser UI tests. The engine is an explicitly constructed service
//! object; callers hold it by reference and tear it down with
//! [`Engine::shutdown`].

pub mod browser;
pub mod config;
pub mod driver;
pub mod evidence;
pub mod recorder;
pub mod scheduler;
pub mod surface;

pub use config::EngineConfig;
pub use recorder::RecordingManager;
pub use scheduler::Scheduler;
pub use surface::{AutomationBackend, AutomationSurface, EventSink};

use crate::driver::StepDriver;
use crate::evidence::EvidenceStore;
use std::sync::Arc;
use uireplay_common::Result;

/// The assembled engine: one scheduler and one recording manager sharing
/// an automation backend.
pub struct Engine {
    scheduler: Scheduler,
    recorder: RecordingManager,
}

impl Engine {
    /// Construct the engine with the production Chromium backend.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let backend = Arc::new(browser::ChromiumBackend::new(config.browser.clone()));
        Self::with_backend(config, backend)
    }

    /// Construct the engine over an arbitrary automation backend. Tests
    /// use this to substitute scripted surfaces.
    pub fn with_backend(
        config: EngineConfig,
        backend: Arc<dyn AutomationBackend>,
    ) -> Result<Self> {
        let evidence = EvidenceStore::new(&config.screenshot_dir);
        let driver = Arc::new(StepDriver::new(
            Arc::clone(&backend),
            evidence,
            config.timing.clone(),
        ));
        let scheduler = Scheduler::start(config.max_workers, driver)?;
        let recorder = RecordingManager::new(backend, config.timing);
        Ok(Self { scheduler, recorder })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn recorder(&self) -> &RecordingManager {
        &self.recorder
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    /// Recording sessions are cleaned up unconditionally.
    pub async fn shutdown(&self) {
        for session_id in self.recorder.session_ids() {
            let _ = self.recorder.cleanup(&session_id);
        }
        self.scheduler.shutdown().await;
    }
}
