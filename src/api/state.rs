//! Application state for the API server

use crate::{Config, TestOrchestrator};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the orchestrator and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The engine every connection runs its batches on
    pub engine: Arc<TestOrchestrator>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: Arc<TestOrchestrator>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }
}
