//! Server state.

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::pipeline::LabelPipeline;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Config,
    pub pipeline: LabelPipeline,
    /// Printer sessions, one per transport.
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Config, pipeline: LabelPipeline, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            pipeline,
            dispatcher,
        }
    }
}
