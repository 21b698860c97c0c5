//! Per-run context: one config, one timeline, one cancel token.

use crate::cancel::CancelToken;
use crate::config::SuiteConfig;
use crate::poller::Poller;
use crate::timeline::{SystemTimeline, Timeline};
use std::sync::Arc;

/// Shared state for every poll a suite run performs.
///
/// All pollers handed out by one context share its timeline and cancel
/// token, so cancelling the context stops every wait in the run.
#[derive(Debug, Clone)]
pub struct SuiteContext {
    config: Arc<SuiteConfig>,
    timeline: Arc<dyn Timeline>,
    cancel: CancelToken,
}

impl SuiteContext {
    /// Context on the real clock
    #[must_use]
    pub fn new(config: SuiteConfig) -> Self {
        Self::with_timeline(config, Arc::new(SystemTimeline::new()))
    }

    /// Context on an injected timeline
    #[must_use]
    pub fn with_timeline(config: SuiteConfig, timeline: Arc<dyn Timeline>) -> Self {
        Self {
            config: Arc::new(config),
            timeline,
            cancel: CancelToken::new(),
        }
    }

    /// The suite configuration
    #[must_use]
    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// A poller sharing this context's timeline and cancel token
    #[must_use]
    pub fn poller(&self) -> Poller {
        Poller::with_timeline(self.timeline.clone()).with_cancel(self.cancel.clone())
    }

    /// Handle that stops every poll in this run
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}
