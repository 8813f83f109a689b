// Explicit per-run context: which device, through which transport, stoppable
// by which token
use super::cancel::CancelToken;
use crate::adb::Transport;
use crate::config::AppConfig;
use crate::template_matching::TemplateMatcher;
use std::sync::Arc;

/// Everything a routine step needs. Cheap to clone; clones share the
/// transport, configuration and cancellation flag.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: Arc<T>,
    device: String,
    token: CancelToken,
    matcher: TemplateMatcher,
    config: Arc<AppConfig>,
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            device: self.device.clone(),
            token: self.token.clone(),
            matcher: self.matcher.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: Arc<T>,
        device: impl Into<String>,
        token: CancelToken,
        config: Arc<AppConfig>,
    ) -> Self {
        let matcher = TemplateMatcher::new(config.matching.clone());
        Self {
            transport,
            device: device.into(),
            token,
            matcher,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn matcher(&self) -> &TemplateMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
