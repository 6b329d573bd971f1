use log::{debug, info, warn};

/// Logger scoped to one pipeline stage; the stage name is the log target.
#[derive(Debug, Clone, Copy)]
pub struct LogManager {
    stage: &'static str,
}

impl LogManager {
    pub fn new() -> Self {
        Self::for_stage("seiscore")
    }

    pub fn for_stage(stage: &'static str) -> Self {
        Self { stage }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn record(&self, message: &str) {
        info!(target: self.stage, "{}", message);
    }

    pub fn detail(&self, message: &str) {
        debug!(target: self.stage, "{}", message);
    }

    pub fn caution(&self, message: &str) {
        warn!(target: self.stage, "{}", message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
