use crate::workflow::runner::AnalysisReport;
use serde::{Deserialize, Serialize};

/// State served by `GET /report`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeModel {
    pub last_report: Option<AnalysisReport>,
    pub completed: usize,
    pub status: String,
}

impl BridgeModel {
    pub fn record(&mut self, report: AnalysisReport) {
        self.status = format!("analysis of {} ready", report.channels.join(", "));
        self.last_report = Some(report);
        self.completed += 1;
    }
}
