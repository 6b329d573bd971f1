use crate::generator::profile::GeneratorConfig;
use crate::workflow::runner::{AnalysisKind, AnalysisRequest};
use anyhow::Context;
use seiscore::interface::{ChannelId, TimeInterval};
use seiscore::processing::{
    CorrelatorConfig, DeconvolverConfig, FilterSelection, SpectrumConfig, TaperKind,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub analysis: AnalysisKind,
    pub filter: FilterSelection,
    /// Taper for every request; each analysis picks its own when unset.
    pub taper: Option<TaperKind>,
    /// Analysis window; the full extent of each channel when unset.
    pub interval: Option<TimeInterval>,
    /// Channel codes to analyze; every generated channel when empty.
    pub channels: Vec<String>,
    pub correlation: CorrelatorConfig,
    pub deconvolution: DeconvolverConfig,
    pub spectra: SpectrumConfig,
    /// Pre-approves deconvolution of traces above the size ceiling.
    pub confirm_oversized: bool,
    pub generator: GeneratorConfig,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn selected_channels(&self) -> Vec<ChannelId> {
        if self.channels.is_empty() {
            self.generator.channel_ids()
        } else {
            self.channels
                .iter()
                .map(|code| self.generator.channel_id(code))
                .collect()
        }
    }

    fn request(&self, channels: Vec<ChannelId>) -> AnalysisRequest {
        AnalysisRequest {
            channels,
            interval: self.interval,
            filter: self.filter,
            taper: self.taper,
            analysis: self.analysis.clone(),
            confirm_oversized: self.confirm_oversized,
        }
    }

    /// Splits the configured analysis into independent requests: one per
    /// channel for per-channel views, a single request for paired views.
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        let channels = self.selected_channels();
        match self.analysis {
            AnalysisKind::Correlation => {
                vec![self.request(channels.into_iter().take(2).collect())]
            }
            AnalysisKind::ParticleMotion => {
                let horizontal = |suffix: char| {
                    channels
                        .iter()
                        .find(|id| id.channel.ends_with(suffix))
                        .cloned()
                };
                let pair = match (horizontal('N'), horizontal('E')) {
                    (Some(north), Some(east)) => vec![north, east],
                    _ => channels.into_iter().take(2).collect(),
                };
                vec![self.request(pair)]
            }
            _ => channels
                .into_iter()
                .map(|id| self.request(vec![id]))
                .collect(),
        }
    }
}
