use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use log::{info, warn};
use seiscore::interface::{
    sample_response_curve, ChannelData, ChannelId, Response, ResponsePoint, ResponseProvider,
    TimeInterval,
};
use seiscore::processing::{
    particle_motion, ButterworthFilter, CorrelationResult, Correlator, Deconvolver,
    FilterDescriptor, FilterSelection, ParticleMotion, ResponseStage, SegmentAssembler, Spectrum,
    SpectrumAnalyzer, SpectrumConfig, TaperKind,
};
use seiscore::telemetry::MetricsRecorder;
use seiscore::{ProcessingStage, Trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Derived view requested for a set of channels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Auto-correlation of one channel or cross-correlation of two.
    #[default]
    Correlation,
    Spectra {
        #[serde(default)]
        remove_response: bool,
    },
    /// Removes the channel response; convolves with `external`'s when set.
    Deconvolution {
        #[serde(default)]
        external: Option<ChannelId>,
    },
    /// North channel first, east second.
    ParticleMotion,
    ResponseCurve {
        min_frequency: f64,
        max_frequency: f64,
        points: usize,
    },
}

impl AnalysisKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisKind::Correlation => "correlation",
            AnalysisKind::Spectra { .. } => "spectra",
            AnalysisKind::Deconvolution { .. } => "deconvolution",
            AnalysisKind::ParticleMotion => "particle_motion",
            AnalysisKind::ResponseCurve { .. } => "response_curve",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub channels: Vec<ChannelId>,
    #[serde(default)]
    pub interval: Option<TimeInterval>,
    #[serde(default)]
    pub filter: FilterSelection,
    /// Unset leaves each analysis on its default: no taper for
    /// correlation, the configured spectrum taper for spectra.
    #[serde(default)]
    pub taper: Option<TaperKind>,
    pub analysis: AnalysisKind,
    #[serde(default)]
    pub confirm_oversized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AnalysisOutput {
    Correlation(CorrelationResult),
    Spectra(Vec<Spectrum>),
    Deconvolution(Vec<Trace>),
    ParticleMotion(ParticleMotion),
    ResponseCurve(Vec<Vec<ResponsePoint>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub channels: Vec<String>,
    /// Label of the applied filter, if any.
    pub filter: Option<String>,
    pub output: AnalysisOutput,
}

/// Executes analysis requests against an in-memory channel archive.
#[derive(Clone)]
pub struct Runner {
    config: Arc<WorkflowConfig>,
    archive: Arc<BTreeMap<ChannelId, ChannelData>>,
    responses: Arc<dyn ResponseProvider>,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(
        config: WorkflowConfig,
        channels: Vec<ChannelData>,
        responses: Arc<dyn ResponseProvider>,
    ) -> Self {
        let archive = channels.into_iter().map(|data| (data.id.clone(), data)).collect();
        Self {
            config: Arc::new(config),
            archive: Arc::new(archive),
            responses,
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Runs one request and records its outcome in the metrics.
    pub fn execute(&self, request: &AnalysisRequest) -> anyhow::Result<AnalysisReport> {
        let kind = request.analysis.name();
        let result = self.run(request);
        match &result {
            Ok(_) => {
                self.metrics.record_processed(kind);
                info!("{} over {} channel(s) complete", kind, request.channels.len());
            }
            Err(err) => {
                self.metrics.record_error(kind);
                warn!("{} failed: {:#}", kind, err);
            }
        }
        result
    }

    /// Runs independent requests in parallel on the blocking pool. Results
    /// come back in request order.
    pub async fn execute_batch(
        &self,
        requests: Vec<AnalysisRequest>,
    ) -> Vec<anyhow::Result<AnalysisReport>> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let runner = self.clone();
                tokio::task::spawn_blocking(move || runner.execute(&request))
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(match handle.await {
                Ok(result) => result,
                Err(err) => Err(anyhow::Error::new(err).context("analysis task aborted")),
            });
        }
        reports
    }

    fn run(&self, request: &AnalysisRequest) -> anyhow::Result<AnalysisReport> {
        if request.channels.is_empty() {
            bail!("request names no channels");
        }
        let descriptor = request
            .filter
            .resolve()
            .context("resolving filter selection")?;

        let output = match &request.analysis {
            AnalysisKind::Correlation => {
                if request.channels.len() > 2 {
                    bail!(
                        "correlation takes one or two channels, got {}",
                        request.channels.len()
                    );
                }
                let first = self.prepare(&request.channels[0], request, descriptor)?;
                let second = match request.channels.get(1) {
                    Some(id) => Some(self.prepare(id, request, descriptor)?),
                    None => None,
                };
                let result = Correlator::new(self.config.correlation.clone())
                    .correlate(&first, second.as_ref(), request.taper.unwrap_or_default())
                    .context("correlating traces")?;
                AnalysisOutput::Correlation(result)
            }
            AnalysisKind::Spectra { remove_response } => {
                let config = SpectrumConfig {
                    taper: request.taper.unwrap_or(self.config.spectra.taper),
                    ..self.config.spectra.clone()
                };
                let analyzer = SpectrumAnalyzer::new(config);
                let mut spectra = Vec::with_capacity(request.channels.len());
                for id in &request.channels {
                    let trace = self.prepare(id, request, descriptor)?;
                    let response = if *remove_response {
                        Some(self.lookup(id)?)
                    } else {
                        None
                    };
                    let spectrum = analyzer
                        .power_spectrum(&trace, response.as_deref(), trace.start)
                        .with_context(|| format!("computing spectrum of {}", id))?;
                    spectra.push(spectrum);
                }
                AnalysisOutput::Spectra(spectra)
            }
            AnalysisKind::Deconvolution { external } => {
                let target = match external {
                    Some(id) => Some(self.lookup(id)?),
                    None => None,
                };
                let mut traces = Vec::with_capacity(request.channels.len());
                for id in &request.channels {
                    let trace = self.assemble(id, request)?;
                    let mut stages: Vec<Box<dyn ProcessingStage>> = Vec::new();
                    if let Some(descriptor) = descriptor {
                        stages.push(Box::new(ButterworthFilter::new(descriptor)?));
                    }
                    let deconvolver = Deconvolver::new(self.config.deconvolution.clone());
                    let stage =
                        ResponseStage::new(deconvolver, self.lookup(id)?, target.clone(), trace.start)
                            .confirm_oversized(request.confirm_oversized);
                    stages.push(Box::new(stage));
                    traces.push(run_stages(id, trace, &mut stages)?);
                }
                AnalysisOutput::Deconvolution(traces)
            }
            AnalysisKind::ParticleMotion => {
                let [north, east] = request.channels.as_slice() else {
                    bail!(
                        "particle motion takes a north and an east channel, got {}",
                        request.channels.len()
                    );
                };
                let north = self.prepare(north, request, descriptor)?;
                let east = self.prepare(east, request, descriptor)?;
                let motion = particle_motion(&north, &east).context("pairing components")?;
                AnalysisOutput::ParticleMotion(motion)
            }
            AnalysisKind::ResponseCurve {
                min_frequency,
                max_frequency,
                points,
            } => {
                let mut curves = Vec::with_capacity(request.channels.len());
                for id in &request.channels {
                    let at = self.epoch(id, request)?;
                    let response = self.lookup(id)?;
                    let curve = sample_response_curve(
                        response.as_ref(),
                        *min_frequency,
                        *max_frequency,
                        *points,
                        at,
                    )
                    .with_context(|| format!("sampling response of {}", id))?;
                    curves.push(curve);
                }
                AnalysisOutput::ResponseCurve(curves)
            }
        };

        Ok(AnalysisReport {
            channels: request.channels.iter().map(ToString::to_string).collect(),
            filter: descriptor.map(|d| d.label()),
            output,
        })
    }

    fn channel(&self, id: &ChannelId) -> anyhow::Result<&ChannelData> {
        self.archive
            .get(id)
            .with_context(|| format!("channel {} is not in the archive", id))
    }

    fn interval(&self, data: &ChannelData, request: &AnalysisRequest) -> anyhow::Result<TimeInterval> {
        match request.interval {
            Some(interval) => Ok(interval),
            None => TimeInterval::covering(&data.segments)
                .with_context(|| format!("channel {} has no samples", data.id)),
        }
    }

    fn epoch(&self, id: &ChannelId, request: &AnalysisRequest) -> anyhow::Result<f64> {
        let data = self.channel(id)?;
        Ok(self.interval(data, request)?.start)
    }

    fn assemble(&self, id: &ChannelId, request: &AnalysisRequest) -> anyhow::Result<Trace> {
        let data = self.channel(id)?;
        let interval = self.interval(data, request)?;
        SegmentAssembler::new()
            .assemble(&data.segments, &interval)
            .with_context(|| format!("assembling channel {}", id))
    }

    fn prepare(
        &self,
        id: &ChannelId,
        request: &AnalysisRequest,
        descriptor: Option<FilterDescriptor>,
    ) -> anyhow::Result<Trace> {
        let trace = self.assemble(id, request)?;
        match descriptor {
            Some(descriptor) => {
                let mut stages: Vec<Box<dyn ProcessingStage>> =
                    vec![Box::new(ButterworthFilter::new(descriptor)?)];
                run_stages(id, trace, &mut stages)
            }
            None => Ok(trace),
        }
    }

    fn lookup(&self, id: &ChannelId) -> anyhow::Result<Arc<dyn Response>> {
        self.responses
            .get_response(id)
            .with_context(|| format!("looking up response of {}", id))
    }
}

fn run_stages(
    id: &ChannelId,
    mut trace: Trace,
    stages: &mut [Box<dyn ProcessingStage>],
) -> anyhow::Result<Trace> {
    for stage in stages.iter_mut() {
        trace = stage
            .execute(trace)
            .with_context(|| format!("executing {} stage on {}", stage.name(), id))?;
    }
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_channel_data, GeneratorConfig};
    use crate::generator::response::SyntheticCatalog;
    use seiscore::PipelineError;

    fn runner_with(generator: GeneratorConfig) -> (Runner, WorkflowConfig) {
        let config = WorkflowConfig {
            generator,
            ..Default::default()
        };
        let channels = build_channel_data(&config.generator).unwrap();
        let catalog = SyntheticCatalog::from_config(&config.generator);
        (
            Runner::new(config.clone(), channels, Arc::new(catalog)),
            config,
        )
    }

    fn small() -> GeneratorConfig {
        GeneratorConfig {
            segments: 2,
            segment_len: 256,
            ..Default::default()
        }
    }

    fn request(channels: Vec<ChannelId>, analysis: AnalysisKind) -> AnalysisRequest {
        AnalysisRequest {
            channels,
            interval: None,
            filter: FilterSelection::BandPass {
                order: 2,
                low: 0.5,
                high: 5.0,
            },
            taper: Some(TaperKind::Hanning),
            analysis,
            confirm_oversized: false,
        }
    }

    #[test]
    fn auto_correlation_report() {
        let (runner, config) = runner_with(small());
        let id = config.generator.channel_id("BHZ");
        let report = runner
            .execute(&request(vec![id], AnalysisKind::Correlation))
            .unwrap();
        let AnalysisOutput::Correlation(result) = report.output else {
            panic!("expected correlation output");
        };
        assert_eq!(result.values.len(), 2 * 512 - 1);
        assert_eq!(result.peak_lag, 0.0);
        assert_eq!(report.filter.as_deref(), Some("band-pass order 2 0.5-5 Hz"));
        assert_eq!(runner.metrics().snapshot().processed, 1);
    }

    #[test]
    fn gap_in_source_data_is_reported_with_channel() {
        let (runner, config) = runner_with(GeneratorConfig {
            gap_before: Some(1),
            ..small()
        });
        let id = config.generator.channel_id("BHZ");
        let err = runner
            .execute(&request(vec![id], AnalysisKind::Correlation))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("assembling channel XX.SIM.00.BHZ"));
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::DataGap { .. })
        ));
        assert_eq!(runner.metrics().snapshot().errors, 1);
    }

    #[test]
    fn deconvolution_with_external_response() {
        let (runner, config) = runner_with(small());
        let id = config.generator.channel_id("BHZ");
        let external = Some(config.generator.channel_id("BHN"));
        let report = runner
            .execute(&request(vec![id], AnalysisKind::Deconvolution { external }))
            .unwrap();
        let AnalysisOutput::Deconvolution(traces) = report.output else {
            panic!("expected deconvolution output");
        };
        assert_eq!(traces[0].len(), 512);
    }

    #[test]
    fn unknown_external_channel_fails() {
        let (runner, config) = runner_with(small());
        let id = config.generator.channel_id("BHZ");
        let external = Some(ChannelId::new("XX", "NONE", "", "BHZ"));
        let err = runner
            .execute(&request(vec![id], AnalysisKind::Deconvolution { external }))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ResponseUnavailable { .. })
        ));
    }

    #[test]
    fn particle_motion_needs_two_channels() {
        let (runner, config) = runner_with(small());
        let ids = config.generator.channel_ids();
        assert!(runner
            .execute(&request(vec![ids[1].clone()], AnalysisKind::ParticleMotion))
            .is_err());
        let report = runner
            .execute(&request(ids[1..].to_vec(), AnalysisKind::ParticleMotion))
            .unwrap();
        assert!(matches!(report.output, AnalysisOutput::ParticleMotion(_)));
    }

    #[test]
    fn response_curve_spans_requested_range() {
        let (runner, config) = runner_with(small());
        let id = config.generator.channel_id("BHZ");
        let analysis = AnalysisKind::ResponseCurve {
            min_frequency: 0.01,
            max_frequency: 10.0,
            points: 31,
        };
        let report = runner.execute(&request(vec![id], analysis)).unwrap();
        let AnalysisOutput::ResponseCurve(curves) = report.output else {
            panic!("expected response curve output");
        };
        assert_eq!(curves[0].len(), 31);
        assert!((curves[0][30].frequency - 10.0).abs() < 1e-9);
    }

    #[test]
    fn spectra_with_response_removed() {
        let (runner, config) = runner_with(small());
        let id = config.generator.channel_id("BHE");
        let analysis = AnalysisKind::Spectra {
            remove_response: true,
        };
        let report = runner.execute(&request(vec![id], analysis)).unwrap();
        let AnalysisOutput::Spectra(spectra) = report.output else {
            panic!("expected spectra output");
        };
        assert!(spectra[0].response_removed);
        assert!(!spectra[0].points.is_empty());
    }

    #[test]
    fn explicit_no_taper_differs_from_unset() {
        let (runner, config) = runner_with(small());
        let id = config.generator.channel_id("BHZ");
        let spectrum_with = |taper: Option<TaperKind>| {
            let mut request = request(
                vec![id.clone()],
                AnalysisKind::Spectra {
                    remove_response: false,
                },
            );
            request.taper = taper;
            match runner.execute(&request).unwrap().output {
                AnalysisOutput::Spectra(mut spectra) => spectra.remove(0),
                other => panic!("expected spectra output, got {:?}", other),
            }
        };
        let unset = spectrum_with(None);
        assert_eq!(unset, spectrum_with(Some(TaperKind::Hanning)));
        assert_ne!(unset, spectrum_with(Some(TaperKind::None)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_runs_every_channel() {
        let (runner, config) = runner_with(small());
        let requests = config
            .generator
            .channel_ids()
            .into_iter()
            .map(|id| {
                request(
                    vec![id],
                    AnalysisKind::Spectra {
                        remove_response: false,
                    },
                )
            })
            .collect();
        let reports = runner.execute_batch(requests).await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.is_ok()));
        let snapshot = runner.metrics().snapshot();
        assert_eq!(snapshot.by_kind.get("spectra"), Some(&(3, 0)));
    }
}
