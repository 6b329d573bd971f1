use anyhow::{bail, Context};
use bridge::server::{default_bind_address, Bridge};
use clap::{Parser, ValueEnum};
use generator::profile::build_channel_data;
use generator::response::SyntheticCatalog;
use log::error;
use seiscore::processing::{FilterSelection, TaperKind};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{AnalysisKind, AnalysisOutput, AnalysisReport, Runner};

mod bridge;
mod generator;
mod workflow;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AnalysisArg {
    Correlation,
    Spectra,
    Deconvolution,
    ParticleMotion,
    ResponseCurve,
}

impl AnalysisArg {
    fn into_kind(self) -> AnalysisKind {
        match self {
            AnalysisArg::Correlation => AnalysisKind::Correlation,
            AnalysisArg::Spectra => AnalysisKind::Spectra {
                remove_response: true,
            },
            AnalysisArg::Deconvolution => AnalysisKind::Deconvolution { external: None },
            AnalysisArg::ParticleMotion => AnalysisKind::ParticleMotion,
            AnalysisArg::ResponseCurve => AnalysisKind::ResponseCurve {
                min_frequency: 0.01,
                max_frequency: 50.0,
                points: 200,
            },
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Seismic waveform analysis driver")]
struct Args {
    /// Run the configured analysis once over generated data and write a report
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, value_enum)]
    analysis: Option<AnalysisArg>,
    /// Butterworth order; pair with --low and/or --high
    #[arg(long)]
    order: Option<usize>,
    /// Low cutoff in Hz
    #[arg(long)]
    low: Option<f64>,
    /// High cutoff in Hz
    #[arg(long)]
    high: Option<f64>,
    /// Taper applied before correlation and spectra (hanning, hamming, ...)
    #[arg(long)]
    taper: Option<TaperKind>,
    /// Process traces above the deconvolution size ceiling without asking
    #[arg(long, default_value_t = false)]
    force: bool,
    #[arg(long, default_value = "reports/offline_analysis.json")]
    report: PathBuf,
    /// Keep the HTTP bridge alive for incoming analysis requests
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = default_bind_address())]
    bind: SocketAddr,
}

impl Args {
    fn apply(&self, config: &mut WorkflowConfig) {
        if let Some(analysis) = self.analysis {
            config.analysis = analysis.into_kind();
        }
        if self.order.is_some() || self.low.is_some() || self.high.is_some() {
            config.filter = FilterSelection::Composite {
                order: self.order.unwrap_or(2),
                low: self.low,
                high: self.high,
            };
        }
        if let Some(taper) = self.taper {
            config.taper = Some(taper);
        }
        if self.force {
            config.confirm_oversized = true;
        }
    }
}

fn summarize(report: &AnalysisReport) -> String {
    let channels = report.channels.join(" x ");
    match &report.output {
        AnalysisOutput::Correlation(result) => format!(
            "{}: {} lags, peak {:.4} at {:.4} s",
            channels,
            result.values.len(),
            result.peak_amplitude,
            result.peak_lag
        ),
        AnalysisOutput::Spectra(spectra) => format!(
            "{}: {} spectrum points",
            channels,
            spectra.iter().map(|s| s.points.len()).sum::<usize>()
        ),
        AnalysisOutput::Deconvolution(traces) => format!(
            "{}: {} corrected samples",
            channels,
            traces.iter().map(|t| t.len()).sum::<usize>()
        ),
        AnalysisOutput::ParticleMotion(motion) => format!(
            "{}: azimuth {:.1} deg, rectilinearity {:.3}",
            channels, motion.azimuth_deg, motion.rectilinearity
        ),
        AnalysisOutput::ResponseCurve(curves) => format!(
            "{}: {} response points",
            channels,
            curves.iter().map(Vec::len).sum::<usize>()
        ),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    args.apply(&mut workflow_config);

    let channels =
        build_channel_data(&workflow_config.generator).context("generating channel data")?;
    let catalog = SyntheticCatalog::from_config(&workflow_config.generator);
    let runner = Runner::new(workflow_config.clone(), channels, Arc::new(catalog));
    let bridge = Bridge::new(runner.clone());

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating analysis runtime")?;

    if args.offline {
        let requests = workflow_config.requests();
        let total = requests.len();
        let results = runtime.block_on(runner.execute_batch(requests));

        let mut reports = Vec::with_capacity(total);
        for result in results {
            match result {
                Ok(report) => {
                    println!("Offline run -> {}", summarize(&report));
                    reports.push(report);
                }
                Err(err) => error!("offline request failed: {:#}", err),
            }
        }

        if let Some(parent) = args.report.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&reports).context("serializing reports")?;
        fs::write(&args.report, body)
            .with_context(|| format!("writing report {}", args.report.display()))?;

        let failed = total - reports.len();
        if let Some(last) = reports.pop() {
            bridge.publish(last);
        }
        bridge.publish_status("Offline analysis results ready.");
        if failed > 0 {
            bail!("{} of {} offline requests failed", failed, total);
        }
    }
    if args.serve {
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        runtime.block_on(bridge.serve(args.bind, async {
            if let Err(err) = signal::ctrl_c().await {
                error!("awaiting Ctrl+C to exit: {}", err);
            }
        }))?;
    }

    Ok(())
}
