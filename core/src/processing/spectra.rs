use crate::interface::response::{evaluate, Response};
use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult, Trace};
use crate::processing::deconvolution::{
    condition_response, frequency_bins, suppress_excess, DEFAULT_EXCESS_RATIO,
};
use crate::processing::window::{taper, TaperKind};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub taper: TaperKind,
    pub excess_ratio: f64,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            taper: TaperKind::Hanning,
            excess_ratio: DEFAULT_EXCESS_RATIO,
        }
    }
}

/// One point of a log-log spectrum display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    pub log_frequency: f64,
    pub log_amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub points: Vec<SpectrumPoint>,
    /// True when the instrument response was divided out.
    pub response_removed: bool,
}

impl Spectrum {
    /// Point with the highest amplitude.
    pub fn peak(&self) -> Option<SpectrumPoint> {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.log_amplitude.total_cmp(&b.log_amplitude))
    }
}

/// One-sided power spectral density estimator.
pub struct SpectrumAnalyzer {
    config: SpectrumConfig,
    logger: LogManager,
}

impl SpectrumAnalyzer {
    pub fn new(config: SpectrumConfig) -> Self {
        Self {
            config,
            logger: LogManager::for_stage("spectra"),
        }
    }

    /// PSD of `trace` as `(log10 Hz, log10 power)` pairs, optionally
    /// corrected for `response` evaluated at `at`.
    pub fn power_spectrum(
        &self,
        trace: &Trace,
        response: Option<&dyn Response>,
        at: f64,
    ) -> PipelineResult<Spectrum> {
        let n = trace.len() - trace.len() % 2;
        if n < 2 {
            return Err(PipelineError::NoData);
        }
        let mut data = trace.samples[..n].to_vec();
        StatsHelper::detrend(&mut data);
        let weights = self.config.taper.weights(n);
        taper(&mut data, self.config.taper);
        let weight_energy = StatsHelper::energy(&weights);

        let mut fft = FftHelper::new(n);
        let mut spectrum = fft.forward_half(&data);
        let frequencies = frequency_bins(trace.rate, n);

        let mut power_response = None;
        if let Some(response) = response {
            let mut values = evaluate(response, &frequencies, at)?;
            condition_response(&mut values);
            suppress_excess(&mut spectrum, &mut values, self.config.excess_ratio)?;
            power_response = Some(values.iter().map(|c| c.norm_sqr()).collect::<Vec<f64>>());
        }

        let scale = 2.0 / (trace.rate * weight_energy);
        let mut points = Vec::with_capacity(spectrum.len());
        for (k, value) in spectrum.iter().enumerate().skip(1) {
            let mut power = value.norm_sqr() * scale;
            if let Some(gains) = &power_response {
                if gains[k] <= 0.0 {
                    continue;
                }
                power /= gains[k];
            }
            if power > 0.0 {
                points.push(SpectrumPoint {
                    log_frequency: frequencies[k].log10(),
                    log_amplitude: power.log10(),
                });
            }
        }

        self.logger.detail(&format!(
            "spectrum of {} samples: {} usable bins",
            n,
            points.len()
        ));

        Ok(Spectrum {
            points,
            response_removed: response.is_some(),
        })
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(SpectrumConfig::default())
    }
}
