use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult, Trace};
use crate::processing::window::{tapered, TaperKind};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Tunables for [`Correlator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Ceiling on either input's sample count.
    pub max_samples: usize,
    /// Divide by `sqrt(Ea·Eb)` of the tapered inputs.
    pub normalize: bool,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_samples: 1 << 20,
            normalize: true,
        }
    }
}

/// Correlation series with its peak.
///
/// `values[i]` is the correlation at `lags[i]` seconds; a positive lag means
/// the first input lags the second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub lags: Vec<f64>,
    pub values: Vec<f64>,
    pub peak_lag: f64,
    pub peak_amplitude: f64,
    pub rate: f64,
}

impl CorrelationResult {
    /// Index of zero lag.
    pub fn midpoint(&self) -> usize {
        self.values.len() / 2
    }
}

pub struct Correlator {
    config: CorrelatorConfig,
    logger: LogManager,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            logger: LogManager::for_stage("correlation"),
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Cross-correlates `first` with `second`, or auto-correlates `first`
    /// when `second` is `None`. Each input is tapered with `taper` first.
    pub fn correlate(
        &self,
        first: &Trace,
        second: Option<&Trace>,
        taper: TaperKind,
    ) -> PipelineResult<CorrelationResult> {
        let second_trace = second.unwrap_or(first);
        if first.is_empty() || second_trace.is_empty() {
            return Err(PipelineError::NoData);
        }
        if (first.rate - second_trace.rate).abs() > 1e-9 * first.rate {
            return Err(PipelineError::LengthMismatch(format!(
                "sample periods differ: {} Hz vs {} Hz",
                first.rate, second_trace.rate
            )));
        }
        let max = self.config.max_samples;
        if let Some(len) = [first.len(), second_trace.len()]
            .into_iter()
            .find(|&len| len > max)
        {
            return Err(PipelineError::TooLong { len, max });
        }

        let n = first.len().max(second_trace.len());
        let mut a = tapered(&first.samples, taper);
        a.resize(n, 0.0);
        let mut b = if second.is_some() {
            tapered(&second_trace.samples, taper)
        } else {
            a.clone()
        };
        b.resize(n, 0.0);

        let size = 2 * n;
        let mut fft = FftHelper::new(size);
        let spectrum_a = fft.forward(&a);
        let cross: Vec<_> = if second.is_some() {
            let spectrum_b = fft.forward(&b);
            spectrum_a
                .iter()
                .zip(&spectrum_b)
                .map(|(x, y)| x * y.conj())
                .collect()
        } else {
            spectrum_a.iter().map(|x| x * x.conj()).collect()
        };
        let circular = fft.inverse(&cross);

        let scale = if self.config.normalize {
            let denominator = (StatsHelper::energy(&a) * StatsHelper::energy(&b)).sqrt();
            if denominator > 0.0 {
                1.0 / denominator
            } else {
                1.0
            }
        } else {
            1.0
        };

        let rate = first.rate;
        let half = n as isize - 1;
        let mut lags = Vec::with_capacity(2 * n - 1);
        let mut values = Vec::with_capacity(2 * n - 1);
        for lag in -half..=half {
            let index = lag.rem_euclid(size as isize) as usize;
            lags.push(lag as f64 / rate);
            values.push(circular[index] * scale);
        }

        // Ties, including an all-zero series, resolve to zero lag.
        let mid = n - 1;
        let (peak_index, peak_amplitude) = values.iter().enumerate().fold(
            (mid, values[mid]),
            |(best, best_value), (i, &v)| {
                if v.abs() > best_value.abs() {
                    (i, v)
                } else {
                    (best, best_value)
                }
            },
        );
        let peak_lag = lags[peak_index];

        self.logger.record(&format!(
            "{} of {} samples: peak {:.4} at {:.4} s",
            if second.is_some() { "cross-correlation" } else { "auto-correlation" },
            n,
            peak_amplitude,
            peak_lag
        ));

        Ok(CorrelationResult {
            lags,
            values,
            peak_lag,
            peak_amplitude,
            rate,
        })
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(CorrelatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pulse_train(len: usize, offset: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 - offset as f64;
                (-t * t / 20.0).exp() + 0.3 * (-(t - 15.0) * (t - 15.0) / 8.0).exp()
            })
            .collect()
    }

    #[test]
    fn auto_correlation_is_symmetric_with_energy_at_midpoint() {
        let samples: Vec<f64> = (0..64).map(|i| ((i * 13) % 7) as f64 - 3.0).collect();
        let energy = StatsHelper::energy(&samples);
        let correlator = Correlator::new(CorrelatorConfig {
            normalize: false,
            ..Default::default()
        });
        let trace = Trace::new(samples, 10.0, 0.0);
        let result = correlator.correlate(&trace, None, TaperKind::None).unwrap();

        assert_eq!(result.values.len(), 127);
        let mid = result.midpoint();
        assert_abs_diff_eq!(result.lags[mid], 0.0);
        assert_abs_diff_eq!(result.values[mid], energy, epsilon = 1e-8);
        for k in 1..=mid {
            assert_abs_diff_eq!(result.values[mid - k], result.values[mid + k], epsilon = 1e-8);
        }
        assert_eq!(result.peak_lag, 0.0);
        assert_abs_diff_eq!(result.peak_amplitude, energy, epsilon = 1e-8);
    }

    #[test]
    fn normalized_auto_correlation_peaks_at_one() {
        let trace = Trace::new(pulse_train(50, 20), 100.0, 0.0);
        let result = Correlator::default()
            .correlate(&trace, None, TaperKind::Hanning)
            .unwrap();
        assert_abs_diff_eq!(result.peak_amplitude, 1.0, epsilon = 1e-9);
        assert!(result.values.iter().all(|v| v.abs() <= 1.0 + 1e-9));
    }

    #[test]
    fn cross_correlation_finds_delay() {
        let rate = 20.0;
        let early = Trace::new(pulse_train(80, 20), rate, 0.0);
        let late = Trace::new(pulse_train(80, 26), rate, 0.0);
        let result = Correlator::default()
            .correlate(&late, Some(&early), TaperKind::None)
            .unwrap();
        assert_abs_diff_eq!(result.peak_lag, 6.0 / rate, epsilon = 1e-12);
        assert!(result.peak_amplitude > 0.9);
    }

    #[test]
    fn shorter_input_is_zero_padded() {
        let a = Trace::new(vec![1.0; 10], 1.0, 0.0);
        let b = Trace::new(vec![1.0; 4], 1.0, 0.0);
        let result = Correlator::default()
            .correlate(&a, Some(&b), TaperKind::None)
            .unwrap();
        assert_eq!(result.values.len(), 19);
    }

    #[test]
    fn differing_rates_are_rejected() {
        let a = Trace::new(vec![1.0; 10], 100.0, 0.0);
        let b = Trace::new(vec![1.0; 10], 50.0, 0.0);
        assert!(matches!(
            Correlator::default().correlate(&a, Some(&b), TaperKind::None),
            Err(PipelineError::LengthMismatch(_))
        ));
    }

    #[test]
    fn oversized_input_is_rejected() {
        let correlator = Correlator::new(CorrelatorConfig {
            max_samples: 8,
            ..Default::default()
        });
        let trace = Trace::new(vec![1.0; 9], 1.0, 0.0);
        assert_eq!(
            correlator.correlate(&trace, None, TaperKind::None).unwrap_err(),
            PipelineError::TooLong { len: 9, max: 8 }
        );
    }

    #[test]
    fn silent_input_peaks_at_zero_lag() {
        let trace = Trace::new(vec![0.0; 50], 10.0, 0.0);
        let result = Correlator::default()
            .correlate(&trace, None, TaperKind::Hanning)
            .unwrap();
        assert_eq!(result.peak_lag, 0.0);
        assert_eq!(result.peak_amplitude, 0.0);
        assert!(result.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_input_is_no_data() {
        let trace = Trace::new(Vec::new(), 1.0, 0.0);
        assert_eq!(
            Correlator::default()
                .correlate(&trace, None, TaperKind::None)
                .unwrap_err(),
            PipelineError::NoData
        );
    }
}
