//! Instrument-response removal and simulation in the frequency domain.
//!
//! A trace is de-trended, Hanning-tapered and transformed; its spectrum is
//! divided by the channel response and optionally multiplied by a second
//! (target) response before transforming back. Bins where a response is
//! more than `excess_ratio` times weaker than its peak are zeroed in both
//! spectra so the division cannot blow up.

use crate::interface::response::{evaluate, Response};
use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult, ProcessingStage, Trace};
use crate::processing::window::{taper, TaperKind};
use crate::telemetry::log::LogManager;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Peak-to-bin magnitude ratio above which a bin is suppressed.
pub const DEFAULT_EXCESS_RATIO: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolverConfig {
    pub excess_ratio: f64,
    /// Lengths above this need caller confirmation.
    pub max_samples: usize,
}

impl Default for DeconvolverConfig {
    fn default() -> Self {
        Self {
            excess_ratio: DEFAULT_EXCESS_RATIO,
            max_samples: 1 << 21,
        }
    }
}

/// Scales `response` so its largest magnitude is one.
pub fn condition_response(response: &mut [Complex64]) {
    let peak = response.iter().map(|c| c.norm()).fold(0.0, f64::max);
    if peak > 0.0 && peak.is_finite() {
        response.iter_mut().for_each(|c| *c = *c / peak);
    }
}

/// Zeroes every bin of `signal` and `response` where
/// `max|response| / |response[bin]| > ratio`. Returns the number of
/// suppressed bins.
pub fn suppress_excess(
    signal: &mut [Complex64],
    response: &mut [Complex64],
    ratio: f64,
) -> PipelineResult<usize> {
    if signal.len() != response.len() {
        return Err(PipelineError::ArrayLengthMismatch {
            expected: signal.len(),
            found: response.len(),
        });
    }
    let peak = response.iter().map(|c| c.norm()).fold(0.0, f64::max);
    let zero = Complex64::new(0.0, 0.0);
    let mut suppressed = 0;
    for (s, r) in signal.iter_mut().zip(response.iter_mut()) {
        let magnitude = r.norm();
        if magnitude == 0.0 || peak / magnitude > ratio {
            *s = zero;
            *r = zero;
            suppressed += 1;
        }
    }
    Ok(suppressed)
}

/// Frequencies (Hz) of the `n/2 + 1` bins of an `n`-point transform.
pub fn frequency_bins(rate: f64, n: usize) -> Vec<f64> {
    (0..=n / 2).map(|k| k as f64 * rate / n as f64).collect()
}

pub struct Deconvolver {
    config: DeconvolverConfig,
    logger: LogManager,
}

impl Deconvolver {
    pub fn new(config: DeconvolverConfig) -> Self {
        Self {
            config,
            logger: LogManager::for_stage("deconvolution"),
        }
    }

    pub fn config(&self) -> &DeconvolverConfig {
        &self.config
    }

    /// Removes `response` from `trace` and, when `external` is given,
    /// convolves the result with it.
    ///
    /// Responses are evaluated at `at` (epoch seconds). When the trace is
    /// longer than the configured ceiling, `confirm` is asked once with the
    /// length before any work starts.
    pub fn process<F>(
        &self,
        trace: &Trace,
        response: &dyn Response,
        external: Option<&dyn Response>,
        at: f64,
        confirm: F,
    ) -> PipelineResult<Trace>
    where
        F: FnOnce(usize) -> bool,
    {
        let len = trace.len();
        if len < 2 {
            return Err(PipelineError::NoData);
        }
        let max = self.config.max_samples;
        if len > max {
            if !confirm(len) {
                return Err(PipelineError::DataTooLong { len, max });
            }
            self.logger
                .caution(&format!("processing {} samples above the {} ceiling", len, max));
        }

        let n = len - len % 2;
        let mut data = trace.samples[..n].to_vec();
        let (min, max_value) = StatsHelper::min_max(&data).ok_or(PipelineError::NoData)?;
        let mean = StatsHelper::mean(&data);

        StatsHelper::detrend(&mut data);
        taper(&mut data, TaperKind::Hanning);

        let mut fft = FftHelper::new(n);
        let mut spectrum = fft.forward_half(&data);
        let frequencies = frequency_bins(trace.rate, n);

        let mut primary = evaluate(response, &frequencies, at)?;
        condition_response(&mut primary);
        let suppressed = suppress_excess(&mut spectrum, &mut primary, self.config.excess_ratio)?;
        for (s, r) in spectrum.iter_mut().zip(&primary) {
            if r.norm() > 0.0 {
                *s = *s / *r;
            }
        }

        let mut external_suppressed = 0;
        if let Some(external) = external {
            let mut target = evaluate(external, &frequencies, at)?;
            condition_response(&mut target);
            external_suppressed =
                suppress_excess(&mut spectrum, &mut target, self.config.excess_ratio)?;
            for (s, r) in spectrum.iter_mut().zip(&target) {
                *s = *s * *r;
            }
        }

        let restored = fft.inverse_half(&spectrum);
        let span = StatsHelper::span(&restored);
        let scale = if span > 0.0 {
            (max_value - min) / span
        } else {
            0.0
        };
        let mut samples: Vec<f64> = restored.iter().map(|v| v * scale + mean).collect();
        if len % 2 == 1 {
            samples.push(samples[n - 1]);
        }

        self.logger.record(&format!(
            "{} {} samples, suppressed {} + {} of {} bins",
            if external.is_some() { "reconvolved" } else { "deconvolved" },
            len,
            suppressed,
            external_suppressed,
            frequencies.len()
        ));

        Ok(Trace::new(samples, trace.rate, trace.start))
    }
}

impl Default for Deconvolver {
    fn default() -> Self {
        Self::new(DeconvolverConfig::default())
    }
}

/// Deconvolution bound to its responses so it can run as a pipeline stage.
pub struct ResponseStage {
    deconvolver: Deconvolver,
    response: Arc<dyn Response>,
    external: Option<Arc<dyn Response>>,
    at: f64,
    confirmed: bool,
}

impl ResponseStage {
    pub fn new(
        deconvolver: Deconvolver,
        response: Arc<dyn Response>,
        external: Option<Arc<dyn Response>>,
        at: f64,
    ) -> Self {
        Self {
            deconvolver,
            response,
            external,
            at,
            confirmed: false,
        }
    }

    /// Pre-approves traces longer than the configured ceiling.
    pub fn confirm_oversized(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }
}

impl ProcessingStage for ResponseStage {
    fn name(&self) -> &'static str {
        "deconvolution"
    }

    fn execute(&mut self, input: Trace) -> PipelineResult<Trace> {
        let confirmed = self.confirmed;
        self.deconvolver.process(
            &input,
            self.response.as_ref(),
            self.external.as_deref(),
            self.at,
            |_| confirmed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    /// Second-order high-pass, like a velocity sensor above its corner.
    struct Seismometer {
        corner: f64,
    }

    impl Response for Seismometer {
        fn amplitude_and_phase(
            &self,
            frequencies: &[f64],
            _at: f64,
        ) -> PipelineResult<Vec<Complex64>> {
            let w0 = 2.0 * PI * self.corner;
            Ok(frequencies
                .iter()
                .map(|&f| {
                    let s = Complex64::new(0.0, 2.0 * PI * f);
                    s * s / (s * s + s * (2.0 * 0.707 * w0) + w0 * w0)
                })
                .collect())
        }
    }

    struct Flat;

    impl Response for Flat {
        fn amplitude_and_phase(
            &self,
            frequencies: &[f64],
            _at: f64,
        ) -> PipelineResult<Vec<Complex64>> {
            Ok(vec![Complex64::new(2.0, 0.0); frequencies.len()])
        }
    }

    struct Missing;

    impl Response for Missing {
        fn amplitude_and_phase(&self, _: &[f64], _: f64) -> PipelineResult<Vec<Complex64>> {
            Err(PipelineError::ResponseUnavailable {
                channel: "XX.MISS..BHZ".into(),
                reason: "no response file".into(),
            })
        }
    }

    fn signal(len: usize, rate: f64) -> Trace {
        let samples = (0..len)
            .map(|i| {
                let t = i as f64 / rate;
                500.0 + 120.0 * (2.0 * PI * 2.0 * t).sin() + 40.0 * (2.0 * PI * 7.5 * t).cos()
            })
            .collect();
        Trace::new(samples, rate, 1000.0)
    }

    #[test]
    fn conditioning_scales_without_removing_the_mean() {
        let mut flat = vec![Complex64::new(3.0, 4.0); 4];
        condition_response(&mut flat);
        for c in &flat {
            assert_abs_diff_eq!(c.re, 0.6, epsilon = 1e-12);
            assert_abs_diff_eq!(c.im, 0.8, epsilon = 1e-12);
        }

        let mut shaped = vec![Complex64::new(2.0, 0.0), Complex64::new(0.0, -8.0)];
        condition_response(&mut shaped);
        assert_eq!(shaped, vec![Complex64::new(0.25, 0.0), Complex64::new(0.0, -1.0)]);
    }

    #[test]
    fn suppression_zeroes_weak_bins_in_both_spectra() {
        let mut signal = vec![Complex64::new(1.0, 1.0); 5];
        let mut response = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.5, 0.0),
            Complex64::new(0.005, 0.0),
            Complex64::new(0.0, 0.02),
            Complex64::new(0.0, 0.0),
        ];
        let count = suppress_excess(&mut signal, &mut response, DEFAULT_EXCESS_RATIO).unwrap();
        assert_eq!(count, 2);
        assert_eq!(signal[2], Complex64::new(0.0, 0.0));
        assert_eq!(response[2], Complex64::new(0.0, 0.0));
        assert_eq!(signal[4], Complex64::new(0.0, 0.0));
        assert_eq!(signal[3], Complex64::new(1.0, 1.0));
        assert_eq!(response[1], Complex64::new(0.5, 0.0));
    }

    #[test]
    fn suppression_requires_equal_lengths() {
        let mut signal = vec![Complex64::new(1.0, 0.0); 3];
        let mut response = vec![Complex64::new(1.0, 0.0); 2];
        assert_eq!(
            suppress_excess(&mut signal, &mut response, 100.0).unwrap_err(),
            PipelineError::ArrayLengthMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn output_matches_input_span_and_mean_offset() {
        let trace = signal(512, 50.0);
        let (lo, hi) = StatsHelper::min_max(&trace.samples).unwrap();
        let output = Deconvolver::default()
            .process(&trace, &Seismometer { corner: 1.0 }, None, 0.0, |_| true)
            .unwrap();
        assert_eq!(output.len(), trace.len());
        assert_abs_diff_eq!(StatsHelper::span(&output.samples), hi - lo, epsilon = 1e-6);
        assert_eq!(output.start, trace.start);
    }

    #[test]
    fn round_trip_reproduces_amplitude_range() {
        let trace = signal(400, 40.0);
        let (lo, hi) = StatsHelper::min_max(&trace.samples).unwrap();
        let sensor = Seismometer { corner: 1.0 };
        let output = Deconvolver::default()
            .process(&trace, &sensor, Some(&sensor), 0.0, |_| true)
            .unwrap();
        assert_abs_diff_eq!(StatsHelper::span(&output.samples), hi - lo, epsilon = 1e-6);
        assert!(output.samples.iter().all(|v| v.is_finite()));
    }

    fn pearson(a: &[f64], b: &[f64]) -> f64 {
        let (ma, mb) = (StatsHelper::mean(a), StatsHelper::mean(b));
        let mut cross = 0.0;
        let (mut ea, mut eb) = (0.0, 0.0);
        for (x, y) in a.iter().zip(b) {
            cross += (x - ma) * (y - mb);
            ea += (x - ma) * (x - ma);
            eb += (y - mb) * (y - mb);
        }
        cross / (ea * eb).sqrt()
    }

    #[test]
    fn round_trip_preserves_waveform() {
        let trace = signal(400, 40.0);
        let sensor = Seismometer { corner: 0.2 };
        let output = Deconvolver::default()
            .process(&trace, &sensor, Some(&sensor), 0.0, |_| true)
            .unwrap();

        // Only DC falls below the suppression ratio, so the output is the
        // detrended, tapered input up to offset and scale.
        let mut expected = trace.samples.clone();
        StatsHelper::detrend(&mut expected);
        taper(&mut expected, TaperKind::Hanning);
        assert!(pearson(&expected, &output.samples) > 0.9999);

        // The untapered middle follows the raw input closely.
        let middle = 150..250;
        assert!(pearson(&trace.samples[middle.clone()], &output.samples[middle]) > 0.95);
    }

    #[test]
    fn deconvolution_alone_changes_the_waveform() {
        let trace = signal(400, 40.0);
        let output = Deconvolver::default()
            .process(&trace, &Seismometer { corner: 5.0 }, None, 0.0, |_| true)
            .unwrap();
        let mut expected = trace.samples.clone();
        StatsHelper::detrend(&mut expected);
        taper(&mut expected, TaperKind::Hanning);
        assert!(pearson(&expected, &output.samples) < 0.99);
    }

    #[test]
    fn odd_length_duplicates_last_sample() {
        let trace = signal(257, 20.0);
        let output = Deconvolver::default()
            .process(&trace, &Flat, None, 0.0, |_| true)
            .unwrap();
        assert_eq!(output.len(), 257);
        assert_eq!(output.samples[256], output.samples[255]);
    }

    #[test]
    fn flat_response_keeps_the_tapered_shape() {
        let trace = signal(256, 20.0);
        let output = Deconvolver::default()
            .process(&trace, &Flat, Some(&Flat), 0.0, |_| true)
            .unwrap();
        // The Hanning taper zeroes both ends before the transform.
        assert_abs_diff_eq!(output.samples[0], output.samples[255], epsilon = 1e-6);
    }

    /// Unit gain up to `cutoff`, dead above it.
    struct BrickWall {
        cutoff: f64,
    }

    impl Response for BrickWall {
        fn amplitude_and_phase(
            &self,
            frequencies: &[f64],
            _at: f64,
        ) -> PipelineResult<Vec<Complex64>> {
            Ok(frequencies
                .iter()
                .map(|&f| Complex64::new(if f <= self.cutoff { 1.0 } else { 0.0 }, 0.0))
                .collect())
        }
    }

    #[test]
    fn external_response_suppresses_its_dead_bins() {
        let rate = 20.0;
        let trace = signal(256, rate);
        let output = Deconvolver::default()
            .process(&trace, &Flat, Some(&BrickWall { cutoff: 5.0 }), 0.0, |_| true)
            .unwrap();

        let spectrum = FftHelper::new(256).forward_half(&output.samples);
        let bins = frequency_bins(rate, 256);
        let peak = spectrum.iter().map(|c| c.norm()).fold(0.0, f64::max);
        for (value, f) in spectrum.iter().zip(&bins) {
            if *f > 5.0 {
                assert!(value.norm() < 1e-9 * peak, "bin at {} Hz survived", f);
            }
        }
    }

    #[test]
    fn missing_response_propagates() {
        let trace = signal(64, 20.0);
        assert!(matches!(
            Deconvolver::default().process(&trace, &Missing, None, 0.0, |_| true),
            Err(PipelineError::ResponseUnavailable { .. })
        ));
        assert!(matches!(
            Deconvolver::default().process(&trace, &Flat, Some(&Missing), 0.0, |_| true),
            Err(PipelineError::ResponseUnavailable { .. })
        ));
    }

    #[test]
    fn oversized_trace_needs_confirmation() {
        let deconvolver = Deconvolver::new(DeconvolverConfig {
            max_samples: 100,
            ..Default::default()
        });
        let trace = signal(128, 20.0);
        let mut asked = None;
        let result = deconvolver.process(&trace, &Flat, None, 0.0, |len| {
            asked = Some(len);
            false
        });
        assert_eq!(asked, Some(128));
        assert_eq!(
            result.unwrap_err(),
            PipelineError::DataTooLong { len: 128, max: 100 }
        );
        assert!(deconvolver
            .process(&trace, &Flat, None, 0.0, |_| true)
            .is_ok());
    }

    #[test]
    fn response_stage_runs_in_chain() {
        let deconvolver = Deconvolver::default();
        let mut stage = ResponseStage::new(deconvolver, Arc::new(Flat), None, 0.0);
        let output = stage.execute(signal(100, 20.0)).unwrap();
        assert_eq!(output.len(), 100);
        assert_eq!(stage.name(), "deconvolution");
    }

    #[test]
    fn frequency_bins_reach_nyquist() {
        let bins = frequency_bins(100.0, 8);
        assert_eq!(bins, vec![0.0, 12.5, 25.0, 37.5, 50.0]);
    }
}
