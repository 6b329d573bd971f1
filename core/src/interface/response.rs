use crate::interface::segment::ChannelId;
use crate::prelude::{PipelineError, PipelineResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Instrument transfer function of one channel.
///
/// Implementations are backed by response files or catalogs and may be slow;
/// callers treat every evaluation as fallible. The evaluation time matters
/// because an instrument's response changes over the channel's history.
pub trait Response: Send + Sync {
    /// Complex gain at each of `frequencies` (Hz), valid at epoch `at`.
    fn amplitude_and_phase(&self, frequencies: &[f64], at: f64) -> PipelineResult<Vec<Complex64>>;
}

/// Lookup of channel responses.
pub trait ResponseProvider: Send + Sync {
    fn get_response(&self, channel: &ChannelId) -> PipelineResult<Arc<dyn Response>>;
}

/// Evaluates `response` and checks that one value came back per frequency.
pub fn evaluate(
    response: &dyn Response,
    frequencies: &[f64],
    at: f64,
) -> PipelineResult<Vec<Complex64>> {
    let values = response.amplitude_and_phase(frequencies, at)?;
    if values.len() != frequencies.len() {
        return Err(PipelineError::ArrayLengthMismatch {
            expected: frequencies.len(),
            found: values.len(),
        });
    }
    Ok(values)
}

/// One point of an amplitude/phase response display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponsePoint {
    pub frequency: f64,
    pub amplitude: f64,
    pub phase_deg: f64,
}

/// Samples `response` at `points` log-spaced frequencies in
/// `[min_frequency, max_frequency]`.
pub fn sample_response_curve(
    response: &dyn Response,
    min_frequency: f64,
    max_frequency: f64,
    points: usize,
    at: f64,
) -> PipelineResult<Vec<ResponsePoint>> {
    if points == 0
        || min_frequency.is_nan()
        || min_frequency <= 0.0
        || !max_frequency.is_finite()
        || max_frequency < min_frequency
    {
        return Err(PipelineError::NoData);
    }

    let frequencies: Vec<f64> = if points == 1 {
        vec![min_frequency]
    } else {
        let log_min = min_frequency.log10();
        let step = (max_frequency.log10() - log_min) / (points - 1) as f64;
        (0..points)
            .map(|i| 10f64.powf(log_min + step * i as f64))
            .collect()
    };

    let values = evaluate(response, &frequencies, at)?;
    Ok(frequencies
        .iter()
        .zip(values)
        .map(|(&frequency, value)| ResponsePoint {
            frequency,
            amplitude: value.norm(),
            phase_deg: value.arg().to_degrees(),
        })
        .collect())
}
