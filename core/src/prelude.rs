use serde::{Deserialize, Serialize};

/// Contiguous, uniformly sampled buffer handed between pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub samples: Vec<f64>,
    /// Samples per second.
    pub rate: f64,
    /// Epoch seconds of the first sample.
    pub start: f64,
}

impl Trace {
    pub fn new(samples: Vec<f64>, rate: f64, start: f64) -> Self {
        Self {
            samples,
            rate,
            start,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn period(&self) -> f64 {
        1.0 / self.rate
    }

    /// Time of the last sample.
    pub fn end(&self) -> f64 {
        if self.samples.is_empty() {
            self.start
        } else {
            self.start + (self.samples.len() - 1) as f64 / self.rate
        }
    }
}

/// Failure taxonomy of the pipeline. Every variant is terminal for the
/// request that produced it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("no data in the requested interval")]
    NoData,
    #[error("sample rate mismatch: expected {expected} Hz, found {found} Hz")]
    RateMismatch { expected: f64, found: f64 },
    #[error("data gap of {gap:.6} s after sample at {after:.6}")]
    DataGap { after: f64, gap: f64 },
    #[error("invalid cutoffs: {0}")]
    InvalidCutoffs(String),
    #[error("filter has not been designed for a sample rate")]
    FilterNotDesigned,
    #[error("declared length {declared} exceeds buffer length {actual}")]
    LengthExceeded { declared: usize, actual: usize },
    #[error("length mismatch: {0}")]
    LengthMismatch(String),
    #[error("{len} samples exceeds the correlation limit of {max}")]
    TooLong { len: usize, max: usize },
    #[error("{len} samples exceeds the processing ceiling of {max} and was not confirmed")]
    DataTooLong { len: usize, max: usize },
    #[error("response unavailable for {channel}: {reason}")]
    ResponseUnavailable { channel: String, reason: String },
    #[error("array length mismatch: expected {expected}, found {found}")]
    ArrayLengthMismatch { expected: usize, found: usize },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A stage that consumes a trace and produces the next one in the chain.
pub trait ProcessingStage {
    fn name(&self) -> &'static str;
    fn execute(&mut self, input: Trace) -> PipelineResult<Trace>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_end_uses_inclusive_last_sample() {
        let trace = Trace::new(vec![0.0; 101], 100.0, 10.0);
        assert!((trace.end() - 11.0).abs() < 1e-12);
        assert!((trace.period() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn errors_render_readable_messages() {
        let err = PipelineError::LengthExceeded {
            declared: 10,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "declared length 10 exceeds buffer length 4"
        );
    }
}
