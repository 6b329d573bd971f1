use crate::interface::segment::{Segment, TimeInterval};
use crate::prelude::{PipelineError, PipelineResult, Trace};
use crate::telemetry::log::LogManager;

/// Allowed distance, in sample periods, between a segment's expected next
/// sample and the start of the following segment.
pub const GAP_TOLERANCE_SAMPLES: f64 = 0.5;

const RATE_TOLERANCE: f64 = 1e-9;
const SAMPLE_EPSILON: f64 = 1e-9;

/// Merges the ordered segments of one channel into a single trace.
pub struct SegmentAssembler {
    rate: Option<f64>,
    logger: LogManager,
}

impl SegmentAssembler {
    pub fn new() -> Self {
        Self {
            rate: None,
            logger: LogManager::for_stage("assembler"),
        }
    }

    /// Rate validated by the last successful [`assemble`](Self::assemble).
    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    /// Concatenates the samples of `segments` that fall inside `interval`.
    ///
    /// Segments must be ordered by start time. Overlapping segments are not
    /// deduplicated.
    pub fn assemble(
        &mut self,
        segments: &[Segment],
        interval: &TimeInterval,
    ) -> PipelineResult<Trace> {
        self.rate = None;

        // A non-finite rate makes every sample time NaN, which would silently
        // drop the segment from the interval filter below.
        if let Some(bad) = segments
            .iter()
            .find(|s| !s.is_empty() && !(s.rate.is_finite() && s.rate > 0.0))
        {
            let expected = segments
                .iter()
                .map(|s| s.rate)
                .find(|r| r.is_finite() && *r > 0.0)
                .unwrap_or(bad.rate);
            return Err(PipelineError::RateMismatch {
                expected,
                found: bad.rate,
            });
        }

        let relevant: Vec<&Segment> = segments.iter().filter(|s| interval.overlaps(s)).collect();
        let first = relevant.first().ok_or(PipelineError::NoData)?;
        let rate = first.rate;

        for pair in relevant.windows(2) {
            let (previous, next) = (pair[0], pair[1]);
            if (next.rate - rate).abs() > RATE_TOLERANCE * rate {
                return Err(PipelineError::RateMismatch {
                    expected: rate,
                    found: next.rate,
                });
            }
            let expected_start = previous.end() + 1.0 / rate;
            let gap_samples = (next.start - expected_start) * rate;
            if gap_samples > GAP_TOLERANCE_SAMPLES + SAMPLE_EPSILON {
                return Err(PipelineError::DataGap {
                    after: previous.end(),
                    gap: next.start - previous.end(),
                });
            }
        }

        let mut samples = Vec::with_capacity(relevant.iter().map(|s| s.len()).sum());
        let mut start = None;
        for segment in &relevant {
            for (index, &count) in segment.samples.iter().enumerate() {
                let time = segment.sample_time(index);
                if interval.contains(time) {
                    start.get_or_insert(time);
                    samples.push(f64::from(count));
                }
            }
        }
        let start = start.ok_or(PipelineError::NoData)?;

        self.logger.detail(&format!(
            "assembled {} samples from {} segments at {} Hz",
            samples.len(),
            relevant.len(),
            rate
        ));
        self.rate = Some(rate);
        Ok(Trace::new(samples, rate, start))
    }
}

impl Default for SegmentAssembler {
    fn default() -> Self {
        Self::new()
    }
}
