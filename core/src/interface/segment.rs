use serde::{Deserialize, Serialize};
use std::fmt;

/// SEED-style channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl ChannelId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Contiguous run of raw counts for one channel, as delivered by the
/// data-retrieval layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Epoch seconds of the first sample.
    pub start: f64,
    /// Samples per second.
    pub rate: f64,
    pub samples: Vec<i32>,
}

impl Segment {
    pub fn new(start: f64, rate: f64, samples: Vec<i32>) -> Self {
        Self {
            start,
            rate,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the last sample: `start + (count - 1) / rate`.
    pub fn end(&self) -> f64 {
        if self.samples.is_empty() {
            self.start
        } else {
            self.start + (self.samples.len() - 1) as f64 / self.rate
        }
    }

    pub fn sample_time(&self, index: usize) -> f64 {
        self.start + index as f64 / self.rate
    }
}

/// Half-open `[start, end)` time range in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: f64,
    pub end: f64,
}

impl TimeInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Smallest interval covering every sample of `segments`.
    pub fn covering(segments: &[Segment]) -> Option<Self> {
        let mut populated = segments.iter().filter(|s| !s.is_empty());
        let first = populated.next()?;
        let mut start = first.start;
        let mut end = first.end() + 1.0 / first.rate;
        for segment in populated {
            start = start.min(segment.start);
            end = end.max(segment.end() + 1.0 / segment.rate);
        }
        Some(Self { start, end })
    }

    pub fn overlaps(&self, segment: &Segment) -> bool {
        !segment.is_empty() && segment.start < self.end && segment.end() >= self.start
    }
}

/// All retrieved segments of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub id: ChannelId,
    pub segments: Vec<Segment>,
}

impl ChannelData {
    pub fn new(id: ChannelId, segments: Vec<Segment>) -> Self {
        Self { id, segments }
    }
}
