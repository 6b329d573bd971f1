use crate::generator::template::sine_wave;
use anyhow::{ensure, Context};
use rand::{rngs::StdRng, Rng, SeedableRng};
use seiscore::interface::{ChannelData, ChannelId, Segment};
use serde::{Deserialize, Serialize};

/// Configuration for generating synthetic station data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channels: Vec<String>,
    /// Samples per second.
    pub rate: f64,
    /// Epoch seconds of the first sample.
    pub start: f64,
    pub segments: usize,
    pub segment_len: usize,
    /// Dominant ground-motion frequency in Hz.
    pub frequency: f64,
    /// Peak amplitude in counts.
    pub amplitude: f64,
    pub offset: f64,
    pub noise: f64,
    pub seed: u64,
    /// Inserts a break of `gap_seconds` before this segment index.
    pub gap_before: Option<usize>,
    pub gap_seconds: f64,
    pub sensor: SensorConfig,
}

/// Parameters of the synthetic velocity sensor attached to every channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Natural frequency in Hz.
    pub corner: f64,
    pub damping: f64,
    pub gain: f64,
    /// Epoch seconds from which the response is known.
    pub valid_from: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            network: "XX".into(),
            station: "SIM".into(),
            location: "00".into(),
            channels: vec!["BHZ".into(), "BHN".into(), "BHE".into()],
            rate: 100.0,
            start: 0.0,
            segments: 4,
            segment_len: 1000,
            frequency: 1.5,
            amplitude: 2000.0,
            offset: 120.0,
            noise: 40.0,
            seed: 0,
            gap_before: None,
            gap_seconds: 1.0,
            sensor: SensorConfig::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            corner: 1.0,
            damping: 0.707,
            gain: 1500.0,
            valid_from: f64::MIN,
        }
    }
}

impl GeneratorConfig {
    pub fn channel_id(&self, code: &str) -> ChannelId {
        ChannelId::new(&self.network, &self.station, &self.location, code)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|code| self.channel_id(code)).collect()
    }
}

fn build_segments(config: &GeneratorConfig, index: usize, rng: &mut StdRng) -> Vec<Segment> {
    let phase_offset = index as f64 * 0.25;
    let len = config.segment_len;
    let mut segments = Vec::with_capacity(config.segments);
    let mut start = config.start;
    for segment_index in 0..config.segments {
        if config.gap_before == Some(segment_index) {
            start += config.gap_seconds;
        }
        let elapsed = (segment_index * len) as f64 / config.rate;
        let phase = 2.0 * std::f64::consts::PI * config.frequency * elapsed + phase_offset;
        let samples = sine_wave(len, config.frequency, config.rate, phase)
            .into_iter()
            .map(|v| {
                let jitter = if config.noise > 0.0 {
                    rng.gen_range(-config.noise..config.noise)
                } else {
                    0.0
                };
                (v * config.amplitude + config.offset + jitter).round() as i32
            })
            .collect();
        segments.push(Segment::new(start, config.rate, samples));
        start += len as f64 / config.rate;
    }
    segments
}

/// Builds one [`ChannelData`] per configured channel code. Channel `k` is
/// shifted by `0.25·k` radians so pairs are neither identical nor unrelated.
pub fn build_channel_data(config: &GeneratorConfig) -> anyhow::Result<Vec<ChannelData>> {
    ensure!(
        config.rate.is_finite() && config.rate > 0.0,
        "generator rate must be positive, got {}",
        config.rate
    );
    config
        .segments
        .checked_mul(config.segment_len)
        .context("overflow computing sample count for generator")?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    Ok(config
        .channels
        .iter()
        .enumerate()
        .map(|(index, code)| {
            ChannelData::new(config.channel_id(code), build_segments(config, index, &mut rng))
        })
        .collect())
}
