use crate::generator::profile::{GeneratorConfig, SensorConfig};
use num_complex::Complex64;
use seiscore::interface::{ChannelId, Response, ResponseProvider};
use seiscore::{PipelineError, PipelineResult};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Damped second-order velocity sensor, flat above its corner frequency.
#[derive(Debug, Clone)]
pub struct SyntheticResponse {
    channel: String,
    sensor: SensorConfig,
}

impl SyntheticResponse {
    pub fn new(channel: &ChannelId, sensor: SensorConfig) -> Self {
        Self {
            channel: channel.to_string(),
            sensor,
        }
    }
}

impl Response for SyntheticResponse {
    fn amplitude_and_phase(&self, frequencies: &[f64], at: f64) -> PipelineResult<Vec<Complex64>> {
        if at < self.sensor.valid_from {
            return Err(PipelineError::ResponseUnavailable {
                channel: self.channel.clone(),
                reason: format!("no response epoch covers {}", at),
            });
        }
        let w0 = 2.0 * PI * self.sensor.corner;
        let damping = self.sensor.damping;
        let gain = self.sensor.gain;
        Ok(frequencies
            .iter()
            .map(|&f| {
                let s = Complex64::new(0.0, 2.0 * PI * f);
                s * s * gain / (s * s + s * (2.0 * damping * w0) + w0 * w0)
            })
            .collect())
    }
}

/// In-memory response lookup for generated channels.
#[derive(Default)]
pub struct SyntheticCatalog {
    responses: BTreeMap<ChannelId, Arc<SyntheticResponse>>,
}

impl SyntheticCatalog {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let responses = config
            .channel_ids()
            .into_iter()
            .map(|id| {
                let response = Arc::new(SyntheticResponse::new(&id, config.sensor.clone()));
                (id, response)
            })
            .collect();
        Self { responses }
    }
}

impl ResponseProvider for SyntheticCatalog {
    fn get_response(&self, channel: &ChannelId) -> PipelineResult<Arc<dyn Response>> {
        self.responses
            .get(channel)
            .map(|response| response.clone() as Arc<dyn Response>)
            .ok_or_else(|| PipelineError::ResponseUnavailable {
                channel: channel.to_string(),
                reason: "channel is not in the catalog".into(),
            })
    }
}
