use std::f64::consts::PI;

/// `length` samples of a unit sine at `frequency` Hz sampled at `rate`,
/// shifted by `phase` radians.
pub fn sine_wave(length: usize, frequency: f64, rate: f64, phase: f64) -> Vec<f64> {
    (0..length)
        .map(|i| (2.0 * PI * frequency * i as f64 / rate + phase).sin())
        .collect()
}
