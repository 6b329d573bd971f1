use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse at one transform size.
pub struct FftHelper {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let scratch = vec![Complex64::zero(); scratch_len];
        Self {
            size,
            forward,
            inverse,
            scratch,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Full complex spectrum of a real input, zero-padded or truncated to the
    /// transform size.
    pub fn forward(&mut self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());

        self.forward.process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// The `size/2 + 1` non-negative frequency bins of a real input.
    pub fn forward_half(&mut self, input: &[f64]) -> Vec<Complex64> {
        let mut spectrum = self.forward(input);
        spectrum.truncate(self.size / 2 + 1);
        spectrum
    }

    /// Real part of the scaled inverse transform of a full spectrum.
    pub fn inverse(&mut self, spectrum: &[Complex64]) -> Vec<f64> {
        let mut buffer = spectrum.to_vec();
        buffer.resize(self.size, Complex64::zero());

        self.inverse.process_with_scratch(&mut buffer, &mut self.scratch);
        let scale = 1.0 / self.size as f64;
        buffer.iter().map(|c| c.re * scale).collect()
    }

    /// Inverse of [`forward_half`](Self::forward_half): rebuilds the
    /// Hermitian-symmetric spectrum and returns the real series.
    pub fn inverse_half(&mut self, half: &[Complex64]) -> Vec<f64> {
        let mut full = vec![Complex64::zero(); self.size];
        let usable = half.len().min(self.size / 2 + 1);
        full[..usable].copy_from_slice(&half[..usable]);
        for k in 1..usable {
            let mirror = self.size - k;
            if mirror >= usable {
                full[mirror] = half[k].conj();
            }
        }
        self.inverse(&full)
    }

    /// Frequency in Hz of bin `k` for a transform sampled at `rate`.
    pub fn bin_frequency(&self, bin: usize, rate: f64) -> f64 {
        bin as f64 * rate / self.size as f64
    }
}
