//! Tapering windows applied before spectral analysis and correlation.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Standard deviation of the Gauss window, relative to its half-length.
const GAUSS_SIGMA: f64 = 0.4;

/// Window function families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaperKind {
    /// Identity: every weight is 1.
    #[default]
    None,
    /// `0.5 - 0.5*cos(2πi/(N-1))`
    Hanning,
    /// `0.54 - 0.46*cos(2πi/(N-1))`
    Hamming,
    /// `sin(πi/(N-1))`
    Cosine,
    /// Triangle with non-zero end points.
    Triangular,
    /// Triangle reaching zero at both ends.
    Bartlett,
    Gauss,
    /// `0.42 - 0.5*cos(2πi/(N-1)) + 0.08*cos(4πi/(N-1))`
    Blackman,
}

impl TaperKind {
    pub const ALL: [TaperKind; 8] = [
        TaperKind::None,
        TaperKind::Hanning,
        TaperKind::Hamming,
        TaperKind::Cosine,
        TaperKind::Triangular,
        TaperKind::Bartlett,
        TaperKind::Gauss,
        TaperKind::Blackman,
    ];

    /// Weight of sample `i` in a window of `n` samples.
    pub fn weight(self, i: usize, n: usize) -> f64 {
        if n <= 1 {
            return 1.0;
        }
        let m = (n - 1) as f64;
        let x = i as f64;
        let half = m / 2.0;
        match self {
            TaperKind::None => 1.0,
            TaperKind::Hanning => 0.5 - 0.5 * (2.0 * PI * x / m).cos(),
            TaperKind::Hamming => 0.54 - 0.46 * (2.0 * PI * x / m).cos(),
            TaperKind::Cosine => (PI * x / m).sin(),
            TaperKind::Triangular => 1.0 - ((x - half) / ((n + 1) as f64 / 2.0)).abs(),
            TaperKind::Bartlett => 1.0 - ((x - half) / half).abs(),
            TaperKind::Gauss => {
                let ratio = (x - half) / (GAUSS_SIGMA * half);
                (-0.5 * ratio * ratio).exp()
            }
            TaperKind::Blackman => {
                0.42 - 0.5 * (2.0 * PI * x / m).cos() + 0.08 * (4.0 * PI * x / m).cos()
            }
        }
    }

    pub fn weights(self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.weight(i, n)).collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            TaperKind::None => "none",
            TaperKind::Hanning => "hanning",
            TaperKind::Hamming => "hamming",
            TaperKind::Cosine => "cosine",
            TaperKind::Triangular => "triangular",
            TaperKind::Bartlett => "bartlett",
            TaperKind::Gauss => "gauss",
            TaperKind::Blackman => "blackman",
        }
    }
}

impl fmt::Display for TaperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaperKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let alias = match lowered.as_str() {
            "hann" => "hanning",
            "rectangular" => "none",
            other => other,
        };
        TaperKind::ALL
            .into_iter()
            .find(|kind| kind.name() == alias)
            .ok_or_else(|| format!("unknown taper '{}'", s))
    }
}

/// Multiplies `buffer` in place by the `kind` window.
pub fn taper(buffer: &mut [f64], kind: TaperKind) {
    if kind == TaperKind::None {
        return;
    }
    let n = buffer.len();
    for (i, value) in buffer.iter_mut().enumerate() {
        *value *= kind.weight(i, n);
    }
}

/// Tapered copy of `buffer`.
pub fn tapered(buffer: &[f64], kind: TaperKind) -> Vec<f64> {
    let mut copy = buffer.to_vec();
    taper(&mut copy, kind);
    copy
}
