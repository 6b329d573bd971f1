use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult, Trace};
use crate::telemetry::log::LogManager;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Horizontal trajectory of two orthogonal components and its polarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleMotion {
    /// `(east, north)` pairs, de-meaned.
    pub points: Vec<(f64, f64)>,
    /// Principal axis, degrees clockwise from north in `[0, 180)`.
    pub azimuth_deg: f64,
    /// `1 - λ2/λ1`: 1 for a straight line, 0 for a circle.
    pub rectilinearity: f64,
}

/// Pairs `north` and `east` sample by sample.
pub fn particle_motion(north: &Trace, east: &Trace) -> PipelineResult<ParticleMotion> {
    if north.is_empty() || east.is_empty() {
        return Err(PipelineError::NoData);
    }
    if north.len() != east.len() || (north.rate - east.rate).abs() > 1e-9 * north.rate {
        return Err(PipelineError::LengthMismatch(format!(
            "components differ: {} samples at {} Hz vs {} samples at {} Hz",
            north.len(),
            north.rate,
            east.len(),
            east.rate
        )));
    }

    let mut n = north.samples.clone();
    let mut e = east.samples.clone();
    StatsHelper::demean(&mut n);
    StatsHelper::demean(&mut e);

    let observations = Array2::from_shape_fn((2, n.len()), |(row, col)| {
        if row == 0 {
            e[col]
        } else {
            n[col]
        }
    });
    let cov = MatrixHelper::covariance(observations.view());
    let (cee, cnn, cen) = (cov[[0, 0]], cov[[1, 1]], cov[[0, 1]]);

    let total = cee + cnn;
    let spread = ((cee - cnn) * (cee - cnn) / 4.0 + cen * cen).sqrt();
    let major = total / 2.0 + spread;
    let minor = total / 2.0 - spread;

    // Principal eigenvector angle measured from the east axis.
    let from_east = 0.5 * (2.0 * cen).atan2(cee - cnn);
    let azimuth_deg = (90.0 - from_east.to_degrees()).rem_euclid(180.0);
    let rectilinearity = if major > 0.0 {
        1.0 - (minor.max(0.0) / major)
    } else {
        0.0
    };

    LogManager::for_stage("particle_motion").detail(&format!(
        "azimuth {:.1} deg, rectilinearity {:.3}",
        azimuth_deg, rectilinearity
    ));

    Ok(ParticleMotion {
        points: e.into_iter().zip(n).collect(),
        azimuth_deg,
        rectilinearity,
    })
}
