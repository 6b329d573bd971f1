pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn energy(samples: &[f64]) -> f64 {
        samples.iter().map(|&v| v * v).sum()
    }

    /// `(min, max)`, or `None` for an empty slice.
    pub fn min_max(samples: &[f64]) -> Option<(f64, f64)> {
        let first = *samples.first()?;
        Some(
            samples
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    pub fn span(samples: &[f64]) -> f64 {
        Self::min_max(samples).map_or(0.0, |(lo, hi)| hi - lo)
    }

    /// Subtracts the mean in place and returns it.
    pub fn demean(samples: &mut [f64]) -> f64 {
        let mean = Self::mean(samples);
        samples.iter_mut().for_each(|v| *v -= mean);
        mean
    }

    /// Removes the least-squares line through the samples in place.
    pub fn detrend(samples: &mut [f64]) {
        let n = samples.len();
        if n < 2 {
            Self::demean(samples);
            return;
        }
        let x_mean = (n - 1) as f64 / 2.0;
        let y_mean = Self::mean(samples);
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, &y) in samples.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y - y_mean);
            sxx += dx * dx;
        }
        let slope = sxy / sxx;
        for (i, v) in samples.iter_mut().enumerate() {
            *v -= y_mean + slope * (i as f64 - x_mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[4.0]), 4.0);
    }

    #[test]
    fn min_max_and_span() {
        assert_eq!(StatsHelper::min_max(&[]), None);
        assert_eq!(StatsHelper::min_max(&[3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
        assert_eq!(StatsHelper::span(&[3.0, -1.0, 2.0]), 4.0);
    }

    #[test]
    fn detrend_removes_a_ramp() {
        let mut samples: Vec<f64> = (0..16).map(|i| 3.0 + 0.5 * i as f64).collect();
        StatsHelper::detrend(&mut samples);
        assert!(samples.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn demean_returns_removed_mean() {
        let mut samples = vec![1.0, 2.0, 3.0];
        assert_eq!(StatsHelper::demean(&mut samples), 2.0);
        assert_eq!(samples, vec![-1.0, 0.0, 1.0]);
    }
}
