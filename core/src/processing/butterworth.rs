//! Butterworth IIR filters built from cascaded sections.
//!
//! Coefficients follow Stearns' bilinear-transform pole placement: a filter of
//! `order` sections carries `2 * order` analog poles at
//! `cos(π(2(k+1+order)-1) / (4·order))` for `k` in `0..order`, pre-warped with
//! `tan(fc·π/fs)`. High-pass and low-pass sections have two delay taps,
//! band-pass sections four.
//!
//! Filtering removes the mean of the processed range first and adds it back
//! afterwards, so constant offsets pass through unchanged.

use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult, ProcessingStage, Trace};
use crate::telemetry::log::LogManager;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Immutable filter parameters. Cutoffs are in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterDescriptor {
    HighPass { order: usize, cutoff: f64 },
    LowPass { order: usize, cutoff: f64 },
    BandPass { order: usize, low: f64, high: f64 },
}

impl FilterDescriptor {
    pub fn order(&self) -> usize {
        match *self {
            FilterDescriptor::HighPass { order, .. }
            | FilterDescriptor::LowPass { order, .. }
            | FilterDescriptor::BandPass { order, .. } => order,
        }
    }

    pub fn label(&self) -> String {
        match *self {
            FilterDescriptor::HighPass { order, cutoff } => {
                format!("high-pass order {} @ {} Hz", order, cutoff)
            }
            FilterDescriptor::LowPass { order, cutoff } => {
                format!("low-pass order {} @ {} Hz", order, cutoff)
            }
            FilterDescriptor::BandPass { order, low, high } => {
                format!("band-pass order {} {}-{} Hz", order, low, high)
            }
        }
    }

    /// Checks order and cutoff ordering, independent of any sample rate.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.order() < 1 {
            return Err(PipelineError::InvalidCutoffs(format!(
                "order must be at least 1, got {}",
                self.order()
            )));
        }
        let cutoffs = match *self {
            FilterDescriptor::HighPass { cutoff, .. } | FilterDescriptor::LowPass { cutoff, .. } => {
                vec![cutoff]
            }
            FilterDescriptor::BandPass { low, high, .. } => vec![low, high],
        };
        if let Some(bad) = cutoffs.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
            return Err(PipelineError::InvalidCutoffs(format!(
                "cutoff {} must be a positive frequency",
                bad
            )));
        }
        if let FilterDescriptor::BandPass { low, high, .. } = *self {
            if low >= high {
                return Err(PipelineError::InvalidCutoffs(format!(
                    "low cutoff {} must be below high cutoff {}",
                    low, high
                )));
            }
        }
        Ok(())
    }

    fn highest_cutoff(&self) -> f64 {
        match *self {
            FilterDescriptor::HighPass { cutoff, .. } | FilterDescriptor::LowPass { cutoff, .. } => {
                cutoff
            }
            FilterDescriptor::BandPass { high, .. } => high,
        }
    }
}

/// Filter choice as it arrives from configuration or user input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSelection {
    #[default]
    None,
    HighPass {
        order: usize,
        cutoff: f64,
    },
    LowPass {
        order: usize,
        cutoff: f64,
    },
    BandPass {
        order: usize,
        low: f64,
        high: f64,
    },
    /// Raw user-entered values; unset or non-finite cutoffs are ignored.
    Composite {
        order: usize,
        #[serde(default)]
        low: Option<f64>,
        #[serde(default)]
        high: Option<f64>,
    },
}

impl FilterSelection {
    /// Resolves the selection to a concrete descriptor, or `None` when no
    /// filtering was requested.
    pub fn resolve(&self) -> PipelineResult<Option<FilterDescriptor>> {
        let descriptor = match *self {
            FilterSelection::None => return Ok(None),
            FilterSelection::HighPass { order, cutoff } => {
                FilterDescriptor::HighPass { order, cutoff }
            }
            FilterSelection::LowPass { order, cutoff } => FilterDescriptor::LowPass { order, cutoff },
            FilterSelection::BandPass { order, low, high } => {
                FilterDescriptor::BandPass { order, low, high }
            }
            FilterSelection::Composite { order, low, high } => {
                let low = low.filter(|f| f.is_finite());
                let high = high.filter(|f| f.is_finite());
                match (low, high) {
                    (Some(low), Some(high)) => FilterDescriptor::BandPass { order, low, high },
                    (Some(cutoff), None) => FilterDescriptor::HighPass { order, cutoff },
                    (None, Some(cutoff)) => FilterDescriptor::LowPass { order, cutoff },
                    (None, None) => {
                        return Err(PipelineError::InvalidCutoffs(
                            "no finite cutoff was entered".into(),
                        ))
                    }
                }
            }
        };
        descriptor.validate()?;
        Ok(Some(descriptor))
    }
}

/// Two-tap section: `y = a·(x0 ± 2x1 + x2) - b·y1 - c·y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SecondOrderSection {
    a: f64,
    b: f64,
    c: f64,
}

/// Four-tap band-pass section:
/// `y = a·(x0 - 2x2 + x4) - b·y1 - c·y2 - d·y3 - e·y4`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FourthOrderSection {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Sections {
    HighPass(Vec<SecondOrderSection>),
    LowPass(Vec<SecondOrderSection>),
    BandPass(Vec<FourthOrderSection>),
}

#[derive(Debug, Clone, PartialEq)]
struct Design {
    sample_rate: f64,
    sections: Sections,
}

/// Pole angle cosine of section `k` for a filter of `order` sections.
fn pole_cosine(k: usize, order: usize) -> f64 {
    let numerator = (2 * (k + 1 + order) - 1) as f64;
    (PI * numerator / (4 * order) as f64).cos()
}

fn prewarp(frequency: f64, sample_rate: f64) -> f64 {
    (frequency * PI / sample_rate).tan()
}

fn design_two_tap(
    order: usize,
    cutoff: f64,
    sample_rate: f64,
    low_pass: bool,
) -> Vec<SecondOrderSection> {
    let wcp = prewarp(cutoff, sample_rate);
    let wcp2 = wcp * wcp;
    (0..order)
        .map(|k| {
            let cs = pole_cosine(k, order);
            let x = 1.0 / (1.0 + wcp2 - 2.0 * wcp * cs);
            SecondOrderSection {
                a: if low_pass { wcp2 * x } else { x },
                b: 2.0 * (wcp2 - 1.0) * x,
                c: (1.0 + wcp2 + 2.0 * wcp * cs) * x,
            }
        })
        .collect()
}

fn design_band_pass(
    order: usize,
    low: f64,
    high: f64,
    sample_rate: f64,
) -> Vec<FourthOrderSection> {
    let w1 = prewarp(low, sample_rate);
    let w2 = prewarp(high, sample_rate);
    let wc = w2 - w1;
    let q = wc * wc + 2.0 * w1 * w2;
    let s = w1 * w1 * w2 * w2;
    (0..order)
        .map(|k| {
            let cs = pole_cosine(k, order);
            let p = -2.0 * wc * cs;
            let r = p * w1 * w2;
            let x = 1.0 + p + q + r + s;
            FourthOrderSection {
                a: wc * wc / x,
                b: (-4.0 - 2.0 * p + 2.0 * r + 4.0 * s) / x,
                c: (6.0 - 2.0 * q + 6.0 * s) / x,
                d: (-4.0 + 2.0 * p - 2.0 * r + 4.0 * s) / x,
                e: (1.0 - p + q - r + s) / x,
            }
        })
        .collect()
}

impl SecondOrderSection {
    fn run(&self, data: &mut [f64], low_pass: bool) {
        let middle = if low_pass { 2.0 } else { -2.0 };
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        for value in data.iter_mut() {
            let x0 = *value;
            let y0 = self.a * (x0 + middle * x1 + x2) - self.b * y1 - self.c * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *value = y0;
        }
    }

    fn response(&self, z1: Complex64, low_pass: bool) -> Complex64 {
        let z2 = z1 * z1;
        let middle = if low_pass { 2.0 } else { -2.0 };
        let numerator = (z1 * middle + z2 + 1.0) * self.a;
        let denominator = z1 * self.b + z2 * self.c + 1.0;
        numerator / denominator
    }
}

impl FourthOrderSection {
    fn run(&self, data: &mut [f64]) {
        let mut x = [0.0f64; 4];
        let mut y = [0.0f64; 4];
        for value in data.iter_mut() {
            let x0 = *value;
            let y0 = self.a * (x0 - 2.0 * x[1] + x[3])
                - self.b * y[0]
                - self.c * y[1]
                - self.d * y[2]
                - self.e * y[3];
            x.rotate_right(1);
            x[0] = x0;
            y.rotate_right(1);
            y[0] = y0;
            *value = y0;
        }
    }

    fn response(&self, z1: Complex64) -> Complex64 {
        let z2 = z1 * z1;
        let z3 = z2 * z1;
        let z4 = z2 * z2;
        let numerator = (z2 * -2.0 + z4 + 1.0) * self.a;
        let denominator = z1 * self.b + z2 * self.c + z3 * self.d + z4 * self.e + 1.0;
        numerator / denominator
    }
}

/// One filtering session for one channel.
///
/// [`design`](Self::design) computes the section coefficients for a sample
/// rate; [`apply`](Self::apply) reuses them until the rate changes.
pub struct ButterworthFilter {
    descriptor: FilterDescriptor,
    design: Option<Design>,
    logger: LogManager,
}

impl ButterworthFilter {
    pub fn new(descriptor: FilterDescriptor) -> PipelineResult<Self> {
        descriptor.validate()?;
        Ok(Self {
            descriptor,
            design: None,
            logger: LogManager::for_stage("butterworth"),
        })
    }

    pub fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    pub fn designed_rate(&self) -> Option<f64> {
        self.design.as_ref().map(|d| d.sample_rate)
    }

    /// Computes section coefficients for `sample_rate` (Hz).
    pub fn design(&mut self, sample_rate: f64) -> PipelineResult<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PipelineError::InvalidCutoffs(format!(
                "sample rate {} is not positive",
                sample_rate
            )));
        }
        let nyquist = sample_rate / 2.0;
        if self.descriptor.highest_cutoff() >= nyquist {
            return Err(PipelineError::InvalidCutoffs(format!(
                "cutoff {} Hz is not below the Nyquist frequency {} Hz",
                self.descriptor.highest_cutoff(),
                nyquist
            )));
        }

        let sections = match self.descriptor {
            FilterDescriptor::HighPass { order, cutoff } => {
                Sections::HighPass(design_two_tap(order, cutoff, sample_rate, false))
            }
            FilterDescriptor::LowPass { order, cutoff } => {
                Sections::LowPass(design_two_tap(order, cutoff, sample_rate, true))
            }
            FilterDescriptor::BandPass { order, low, high } => {
                Sections::BandPass(design_band_pass(order, low, high, sample_rate))
            }
        };
        self.logger.detail(&format!(
            "designed {} for {} Hz",
            self.descriptor.label(),
            sample_rate
        ));
        self.design = Some(Design {
            sample_rate,
            sections,
        });
        Ok(())
    }

    /// Filters the first `length` samples of `data` in place and returns
    /// that range.
    pub fn apply<'a>(
        &mut self,
        data: &'a mut [f64],
        length: usize,
    ) -> PipelineResult<&'a mut [f64]> {
        if length > data.len() {
            return Err(PipelineError::LengthExceeded {
                declared: length,
                actual: data.len(),
            });
        }
        let design = self.design.as_ref().ok_or(PipelineError::FilterNotDesigned)?;
        let range = &mut data[..length];
        if range.is_empty() {
            return Ok(range);
        }

        let mean = StatsHelper::demean(range);
        match &design.sections {
            Sections::HighPass(sections) => sections.iter().for_each(|s| s.run(range, false)),
            Sections::LowPass(sections) => sections.iter().for_each(|s| s.run(range, true)),
            Sections::BandPass(sections) => sections.iter().for_each(|s| s.run(range)),
        }
        range.iter_mut().for_each(|v| *v += mean);
        Ok(range)
    }

    /// Filters an owned buffer over its full length.
    pub fn filter(&mut self, mut data: Vec<f64>) -> PipelineResult<Vec<f64>> {
        let length = data.len();
        self.apply(&mut data, length)?;
        Ok(data)
    }

    /// Complex gain of the designed cascade at `frequency` Hz.
    pub fn gain_at(&self, frequency: f64) -> PipelineResult<Complex64> {
        let design = self.design.as_ref().ok_or(PipelineError::FilterNotDesigned)?;
        let omega = 2.0 * PI * frequency / design.sample_rate;
        let z1 = Complex64::from_polar(1.0, -omega);
        Ok(match &design.sections {
            Sections::HighPass(sections) => sections.iter().map(|s| s.response(z1, false)).product(),
            Sections::LowPass(sections) => sections.iter().map(|s| s.response(z1, true)).product(),
            Sections::BandPass(sections) => sections.iter().map(|s| s.response(z1)).product(),
        })
    }
}

impl ProcessingStage for ButterworthFilter {
    fn name(&self) -> &'static str {
        "butterworth"
    }

    fn execute(&mut self, mut input: Trace) -> PipelineResult<Trace> {
        if self.designed_rate() != Some(input.rate) {
            self.design(input.rate)?;
        }
        let length = input.samples.len();
        self.apply(&mut input.samples, length)?;
        self.logger.record(&format!(
            "{} applied to {} samples",
            self.descriptor.label(),
            length
        ));
        Ok(input)
    }
}
