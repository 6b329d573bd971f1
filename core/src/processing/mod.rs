pub mod assembler;
pub mod butterworth;
pub mod correlation;
pub mod deconvolution;
pub mod particle_motion;
pub mod spectra;
pub mod window;

pub use assembler::SegmentAssembler;
pub use butterworth::{ButterworthFilter, FilterDescriptor, FilterSelection};
pub use correlation::{CorrelationResult, Correlator, CorrelatorConfig};
pub use deconvolution::{Deconvolver, DeconvolverConfig, ResponseStage};
pub use particle_motion::{particle_motion, ParticleMotion};
pub use spectra::{Spectrum, SpectrumAnalyzer, SpectrumConfig, SpectrumPoint};
pub use window::{taper, tapered, TaperKind};
