//! Signal-processing core for the seismic waveform workbench.
//!
//! Raw channel segments are assembled into gap-free traces, optionally
//! Butterworth-filtered, and turned into correlations, spectra, particle
//! motion or instrument-corrected traces. Every operation is synchronous and
//! works on bounded, already-retrieved buffers.

pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{PipelineError, PipelineResult, ProcessingStage, Trace};
