//! DSP stage graph: the closed set of processing stages and the executor
//! that runs them in dependency order.

pub mod envelope;
pub mod filter;
pub mod graph;
pub mod lfo;
pub mod oscillator;
pub mod stage;

pub use envelope::EnvelopeStage;
pub use filter::{FilterKind, FilterStage};
pub use graph::{Connection, DspGraph};
pub use lfo::LfoStage;
pub use oscillator::OscillatorStage;
pub use stage::{Stage, StageType, Waveform};

/// All rendering runs at a fixed rate; buffers are mono f32.
pub const SAMPLE_RATE: f64 = 44_100.0;

/// Construct a fresh stage of the named type, or `None` for unknown names.
pub fn make_stage(kind: &str) -> Option<Box<dyn Stage>> {
    match StageType::from_name(kind)? {
        StageType::Oscillator => Some(Box::new(OscillatorStage::new())),
        StageType::Filter => Some(Box::new(FilterStage::new())),
        StageType::Envelope => Some(Box::new(EnvelopeStage::new())),
        StageType::Lfo => Some(Box::new(LfoStage::new())),
    }
}
