//! promptsynth: prompt-to-audio generation core.
//!
//! A text prompt and a musical role go in; a rendered, loudness-safe mono
//! buffer comes out with a reproducibility trace attached. The pipeline:
//! candidate parameter assignments are proposed inside the role's policy
//! ranges, scored against the prompt, selected under resource constraints,
//! written onto a DSP stage graph, rendered block by block, then normalized
//! and peak-limited.

pub mod decision;
pub mod dsp;
pub mod error;
pub mod generator;
pub mod monitor;
pub mod moo;
pub mod params;
pub mod policy;
pub mod preset;
pub mod quality;
pub mod render;
pub mod safety;
pub mod semantic;

pub use decision::{Candidate, DecisionHeads};
pub use dsp::{Connection, DspGraph, Stage, StageType, Waveform, SAMPLE_RATE};
pub use error::{ConfigError, EngineFault, GraphError, ParameterError, PresetError};
pub use generator::{
    AudioGenerator, Constraints, GenerationRequest, GenerationResult, GeneratorStatus, Trace,
};
pub use monitor::{SystemMetrics, SystemMonitor};
pub use moo::MooOptimizer;
pub use params::ParamValue;
pub use policy::{MusicalContext, Role, RolePolicy};
pub use preset::{parse_preset, serialize_preset, PresetDoc};
pub use quality::{QualityAssessor, QualityMetrics, QualityWeights};
pub use render::{encode_wav, AudioRenderer};
pub use safety::AudioSafety;
pub use semantic::{SemanticFusion, SemanticScorer};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-shot convenience: run a request through a fresh generator.
pub fn generate(request: &GenerationRequest) -> GenerationResult {
    AudioGenerator::new().generate(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_generation_works() {
        let request = GenerationRequest {
            prompt: "deep bass".to_string(),
            role: Role::Bass,
            seed: Some(1),
            ..GenerationRequest::default()
        };
        let result = generate(&request);
        assert!(!result.audio.is_empty());
        assert_eq!(result.sample_rate, 44_100);
    }
}
