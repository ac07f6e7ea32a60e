//! ADSR envelope stage with linear segments, gated by input signal level.

use crate::dsp::stage::{numeric_in, Stage, StageType};
use crate::dsp::SAMPLE_RATE;
use crate::error::ParameterError;
use crate::params::ParamValue;

const PARAMS: &[&str] = &["attack", "decay", "sustain", "release"];

/// Input magnitude above this opens the gate.
const GATE_THRESHOLD: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct EnvelopeStage {
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,

    phase: Phase,
    level: f64,
}

impl EnvelopeStage {
    pub fn new() -> Self {
        EnvelopeStage {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
            phase: Phase::Idle,
            level: 0.0,
        }
    }

    fn advance(&mut self, gate: bool) -> f64 {
        if gate {
            match self.phase {
                Phase::Idle | Phase::Release => self.phase = Phase::Attack,
                _ => {}
            }
        } else if self.phase != Phase::Idle {
            self.phase = Phase::Release;
        }

        match self.phase {
            Phase::Idle => {}
            Phase::Attack => {
                self.level += 1.0 / (self.attack * SAMPLE_RATE);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.phase = Phase::Decay;
                }
            }
            Phase::Decay => {
                self.level -= (1.0 - self.sustain) / (self.decay * SAMPLE_RATE);
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.phase = Phase::Sustain;
                }
            }
            Phase::Sustain => self.level = self.sustain,
            Phase::Release => {
                self.level -= 1.0 / (self.release * SAMPLE_RATE);
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.phase = Phase::Idle;
                }
            }
        }
        self.level
    }
}

impl Default for EnvelopeStage {
    fn default() -> Self {
        EnvelopeStage::new()
    }
}

impl Stage for EnvelopeStage {
    fn stage_type(&self) -> StageType {
        StageType::Envelope
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        match name {
            "attack" => self.attack = numeric_in(name, &value, 0.001, 5.0)?,
            "decay" => self.decay = numeric_in(name, &value, 0.001, 5.0)?,
            "sustain" => self.sustain = numeric_in(name, &value, 0.0, 1.0)?,
            "release" => self.release = numeric_in(name, &value, 0.001, 5.0)?,
            _ => {
                return Err(ParameterError::Unknown {
                    stage: "envelope",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<ParamValue, ParameterError> {
        match name {
            "attack" => Ok(ParamValue::Number(self.attack)),
            "decay" => Ok(ParamValue::Number(self.decay)),
            "sustain" => Ok(ParamValue::Number(self.sustain)),
            "release" => Ok(ParamValue::Number(self.release)),
            _ => Err(ParameterError::Unknown {
                stage: "envelope",
                name: name.to_string(),
            }),
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len());
        for &x in input {
            let level = self.advance(x.abs() > GATE_THRESHOLD);
            out.push(x * level as f32);
        }
        out
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_on_silence() {
        let mut env = EnvelopeStage::new();
        let out = env.process(&[0.0; 128]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn attack_ramps_toward_full_level() {
        let mut env = EnvelopeStage::new();
        env.set_parameter("attack", ParamValue::Number(0.001)).unwrap();
        // 0.001 s attack is ~44 samples; by 200 the envelope is past attack
        let out = env.process(&[1.0; 200]);
        assert!(out[0] < out[40], "level should rise during attack");
        assert!(out[50] > 0.9, "attack should reach full level, got {}", out[50]);
    }

    #[test]
    fn decays_to_sustain_level() {
        let mut env = EnvelopeStage::new();
        env.set_parameter("attack", ParamValue::Number(0.001)).unwrap();
        env.set_parameter("decay", ParamValue::Number(0.001)).unwrap();
        env.set_parameter("sustain", ParamValue::Number(0.5)).unwrap();
        let out = env.process(&[1.0; 1000]);
        let settled = out[999];
        assert!((settled - 0.5).abs() < 1e-3, "expected sustain 0.5, got {settled}");
    }

    #[test]
    fn releases_back_to_silence() {
        let mut env = EnvelopeStage::new();
        env.set_parameter("attack", ParamValue::Number(0.001)).unwrap();
        env.set_parameter("release", ParamValue::Number(0.001)).unwrap();
        env.process(&[1.0; 500]);
        let out = env.process(&[0.0; 500]);
        assert_eq!(out[499], 0.0, "release should return to zero");
    }

    #[test]
    fn times_clamp_to_legal_range() {
        let mut env = EnvelopeStage::new();
        env.set_parameter("release", ParamValue::Number(100.0)).unwrap();
        assert_eq!(env.parameter("release").unwrap(), ParamValue::Number(5.0));
        env.set_parameter("attack", ParamValue::Number(0.0)).unwrap();
        assert_eq!(env.parameter("attack").unwrap(), ParamValue::Number(0.001));
    }
}
