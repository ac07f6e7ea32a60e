//! Low-frequency oscillator stage. Control-rate: its graph output modulates
//! a destination parameter rather than feeding an audio input.

use crate::dsp::stage::{
    numeric_in, text_of, wave_sample, Stage, StageType, Waveform, NOISE_SEED,
};
use crate::dsp::SAMPLE_RATE;
use crate::error::ParameterError;
use crate::params::ParamValue;

const PARAMS: &[&str] = &["rate", "depth", "waveType"];

#[derive(Debug, Clone)]
pub struct LfoStage {
    rate: f64,
    depth: f64,
    wave: Waveform,
    phase: f64,
    noise: u32,
}

impl LfoStage {
    pub fn new() -> Self {
        LfoStage {
            rate: 1.0,
            depth: 0.5,
            wave: Waveform::Sine,
            phase: 0.0,
            noise: NOISE_SEED,
        }
    }
}

impl Default for LfoStage {
    fn default() -> Self {
        LfoStage::new()
    }
}

impl Stage for LfoStage {
    fn stage_type(&self) -> StageType {
        StageType::Lfo
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        match name {
            "rate" => self.rate = numeric_in(name, &value, 0.01, 20.0)?,
            "depth" => self.depth = numeric_in(name, &value, 0.0, 1.0)?,
            "waveType" => {
                let text = text_of(name, &value)?;
                self.wave = Waveform::from_name(text).ok_or_else(|| {
                    ParameterError::InvalidValue {
                        name: name.to_string(),
                        value: text.to_string(),
                    }
                })?;
            }
            _ => {
                return Err(ParameterError::Unknown {
                    stage: "lfo",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<ParamValue, ParameterError> {
        match name {
            "rate" => Ok(ParamValue::Number(self.rate)),
            "depth" => Ok(ParamValue::Number(self.depth)),
            "waveType" => Ok(ParamValue::from(self.wave.name())),
            _ => Err(ParameterError::Unknown {
                stage: "lfo",
                name: name.to_string(),
            }),
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let inc = self.rate / SAMPLE_RATE;
        let mut out = Vec::with_capacity(input.len());
        for &x in input {
            let s = wave_sample(self.wave, self.phase, &mut self.noise) * self.depth;
            out.push(x + s as f32);
            self.phase += inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        out
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.noise = NOISE_SEED;
    }
}
