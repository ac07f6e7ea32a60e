//! Oscillator stage: adds a scaled waveform onto its input signal.

use crate::dsp::stage::{
    numeric_in, text_of, wave_sample, Stage, StageType, Waveform, NOISE_SEED,
};
use crate::dsp::SAMPLE_RATE;
use crate::error::ParameterError;
use crate::params::ParamValue;

const PARAMS: &[&str] = &["frequency", "amplitude", "waveType"];

#[derive(Debug, Clone)]
pub struct OscillatorStage {
    frequency: f64,
    amplitude: f64,
    wave: Waveform,
    phase: f64,
    noise: u32,
}

impl OscillatorStage {
    pub fn new() -> Self {
        OscillatorStage {
            frequency: 440.0,
            amplitude: 0.5,
            wave: Waveform::Sine,
            phase: 0.0,
            noise: NOISE_SEED,
        }
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }
}

impl Default for OscillatorStage {
    fn default() -> Self {
        OscillatorStage::new()
    }
}

impl Stage for OscillatorStage {
    fn stage_type(&self) -> StageType {
        StageType::Oscillator
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        match name {
            "frequency" => self.frequency = numeric_in(name, &value, 20.0, 20_000.0)?,
            "amplitude" => self.amplitude = numeric_in(name, &value, 0.0, 1.0)?,
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
                    stage: "oscillator",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<ParamValue, ParameterError> {
        match name {
            "frequency" => Ok(ParamValue::Number(self.frequency)),
            "amplitude" => Ok(ParamValue::Number(self.amplitude)),
            "waveType" => Ok(ParamValue::from(self.wave.name())),
            _ => Err(ParameterError::Unknown {
                stage: "oscillator",
                name: name.to_string(),
            }),
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let inc = self.frequency / SAMPLE_RATE;
        let mut out = Vec::with_capacity(input.len());
        for &x in input {
            let s = wave_sample(self.wave, self.phase, &mut self.noise) * self.amplitude;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = OscillatorStage::new();
        let out = osc.process(&[0.0; 4]);
        assert!(out[0].abs() < 1e-6, "first sine sample should be 0, got {}", out[0]);
    }

    #[test]
    fn output_adds_onto_the_input() {
        let mut osc = OscillatorStage::new();
        osc.set_parameter("amplitude", ParamValue::Number(0.0)).unwrap();
        let input = [0.25_f32; 8];
        let out = osc.process(&input);
        assert_eq!(out, input.to_vec(), "zero amplitude should pass input through");
    }

    #[test]
    fn frequency_clamps_into_audible_range() {
        let mut osc = OscillatorStage::new();
        osc.set_parameter("frequency", ParamValue::Number(5.0)).unwrap();
        assert_eq!(osc.parameter("frequency").unwrap(), ParamValue::Number(20.0));
        osc.set_parameter("frequency", ParamValue::Number(99_999.0)).unwrap();
        assert_eq!(osc.parameter("frequency").unwrap(), ParamValue::Number(20_000.0));
    }

    #[test]
    fn wave_type_rejects_unknown_names() {
        let mut osc = OscillatorStage::new();
        let err = osc.set_parameter("waveType", ParamValue::from("warble")).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidValue { .. }), "{err:?}");
    }

    #[test]
    fn reset_replays_the_same_block() {
        let mut osc = OscillatorStage::new();
        osc.set_parameter("waveType", ParamValue::from("noise")).unwrap();
        let a = osc.process(&[0.0; 64]);
        osc.reset();
        let b = osc.process(&[0.0; 64]);
        assert_eq!(a, b, "reset oscillator should replay identical output");
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let osc = OscillatorStage::new();
        assert!(osc.parameter("cutoff").is_err());
    }
}
