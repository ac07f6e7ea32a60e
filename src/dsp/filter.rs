//! Biquad filter stage (Direct Form II Transposed).
//!
//! Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).

use std::f64::consts::PI;

use crate::dsp::stage::{numeric_in, text_of, Stage, StageType};
use crate::dsp::SAMPLE_RATE;
use crate::error::ParameterError;
use crate::params::ParamValue;

const PARAMS: &[&str] = &["cutoff", "resonance", "filterType"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

impl FilterKind {
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Lowpass => "lowpass",
            FilterKind::Highpass => "highpass",
            FilterKind::Bandpass => "bandpass",
        }
    }

    pub fn from_name(name: &str) -> Option<FilterKind> {
        match name {
            "lowpass" => Some(FilterKind::Lowpass),
            "highpass" => Some(FilterKind::Highpass),
            "bandpass" => Some(FilterKind::Bandpass),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterStage {
    cutoff: f64,
    resonance: f64,
    kind: FilterKind,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // Direct Form II Transposed state
    z1: f64,
    z2: f64,

    dirty: bool,
}

impl FilterStage {
    pub fn new() -> Self {
        let mut f = FilterStage {
            cutoff: 1000.0,
            resonance: 0.1,
            kind: FilterKind::Lowpass,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Resonance in [0, 0.99] maps onto Q from Butterworth up to a sharp peak.
    fn q(&self) -> f64 {
        0.707 + self.resonance * 9.0
    }

    fn update_coefficients(&mut self) {
        let omega = 2.0 * PI * self.cutoff / SAMPLE_RATE;
        let sin_w = omega.sin();
        let cos_w = omega.cos();
        let alpha = sin_w / (2.0 * self.q());

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha)
            }
            FilterKind::Highpass => {
                let b1 = -(1.0 + cos_w);
                let b0 = -b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha)
            }
            FilterKind::Bandpass => {
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha)
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }
}

impl Default for FilterStage {
    fn default() -> Self {
        FilterStage::new()
    }
}

impl Stage for FilterStage {
    fn stage_type(&self) -> StageType {
        StageType::Filter
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        match name {
            "cutoff" => self.cutoff = numeric_in(name, &value, 20.0, 20_000.0)?,
            "resonance" => self.resonance = numeric_in(name, &value, 0.0, 0.99)?,
            "filterType" => {
                let text = text_of(name, &value)?;
                self.kind = FilterKind::from_name(text).ok_or_else(|| {
                    ParameterError::InvalidValue {
                        name: name.to_string(),
                        value: text.to_string(),
                    }
                })?;
            }
            _ => {
                return Err(ParameterError::Unknown {
                    stage: "filter",
                    name: name.to_string(),
                })
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<ParamValue, ParameterError> {
        match name {
            "cutoff" => Ok(ParamValue::Number(self.cutoff)),
            "resonance" => Ok(ParamValue::Number(self.resonance)),
            "filterType" => Ok(ParamValue::from(self.kind.name())),
            _ => Err(ParameterError::Unknown {
                stage: "filter",
                name: name.to_string(),
            }),
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.dirty {
            self.update_coefficients();
        }
        let mut out = Vec::with_capacity(input.len());
        for &x in input {
            let x = x as f64;
            let y = self.b0 * x + self.z1;
            self.z1 = self.b1 * x - self.a1 * y + self.z2;
            self.z2 = self.b2 * x - self.a2 * y;
            out.push(y as f32);
        }
        out
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_passes_dc() {
        let mut f = FilterStage::new();
        let out = f.process(&[1.0; 2048]);
        let settled = out[2047];
        assert!(
            (settled - 1.0).abs() < 0.01,
            "lowpass should pass DC, settled at {settled}"
        );
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = FilterStage::new();
        f.set_parameter("filterType", ParamValue::from("highpass")).unwrap();
        let out = f.process(&[1.0; 4096]);
        let settled = out[4095];
        assert!(settled.abs() < 0.01, "highpass should block DC, settled at {settled}");
    }

    #[test]
    fn resonance_clamps_below_one() {
        let mut f = FilterStage::new();
        f.set_parameter("resonance", ParamValue::Number(2.0)).unwrap();
        assert_eq!(f.parameter("resonance").unwrap(), ParamValue::Number(0.99));
    }

    #[test]
    fn reset_clears_state_but_keeps_parameters() {
        let mut f = FilterStage::new();
        f.set_parameter("cutoff", ParamValue::Number(500.0)).unwrap();
        f.process(&[1.0; 64]);
        f.reset();
        assert_eq!(f.parameter("cutoff").unwrap(), ParamValue::Number(500.0));
        let out = f.process(&[0.0; 64]);
        assert!(out.iter().all(|&s| s == 0.0), "state should be cleared after reset");
    }

    #[test]
    fn output_stays_finite_with_high_resonance() {
        let mut f = FilterStage::new();
        f.set_parameter("resonance", ParamValue::Number(0.99)).unwrap();
        f.set_parameter("cutoff", ParamValue::Number(200.0)).unwrap();
        let out = f.process(&[0.5; 8192]);
        assert!(out.iter().all(|s| s.is_finite()));
    }
}
