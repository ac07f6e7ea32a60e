use crate::error::ParameterError;
use crate::params::ParamValue;

/// The closed set of processing stage kinds the engine executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageType {
    Oscillator,
    Filter,
    Envelope,
    Lfo,
}

impl StageType {
    pub fn name(self) -> &'static str {
        match self {
            StageType::Oscillator => "oscillator",
            StageType::Filter => "filter",
            StageType::Envelope => "envelope",
            StageType::Lfo => "lfo",
        }
    }

    pub fn from_name(name: &str) -> Option<StageType> {
        match name {
            "oscillator" => Some(StageType::Oscillator),
            "filter" => Some(StageType::Filter),
            "envelope" => Some(StageType::Envelope),
            "lfo" => Some(StageType::Lfo),
            _ => None,
        }
    }

    /// Control-rate stages emit slowly varying shaping signals; their graph
    /// outputs modulate parameters instead of feeding audio inputs.
    pub fn is_control_rate(self) -> bool {
        matches!(self, StageType::Lfo | StageType::Envelope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
    Noise,
}

impl Waveform {
    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Saw => "saw",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
            Waveform::Noise => "noise",
        }
    }

    pub fn from_name(name: &str) -> Option<Waveform> {
        match name {
            "sine" => Some(Waveform::Sine),
            "saw" => Some(Waveform::Saw),
            "square" => Some(Waveform::Square),
            "triangle" => Some(Waveform::Triangle),
            "noise" => Some(Waveform::Noise),
            _ => None,
        }
    }
}

/// Evaluate one sample of `wave` at `phase` in [0, 1). Noise advances the
/// caller's xorshift state so identical seeds replay identical noise.
pub fn wave_sample(wave: Waveform, phase: f64, noise: &mut u32) -> f64 {
    match wave {
        Waveform::Sine => (phase * std::f64::consts::TAU).sin(),
        Waveform::Saw => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
        Waveform::Noise => {
            let mut x = *noise;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            *noise = x;
            (x as f64 / u32::MAX as f64) * 2.0 - 1.0
        }
    }
}

/// Default xorshift state for noise generation; stages reset to this so a
/// reset graph replays byte-identical noise.
pub const NOISE_SEED: u32 = 0x2545_f491;

/// A single processing node in the graph. Implementations keep their own
/// phase/filter/envelope state across `process` calls; `reset` returns them
/// to their initial state without touching parameter values.
pub trait Stage: Send {
    fn stage_type(&self) -> StageType;

    /// Set a parameter. Numeric values are clamped into the stage's legal
    /// range rather than rejected; unknown names and wrong tags are errors.
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError>;

    fn parameter(&self, name: &str) -> Result<ParamValue, ParameterError>;

    fn parameter_names(&self) -> &'static [&'static str];

    /// Process one block. The output has the same length as `input`.
    fn process(&mut self, input: &[f32]) -> Vec<f32>;

    fn reset(&mut self);
}

/// Extract a numeric value clamped into `[min, max]`.
pub(crate) fn numeric_in(
    name: &str,
    value: &ParamValue,
    min: f64,
    max: f64,
) -> Result<f64, ParameterError> {
    match value.as_number() {
        Some(n) => Ok(n.clamp(min, max)),
        None => Err(ParameterError::TypeMismatch {
            name: name.to_string(),
            expected: "number",
            got: value.tag(),
        }),
    }
}

pub(crate) fn text_of<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str, ParameterError> {
    match value.as_text() {
        Some(s) => Ok(s),
        None => Err(ParameterError::TypeMismatch {
            name: name.to_string(),
            expected: "text",
            got: value.tag(),
        }),
    }
}
