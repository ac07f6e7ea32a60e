//! Role policies: per-role legal ranges and defaults for every stage
//! parameter, plus adjustments for musical context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dsp::DspGraph;
use crate::params::ParamValue;

pub const POLICY_VERSION: &str = "1.2.0";

/// Musical role a generated sound plays in a mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Pad,
    Bass,
    Lead,
    Drum,
    Texture,
    Ambient,
    Unknown,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Pad => "pad",
            Role::Bass => "bass",
            Role::Lead => "lead",
            Role::Drum => "drum",
            Role::Texture => "texture",
            Role::Ambient => "ambient",
            Role::Unknown => "unknown",
        }
    }

    /// Case-insensitive lookup; anything unrecognized is `Unknown`.
    pub fn from_name(name: &str) -> Role {
        match name.to_ascii_lowercase().as_str() {
            "pad" => Role::Pad,
            "bass" => Role::Bass,
            "lead" => Role::Lead,
            "drum" => Role::Drum,
            "texture" => Role::Texture,
            "ambient" => Role::Ambient,
            _ => Role::Unknown,
        }
    }
}

/// Tempo, key offset in semitones from A440's key center, and scale name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalContext {
    pub tempo: f64,
    pub key: i32,
    pub scale: String,
}

impl Default for MusicalContext {
    fn default() -> Self {
        MusicalContext {
            tempo: 120.0,
            key: 0,
            scale: "major".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

/// The numeric envelope a role imposes on graph parameters. Keys are
/// "<stage type>.<parameter>", e.g. "filter.cutoff".
#[derive(Debug, Clone)]
pub struct RolePolicy {
    pub role: Role,
    pub version: &'static str,
    ranges: BTreeMap<&'static str, ParamRange>,
}

const TIME_KEYS: &[&str] = &["envelope.attack", "envelope.decay", "envelope.release"];

fn table(entries: &[(&'static str, f64, f64, f64)]) -> BTreeMap<&'static str, ParamRange> {
    entries
        .iter()
        .map(|&(k, min, max, default)| (k, ParamRange { min, max, default }))
        .collect()
}

impl RolePolicy {
    pub fn for_role(role: Role) -> RolePolicy {
        let ranges = match role {
            Role::Pad => table(&[
                ("oscillator.frequency", 55.0, 880.0, 220.0),
                ("oscillator.amplitude", 0.2, 0.7, 0.45),
                ("filter.cutoff", 400.0, 1200.0, 800.0),
                ("filter.resonance", 0.0, 0.6, 0.2),
                ("envelope.attack", 0.2, 0.8, 0.4),
                ("envelope.decay", 0.1, 2.0, 0.5),
                ("envelope.sustain", 0.5, 1.0, 0.8),
                ("envelope.release", 0.5, 4.0, 1.5),
                ("lfo.rate", 0.05, 2.0, 0.25),
                ("lfo.depth", 0.1, 0.6, 0.3),
            ]),
            Role::Bass => table(&[
                ("oscillator.frequency", 40.0, 200.0, 65.0),
                ("oscillator.amplitude", 0.4, 0.9, 0.6),
                ("filter.cutoff", 200.0, 800.0, 400.0),
                ("filter.resonance", 0.0, 0.5, 0.15),
                ("envelope.attack", 0.005, 0.04, 0.01),
                ("envelope.decay", 0.05, 0.5, 0.15),
                ("envelope.sustain", 0.3, 0.9, 0.6),
                ("envelope.release", 0.05, 0.5, 0.2),
                ("lfo.rate", 0.1, 8.0, 1.0),
                ("lfo.depth", 0.0, 0.3, 0.1),
            ]),
            Role::Lead => table(&[
                ("oscillator.frequency", 220.0, 2000.0, 440.0),
                ("oscillator.amplitude", 0.3, 0.8, 0.55),
                ("filter.cutoff", 800.0, 2000.0, 1400.0),
                ("filter.resonance", 0.1, 0.8, 0.35),
                ("envelope.attack", 0.005, 0.12, 0.02),
                ("envelope.decay", 0.05, 0.8, 0.2),
                ("envelope.sustain", 0.4, 0.9, 0.7),
                ("envelope.release", 0.1, 1.0, 0.3),
                ("lfo.rate", 0.5, 8.0, 5.0),
                ("lfo.depth", 0.0, 0.4, 0.15),
            ]),
            Role::Drum => table(&[
                ("oscillator.frequency", 40.0, 400.0, 100.0),
                ("oscillator.amplitude", 0.5, 1.0, 0.7),
                ("filter.cutoff", 100.0, 12_000.0, 3000.0),
                ("filter.resonance", 0.0, 0.4, 0.1),
                ("envelope.attack", 0.001, 0.01, 0.001),
                ("envelope.decay", 0.02, 0.4, 0.1),
                ("envelope.sustain", 0.0, 0.3, 0.0),
                ("envelope.release", 0.02, 0.3, 0.08),
                ("lfo.rate", 0.5, 12.0, 4.0),
                ("lfo.depth", 0.0, 0.2, 0.0),
            ]),
            Role::Texture => table(&[
                ("oscillator.frequency", 100.0, 4000.0, 600.0),
                ("oscillator.amplitude", 0.1, 0.5, 0.3),
                ("filter.cutoff", 300.0, 2000.0, 1000.0),
                ("filter.resonance", 0.0, 0.9, 0.4),
                ("envelope.attack", 0.2, 1.0, 0.5),
                ("envelope.decay", 0.2, 3.0, 1.0),
                ("envelope.sustain", 0.4, 1.0, 0.7),
                ("envelope.release", 0.5, 5.0, 2.0),
                ("lfo.rate", 0.02, 4.0, 0.5),
                ("lfo.depth", 0.2, 0.9, 0.5),
            ]),
            Role::Ambient => table(&[
                ("oscillator.frequency", 55.0, 1000.0, 165.0),
                ("oscillator.amplitude", 0.15, 0.5, 0.3),
                ("filter.cutoff", 200.0, 8000.0, 1000.0),
                ("filter.resonance", 0.0, 0.5, 0.15),
                ("envelope.attack", 0.5, 5.0, 1.5),
                ("envelope.decay", 0.5, 4.0, 1.5),
                ("envelope.sustain", 0.6, 1.0, 0.85),
                ("envelope.release", 1.0, 5.0, 3.0),
                ("lfo.rate", 0.02, 1.0, 0.1),
                ("lfo.depth", 0.1, 0.7, 0.35),
            ]),
            Role::Unknown => table(&[
                ("oscillator.frequency", 20.0, 20_000.0, 440.0),
                ("oscillator.amplitude", 0.0, 1.0, 0.5),
                ("filter.cutoff", 20.0, 20_000.0, 1000.0),
                ("filter.resonance", 0.0, 0.99, 0.1),
                ("envelope.attack", 0.001, 5.0, 0.01),
                ("envelope.decay", 0.001, 5.0, 0.1),
                ("envelope.sustain", 0.0, 1.0, 0.7),
                ("envelope.release", 0.001, 5.0, 0.3),
                ("lfo.rate", 0.01, 20.0, 1.0),
                ("lfo.depth", 0.0, 1.0, 0.5),
            ]),
        };
        RolePolicy {
            role,
            version: POLICY_VERSION,
            ranges,
        }
    }

    pub fn range(&self, key: &str) -> Option<&ParamRange> {
        self.ranges.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ranges.keys().copied()
    }

    /// Fit the policy to a musical context. Faster tempo shortens envelope
    /// times proportionally; the key offset transposes the default
    /// oscillator frequency by semitones.
    pub fn adjusted(&self, ctx: &MusicalContext) -> RolePolicy {
        let mut out = self.clone();
        let tempo_factor = (ctx.tempo / 120.0).clamp(0.25, 4.0);
        for &key in TIME_KEYS {
            if let Some(r) = out.ranges.get_mut(key) {
                r.min = (r.min / tempo_factor).clamp(0.001, 5.0);
                r.max = (r.max / tempo_factor).clamp(0.001, 5.0);
                r.default = (r.default / tempo_factor).clamp(r.min, r.max);
            }
        }
        if ctx.key != 0 {
            if let Some(r) = out.ranges.get_mut("oscillator.frequency") {
                let shifted = r.default * 2f64.powf(ctx.key as f64 / 12.0);
                r.default = shifted.clamp(r.min, r.max);
            }
        }
        out
    }

    /// Report every graph parameter currently outside this policy's range.
    pub fn check(&self, graph: &DspGraph) -> Vec<String> {
        let mut violations = Vec::new();
        for (name, stage) in graph.stages() {
            let type_name = stage.stage_type().name();
            for &pname in stage.parameter_names() {
                let key = format!("{type_name}.{pname}");
                let Some(range) = self.ranges.get(key.as_str()) else {
                    continue;
                };
                if let Ok(ParamValue::Number(v)) = stage.parameter(pname) {
                    if v < range.min || v > range.max {
                        violations.push(format!(
                            "{name}.{pname} = {v:.3} outside {role} range [{:.3}, {:.3}]",
                            range.min,
                            range.max,
                            role = self.role.name()
                        ));
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{Connection, DspGraph, FilterStage, OscillatorStage};

    #[test]
    fn role_names_round_trip_and_default_to_unknown() {
        assert_eq!(Role::from_name("Pad"), Role::Pad);
        assert_eq!(Role::from_name("BASS"), Role::Bass);
        assert_eq!(Role::from_name("kazoo"), Role::Unknown);
    }

    #[test]
    fn every_role_covers_the_same_keys() {
        let reference: Vec<_> = RolePolicy::for_role(Role::Unknown).keys().collect();
        for role in [
            Role::Pad,
            Role::Bass,
            Role::Lead,
            Role::Drum,
            Role::Texture,
            Role::Ambient,
        ] {
            let keys: Vec<_> = RolePolicy::for_role(role).keys().collect();
            assert_eq!(keys, reference, "{} policy keys differ", role.name());
        }
    }

    #[test]
    fn defaults_sit_inside_their_ranges() {
        for role in [Role::Pad, Role::Bass, Role::Lead, Role::Drum] {
            let policy = RolePolicy::for_role(role);
            for key in policy.keys() {
                let r = policy.range(key).unwrap();
                assert!(
                    r.min <= r.default && r.default <= r.max,
                    "{} {key}: default {} outside [{}, {}]",
                    role.name(),
                    r.default,
                    r.min,
                    r.max
                );
            }
        }
    }

    #[test]
    fn bass_keeps_frequencies_low() {
        let policy = RolePolicy::for_role(Role::Bass);
        let r = policy.range("oscillator.frequency").unwrap();
        assert!(r.max <= 250.0, "bass frequency ceiling too high: {}", r.max);
    }

    #[test]
    fn fast_tempo_shortens_envelopes() {
        let policy = RolePolicy::for_role(Role::Pad);
        let ctx = MusicalContext {
            tempo: 240.0,
            ..MusicalContext::default()
        };
        let adjusted = policy.adjusted(&ctx);
        let base = policy.range("envelope.release").unwrap();
        let fit = adjusted.range("envelope.release").unwrap();
        assert!(
            fit.default < base.default,
            "release should shrink at 240 bpm: {} vs {}",
            fit.default,
            base.default
        );
    }

    #[test]
    fn key_offset_transposes_the_default_frequency() {
        let policy = RolePolicy::for_role(Role::Lead);
        let ctx = MusicalContext {
            key: 12,
            ..MusicalContext::default()
        };
        let base = policy.range("oscillator.frequency").unwrap().default;
        let fit = policy.adjusted(&ctx).range("oscillator.frequency").unwrap().default;
        assert!((fit - base * 2.0).abs() < 1e-9, "one octave up: {base} -> {fit}");
    }

    #[test]
    fn check_flags_out_of_range_parameters() {
        let mut g = DspGraph::new();
        g.add_stage("osc1", Box::new(OscillatorStage::new())).unwrap();
        g.add_stage("filter1", Box::new(FilterStage::new())).unwrap();
        g.add_connection(Connection::audio("osc1", "filter1"));
        g.stage_mut("osc1")
            .unwrap()
            .set_parameter("frequency", ParamValue::Number(2000.0))
            .unwrap();

        let policy = RolePolicy::for_role(Role::Bass);
        let violations = policy.check(&g);
        assert!(
            violations.iter().any(|v| v.contains("osc1.frequency")),
            "{violations:?}"
        );
    }
}
