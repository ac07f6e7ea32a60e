//! Heuristic quality assessment over the rendered buffer: semantic, mix
//! readiness, perceptual, and stability sub-scores folded into one number.

use serde::{Deserialize, Serialize};

use crate::dsp::SAMPLE_RATE;
use crate::generator::Constraints;
use crate::policy::Role;
use crate::safety::{measure_lufs, measure_true_peak_db, rms};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    pub semantic: f32,
    pub mix: f32,
    pub perceptual: f32,
    pub stability: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        QualityWeights {
            semantic: 0.3,
            mix: 0.25,
            perceptual: 0.25,
            stability: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityMetrics {
    pub overall: f32,
    pub semantic_match: f32,
    pub mix_readiness: f32,
    pub perceptual_quality: f32,
    pub stability: f32,
    pub issues: Vec<String>,
}

pub struct QualityAssessor {
    pub weights: QualityWeights,
}

fn dc_offset(audio: &[f32]) -> f64 {
    if audio.is_empty() {
        return 0.0;
    }
    audio.iter().map(|&s| s as f64).sum::<f64>() / audio.len() as f64
}

/// Crude brightness proxy: zero-crossing rate mapped to a frequency.
fn brightness_hz(audio: &[f32]) -> f64 {
    if audio.len() < 2 {
        return 0.0;
    }
    let crossings = audio
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 * SAMPLE_RATE / (2.0 * audio.len() as f64)
}

/// Peak-to-RMS ratio in dB.
fn crest_factor_db(audio: &[f32]) -> f64 {
    let peak = audio.iter().map(|s| s.abs() as f64).fold(0.0, f64::max);
    let r = rms(audio);
    if r < 1e-10 {
        return 0.0;
    }
    20.0 * (peak / r).log10()
}

/// Expected crest window by role: percussive material rides higher.
fn crest_window(role: Role) -> (f64, f64) {
    match role {
        Role::Drum => (8.0, 20.0),
        Role::Pad | Role::Ambient => (4.0, 12.0),
        _ => (6.0, 14.0),
    }
}

impl QualityAssessor {
    pub fn new() -> Self {
        QualityAssessor {
            weights: QualityWeights::default(),
        }
    }

    pub fn assess(
        &self,
        audio: &[f32],
        role: Role,
        constraints: &Constraints,
        semantic_match: f32,
    ) -> QualityMetrics {
        let mut issues = Vec::new();

        let peak = audio.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let level = rms(audio);
        let dc = dc_offset(audio);

        let mut perceptual = 0.0f32;
        if peak <= 1.0 {
            perceptual += 0.3;
        }
        if dc.abs() < 0.001 {
            perceptual += 0.2;
        }
        if level > 0.001 {
            perceptual += 0.3;
        }
        let bright = brightness_hz(audio);
        if bright > 20.0 && bright < 16_000.0 {
            perceptual += 0.2;
        }

        let mut mix = 0.0f32;
        let lufs_err = (measure_lufs(audio) - constraints.lufs_target).abs();
        if lufs_err < 1.0 {
            mix += 0.3;
        } else if lufs_err < 3.0 {
            mix += 0.2;
        }
        let tp = measure_true_peak_db(audio);
        if tp <= constraints.true_peak_limit_db {
            mix += 0.3;
        } else if tp <= constraints.true_peak_limit_db + 1.0 {
            mix += 0.2;
        }
        let crest = crest_factor_db(audio);
        let (lo, hi) = crest_window(role);
        if crest >= lo && crest <= hi {
            mix += 0.4;
        } else if crest >= 3.0 && crest <= 20.0 {
            mix += 0.2;
        }

        let mut stability = 0.0f32;
        if audio.iter().all(|s| s.is_finite()) {
            stability += 0.4;
        }
        if dc.abs() < 0.001 {
            stability += 0.2;
        }
        let max_jump = audio
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        if max_jump < 0.5 {
            stability += 0.2;
        }
        let variance = level * level;
        if variance > 0.0 && variance < 1.0 {
            stability += 0.2;
        }

        let semantic = semantic_match.clamp(0.0, 1.0);

        let w = &self.weights;
        let total_w = w.semantic + w.mix + w.perceptual + w.stability;
        let mut overall = if total_w > 0.0 {
            (w.semantic * semantic + w.mix * mix + w.perceptual * perceptual
                + w.stability * stability)
                / total_w
        } else {
            0.0
        };

        if level < 1e-6 {
            overall = overall.min(0.2);
            issues.push("buffer is nearly silent".to_string());
        }
        if perceptual < 0.5 {
            issues.push(format!("low perceptual quality ({perceptual:.2})"));
        }
        if mix < 0.5 {
            issues.push(format!("not mix-ready ({mix:.2})"));
        }
        if stability < 0.5 {
            issues.push(format!("unstable signal ({stability:.2})"));
        }

        QualityMetrics {
            overall: overall.clamp(0.0, 1.0),
            semantic_match: semantic,
            mix_readiness: mix,
            perceptual_quality: perceptual,
            stability,
            issues,
        }
    }
}

impl Default for QualityAssessor {
    fn default() -> Self {
        QualityAssessor::new()
    }
}
