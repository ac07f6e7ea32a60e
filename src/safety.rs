//! Output safety chain: loudness normalization toward the LUFS target,
//! true-peak limiting, and an optional hard clamp. Meters come out in a
//! report; problems become warnings, never failures.

use tracing::debug;

use crate::generator::Constraints;

/// Loudness gain is never allowed to exceed this either way.
const MAX_GAIN_DB: f64 = 24.0;

/// RMS below this is treated as silence and left untouched.
const SILENCE_RMS: f64 = 1e-9;

pub fn rms(audio: &[f32]) -> f64 {
    if audio.is_empty() {
        return 0.0;
    }
    let sum: f64 = audio.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / audio.len() as f64).sqrt()
}

/// Simplified integrated loudness: RMS level referenced to -23 LUFS at
/// 0 dBFS. No K-weighting; adequate for steering gain toward a target.
pub fn measure_lufs(audio: &[f32]) -> f64 {
    20.0 * rms(audio).max(1e-10).log10() - 23.0
}

fn catmull_rom(x0: f64, x1: f64, x2: f64, x3: f64, t: f64) -> f64 {
    0.5 * ((2.0 * x1)
        + (-x0 + x2) * t
        + (2.0 * x0 - 5.0 * x1 + 4.0 * x2 - x3) * t * t
        + (-x0 + 3.0 * x1 - 3.0 * x2 + x3) * t * t * t)
}

/// True peak in dBTP via 4x cubic-interpolated oversampling, so
/// inter-sample peaks the raw sample maximum misses are caught.
pub fn measure_true_peak_db(audio: &[f32]) -> f64 {
    if audio.is_empty() {
        return -120.0;
    }
    let mut peak = 0.0f64;
    for &s in audio {
        peak = peak.max((s as f64).abs());
    }
    for i in 0..audio.len().saturating_sub(1) {
        let x0 = audio[i.saturating_sub(1)] as f64;
        let x1 = audio[i] as f64;
        let x2 = audio[i + 1] as f64;
        let x3 = audio[(i + 2).min(audio.len() - 1)] as f64;
        for k in 1..4 {
            let t = k as f64 / 4.0;
            peak = peak.max(catmull_rom(x0, x1, x2, x3, t).abs());
        }
    }
    20.0 * peak.max(1e-10).log10()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyReport {
    /// Loudness gain applied, dB.
    pub gain_db: f64,
    /// True-peak reduction applied, dB.
    pub peak_reduction_db: f64,
    pub clamped_samples: usize,
    /// Meters measured after processing.
    pub lufs: f64,
    pub true_peak_db: f64,
    pub warnings: Vec<String>,
}

pub struct AudioSafety {
    pub max_gain_db: f64,
}

impl AudioSafety {
    pub fn new() -> Self {
        AudioSafety {
            max_gain_db: MAX_GAIN_DB,
        }
    }

    pub fn process(&self, audio: &mut [f32], constraints: &Constraints) -> SafetyReport {
        let mut warnings = Vec::new();

        let bad = audio.iter().filter(|s| !s.is_finite()).count();
        if bad > 0 {
            for s in audio.iter_mut() {
                if !s.is_finite() {
                    *s = 0.0;
                }
            }
            warnings.push(format!("replaced {bad} non-finite samples with silence"));
        }

        if rms(audio) < SILENCE_RMS {
            warnings.push("buffer is silent; skipped loudness normalization".to_string());
            return SafetyReport {
                gain_db: 0.0,
                peak_reduction_db: 0.0,
                clamped_samples: 0,
                lufs: measure_lufs(audio),
                true_peak_db: measure_true_peak_db(audio),
                warnings,
            };
        }

        // 1. loudness toward target, gain clamped to a sane window
        let measured = measure_lufs(audio);
        let wanted = constraints.lufs_target - measured;
        let gain_db = wanted.clamp(-self.max_gain_db, self.max_gain_db);
        if (wanted - gain_db).abs() > 1e-9 {
            warnings.push(format!(
                "loudness gain clamped to {gain_db:+.1} dB (wanted {wanted:+.1} dB)"
            ));
        }
        if gain_db.abs() > 0.05 {
            let scale = 10f64.powf(gain_db / 20.0) as f32;
            for s in audio.iter_mut() {
                *s *= scale;
            }
        }
        debug!(measured_lufs = measured, gain_db, "loudness normalization");

        // 2. true-peak limiting
        let mut peak_reduction_db = 0.0;
        let mut true_peak = measure_true_peak_db(audio);
        if true_peak > constraints.true_peak_limit_db {
            peak_reduction_db = true_peak - constraints.true_peak_limit_db;
            let scale = 10f64.powf(-peak_reduction_db / 20.0) as f32;
            for s in audio.iter_mut() {
                *s *= scale;
            }
            warnings.push(format!(
                "reduced true peak by {peak_reduction_db:.1} dB to meet {:.1} dBTP",
                constraints.true_peak_limit_db
            ));
            true_peak = measure_true_peak_db(audio);
        }

        // 3. hard clamp, last line of defense
        let mut clamped_samples = 0;
        if constraints.no_hard_clips {
            for s in audio.iter_mut() {
                if s.abs() > 1.0 {
                    *s = s.clamp(-1.0, 1.0);
                    clamped_samples += 1;
                }
            }
            if clamped_samples > 0 {
                warnings.push(format!("hard-clamped {clamped_samples} samples to [-1, 1]"));
            }
        }

        SafetyReport {
            gain_db,
            peak_reduction_db,
            clamped_samples,
            lufs: measure_lufs(audio),
            true_peak_db: true_peak,
            warnings,
        }
    }
}

impl Default for AudioSafety {
    fn default() -> Self {
        AudioSafety::new()
    }
}
