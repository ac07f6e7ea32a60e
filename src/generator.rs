//! The generation pipeline: request in, rendered and safety-processed
//! audio out, with a reproducibility trace attached.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::decision::{Candidate, DecisionHeads};
use crate::dsp::{DspGraph, OscillatorStage, Stage, SAMPLE_RATE};
use crate::error::{ConfigError, PresetError};
use crate::moo::{CostEstimate, MooOptimizer, Selection};
use crate::params::ParamValue;
use crate::policy::{MusicalContext, Role, RolePolicy};
use crate::preset::{ConnectionSpec, PresetDoc, StageSpec};
use crate::quality::{QualityAssessor, QualityMetrics};
use crate::render::{encode_wav, AudioRenderer, RenderStats};
use crate::safety::AudioSafety;
use crate::semantic::SemanticFusion;
use crate::monitor::SystemMonitor;

/// Resource and loudness limits a generation must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Fraction of one core the render may consume.
    pub max_cpu: f64,
    /// Wall-clock render budget.
    pub max_latency_ms: f64,
    pub no_hard_clips: bool,
    pub true_peak_limit_db: f64,
    pub lufs_target: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            max_cpu: 1.0,
            max_latency_ms: 10.0,
            no_hard_clips: true,
            true_peak_limit_db: -1.0,
            lufs_target: -18.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub role: Role,
    pub context: MusicalContext,
    pub constraints: Constraints,
    pub use_semantic_search: bool,
    pub apply_policies: bool,
    pub optimize_for_moo: bool,
    /// Explicit seed; derived from the query hash when absent.
    pub seed: Option<u64>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        GenerationRequest {
            prompt: String::new(),
            role: Role::Unknown,
            context: MusicalContext::default(),
            constraints: Constraints::default(),
            use_semantic_search: true,
            apply_policies: true,
            optimize_for_moo: true,
            seed: None,
        }
    }
}

/// Everything needed to reproduce or audit a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub prompt: String,
    pub query_hash: String,
    /// The preset or template the graph came from.
    pub entry_id: String,
    pub policy_version: String,
    pub budget_tier: String,
    /// Always nonzero.
    pub seed: u64,
    pub meters: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub audio: Vec<f32>,
    pub sample_rate: u32,
    pub quality: QualityMetrics,
    pub warnings: Vec<String>,
    pub explanation: String,
    pub trace: Trace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorStatus {
    pub initialized: bool,
    pub active_features: Vec<&'static str>,
    pub loaded_presets: usize,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub total_renders: u64,
}

pub struct AudioGenerator {
    fusion: SemanticFusion,
    heads: DecisionHeads,
    optimizer: MooOptimizer,
    safety: AudioSafety,
    assessor: QualityAssessor,
    renderer: AudioRenderer,
    monitor: SystemMonitor,
    presets: BTreeMap<String, PresetDoc>,
    render_duration_s: f64,
}

fn spec(kind: &str) -> StageSpec {
    StageSpec {
        kind: kind.to_string(),
        parameters: BTreeMap::new(),
    }
}

/// Stock graph for a role: oscillator into filter into envelope, with a
/// cutoff LFO for the evolving roles.
fn role_template(role: Role) -> PresetDoc {
    let mut stages = BTreeMap::new();
    stages.insert("osc1".to_string(), spec("oscillator"));
    stages.insert("filter1".to_string(), spec("filter"));
    stages.insert("env1".to_string(), spec("envelope"));
    let mut connections = vec![
        ConnectionSpec {
            source: "osc1".to_string(),
            destination: "filter1".to_string(),
            parameter: "in".to_string(),
            amount: 1.0,
        },
        ConnectionSpec {
            source: "filter1".to_string(),
            destination: "env1".to_string(),
            parameter: "in".to_string(),
            amount: 1.0,
        },
    ];
    if matches!(role, Role::Pad | Role::Texture | Role::Ambient) {
        stages.insert("lfo1".to_string(), spec("lfo"));
        connections.push(ConnectionSpec {
            source: "lfo1".to_string(),
            destination: "filter1".to_string(),
            parameter: "cutoff".to_string(),
            amount: 0.5,
        });
    }
    PresetDoc { stages, connections }
}

/// Last-resort graph when a preset fails to build: one quiet oscillator.
fn fallback_graph() -> DspGraph {
    let mut g = DspGraph::new();
    let mut osc = OscillatorStage::new();
    let _ = osc.set_parameter("amplitude", ParamValue::Number(0.4));
    let _ = g.add_stage("osc1", Box::new(osc));
    g
}

/// Write every candidate value onto the stages of its keyed type. Stage
/// clamping keeps anything questionable in range.
fn apply_candidate(graph: &mut DspGraph, candidate: &Candidate) {
    let names: Vec<String> = graph
        .stage_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for name in &names {
        let Some(stage) = graph.stage_mut(name) else {
            continue;
        };
        let prefix = format!("{}.", stage.stage_type().name());
        for (key, &value) in &candidate.params {
            if let Some(pname) = key.strip_prefix(&prefix) {
                let _ = stage.set_parameter(pname, ParamValue::Number(value));
            }
        }
        for (key, wave) in &candidate.waves {
            if let Some(pname) = key.strip_prefix(&prefix) {
                let _ = stage.set_parameter(pname, ParamValue::from(wave.clone()));
            }
        }
    }
}

fn budget_tier(max_cpu: f64) -> &'static str {
    if max_cpu < 0.3 {
        "low"
    } else if max_cpu < 0.7 {
        "mid"
    } else {
        "high"
    }
}

impl AudioGenerator {
    pub fn new() -> Self {
        AudioGenerator {
            fusion: SemanticFusion::new(),
            heads: DecisionHeads::new(),
            optimizer: MooOptimizer::new(),
            safety: AudioSafety::new(),
            assessor: QualityAssessor::new(),
            renderer: AudioRenderer::new(),
            monitor: SystemMonitor::new(),
            presets: BTreeMap::new(),
            render_duration_s: 2.0,
        }
    }

    /// Query hash over the full request identity, and the effective seed.
    /// The seed is the hash prefix unless the request pins one; zero is
    /// bumped so "unseeded" never masquerades as a valid seed.
    fn derive_seed(request: &GenerationRequest) -> (String, u64) {
        let mut hasher = Sha256::new();
        hasher.update(request.prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.role.name().as_bytes());
        hasher.update(request.context.tempo.to_le_bytes());
        hasher.update(request.context.key.to_le_bytes());
        hasher.update(request.context.scale.as_bytes());
        let digest = hasher.finalize();
        let query_hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let seed = request.seed.unwrap_or(u64::from_le_bytes(bytes)).max(1);
        (query_hash, seed)
    }

    /// Run the full pipeline. Degrades instead of failing: every recoverable
    /// problem lands in `warnings` and the result always carries a buffer of
    /// the configured duration.
    pub fn generate(&mut self, request: &GenerationRequest) -> GenerationResult {
        let mut warnings = Vec::new();
        let (query_hash, seed) = Self::derive_seed(request);
        info!(
            prompt = %request.prompt,
            role = request.role.name(),
            %query_hash,
            seed,
            "generation started"
        );

        let policy_role = if request.apply_policies {
            request.role
        } else {
            Role::Unknown
        };
        let policy = RolePolicy::for_role(policy_role).adjusted(&request.context);

        let (candidates, head_warnings) = self.heads.propose(
            &policy,
            &self.fusion,
            &request.prompt,
            request.use_semantic_search,
        );
        warnings.extend(head_warnings);

        let duration_ms = self.render_duration_s * 1000.0;
        let total_samples = (self.render_duration_s * SAMPLE_RATE) as usize;

        let (doc, entry_id) = match self.presets.get(request.prompt.trim()) {
            Some(doc) => (doc.clone(), request.prompt.trim().to_string()),
            None => (
                role_template(request.role),
                format!("template:{}", request.role.name()),
            ),
        };
        let stage_count = doc.stages.len();

        let selection = if request.optimize_for_moo {
            self.optimizer.select(
                &candidates,
                &request.constraints,
                stage_count,
                duration_ms,
                seed,
            )
        } else {
            candidates.first().map(|c| Selection {
                candidate: c.clone(),
                estimate: MooOptimizer::estimate(c, stage_count, duration_ms),
                feasible: true,
                warnings: Vec::new(),
            })
        };
        let selection = selection.unwrap_or_else(|| Selection {
            candidate: Candidate {
                id: "c0".to_string(),
                params: BTreeMap::new(),
                waves: BTreeMap::new(),
                tags: Vec::new(),
                semantic_match: 0.5,
                policy_distance: 0.0,
            },
            estimate: CostEstimate {
                cpu: 0.0,
                latency_ms: 0.0,
            },
            feasible: true,
            warnings: Vec::new(),
        });
        warnings.extend(selection.warnings.iter().cloned());

        let mut graph = match doc.build() {
            Ok(g) => g,
            Err(e) => {
                warnings.push(format!("preset build failed ({e}); using fallback oscillator"));
                fallback_graph()
            }
        };
        apply_candidate(&mut graph, &selection.candidate);
        for issue in graph.validate() {
            warnings.push(format!("graph validation: {issue}"));
        }
        if request.apply_policies {
            for violation in policy.check(&graph) {
                warnings.push(format!("policy: {violation}"));
            }
        }

        let mut engine_fault = false;
        let (mut audio, stats) = match self.renderer.render(
            &mut graph,
            total_samples,
            request.constraints.max_latency_ms,
        ) {
            Ok(ok) => ok,
            Err(fault) => {
                engine_fault = true;
                warnings.push(format!("{fault}; returning silence"));
                (
                    vec![0.0; total_samples],
                    RenderStats {
                        render_time_ms: 0.0,
                        blocks: 0,
                        realtime_success: false,
                    },
                )
            }
        };
        self.monitor.record(&stats, request.constraints.max_latency_ms);
        if !engine_fault && !stats.realtime_success {
            warnings.push(format!(
                "render took {:.1} ms, over the {:.1} ms budget",
                stats.render_time_ms, request.constraints.max_latency_ms
            ));
        }

        let report = self.safety.process(&mut audio, &request.constraints);
        warnings.extend(report.warnings.iter().cloned());

        let quality = if engine_fault {
            QualityMetrics {
                overall: 0.0,
                semantic_match: 0.0,
                mix_readiness: 0.0,
                perceptual_quality: 0.0,
                stability: 0.0,
                issues: vec!["render fault, no audio produced".to_string()],
            }
        } else {
            self.assessor.assess(
                &audio,
                request.role,
                &request.constraints,
                selection.candidate.semantic_match,
            )
        };
        warnings.extend(quality.issues.iter().cloned());

        let mut meters = BTreeMap::new();
        meters.insert("lufs".to_string(), report.lufs);
        meters.insert("tp".to_string(), report.true_peak_db);
        meters.insert("gain_db".to_string(), report.gain_db);
        meters.insert("peak_reduction_db".to_string(), report.peak_reduction_db);
        meters.insert("render_ms".to_string(), stats.render_time_ms);
        meters.insert("estimated_cpu".to_string(), selection.estimate.cpu);

        let explanation = format!(
            "'{}' rendered as {} from {}: candidate {} (match {:.2}, est cpu {:.2}, \
             est latency {:.1} ms), {:.1} s at {:.0} Hz, quality {:.2}",
            request.prompt,
            request.role.name(),
            entry_id,
            selection.candidate.id,
            selection.candidate.semantic_match,
            selection.estimate.cpu,
            selection.estimate.latency_ms,
            self.render_duration_s,
            SAMPLE_RATE,
            quality.overall
        );
        info!(quality = quality.overall, warnings = warnings.len(), "generation finished");

        GenerationResult {
            audio,
            sample_rate: SAMPLE_RATE as u32,
            quality,
            warnings,
            explanation,
            trace: Trace {
                prompt: request.prompt.clone(),
                query_hash,
                entry_id,
                policy_version: policy.version.to_string(),
                budget_tier: budget_tier(request.constraints.max_cpu).to_string(),
                seed,
                meters,
            },
        }
    }

    /// Generate and encode as a 16-bit WAV in one step.
    pub fn generate_wav(&mut self, request: &GenerationRequest) -> (Vec<u8>, GenerationResult) {
        let result = self.generate(request);
        let bytes = encode_wav(&result.audio, result.sample_rate);
        (bytes, result)
    }

    /// Register a preset under a name. The document must parse, build, and
    /// validate cleanly; a preset with structural issues is refused.
    pub fn load_preset(&mut self, name: &str, json: &str) -> Result<(), PresetError> {
        let doc = PresetDoc::from_json(json)?;
        let graph = doc.build()?;
        let issues = graph.validate();
        if !issues.is_empty() {
            return Err(PresetError::Validation(issues));
        }
        self.presets.insert(name.to_string(), doc);
        Ok(())
    }

    pub fn available_presets(&self) -> Vec<&str> {
        self.presets.keys().map(|k| k.as_str()).collect()
    }

    pub fn status(&self) -> GeneratorStatus {
        let metrics = self.monitor.metrics();
        GeneratorStatus {
            initialized: true,
            active_features: vec![
                "semantic_fusion",
                "role_policies",
                "moo_optimizer",
                "audio_safety",
            ],
            loaded_presets: self.presets.len(),
            cpu_usage: metrics.cpu_usage,
            memory_usage: metrics.memory_usage,
            total_renders: metrics.total_renders,
        }
    }

    pub fn monitor(&self) -> &SystemMonitor {
        &self.monitor
    }

    /// Apply runtime settings. Unknown keys are logged and skipped so a
    /// newer config file works against an older build; unparseable values
    /// are errors.
    pub fn set_configuration(
        &mut self,
        settings: &BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        for (key, value) in settings {
            let bad = || ConfigError {
                key: key.clone(),
                value: value.clone(),
            };
            match key.as_str() {
                "render.duration_s" => {
                    let v: f64 = value.parse().map_err(|_| bad())?;
                    if !(0.1..=60.0).contains(&v) {
                        return Err(bad());
                    }
                    self.render_duration_s = v;
                }
                "render.block_size" => {
                    let v: usize = value.parse().map_err(|_| bad())?;
                    if v == 0 {
                        return Err(bad());
                    }
                    self.renderer.block_size = v;
                }
                "decision.top_k" => {
                    let v: usize = value.parse().map_err(|_| bad())?;
                    if !(1..=5).contains(&v) {
                        return Err(bad());
                    }
                    self.heads.top_k = v;
                }
                "safety.max_gain_db" => {
                    let v: f64 = value.parse().map_err(|_| bad())?;
                    if !(0.0..=48.0).contains(&v) {
                        return Err(bad());
                    }
                    self.safety.max_gain_db = v;
                }
                "quality.weight.semantic" => {
                    self.assessor.weights.semantic = value.parse().map_err(|_| bad())?;
                }
                "quality.weight.mix" => {
                    self.assessor.weights.mix = value.parse().map_err(|_| bad())?;
                }
                "quality.weight.perceptual" => {
                    self.assessor.weights.perceptual = value.parse().map_err(|_| bad())?;
                }
                "quality.weight.stability" => {
                    self.assessor.weights.stability = value.parse().map_err(|_| bad())?;
                }
                _ => warn!(key = %key, "ignoring unknown configuration key"),
            }
        }
        Ok(())
    }
}

impl Default for AudioGenerator {
    fn default() -> Self {
        AudioGenerator::new()
    }
}
