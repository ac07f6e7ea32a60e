//! Semantic fusion: scoring how well a candidate parameter assignment
//! matches the descriptive words of a prompt.
//!
//! The scorer sits behind a trait so an embedding-backed implementation can
//! be dropped in. The built-in scorer is lexical: candidates are described
//! by tags derived from their parameter values, and the score is the share
//! of the prompt's descriptor words those tags cover.

use std::collections::BTreeMap;

use crate::policy::Role;

/// Every descriptor word `derive_tags` can emit. Prompt words outside this
/// vocabulary carry no timbre information and are ignored.
const VOCAB: &[&str] = &[
    "acid", "airy", "ambient", "analog", "atmospheric", "bass", "breathy", "bright", "buzzy",
    "chiptune", "clean", "dark", "deep", "drum", "gentle", "high", "hollow", "lead", "long",
    "mellow", "modulated", "movement", "noisy", "pad", "plucky", "punchy", "pure", "quiet",
    "resonant", "retro", "rich", "slow", "smooth", "soft", "sub", "texture", "warm", "wobbly",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Describe a candidate parameter assignment with timbre words. Keys follow
/// the policy convention ("filter.cutoff"); `waves` holds text selectors
/// ("oscillator.waveType").
pub fn derive_tags(
    role: Role,
    params: &BTreeMap<String, f64>,
    waves: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut tags: Vec<&str> = Vec::new();
    if role != Role::Unknown {
        tags.push(role.name());
    }

    if let Some(&cutoff) = params.get("filter.cutoff") {
        if cutoff < 800.0 {
            tags.extend(["warm", "dark"]);
        } else if cutoff > 2500.0 {
            tags.push("bright");
        }
    }
    if let Some(&freq) = params.get("oscillator.frequency") {
        if freq < 150.0 {
            tags.extend(["deep", "sub"]);
        } else if freq > 1000.0 {
            tags.push("high");
        }
    }
    if let Some(&attack) = params.get("envelope.attack") {
        if attack > 0.15 {
            tags.extend(["slow", "soft"]);
        } else if attack < 0.02 {
            tags.extend(["punchy", "plucky"]);
        }
    }
    if let Some(&release) = params.get("envelope.release") {
        if release > 1.0 {
            tags.extend(["long", "ambient", "atmospheric"]);
        }
    }
    if let Some(&res) = params.get("filter.resonance") {
        if res > 0.5 {
            tags.extend(["resonant", "acid"]);
        }
    }
    if let Some(&depth) = params.get("lfo.depth") {
        if depth > 0.3 {
            tags.extend(["wobbly", "modulated", "movement"]);
        }
    }
    if let Some(&amp) = params.get("oscillator.amplitude") {
        if amp < 0.4 {
            tags.extend(["quiet", "gentle"]);
        }
    }
    match waves.get("oscillator.waveType").map(String::as_str) {
        Some("saw") => tags.extend(["buzzy", "analog", "rich"]),
        Some("square") => tags.extend(["hollow", "retro", "chiptune"]),
        Some("sine") => tags.extend(["pure", "smooth", "clean"]),
        Some("triangle") => tags.extend(["mellow", "soft"]),
        Some("noise") => tags.extend(["noisy", "airy", "breathy"]),
        _ => {}
    }

    tags.sort_unstable();
    tags.dedup();
    tags.into_iter().map(|t| t.to_string()).collect()
}

/// Scores prompt-to-tags affinity in [0, 1].
pub trait SemanticScorer: Send + Sync {
    fn score(&self, prompt: &str, tags: &[String]) -> f32;
}

/// Descriptor-coverage scorer: the fraction of the prompt's in-vocabulary
/// words covered by the candidate's tags. A prompt with no descriptor words
/// scores a neutral 0.5 for every candidate.
pub struct LexicalScorer;

impl SemanticScorer for LexicalScorer {
    fn score(&self, prompt: &str, tags: &[String]) -> f32 {
        let descriptors: Vec<String> = tokenize(prompt)
            .into_iter()
            .filter(|t| VOCAB.binary_search(&t.as_str()).is_ok())
            .collect();
        if descriptors.is_empty() {
            return 0.5;
        }
        let matched = descriptors
            .iter()
            .filter(|d| tags.iter().any(|t| t == *d))
            .count();
        matched as f32 / descriptors.len() as f32
    }
}

/// Owns the active scorer and degrades to a neutral score with a warning
/// when no scorer is available.
pub struct SemanticFusion {
    scorer: Option<Box<dyn SemanticScorer>>,
}

impl SemanticFusion {
    pub fn new() -> Self {
        SemanticFusion {
            scorer: Some(Box::new(LexicalScorer)),
        }
    }

    pub fn disabled() -> Self {
        SemanticFusion { scorer: None }
    }

    pub fn with_scorer(scorer: Box<dyn SemanticScorer>) -> Self {
        SemanticFusion {
            scorer: Some(scorer),
        }
    }

    /// Score a candidate's tags against the prompt. Returns the score and,
    /// when the fusion layer had to fall back, a warning for the caller.
    pub fn score(&self, prompt: &str, tags: &[String], enabled: bool) -> (f32, Option<String>) {
        if !enabled {
            return (
                0.5,
                Some("semantic search disabled; using neutral match".to_string()),
            );
        }
        match &self.scorer {
            Some(scorer) => (scorer.score(prompt, tags).clamp(0.0, 1.0), None),
            None => (
                0.5,
                Some("semantic scoring unavailable; using neutral match".to_string()),
            ),
        }
    }
}

impl Default for SemanticFusion {
    fn default() -> Self {
        SemanticFusion::new()
    }
}
