//! Decision heads: propose candidate parameter assignments inside a role
//! policy's ranges and rank them by semantic affinity to the prompt.

use std::collections::BTreeMap;

use crate::policy::{Role, RolePolicy};
use crate::semantic::{derive_tags, SemanticFusion};

/// Where each candidate sits inside every parameter range, as a fraction of
/// min..max. The first candidate is centered; the rest fan outward.
const PLACEMENTS: &[f64] = &[0.5, 0.3, 0.7, 0.15, 0.85];

fn role_waves(role: Role) -> &'static [&'static str] {
    match role {
        Role::Pad => &["saw", "triangle", "sine"],
        Role::Bass => &["sine", "saw", "square"],
        Role::Lead => &["saw", "square"],
        Role::Drum => &["noise", "square"],
        Role::Texture => &["noise", "triangle", "saw"],
        Role::Ambient => &["sine", "triangle"],
        Role::Unknown => &["sine", "saw", "square", "triangle"],
    }
}

/// One proposed parameter assignment. Numeric values are keyed by the policy
/// convention ("filter.cutoff"); text selectors live in `waves`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub params: BTreeMap<String, f64>,
    pub waves: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub semantic_match: f32,
    /// Mean normalized distance from the policy defaults, in [0, 1].
    pub policy_distance: f64,
}

pub struct DecisionHeads {
    pub top_k: usize,
}

impl DecisionHeads {
    pub fn new() -> Self {
        DecisionHeads { top_k: 3 }
    }

    /// Propose and rank candidates. Ranking is by semantic match, then by
    /// closeness to the policy defaults, then by candidate id, so the result
    /// order is fully deterministic. Fallback warnings from the fusion layer
    /// are surfaced once.
    pub fn propose(
        &self,
        policy: &RolePolicy,
        fusion: &SemanticFusion,
        prompt: &str,
        semantic_enabled: bool,
    ) -> (Vec<Candidate>, Vec<String>) {
        let waves = role_waves(policy.role);
        let mut warnings = Vec::new();
        let mut candidates = Vec::with_capacity(PLACEMENTS.len());

        for (i, &placement) in PLACEMENTS.iter().enumerate() {
            let mut params = BTreeMap::new();
            let mut distance = 0.0;
            let mut counted = 0usize;
            for key in policy.keys() {
                let r = match policy.range(key) {
                    Some(r) => *r,
                    None => continue,
                };
                let span = r.max - r.min;
                let value = r.min + placement * span;
                params.insert(key.to_string(), value);
                if span > 0.0 {
                    let default_pos = (r.default - r.min) / span;
                    distance += (placement - default_pos).abs();
                    counted += 1;
                }
            }
            let policy_distance = if counted > 0 {
                distance / counted as f64
            } else {
                0.0
            };

            let mut wave_map = BTreeMap::new();
            wave_map.insert(
                "oscillator.waveType".to_string(),
                waves[i % waves.len()].to_string(),
            );

            let tags = derive_tags(policy.role, &params, &wave_map);
            let (semantic_match, warning) = fusion.score(prompt, &tags, semantic_enabled);
            if let Some(w) = warning {
                if warnings.is_empty() {
                    warnings.push(w);
                }
            }

            candidates.push(Candidate {
                id: format!("c{i}"),
                params,
                waves: wave_map,
                tags,
                semantic_match,
                policy_distance,
            });
        }

        candidates.sort_by(|a, b| {
            b.semantic_match
                .partial_cmp(&a.semantic_match)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.policy_distance
                        .partial_cmp(&b.policy_distance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.id.cmp(&b.id))
        });
        candidates.truncate(self.top_k.max(1));
        (candidates, warnings)
    }
}

impl Default for DecisionHeads {
    fn default() -> Self {
        DecisionHeads::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_respect_policy_ranges() {
        let heads = DecisionHeads { top_k: 5 };
        let policy = RolePolicy::for_role(Role::Bass);
        let (candidates, _) = heads.propose(&policy, &SemanticFusion::new(), "deep bass", true);
        assert_eq!(candidates.len(), 5);
        for c in &candidates {
            for (key, &v) in &c.params {
                let r = policy.range(key).unwrap();
                assert!(
                    r.min <= v && v <= r.max,
                    "{} {key} = {v} outside [{}, {}]",
                    c.id,
                    r.min,
                    r.max
                );
            }
        }
    }

    #[test]
    fn ranking_prefers_the_semantic_winner() {
        let heads = DecisionHeads { top_k: 5 };
        let policy = RolePolicy::for_role(Role::Pad);
        let (candidates, _) = heads.propose(&policy, &SemanticFusion::new(), "warm analog pad", true);
        let top = &candidates[0];
        for c in &candidates[1..] {
            assert!(
                top.semantic_match >= c.semantic_match,
                "{} ({}) ranked above {} ({})",
                top.id,
                top.semantic_match,
                c.id,
                c.semantic_match
            );
        }
    }

    #[test]
    fn neutral_prompt_ties_break_toward_the_defaults() {
        let heads = DecisionHeads { top_k: 5 };
        let policy = RolePolicy::for_role(Role::Pad);
        let (candidates, _) = heads.propose(&policy, &SemanticFusion::new(), "", false);
        // all scores neutral, so the closest-to-default candidate leads
        for c in &candidates[1..] {
            assert!(
                candidates[0].policy_distance <= c.policy_distance,
                "expected closest-to-default first, got {:?}",
                candidates.iter().map(|c| c.id.clone()).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn top_k_truncates() {
        let heads = DecisionHeads::new();
        let policy = RolePolicy::for_role(Role::Lead);
        let (candidates, _) = heads.propose(&policy, &SemanticFusion::new(), "bright lead", true);
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn proposals_are_deterministic() {
        let heads = DecisionHeads { top_k: 5 };
        let policy = RolePolicy::for_role(Role::Texture);
        let fusion = SemanticFusion::new();
        let (a, _) = heads.propose(&policy, &fusion, "airy texture", true);
        let (b, _) = heads.propose(&policy, &fusion, "airy texture", true);
        let ids_a: Vec<_> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<_> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn fusion_fallback_warns_once() {
        let heads = DecisionHeads { top_k: 5 };
        let policy = RolePolicy::for_role(Role::Pad);
        let (_, warnings) = heads.propose(&policy, &SemanticFusion::disabled(), "warm pad", true);
        assert_eq!(warnings.len(), 1, "{warnings:?}");
    }
}
