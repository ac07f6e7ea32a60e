//! Multi-objective candidate selection: provisional quality versus
//! estimated cost under the request's resource constraints.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::decision::Candidate;
use crate::generator::Constraints;

/// Scores within this margin count as tied and fall to the seeded
/// tie-breaker.
const TIE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    /// Estimated fraction of one core consumed while rendering.
    pub cpu: f64,
    /// Estimated wall-clock render time for the requested duration.
    pub latency_ms: f64,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub candidate: Candidate,
    pub estimate: CostEstimate,
    pub feasible: bool,
    pub warnings: Vec<String>,
}

pub struct MooOptimizer;

impl MooOptimizer {
    pub fn new() -> Self {
        MooOptimizer
    }

    /// Cost model: a fixed price per stage plus surcharges for the settings
    /// that dominate render time (wide-open filters, high resonance, deep
    /// modulation).
    pub fn estimate(candidate: &Candidate, stage_count: usize, duration_ms: f64) -> CostEstimate {
        let mut cpu = 0.07 * stage_count as f64;
        if let Some(&cutoff) = candidate.params.get("filter.cutoff") {
            cpu += (cutoff / 20_000.0) * 0.12;
        }
        if let Some(&resonance) = candidate.params.get("filter.resonance") {
            cpu += resonance * 0.08;
        }
        if let Some(&depth) = candidate.params.get("lfo.depth") {
            cpu += depth * 0.05;
        }
        let latency_ms = duration_ms * cpu / 100.0;
        CostEstimate { cpu, latency_ms }
    }

    /// Provisional quality before any audio exists: semantic affinity
    /// blended with closeness to the role defaults.
    fn provisional_quality(candidate: &Candidate) -> f64 {
        0.6 * candidate.semantic_match as f64 + 0.4 * (1.0 - candidate.policy_distance)
    }

    /// Pick the best candidate under the constraints. When every candidate
    /// violates them, the least-violating one is selected and a warning is
    /// attached instead of failing the request. Quality ties are broken by
    /// the seeded RNG so repeated runs with the same seed agree.
    pub fn select(
        &self,
        candidates: &[Candidate],
        constraints: &Constraints,
        stage_count: usize,
        duration_ms: f64,
        seed: u64,
    ) -> Option<Selection> {
        if candidates.is_empty() {
            return None;
        }

        let scored: Vec<(usize, CostEstimate, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let est = Self::estimate(c, stage_count, duration_ms);
                (i, est, Self::provisional_quality(c))
            })
            .collect();

        let feasible: Vec<&(usize, CostEstimate, f64)> = scored
            .iter()
            .filter(|(_, est, _)| {
                est.cpu <= constraints.max_cpu && est.latency_ms <= constraints.max_latency_ms
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);

        if !feasible.is_empty() {
            let best_q = feasible
                .iter()
                .map(|(_, _, q)| *q)
                .fold(f64::MIN, f64::max);
            let tied: Vec<_> = feasible
                .iter()
                .filter(|(_, _, q)| (best_q - q).abs() < TIE_EPSILON)
                .collect();
            let pick = tied[rng.gen_range(0..tied.len())];
            let (i, estimate, quality) = **pick;
            debug!(
                candidate = %candidates[i].id,
                quality,
                cpu = estimate.cpu,
                latency_ms = estimate.latency_ms,
                "selected feasible candidate"
            );
            return Some(Selection {
                candidate: candidates[i].clone(),
                estimate,
                feasible: true,
                warnings: Vec::new(),
            });
        }

        // Min-max fallback: minimize the worst relative constraint
        // violation, preferring higher quality on ties.
        let violation = |est: &CostEstimate| -> f64 {
            let cpu_v = (est.cpu - constraints.max_cpu) / constraints.max_cpu.max(1e-9);
            let lat_v =
                (est.latency_ms - constraints.max_latency_ms) / constraints.max_latency_ms.max(1e-9);
            cpu_v.max(lat_v).max(0.0)
        };
        let mut best = &scored[0];
        for entry in &scored[1..] {
            let (v_new, v_best) = (violation(&entry.1), violation(&best.1));
            if v_new < v_best - TIE_EPSILON
                || ((v_new - v_best).abs() < TIE_EPSILON && entry.2 > best.2)
            {
                best = entry;
            }
        }
        let (i, estimate, _) = *best;
        let warning = format!(
            "no candidate satisfies maxCPU={:.2} / maxLatency={:.1} ms; \
             selected least-violating '{}' (cpu {:.2}, latency {:.1} ms)",
            constraints.max_cpu,
            constraints.max_latency_ms,
            candidates[i].id,
            estimate.cpu,
            estimate.latency_ms
        );
        debug!(candidate = %candidates[i].id, "constraint fallback: {warning}");
        Some(Selection {
            candidate: candidates[i].clone(),
            estimate,
            feasible: false,
            warnings: vec![warning],
        })
    }
}

impl Default for MooOptimizer {
    fn default() -> Self {
        MooOptimizer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionHeads;
    use crate::policy::{Role, RolePolicy};
    use crate::semantic::SemanticFusion;

    fn candidates(role: Role, prompt: &str) -> Vec<Candidate> {
        let heads = DecisionHeads { top_k: 5 };
        let (c, _) = heads.propose(
            &RolePolicy::for_role(role),
            &SemanticFusion::new(),
            prompt,
            true,
        );
        c
    }

    #[test]
    fn relaxed_constraints_select_without_warnings() {
        let opt = MooOptimizer::new();
        let selection = opt
            .select(
                &candidates(Role::Pad, "warm analog pad"),
                &Constraints::default(),
                4,
                2000.0,
                7,
            )
            .unwrap();
        assert!(selection.feasible);
        assert!(selection.warnings.is_empty(), "{:?}", selection.warnings);
    }

    #[test]
    fn impossible_cpu_budget_falls_back_with_a_warning() {
        let opt = MooOptimizer::new();
        let constraints = Constraints {
            max_cpu: 0.1,
            ..Constraints::default()
        };
        let selection = opt
            .select(
                &candidates(Role::Pad, "warm pad"),
                &constraints,
                4,
                2000.0,
                7,
            )
            .unwrap();
        assert!(!selection.feasible, "0.1 cpu cannot fit a four-stage graph");
        assert_eq!(selection.warnings.len(), 1);
        assert!(selection.warnings[0].contains("least-violating"), "{:?}", selection.warnings);
    }

    #[test]
    fn same_seed_selects_the_same_candidate() {
        let opt = MooOptimizer::new();
        let cands = candidates(Role::Unknown, "");
        let a = opt.select(&cands, &Constraints::default(), 3, 2000.0, 42).unwrap();
        let b = opt.select(&cands, &Constraints::default(), 3, 2000.0, 42).unwrap();
        assert_eq!(a.candidate.id, b.candidate.id);
    }

    #[test]
    fn more_stages_cost_more_cpu() {
        let cands = candidates(Role::Bass, "deep bass");
        let small = MooOptimizer::estimate(&cands[0], 2, 2000.0);
        let large = MooOptimizer::estimate(&cands[0], 6, 2000.0);
        assert!(large.cpu > small.cpu);
        assert!(large.latency_ms > small.latency_ms);
    }

    #[test]
    fn empty_candidate_list_yields_none() {
        let opt = MooOptimizer::new();
        assert!(opt.select(&[], &Constraints::default(), 3, 2000.0, 1).is_none());
    }
}
