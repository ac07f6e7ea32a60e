//! Directed stage graph with deterministic execution order.
//!
//! Stages are kept in insertion order and executed in a topological order
//! derived from the connection list. Validation reports problems as an issue
//! list; `process` tolerates every one of them and still produces a buffer.

use crate::dsp::stage::{Stage, StageType};
use crate::error::GraphError;
use crate::params::ParamValue;

/// A directed edge. When the source is a control-rate stage and `parameter`
/// names a destination parameter, the edge modulates that parameter by the
/// source's block mean scaled by `amount`. Otherwise the edge routes audio,
/// scaled by `amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: String,
    pub destination: String,
    pub parameter: String,
    pub amount: f64,
}

impl Connection {
    pub fn audio(source: &str, destination: &str) -> Self {
        Connection {
            source: source.to_string(),
            destination: destination.to_string(),
            parameter: "in".to_string(),
            amount: 1.0,
        }
    }

    pub fn modulation(source: &str, destination: &str, parameter: &str, amount: f64) -> Self {
        Connection {
            source: source.to_string(),
            destination: destination.to_string(),
            parameter: parameter.to_string(),
            amount,
        }
    }

    fn is_audio_input(&self) -> bool {
        self.parameter.is_empty() || self.parameter == "in"
    }
}

struct Slot {
    name: String,
    stage: Box<dyn Stage>,
}

pub struct DspGraph {
    slots: Vec<Slot>,
    connections: Vec<Connection>,
}

impl std::fmt::Debug for DspGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DspGraph")
            .field(
                "stages",
                &self.slots.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("connections", &self.connections)
            .finish()
    }
}

impl DspGraph {
    pub fn new() -> Self {
        DspGraph {
            slots: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, name: &str, stage: Box<dyn Stage>) -> Result<(), GraphError> {
        if self.index_of(name).is_some() {
            return Err(GraphError::DuplicateStage(name.to_string()));
        }
        self.slots.push(Slot {
            name: name.to_string(),
            stage,
        });
        Ok(())
    }

    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    pub fn stage(&self, name: &str) -> Option<&dyn Stage> {
        self.index_of(name).map(|i| self.slots[i].stage.as_ref())
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut (dyn Stage + 'static)> {
        let i = self.index_of(name)?;
        Some(self.slots[i].stage.as_mut())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn stages(&self) -> impl Iterator<Item = (&str, &dyn Stage)> {
        self.slots.iter().map(|s| (s.name.as_str(), s.stage.as_ref()))
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Product of all oscillator amplitudes, the graph's gross output gain.
    pub fn total_gain(&self) -> f64 {
        let mut gain = 1.0;
        for slot in &self.slots {
            if slot.stage.stage_type() == StageType::Oscillator {
                if let Ok(ParamValue::Number(a)) = slot.stage.parameter("amplitude") {
                    gain *= a;
                }
            }
        }
        gain
    }

    /// Topological execution order over edges whose endpoints both exist.
    /// Ties resolve by insertion order. The flag reports whether a cycle
    /// prevented some stages from being ordered.
    fn execution_order(&self) -> (Vec<usize>, bool) {
        let n = self.slots.len();
        let mut indegree = vec![0usize; n];
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for c in &self.connections {
            if let (Some(s), Some(d)) = (self.index_of(&c.source), self.index_of(&c.destination)) {
                edges.push((s, d));
                indegree[d] += 1;
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];
        loop {
            let mut advanced = false;
            for i in 0..n {
                if !done[i] && indegree[i] == 0 {
                    done[i] = true;
                    order.push(i);
                    for &(s, d) in &edges {
                        if s == i {
                            indegree[d] -= 1;
                        }
                    }
                    advanced = true;
                }
            }
            if !advanced {
                break;
            }
        }
        let cyclic = order.len() < n;
        (order, cyclic)
    }

    /// Structural audit. Problems are reported, never thrown; `process`
    /// remains safe to call on a graph with issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for c in &self.connections {
            if self.index_of(&c.source).is_none() {
                issues.push(format!("connection references missing stage '{}'", c.source));
            }
            if self.index_of(&c.destination).is_none() {
                issues.push(format!(
                    "connection references missing stage '{}'",
                    c.destination
                ));
            }
        }
        let (_, cyclic) = self.execution_order();
        if cyclic {
            issues.push("graph contains a feedback cycle".to_string());
        }
        let gain = self.total_gain();
        let has_osc = self
            .slots
            .iter()
            .any(|s| s.stage.stage_type() == StageType::Oscillator);
        if has_osc && gain >= 1.0 {
            issues.push(format!("total oscillator gain {gain:.2} may be unstable"));
        }
        issues
    }

    /// Process one block through the graph. Output length equals input
    /// length. Stages inside a cycle still run, appended in insertion order
    /// after the orderable stages, so a flawed graph degrades instead of
    /// failing.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.slots.is_empty() {
            return input.to_vec();
        }

        let (mut order, cyclic) = self.execution_order();
        if cyclic {
            for i in 0..self.slots.len() {
                if !order.contains(&i) {
                    order.push(i);
                }
            }
        }

        let mut outputs: Vec<Option<Vec<f32>>> = vec![None; self.slots.len()];
        for &idx in &order {
            let mut audio: Option<Vec<f32>> = None;
            let mut mods: Vec<(String, f64)> = Vec::new();
            for c in &self.connections {
                if self.index_of(&c.destination) != Some(idx) {
                    continue;
                }
                let Some(src) = self.index_of(&c.source) else {
                    continue;
                };
                let Some(src_out) = outputs[src].as_ref() else {
                    continue;
                };
                let control = self.slots[src].stage.stage_type().is_control_rate();
                if control && !c.is_audio_input() {
                    let mean = src_out.iter().map(|&s| s as f64).sum::<f64>()
                        / src_out.len().max(1) as f64;
                    mods.push((c.parameter.clone(), mean * c.amount));
                } else {
                    let buf = audio.get_or_insert_with(|| vec![0.0; input.len()]);
                    for (o, &s) in buf.iter_mut().zip(src_out) {
                        *o += s * c.amount as f32;
                    }
                }
            }

            let audio_in = audio.unwrap_or_else(|| input.to_vec());

            // Modulation shifts the parameter relative to its base value for
            // this block only; the base is restored afterwards.
            let mut restores: Vec<(String, ParamValue)> = Vec::new();
            for (pname, m) in &mods {
                let stage = self.slots[idx].stage.as_mut();
                if let Ok(ParamValue::Number(base)) = stage.parameter(pname) {
                    restores.push((pname.clone(), ParamValue::Number(base)));
                    let _ = stage.set_parameter(pname, ParamValue::Number(base * (1.0 + m)));
                }
            }

            let out = self.slots[idx].stage.process(&audio_in);

            for (pname, v) in restores {
                let _ = self.slots[idx].stage.set_parameter(&pname, v);
            }
            outputs[idx] = Some(out);
        }

        // The graph output mixes every audio sink. LFO sinks are shaping
        // signals with nothing to shape, so they are left out of the mix.
        let mut mix: Option<Vec<f32>> = None;
        let mut sinks = 0usize;
        for i in 0..self.slots.len() {
            let outgoing = self.connections.iter().any(|c| {
                self.index_of(&c.source) == Some(i) && self.index_of(&c.destination).is_some()
            });
            if outgoing || self.slots[i].stage.stage_type() == StageType::Lfo {
                continue;
            }
            if let Some(out) = outputs[i].as_ref() {
                let buf = mix.get_or_insert_with(|| vec![0.0; input.len()]);
                for (o, &s) in buf.iter_mut().zip(out) {
                    *o += s;
                }
                sinks += 1;
            }
        }

        match mix {
            Some(mut buf) => {
                if sinks > 1 {
                    let scale = 1.0 / sinks as f32;
                    for s in &mut buf {
                        *s *= scale;
                    }
                }
                buf
            }
            // every stage feeds another or is an LFO; fall back to the
            // most recently added stage's output
            None => outputs
                .last()
                .and_then(|o| o.clone())
                .unwrap_or_else(|| input.to_vec()),
        }
    }

    /// Return every stage to its initial state without touching parameters.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.stage.reset();
        }
    }
}

impl Default for DspGraph {
    fn default() -> Self {
        DspGraph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::EnvelopeStage;
    use crate::dsp::filter::FilterStage;
    use crate::dsp::lfo::LfoStage;
    use crate::dsp::oscillator::OscillatorStage;

    fn chain() -> DspGraph {
        let mut g = DspGraph::new();
        g.add_stage("osc1", Box::new(OscillatorStage::new())).unwrap();
        g.add_stage("filter1", Box::new(FilterStage::new())).unwrap();
        g.add_connection(Connection::audio("osc1", "filter1"));
        g
    }

    #[test]
    fn debug_output_lists_stage_names() {
        let g = chain();
        let rendered = format!("{g:?}");
        assert!(rendered.contains("osc1"), "{rendered}");
        assert!(rendered.contains("filter1"), "{rendered}");
    }

    #[test]
    fn duplicate_stage_names_are_rejected() {
        let mut g = DspGraph::new();
        g.add_stage("a", Box::new(OscillatorStage::new())).unwrap();
        let err = g.add_stage("a", Box::new(FilterStage::new())).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStage("a".to_string()));
    }

    #[test]
    fn empty_graph_passes_input_through() {
        let mut g = DspGraph::new();
        let input = vec![0.5; 16];
        assert_eq!(g.process(&input), input);
    }

    #[test]
    fn oscillator_chain_produces_signal_from_silence() {
        let mut g = chain();
        let out = g.process(&[0.0; 2048]);
        assert_eq!(out.len(), 2048);
        let energy: f32 = out.iter().map(|s| s * s).sum();
        assert!(energy > 0.0, "chain should synthesize a signal from silence");
    }

    #[test]
    fn clean_chain_validates_without_issues() {
        let g = chain();
        assert!(g.validate().is_empty(), "{:?}", g.validate());
    }

    #[test]
    fn dangling_connection_is_reported_and_survivable() {
        let mut g = chain();
        g.add_connection(Connection::audio("filter1", "ghost"));
        let issues = g.validate();
        assert!(
            issues.iter().any(|i| i.contains("missing stage 'ghost'")),
            "{issues:?}"
        );
        // graph with issues must still produce a full-length buffer
        let out = g.process(&[0.0; 512]);
        assert_eq!(out.len(), 512);
    }

    #[test]
    fn cycle_is_reported_and_survivable() {
        let mut g = chain();
        g.add_connection(Connection::audio("filter1", "osc1"));
        let issues = g.validate();
        assert!(issues.iter().any(|i| i.contains("cycle")), "{issues:?}");
        let out = g.process(&[0.0; 512]);
        assert_eq!(out.len(), 512);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn execution_order_is_stable_across_runs() {
        let mut a = chain();
        let mut b = chain();
        let out_a = a.process(&[0.0; 1024]);
        let out_b = b.process(&[0.0; 1024]);
        assert_eq!(out_a, out_b, "identical graphs should render identically");
    }

    #[test]
    fn lfo_modulation_changes_the_filter_output() {
        let mut plain = chain();
        let mut modulated = chain();
        modulated
            .add_stage("lfo1", Box::new(LfoStage::new()))
            .unwrap();
        modulated.add_connection(Connection::modulation("lfo1", "filter1", "cutoff", 0.9));

        let mut out_plain = Vec::new();
        let mut out_mod = Vec::new();
        for _ in 0..8 {
            out_plain.extend(plain.process(&[0.0; 1024]));
            out_mod.extend(modulated.process(&[0.0; 1024]));
        }
        assert_ne!(out_plain, out_mod, "cutoff modulation should alter the signal");
    }

    #[test]
    fn modulation_restores_the_base_parameter() {
        let mut g = chain();
        g.add_stage("lfo1", Box::new(LfoStage::new())).unwrap();
        g.add_connection(Connection::modulation("lfo1", "filter1", "cutoff", 0.9));
        let base = g.stage("filter1").unwrap().parameter("cutoff").unwrap();
        g.process(&[0.0; 1024]);
        assert_eq!(g.stage("filter1").unwrap().parameter("cutoff").unwrap(), base);
    }

    #[test]
    fn envelope_sink_reaches_the_output() {
        let mut g = chain();
        g.add_stage("env1", Box::new(EnvelopeStage::new())).unwrap();
        g.add_connection(Connection::audio("filter1", "env1"));
        // warm up past the attack segment
        let mut last = Vec::new();
        for _ in 0..16 {
            last = g.process(&[0.0; 1024]);
        }
        let energy: f32 = last.iter().map(|s| s * s).sum();
        assert!(energy > 0.0, "enveloped chain should pass signal once gated open");
    }

    #[test]
    fn gain_issue_fires_for_full_amplitude() {
        let mut g = chain();
        g.stage_mut("osc1")
            .unwrap()
            .set_parameter("amplitude", ParamValue::Number(1.0))
            .unwrap();
        let issues = g.validate();
        assert!(issues.iter().any(|i| i.contains("gain")), "{issues:?}");
    }
}
