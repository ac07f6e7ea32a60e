//! Preset documents: the JSON description of a stage graph.
//!
//! A preset names its stages, gives each a type tag and a parameter map, and
//! lists the connections between them. Parsing a document builds a live
//! `DspGraph`; a live graph serializes back to an equivalent document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dsp::{make_stage, Connection, DspGraph};
use crate::error::PresetError;
use crate::params::ParamValue;

/// Top-level preset document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetDoc {
    pub stages: BTreeMap<String, StageSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage type tag: "oscillator", "filter", "envelope", or "lfo".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub source: String,
    pub destination: String,
    /// Destination parameter for modulation edges; "in" routes audio.
    #[serde(default = "default_parameter")]
    pub parameter: String,
    #[serde(default = "default_amount")]
    pub amount: f64,
}

fn default_parameter() -> String {
    "in".to_string()
}

fn default_amount() -> f64 {
    1.0
}

impl PresetDoc {
    pub fn from_json(text: &str) -> Result<PresetDoc, PresetError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Instantiate the document as a live graph. Unknown stage types and
    /// bad parameter values are hard errors; structural problems (dangling
    /// connections, cycles) are left for `DspGraph::validate` to report.
    pub fn build(&self) -> Result<DspGraph, PresetError> {
        let mut graph = DspGraph::new();
        for (name, spec) in &self.stages {
            let mut stage =
                make_stage(&spec.kind).ok_or_else(|| PresetError::UnknownStageType {
                    stage: name.clone(),
                    kind: spec.kind.clone(),
                })?;
            for (pname, value) in &spec.parameters {
                stage
                    .set_parameter(pname, value.clone())
                    .map_err(|source| PresetError::Parameter {
                        stage: name.clone(),
                        source,
                    })?;
            }
            graph.add_stage(name, stage)?;
        }
        for c in &self.connections {
            graph.add_connection(Connection {
                source: c.source.clone(),
                destination: c.destination.clone(),
                parameter: c.parameter.clone(),
                amount: c.amount,
            });
        }
        Ok(graph)
    }
}

/// Parse preset text and build the graph in one step.
pub fn parse_preset(text: &str) -> Result<DspGraph, PresetError> {
    PresetDoc::from_json(text)?.build()
}

/// Capture a live graph back into a document, current parameter values
/// included.
pub fn serialize_preset(graph: &DspGraph) -> PresetDoc {
    let mut stages = BTreeMap::new();
    for (name, stage) in graph.stages() {
        let mut parameters = BTreeMap::new();
        for &pname in stage.parameter_names() {
            if let Ok(value) = stage.parameter(pname) {
                parameters.insert(pname.to_string(), value);
            }
        }
        stages.insert(
            name.to_string(),
            StageSpec {
                kind: stage.stage_type().name().to_string(),
                parameters,
            },
        );
    }
    let connections = graph
        .connections()
        .iter()
        .map(|c| ConnectionSpec {
            source: c.source.clone(),
            destination: c.destination.clone(),
            parameter: c.parameter.clone(),
            amount: c.amount,
        })
        .collect();
    PresetDoc { stages, connections }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        "stages": {
            "osc1": { "type": "oscillator", "parameters": { "frequency": 220.0, "waveType": "saw" } },
            "filter1": { "type": "filter", "parameters": { "cutoff": 800.0 } }
        },
        "connections": [
            { "source": "osc1", "destination": "filter1" }
        ]
    }"#;

    #[test]
    fn basic_preset_builds_a_working_graph() {
        let mut graph = parse_preset(BASIC).unwrap();
        assert_eq!(graph.stage_names(), vec!["filter1", "osc1"]);
        assert_eq!(
            graph.stage("osc1").unwrap().parameter("frequency").unwrap(),
            ParamValue::Number(220.0)
        );
        let out = graph.process(&[0.0; 1024]);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn unknown_stage_type_is_a_parse_error() {
        let doc = r#"{ "stages": { "fx": { "type": "reverb" } } }"#;
        let err = parse_preset(doc).unwrap_err();
        assert!(
            matches!(err, PresetError::UnknownStageType { ref kind, .. } if kind == "reverb"),
            "{err:?}"
        );
    }

    #[test]
    fn wrong_parameter_tag_is_a_parse_error() {
        let doc = r#"{ "stages": { "osc1": { "type": "oscillator",
            "parameters": { "frequency": "very high" } } } }"#;
        let err = parse_preset(doc).unwrap_err();
        assert!(matches!(err, PresetError::Parameter { .. }), "{err:?}");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_preset("{ not json"), Err(PresetError::Json(_))));
    }

    #[test]
    fn connection_defaults_fill_in() {
        let graph = parse_preset(BASIC).unwrap();
        let c = &graph.connections()[0];
        assert_eq!(c.parameter, "in");
        assert_eq!(c.amount, 1.0);
    }

    #[test]
    fn serialization_round_trips() {
        let graph = parse_preset(BASIC).unwrap();
        let doc = serialize_preset(&graph);
        let rebuilt = doc.build().unwrap();
        assert_eq!(serialize_preset(&rebuilt), doc);
        assert_eq!(
            doc.stages["osc1"].parameters["waveType"],
            ParamValue::from("saw")
        );
    }
}
