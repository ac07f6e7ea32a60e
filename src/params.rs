use serde::{Deserialize, Serialize};

/// Dynamically tagged parameter value. Stage parameters are either numeric
/// (frequencies, times, gains) or text (waveform and filter type selectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn tag(&self) -> &'static str {
        match self {
            ParamValue::Number(_) => "number",
            ParamValue::Text(_) => "text",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_round_trip() {
        let n: ParamValue = serde_json::from_str("440.0").unwrap();
        assert_eq!(n, ParamValue::Number(440.0));
        let t: ParamValue = serde_json::from_str("\"saw\"").unwrap();
        assert_eq!(t, ParamValue::Text("saw".to_string()));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"saw\"");
    }

    #[test]
    fn accessors_reject_the_other_tag() {
        assert_eq!(ParamValue::from(1.5).as_text(), None);
        assert_eq!(ParamValue::from("sine").as_number(), None);
        assert_eq!(ParamValue::from(1.5).tag(), "number");
    }
}
