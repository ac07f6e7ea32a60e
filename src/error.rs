use std::fmt;

/// A stage rejected a parameter access: unknown name, wrong value tag,
/// or a text value outside the stage's closed option set.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterError {
    Unknown {
        stage: &'static str,
        name: String,
    },
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    InvalidValue {
        name: String,
        value: String,
    },
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::Unknown { stage, name } => {
                write!(f, "{stage} stage has no parameter '{name}'")
            }
            ParameterError::TypeMismatch { name, expected, got } => {
                write!(f, "parameter '{name}' expects a {expected} value, got {got}")
            }
            ParameterError::InvalidValue { name, value } => {
                write!(f, "parameter '{name}' does not accept '{value}'")
            }
        }
    }
}

impl std::error::Error for ParameterError {}

/// Graph construction failure (as opposed to the issue list returned by
/// `DspGraph::validate`, which reports on an already-built graph).
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    DuplicateStage(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateStage(name) => {
                write!(f, "a stage named '{name}' already exists in the graph")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Preset document parsing/building failure. Malformed preset text is the
/// one class of error that propagates to the caller as a hard failure.
#[derive(Debug)]
pub enum PresetError {
    Json(serde_json::Error),
    UnknownStageType { stage: String, kind: String },
    Parameter { stage: String, source: ParameterError },
    Graph(GraphError),
    Validation(Vec<String>),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::Json(e) => write!(f, "malformed preset document: {e}"),
            PresetError::UnknownStageType { stage, kind } => {
                write!(f, "stage '{stage}' has unknown type '{kind}'")
            }
            PresetError::Parameter { stage, source } => {
                write!(f, "stage '{stage}': {source}")
            }
            PresetError::Graph(e) => write!(f, "{e}"),
            PresetError::Validation(issues) => {
                write!(f, "preset failed validation: {}", issues.join("; "))
            }
        }
    }
}

impl std::error::Error for PresetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresetError::Json(e) => Some(e),
            PresetError::Parameter { source, .. } => Some(source),
            PresetError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PresetError {
    fn from(e: serde_json::Error) -> Self {
        PresetError::Json(e)
    }
}

impl From<GraphError> for PresetError {
    fn from(e: GraphError) -> Self {
        PresetError::Graph(e)
    }
}

/// A `set_configuration` value that could not be parsed for its key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub key: String,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value '{}' for configuration key '{}'",
            self.value, self.key
        )
    }
}

impl std::error::Error for ConfigError {}

/// Unexpected internal failure during rendering. Never escapes `generate`:
/// the orchestrator converts it into a silent-safe result with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFault {
    pub message: String,
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine fault: {}", self.message)
    }
}

impl std::error::Error for EngineFault {}
