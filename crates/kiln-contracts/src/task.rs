use serde_json::{Map, Value};

/// One remote generation request. Immutable once built; the engine derives
/// an outbound copy rather than mutating it.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Job profile identifier, sent to the provider as the model field.
    pub kind: String,
    /// Sub-type within the kind, e.g. "generate" or "edit".
    pub operation: String,
    /// Opaque payload meaningful only to the remote provider.
    pub input: Map<String, Value>,
}

impl TaskRequest {
    pub fn new(
        kind: impl Into<String>,
        operation: impl Into<String>,
        input: Map<String, Value>,
    ) -> Self {
        Self {
            kind: kind.into(),
            operation: operation.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Maps the provider's status string. Anything unrecognized is `None`
    /// so contract drift surfaces as an error instead of a guess.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Raw result of a completed job, handed straight to a validator.
#[derive(Debug, Clone)]
pub struct TaskReceipt {
    pub job_id: String,
    /// Opaque usage/cost counter echoed from the provider.
    pub usage: Option<String>,
    pub raw_output: Value,
    /// Wall-clock time from poll-loop entry to the terminal status.
    pub elapsed_seconds: f64,
}
