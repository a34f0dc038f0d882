use thiserror::Error;

/// Failure taxonomy for one orchestration call.
///
/// Every variant is terminal for the call that produced it; nothing in the
/// engine retries internally. Callers decide whether to resubmit.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The HTTP exchange itself could not be completed, returned a
    /// non-success status, or produced a body the envelope decoder could
    /// not make sense of.
    #[error("transport error: {detail}")]
    Transport {
        status: Option<u16>,
        detail: String,
    },

    /// The exchange succeeded but the provider's envelope reported a
    /// non-success application code.
    #[error("provider rejected request (code {code}): {message}")]
    ProviderRejected { code: i64, message: String },

    /// The provider declared the job permanently unsuccessful.
    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// Attempt or wall-clock budget exhausted while the job was still
    /// non-terminal.
    #[error("job {job_id} ({kind}) timed out after {attempts} status queries over {elapsed_seconds:.1}s")]
    JobTimedOut {
        job_id: String,
        kind: String,
        attempts: u32,
        elapsed_seconds: f64,
    },

    /// The provider returned a status string outside its documented set.
    #[error("job {job_id} reported unknown state '{state}'")]
    UnknownJobState { job_id: String, state: String },

    /// The job completed but its payload does not match the declared shape.
    #[error("job {job_id} output failed validation: {violation}")]
    Validation { job_id: String, violation: String },

    /// The payload validated but carried no usable resource.
    #[error("job {job_id} completed without a usable resource")]
    NoResourceFound { job_id: String },

    /// The caller abandoned the request while the poll was in flight.
    #[error("job {job_id} cancelled while polling")]
    Cancelled { job_id: String },
}

impl TaskError {
    pub fn transport(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Transport {
            status,
            detail: detail.into(),
        }
    }

    pub fn validation(job_id: &str, violation: impl Into<String>) -> Self {
        Self::Validation {
            job_id: job_id.to_string(),
            violation: violation.into(),
        }
    }

    /// The job id this failure is attached to, when one was known.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Transport { .. } | Self::ProviderRejected { .. } => None,
            Self::JobFailed { job_id, .. }
            | Self::JobTimedOut { job_id, .. }
            | Self::UnknownJobState { job_id, .. }
            | Self::Validation { job_id, .. }
            | Self::NoResourceFound { job_id }
            | Self::Cancelled { job_id } => Some(job_id),
        }
    }
}
