use std::env;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use kiln_contracts::error::TaskError;
use kiln_contracts::outputs::{self, OutputKind, ParsedOutput};
use kiln_contracts::profiles::{JobProfile, ProfileRegistry, FALLBACK_PROFILE};
use kiln_contracts::task::{JobState, TaskReceipt, TaskRequest};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.piapi.ai/api/v1";
const API_KEY_HEADER: &str = "x-api-key";
const PROVIDER_OK: i64 = 200;

/// Cooperative cancellation for a poll in progress. Cloned freely; all
/// clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sleeps for `duration` unless cancelled first. Returns true when the
    /// wait ended because of cancellation.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*cancelled {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            cancelled = self
                .inner
                .signal
                .wait_timeout(cancelled, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
        true
    }
}

/// Normalized view of one status query, as the poller consumes it.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: String,
    pub output: Option<Value>,
    /// Provider-reported failure detail, when present.
    pub fault: Option<String>,
    pub usage: Option<String>,
}

/// Transport seam between the orchestrator and the remote task service.
pub trait TaskApi: Send + Sync {
    fn create_task(&self, request: &TaskRequest, api_key: &str) -> Result<String, TaskError>;
    fn fetch_status(&self, job_id: &str, api_key: &str) -> Result<StatusSnapshot, TaskError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<WireFault>,
    #[serde(default)]
    meta: Option<WireMeta>,
}

#[derive(Debug, Deserialize)]
struct WireFault {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMeta {
    #[serde(default)]
    usage: Option<Value>,
}

pub struct HttpTaskClient {
    api_base: String,
    http: HttpClient,
}

impl HttpTaskClient {
    pub fn new() -> Self {
        Self::with_base(default_api_base())
    }

    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    fn task_endpoint(&self) -> String {
        format!("{}/task", self.api_base)
    }

    fn status_endpoint(&self, job_id: &str) -> String {
        format!("{}/task/{}", self.api_base, job_id)
    }
}

impl Default for HttpTaskClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskApi for HttpTaskClient {
    fn create_task(&self, request: &TaskRequest, api_key: &str) -> Result<String, TaskError> {
        let endpoint = self.task_endpoint();
        let body = json!({
            "model": request.kind,
            "task_type": request.operation,
            "input": Value::Object(request.input.clone()),
        });
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .map_err(|err| {
                TaskError::transport(None, format!("task submission failed ({endpoint}): {err}"))
            })?;
        let (status, envelope) = read_envelope("task submission", response)?;
        let data = accept_envelope(status, envelope)?;
        let created: CreatedTask = serde_json::from_value(data).map_err(|err| {
            TaskError::transport(
                Some(status),
                format!("task submission response missing task id: {err}"),
            )
        })?;
        Ok(created.task_id)
    }

    fn fetch_status(&self, job_id: &str, api_key: &str) -> Result<StatusSnapshot, TaskError> {
        let endpoint = self.status_endpoint(job_id);
        let response = self
            .http
            .get(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .send()
            .map_err(|err| {
                TaskError::transport(None, format!("status query failed ({endpoint}): {err}"))
            })?;
        let (status, envelope) = read_envelope("status query", response)?;
        let data = accept_envelope(status, envelope)?;
        let wire: WireStatus = serde_json::from_value(data).map_err(|err| {
            TaskError::transport(Some(status), format!("status response malformed: {err}"))
        })?;
        Ok(StatusSnapshot {
            status: wire.status,
            output: wire.output,
            fault: wire
                .error
                .and_then(|fault| fault.message)
                .map(|message| message.trim().to_string())
                .filter(|message| !message.is_empty()),
            usage: wire.meta.and_then(|meta| normalize_usage(meta.usage)),
        })
    }
}

/// Reads the provider envelope out of an HTTP response, preserving status
/// code and body text for diagnostics on every non-success path.
fn read_envelope(context: &str, response: HttpResponse) -> Result<(u16, Envelope), TaskError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        return Err(TaskError::transport(
            Some(code),
            format!(
                "{context} returned HTTP {code}: {}",
                truncate_text(&body, 512)
            ),
        ));
    }
    let envelope = serde_json::from_str(&body).map_err(|err| {
        TaskError::transport(
            Some(code),
            format!("{context} returned unparseable body: {err}"),
        )
    })?;
    Ok((code, envelope))
}

/// Enforces the provider's application-level envelope code and unwraps the
/// data payload.
fn accept_envelope(status: u16, envelope: Envelope) -> Result<Value, TaskError> {
    if envelope.code != PROVIDER_OK {
        let message = if envelope.message.trim().is_empty() {
            "provider returned no detail".to_string()
        } else {
            envelope.message
        };
        return Err(TaskError::ProviderRejected {
            code: envelope.code,
            message,
        });
    }
    envelope
        .data
        .ok_or_else(|| TaskError::transport(Some(status), "provider envelope carried no data"))
}

fn default_api_base() -> String {
    env::var("KILN_API_BASE")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

fn normalize_usage(raw: Option<Value>) -> Option<String> {
    match raw? {
        Value::String(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars).collect();
    format!("{kept}…")
}

/// Keeps only a short prefix of a credential for diagnostics. Never log or
/// embed the raw key.
pub fn redact_credential(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}…")
}

/// Polls `job_id` until a terminal state, the profile's attempt budget, or
/// its wall-clock budget, whichever comes first. Cancellation is honored at
/// the top of every iteration and mid-sleep.
pub fn wait_until_terminal<A: TaskApi + ?Sized>(
    api: &A,
    job_id: &str,
    kind: &str,
    profile: &JobProfile,
    api_key: &str,
    cancel: &CancelToken,
) -> Result<TaskReceipt, TaskError> {
    let started = Instant::now();
    let interval = profile.poll_interval();
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled {
                job_id: job_id.to_string(),
            });
        }

        let snapshot = api.fetch_status(job_id, api_key)?;
        attempts += 1;

        match JobState::parse(&snapshot.status) {
            Some(JobState::Completed) => {
                let elapsed_seconds = started.elapsed().as_secs_f64();
                debug!(job_id, attempts, elapsed_seconds, "job completed");
                return Ok(TaskReceipt {
                    job_id: job_id.to_string(),
                    usage: snapshot.usage,
                    raw_output: snapshot.output.unwrap_or(Value::Null),
                    elapsed_seconds,
                });
            }
            Some(JobState::Failed) => {
                let reason = snapshot
                    .fault
                    .unwrap_or_else(|| "provider reported failure without detail".to_string());
                return Err(TaskError::JobFailed {
                    job_id: job_id.to_string(),
                    reason,
                });
            }
            Some(JobState::Pending) | Some(JobState::Processing) => {
                let elapsed = started.elapsed();
                if attempts >= profile.max_attempts
                    || elapsed.as_secs_f64() >= profile.timeout_seconds as f64
                {
                    return Err(TaskError::JobTimedOut {
                        job_id: job_id.to_string(),
                        kind: kind.to_string(),
                        attempts,
                        elapsed_seconds: elapsed.as_secs_f64(),
                    });
                }
                debug!(job_id, attempts, status = %snapshot.status, "job still in flight");
                if cancel.wait_timeout(interval) {
                    return Err(TaskError::Cancelled {
                        job_id: job_id.to_string(),
                    });
                }
            }
            None => {
                return Err(TaskError::UnknownJobState {
                    job_id: job_id.to_string(),
                    state: snapshot.status,
                });
            }
        }
    }
}

/// Final result of one submit-and-wait call.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub job_id: String,
    pub usage: Option<String>,
    pub elapsed_seconds: f64,
    pub output: ParsedOutput,
}

/// Composition root: profile resolution, submission, polling, validation
/// and extraction for one request. The only entry point callers use.
pub struct Orchestrator<A: TaskApi> {
    api: A,
    profiles: ProfileRegistry,
}

impl Orchestrator<HttpTaskClient> {
    pub fn new() -> Self {
        Self::with_api(HttpTaskClient::new())
    }
}

impl Default for Orchestrator<HttpTaskClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: TaskApi> Orchestrator<A> {
    pub fn with_api(api: A) -> Self {
        Self {
            api,
            profiles: ProfileRegistry::default(),
        }
    }

    pub fn with_profiles(mut self, profiles: ProfileRegistry) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn run(
        &self,
        request: &TaskRequest,
        steps: Option<u32>,
        api_key: &str,
        cancel: &CancelToken,
    ) -> Result<TaskOutcome, TaskError> {
        let profile = match self.profiles.get(&request.kind) {
            Some(profile) => *profile,
            None => {
                warn!(kind = %request.kind, "no profile for job kind, using fallback limits");
                FALLBACK_PROFILE
            }
        };

        let mut input = request.input.clone();
        input.insert(
            "steps".to_string(),
            json!(profile.effective_steps(steps)),
        );
        let outbound = TaskRequest::new(request.kind.clone(), request.operation.clone(), input);

        debug!(
            kind = %request.kind,
            operation = %request.operation,
            key = %redact_credential(api_key),
            "submitting task"
        );
        let job_id = self.api.create_task(&outbound, api_key)?;
        debug!(job_id = %job_id, kind = %request.kind, "task accepted");

        let receipt = wait_until_terminal(
            &self.api,
            &job_id,
            &request.kind,
            &profile,
            api_key,
            cancel,
        )?;

        let category = OutputKind::for_kind(&request.kind);
        let validated = outputs::parse_output(&receipt.job_id, category, &receipt.raw_output)?;
        let output = outputs::extract(&receipt.job_id, validated)?;

        Ok(TaskOutcome {
            job_id: receipt.job_id,
            usage: receipt.usage,
            elapsed_seconds: receipt.elapsed_seconds,
            output,
        })
    }
}
