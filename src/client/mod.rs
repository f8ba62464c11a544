//! HTTP transport for the LMS job endpoints.
//!
//! [`LmsApi`] is the seam the coordinator talks through; [`HttpLmsClient`] is the
//! reqwest implementation. Untyped response envelopes are turned into
//! [`PollResult`] and [`ClientError`] here so the coordinator only sees tagged values.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::models::{Group, GroupId, GroupRequest, JobId, LmsOperation, LmsSelectionRequest, TargetId};

/// Shown when the server gives no usable error message.
pub const GENERIC_FAILURE: &str = "Request failed";

/// Transport or server failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {}", .message.as_deref().unwrap_or(GENERIC_FAILURE))]
    Server { status: u16, message: Option<String> },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Human-readable message for display, from the server payload when present.
    pub fn message(&self) -> String {
        match self {
            ClientError::Server {
                message: Some(message),
                ..
            } => message.clone(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

/// Outcome of a single job status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Job still running, with its current percentage (below 100)
    InProgress(u8),
    /// Job reached 100%, with per-target errors
    Done(Vec<String>),
    /// Server answered but refused to report the job
    Rejected(String),
}

/// Operations the coordinator needs from the LMS job service.
#[async_trait]
pub trait LmsApi: Send + Sync {
    /// Start a bulk job and return its id.
    async fn submit(
        &self,
        operation: LmsOperation,
        group_id: GroupId,
        target_ids: &[TargetId],
    ) -> Result<JobId, ClientError>;

    /// Fetch the status of a job.
    async fn job_status(&self, group_id: GroupId, job_id: &str) -> Result<PollResult, ClientError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawJobStatus {
    progress: i64,
    #[serde(default)]
    errors: Vec<String>,
}

/// reqwest-backed client for the LMS job service.
#[derive(Debug, Clone)]
pub struct HttpLmsClient {
    http: Client,
    base_url: String,
}

impl HttpLmsClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = header::HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| ClientError::Config(e.to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Fetch a group with its targets, e.g. to refresh LMS flags after a job.
    pub async fn get_group(&self, group_id: GroupId) -> Result<Group, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/groups/{}", group_id)))
            .send()
            .await?;
        require_data(read_envelope(response).await?)
    }

    pub async fn create_group(&self, request: &GroupRequest) -> Result<Group, ClientError> {
        let response = self
            .http
            .post(self.url("/groups"))
            .json(request)
            .send()
            .await?;
        require_data(read_envelope(response).await?)
    }
}

#[async_trait]
impl LmsApi for HttpLmsClient {
    async fn submit(
        &self,
        operation: LmsOperation,
        group_id: GroupId,
        target_ids: &[TargetId],
    ) -> Result<JobId, ClientError> {
        let url = self.url(&format!("/groups/{}/lms-accounts", group_id));
        let body = LmsSelectionRequest {
            target_ids: target_ids.to_vec(),
        };

        let request = match operation {
            LmsOperation::Create => self.http.post(url),
            LmsOperation::Delete => self.http.delete(url),
        };

        let response = request.json(&body).send().await?;
        require_data(read_envelope(response).await?)
    }

    async fn job_status(&self, group_id: GroupId, job_id: &str) -> Result<PollResult, ClientError> {
        let url = self.url(&format!("/groups/{}/lms-accounts/jobs/{}", group_id, job_id));
        let response = self.http.get(url).send().await?;
        let envelope: Envelope<RawJobStatus> = read_envelope(response).await?;
        Ok(poll_result(envelope))
    }
}

/// Read a response body, turning non-2xx statuses into [`ClientError::Server`].
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Pull a non-blank `message` field out of an error body.
fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}

fn require_data<T>(envelope: Envelope<T>) -> Result<T, ClientError> {
    match envelope {
        Envelope {
            success: true,
            data: Some(data),
            ..
        } => Ok(data),
        Envelope {
            success: true,
            data: None,
            ..
        } => Err(ClientError::Decode("missing data".to_string())),
        Envelope { message, .. } => Err(ClientError::Server {
            status: 200,
            message: message.filter(|m| !m.trim().is_empty()),
        }),
    }
}

/// Classify a status envelope. Reaching 100% wins over the success flag.
fn poll_result(envelope: Envelope<RawJobStatus>) -> PollResult {
    match envelope.data {
        Some(status) if status.progress >= 100 => PollResult::Done(status.errors),
        Some(status) if envelope.success => PollResult::InProgress(status.progress.clamp(0, 99) as u8),
        _ if envelope.success => PollResult::Rejected("Job status missing from response".to_string()),
        _ => PollResult::Rejected(
            envelope
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Job not found".to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> Envelope<RawJobStatus> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_poll_result_in_progress() {
        let result = poll_result(envelope(
            r#"{"success":true,"data":{"progress":30,"errors":[]}}"#,
        ));
        assert_eq!(result, PollResult::InProgress(30));
    }

    #[test]
    fn test_poll_result_done_with_errors() {
        let result = poll_result(envelope(
            r#"{"success":true,"data":{"progress":100,"errors":["err1"]}}"#,
        ));
        assert_eq!(result, PollResult::Done(vec!["err1".to_string()]));
    }

    #[test]
    fn test_poll_result_clamps_out_of_range() {
        let result = poll_result(envelope(r#"{"success":true,"data":{"progress":-5}}"#));
        assert_eq!(result, PollResult::InProgress(0));

        let result = poll_result(envelope(r#"{"success":true,"data":{"progress":140}}"#));
        assert_eq!(result, PollResult::Done(vec![]));
    }

    #[test]
    fn test_poll_result_rejected_below_100() {
        let result = poll_result(envelope(
            r#"{"success":false,"message":"Wrong job id","data":{"progress":40}}"#,
        ));
        assert_eq!(result, PollResult::Rejected("Wrong job id".to_string()));

        let result = poll_result(envelope(r#"{"success":false}"#));
        assert_eq!(result, PollResult::Rejected("Job not found".to_string()));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(br#"{"message":"Invalid selection"}"#).as_deref(),
            Some("Invalid selection")
        );
        assert_eq!(error_message(br#"{"message":"  "}"#), None);
        assert_eq!(error_message(b"<html>502</html>"), None);
        assert_eq!(error_message(b""), None);
    }

    #[test]
    fn test_client_error_message_fallback() {
        let err = ClientError::Server {
            status: 500,
            message: None,
        };
        assert_eq!(err.message(), GENERIC_FAILURE);
        assert_eq!(ClientError::Decode("x".into()).message(), GENERIC_FAILURE);
    }

    #[test]
    fn test_require_data_success_false() {
        let envelope: Envelope<String> =
            serde_json::from_str(r#"{"success":false,"message":"No users selected"}"#).unwrap();
        let err = require_data(envelope).unwrap_err();
        assert_eq!(err.message(), "No users selected");
    }
}
