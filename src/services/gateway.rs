use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::config::{ApiSettings, Settings};
use crate::schemas::exam::{
    AnswerEntry, ExamDefinitionResponse, StartAttemptResponse, SubmitAcknowledgement,
    SubmitAnswersRequest, WireId,
};
use crate::schemas::extract_error_message;
use crate::services::retry::RetryPolicy;
use crate::session::model::{ExamDefinition, ExamId};

const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub(crate) const GATEWAY_REQUESTS: &str = "gateway_requests_total";
pub(crate) const GATEWAY_LATENCY: &str = "gateway_request_duration_seconds";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Outside the exam window. Carries the server's text verbatim.
    #[error("{0}")]
    TimeWindow(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("backend unavailable: {0}")]
    Transient(String),
    #[error("backend rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::TimeWindow(_) => "time_window",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::Transient(_) => "transient",
            GatewayError::Rejected { .. } => "rejected",
            GatewayError::InvalidResponse(_) => "invalid_response",
        }
    }

    fn from_status(status: StatusCode, detail: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => GatewayError::Unauthorized(detail),
            StatusCode::FORBIDDEN => GatewayError::TimeWindow(detail),
            StatusCode::NOT_FOUND => GatewayError::NotFound(detail),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                GatewayError::Transient(format!("{status}: {detail}"))
            }
            status if status.is_server_error() => {
                GatewayError::Transient(format!("{status}: {detail}"))
            }
            status => GatewayError::Rejected { status: status.as_u16(), detail },
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Transient(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedAttempt {
    pub submission_id: WireId,
    pub expires_at: Option<OffsetDateTime>,
}

impl From<StartAttemptResponse> for StartedAttempt {
    fn from(response: StartAttemptResponse) -> Self {
        Self { submission_id: response.submission_id, expires_at: response.expires_at }
    }
}

/// Boundary to the exam backend.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn fetch_definition(&self, exam_id: &ExamId) -> Result<ExamDefinition, GatewayError>;

    async fn start_attempt(&self, exam_id: &ExamId) -> Result<StartedAttempt, GatewayError>;

    /// Sent once. Implementations must not retry it.
    async fn submit_answers(
        &self,
        exam_id: &ExamId,
        submission_id: &WireId,
        answers: &[AnswerEntry],
    ) -> Result<SubmitAcknowledgement, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct HttpSubmissionGateway {
    client: Client,
    api: ApiSettings,
    retry: RetryPolicy,
}

impl HttpSubmissionGateway {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.api().connect_timeout_seconds))
            .timeout(Duration::from_secs(settings.api().timeout_seconds))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            client,
            api: settings.api().clone(),
            retry: RetryPolicy::from_settings(settings.retry()),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.api.endpoint(path))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        match &self.api.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends one request and decodes a successful body as `T`.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let body = self.send(operation, request).await?;
        let value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<Value>(&body).map_err(|err| {
                GatewayError::InvalidResponse(format!("{operation} returned a non-JSON body: {err}"))
            })?
        };
        serde_json::from_value(value).map_err(|err| {
            GatewayError::InvalidResponse(format!("{operation} response did not decode: {err}"))
        })
    }

    /// Sends one request and returns the raw body of a 2xx response.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<String, GatewayError> {
        let started = Instant::now();
        let result = self.send_inner(request).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        metrics::counter!(GATEWAY_REQUESTS, "operation" => operation, "status" => status)
            .increment(1);
        metrics::histogram!(GATEWAY_LATENCY, "operation" => operation)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => tracing::debug!(operation, "backend call succeeded"),
            Err(err) => tracing::warn!(operation, kind = err.kind(), error = %err, "backend call failed"),
        }
        result
    }

    async fn send_inner(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = request.send().await.map_err(GatewayError::from_transport)?;
        let status = response.status();
        let raw_body = response.text().await.map_err(GatewayError::from_transport)?;

        if status.is_success() {
            return Ok(raw_body);
        }

        let detail = if raw_body.trim().is_empty() {
            status.canonical_reason().unwrap_or("unknown_error").to_string()
        } else {
            match serde_json::from_str::<Value>(&raw_body) {
                Ok(value) => extract_error_message(&value),
                Err(_) => raw_body.trim().to_string(),
            }
        };
        Err(GatewayError::from_status(status, detail))
    }
}

/// A 2xx submit means the backend stored the answers, so the body is read
/// on a best-effort basis and never turns the call into a failure.
fn read_acknowledgement(body: &str) -> SubmitAcknowledgement {
    let text = body.trim();
    if text.is_empty() {
        return SubmitAcknowledgement::default();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "submit acknowledgement did not decode");
            SubmitAcknowledgement::default()
        }),
        Err(_) => SubmitAcknowledgement { detail: Some(text.to_string()), submission_id: None },
    }
}

#[async_trait]
impl SubmissionGateway for HttpSubmissionGateway {
    async fn fetch_definition(&self, exam_id: &ExamId) -> Result<ExamDefinition, GatewayError> {
        let path = format!("exams/{exam_id}");
        let response: ExamDefinitionResponse = self
            .retry
            .run("fetch_definition", || {
                self.execute("fetch_definition", self.request(Method::GET, &path))
            })
            .await?;

        ExamDefinition::try_from(response)
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))
    }

    async fn start_attempt(&self, exam_id: &ExamId) -> Result<StartedAttempt, GatewayError> {
        let path = format!("exams/{exam_id}/start");
        let response: StartAttemptResponse = self
            .retry
            .run("start_attempt", || self.execute("start_attempt", self.request(Method::POST, &path)))
            .await?;
        Ok(response.into())
    }

    async fn submit_answers(
        &self,
        exam_id: &ExamId,
        submission_id: &WireId,
        answers: &[AnswerEntry],
    ) -> Result<SubmitAcknowledgement, GatewayError> {
        let path = format!("exams/{exam_id}/submit");
        let payload = SubmitAnswersRequest { submission_id, answers };
        let request = self.request(Method::POST, &path).json(&payload);

        let body = self.send("submit_answers", request).await?;
        Ok(read_acknowledgement(&body))
    }
}
