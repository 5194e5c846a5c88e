//! CloudFormation custom resource request/response protocol.
//!
//! CloudFormation invokes the lambda with a [`CustomResourceRequest`] and then
//! waits until a [`CustomResourceResponse`] is `PUT` to the pre-signed
//! `ResponseURL` in the request. The lambda's own return value is ignored.

use std::time::Duration;

use async_trait::async_trait;
use aws_cloudfront_monitoring::{DISTRIBUTION_ID_KEY, REALTIME_METRICS_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HandlerError, ReconcileError};
use crate::reconcile::{physical_resource_id, ReconciliationRequest};

/// CloudFormation truncates long reasons anyway and rejects bodies over 4KB.
pub const MAX_REASON_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// Properties are kept as raw json: CloudFormation turns every scalar into a
/// string, so `RealtimeMetrics` usually arrives as `"true"`, not `true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProperties {
    #[serde(rename = "DistributionId", default, skip_serializing_if = "Option::is_none")]
    pub distribution_id: Option<Value>,
    #[serde(rename = "RealtimeMetrics", default, skip_serializing_if = "Option::is_none")]
    pub realtime_metrics: Option<Value>,
}

fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

impl ResourceProperties {
    pub fn parse(&self) -> Result<(String, bool), ReconcileError> {
        let distribution_id = match &self.distribution_id {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            other => {
                return Err(ReconcileError::InvalidRequest(format!(
                    "{DISTRIBUTION_ID_KEY} must be a non-empty string, got {}",
                    describe(other.as_ref())
                )))
            }
        };
        let desired = match self.realtime_metrics.as_ref().and_then(parse_flag) {
            Some(b) => b,
            None => {
                return Err(ReconcileError::InvalidRequest(format!(
                    "{REALTIME_METRICS_KEY} must be true or false, got {}",
                    describe(self.realtime_metrics.as_ref())
                )))
            }
        };
        Ok((distribution_id, desired))
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "nothing".into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceRequest {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    #[serde(default)]
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: ResourceProperties,
    #[serde(default)]
    pub old_resource_properties: Option<ResourceProperties>,
    #[serde(default)]
    pub service_token: String,
}

impl CustomResourceRequest {
    pub fn to_reconciliation_request(&self) -> Result<ReconciliationRequest, ReconcileError> {
        match self.request_type {
            RequestType::Create => {
                let (distribution_id, desired) = self.resource_properties.parse()?;
                Ok(ReconciliationRequest::Create { distribution_id, desired })
            }
            RequestType::Update => {
                let (distribution_id, desired) = self.resource_properties.parse()?;
                let prior_desired = self
                    .old_resource_properties
                    .as_ref()
                    .and_then(|old| old.parse().ok())
                    .map(|(_, prior)| prior);
                Ok(ReconciliationRequest::Update { distribution_id, desired, prior_desired })
            }
            // a delete must succeed even when the properties are garbage,
            // otherwise a stack whose create failed cannot roll back.
            RequestType::Delete => Ok(ReconciliationRequest::Delete {
                distribution_id: self.resource_properties.parse().ok().map(|(d, _)| d),
            }),
        }
    }

    /// physical id to report when the request could not be reconciled.
    fn fallback_physical_id(&self) -> String {
        if let Some(id) = self.physical_resource_id.as_ref().filter(|id| !id.is_empty()) {
            return id.clone();
        }
        match self.resource_properties.parse() {
            Ok((distribution_id, desired)) => physical_resource_id(&distribution_id, desired),
            Err(_) => self.request_id.clone(),
        }
    }

    /// physical id to report once `request` was reconciled.
    pub fn physical_id_for(&self, request: &ReconciliationRequest) -> String {
        match request.target() {
            Some((distribution_id, desired)) => physical_resource_id(distribution_id, desired),
            None => self.fallback_physical_id(),
        }
    }

    fn respond(&self, status: ResponseStatus, physical_resource_id: String, reason: String, data: Option<Map<String, Value>>) -> CustomResourceResponse {
        CustomResourceResponse {
            status,
            reason: Some(truncate_reason(reason)),
            physical_resource_id,
            stack_id: self.stack_id.clone(),
            request_id: self.request_id.clone(),
            logical_resource_id: self.logical_resource_id.clone(),
            no_echo: false,
            data,
        }
    }

    pub fn success(&self, physical_resource_id: String, log_stream: &str, data: Option<Map<String, Value>>) -> CustomResourceResponse {
        let reason = format!("See the details in CloudWatch Log Stream: {log_stream}");
        self.respond(ResponseStatus::Success, physical_resource_id, reason, data)
    }

    pub fn failure(&self, reason: String) -> CustomResourceResponse {
        self.respond(ResponseStatus::Failed, self.fallback_physical_id(), reason, None)
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_REASON_LEN {
        let mut end = MAX_REASON_LEN;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send(&self, response_url: &str, response: &CustomResourceResponse) -> Result<(), HandlerError>;
}

pub struct HttpResponseSender {
    timeout: Duration,
}

/// with two CloudFront calls of at most `OPERATION_TIMEOUT` each, this keeps
/// the whole invocation under the function's 8 second timeout.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

impl Default for HttpResponseSender {
    fn default() -> Self {
        Self { timeout: RESPONSE_TIMEOUT }
    }
}

#[async_trait]
impl ResponseSender for HttpResponseSender {
    async fn send(&self, response_url: &str, response: &CustomResourceResponse) -> Result<(), HandlerError> {
        let body = serde_json::to_string(response)?;
        let url = response_url.to_string();
        let timeout = self.timeout;
        // the pre-signed S3 url is signed without a content type.
        let result = tokio::task::spawn_blocking(move || {
            ureq::put(&url)
                .timeout(timeout)
                .set("content-type", "")
                .send_string(&body)
        })
        .await
        .map_err(|e| HandlerError::Delivery(format!("response task failed: {e}")))?;
        // errors only carry the status/kind: the url holds a signature.
        match result {
            Ok(resp) => {
                debug!(status = resp.status(), "custom resource response delivered");
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => Err(HandlerError::Delivery(format!("response url answered with status {code}"))),
            Err(ureq::Error::Transport(t)) => Err(HandlerError::Delivery(format!("transport error: {}", t.kind()))),
        }
    }
}
