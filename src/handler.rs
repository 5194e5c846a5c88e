use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::error::HandlerError;
use crate::protocol::{CustomResourceRequest, CustomResourceResponse, ResponseSender};
use crate::provider::{SubscriptionProvider, SubscriptionStatus};
use crate::reconcile::{reconcile, Outcome};

fn response_data(outcome: Outcome) -> Option<Map<String, Value>> {
    let status = match outcome.status()? {
        SubscriptionStatus::Enabled => "Enabled",
        SubscriptionStatus::Disabled | SubscriptionStatus::Absent => "Disabled",
    };
    let mut data = Map::new();
    data.insert("RealtimeMetricsSubscriptionStatus".into(), json!(status));
    Some(data)
}

/// Reconciles one custom resource event and reports the result to CloudFormation.
///
/// Failures to reconcile are sent as a `FAILED` response and are not an error here.
/// Only failing to deliver the response fails the invocation, since CloudFormation
/// would otherwise wait for the custom resource timeout.
pub async fn handle(
    event: CustomResourceRequest,
    log_stream: &str,
    provider: &dyn SubscriptionProvider,
    sender: &dyn ResponseSender,
) -> Result<CustomResourceResponse, HandlerError> {
    info!(
        request_type = ?event.request_type,
        request_id = %event.request_id,
        logical_resource_id = %event.logical_resource_id,
        properties = ?event.resource_properties,
        "received custom resource event"
    );

    let response = match event.to_reconciliation_request() {
        Ok(request) => match reconcile(&request, provider).await {
            Ok(outcome) => {
                info!(?outcome, "reconciled realtime metrics subscription");
                event.success(event.physical_id_for(&request), log_stream, response_data(outcome))
            }
            Err(e) => {
                error!(error = %e, "failed to reconcile realtime metrics subscription");
                event.failure(e.to_string())
            }
        },
        Err(e) => {
            error!(error = %e, "rejecting custom resource event");
            event.failure(e.to_string())
        }
    };

    sender.send(&event.response_url, &response).await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fake::RecordingSender;
    use crate::protocol::ResponseStatus;
    use crate::provider::fake::{Call, FakeProvider};

    const LOG_STREAM: &str = "2026/10/18/[$LATEST]0123";

    fn event(request_type: &str, enabled: &str, physical_id: Option<&str>) -> CustomResourceRequest {
        let mut value = json!({
            "RequestType": request_type,
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:MonitoringSubscriptionLambda",
            "ResponseURL": "https://example.s3.amazonaws.com/signed",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/demo/guid",
            "RequestId": "req-1",
            "LogicalResourceId": "InvokeMonitoringSubscriptionLambda1",
            "ResourceType": "AWS::CloudFormation::CustomResource",
            "ResourceProperties": { "DistributionId": "E1", "RealtimeMetrics": enabled },
        });
        if let Some(id) = physical_id {
            value["PhysicalResourceId"] = json!(id);
        }
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn create_enables_and_reports_success() {
        let provider = FakeProvider::with_status(SubscriptionStatus::Absent);
        let sender = RecordingSender::default();
        let response = handle(event("Create", "true", None), LOG_STREAM, &provider, &sender).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "E1-realtime-metrics-1");
        assert_eq!(response.data.as_ref().unwrap()["RealtimeMetricsSubscriptionStatus"], "Enabled");
        assert_eq!(provider.calls(), vec![Call::Get("E1".into()), Call::Create("E1".into())]);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://example.s3.amazonaws.com/signed");
        assert_eq!(sent[0].1, response);
    }

    #[tokio::test]
    async fn provider_failure_is_reported_not_raised() {
        let provider = FakeProvider::with_status(SubscriptionStatus::Absent)
            .failing("CreateMonitoringSubscription", "Throttling", "Rate exceeded");
        let sender = RecordingSender::default();
        let response = handle(event("Create", "true", None), LOG_STREAM, &provider, &sender).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.reason.as_deref().unwrap().starts_with("throttling"));
        assert_eq!(provider.writes(), 1);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn invalid_properties_fail_without_calls() {
        let provider = FakeProvider::with_status(SubscriptionStatus::Absent);
        let sender = RecordingSender::default();
        let response = handle(event("Create", "maybe", None), LOG_STREAM, &provider, &sender).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.reason.as_deref().unwrap().starts_with("invalid request"));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_keeps_subscription_and_physical_id() {
        let provider = FakeProvider::with_status(SubscriptionStatus::Enabled);
        let sender = RecordingSender::default();
        let response = handle(event("Delete", "true", Some("E1-realtime-metrics-1")), LOG_STREAM, &provider, &sender).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "E1-realtime-metrics-1");
        assert!(response.data.is_none());
        assert!(provider.calls().is_empty());
        assert_eq!(provider.status(), SubscriptionStatus::Enabled);
    }

    #[tokio::test]
    async fn update_to_disabled_deletes_subscription() {
        let provider = FakeProvider::with_status(SubscriptionStatus::Enabled);
        let sender = RecordingSender::default();
        let response = handle(event("Update", "false", Some("E1-realtime-metrics-1")), LOG_STREAM, &provider, &sender).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.physical_resource_id, "E1-realtime-metrics-0");
        assert_eq!(response.data.as_ref().unwrap()["RealtimeMetricsSubscriptionStatus"], "Disabled");
        assert_eq!(provider.calls(), vec![Call::Delete("E1".into())]);
    }

    #[tokio::test]
    async fn undeliverable_response_fails_invocation() {
        let provider = FakeProvider::with_status(SubscriptionStatus::Absent);
        let sender = RecordingSender::failing();
        let err = handle(event("Create", "true", None), LOG_STREAM, &provider, &sender).await.unwrap_err();
        assert!(matches!(err, HandlerError::Delivery(_)));
    }
}
