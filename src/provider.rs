use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_cloudfront::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudfront::types::{MonitoringSubscription, RealtimeMetricsSubscriptionConfig, RealtimeMetricsSubscriptionStatus};
use tracing::debug;

use crate::error::{ProviderError, ProviderErrorKind};

/// Upper bound for a single CloudFront call. Two calls plus the response
/// `PUT` must fit in the function timeout so a `FAILED` response still goes out.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Realtime metrics subscription state of a distribution, as CloudFront reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Enabled,
    Disabled,
    /// no monitoring subscription exists for the distribution
    Absent,
}

/// The three CloudFront calls the reconciler needs. Every call is made at
/// most once per invocation; retrying is up to CloudFormation.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn get_subscription_status(&self, distribution_id: &str) -> Result<SubscriptionStatus, ProviderError>;

    async fn create_subscription(&self, distribution_id: &str) -> Result<(), ProviderError>;

    /// a subscription that does not exist counts as deleted.
    async fn delete_subscription(&self, distribution_id: &str) -> Result<(), ProviderError>;
}

pub struct CloudFrontProvider {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontProvider {
    pub fn new(client: aws_sdk_cloudfront::Client) -> Self {
        Self { client }
    }

    /// credentials and region come from the lambda environment.
    pub async fn from_env() -> Self {
        Self::from_loader(aws_config::from_env()).await
    }

    /// The SDK retries and waits indefinitely by default. Both are turned off
    /// here: each call goes out once and gives up after `OPERATION_TIMEOUT`.
    pub async fn from_loader(loader: aws_config::ConfigLoader) -> Self {
        let shared_config = loader
            .retry_config(RetryConfig::disabled())
            .timeout_config(TimeoutConfig::builder().operation_timeout(OPERATION_TIMEOUT).build())
            .load()
            .await;
        Self::new(aws_sdk_cloudfront::Client::new(&shared_config))
    }
}

fn status_of(subscription: Option<&MonitoringSubscription>) -> SubscriptionStatus {
    let status = subscription
        .and_then(|s| s.realtime_metrics_subscription_config())
        .and_then(|c| c.realtime_metrics_subscription_status());
    match status {
        Some(RealtimeMetricsSubscriptionStatus::Enabled) => SubscriptionStatus::Enabled,
        Some(_) => SubscriptionStatus::Disabled,
        None => SubscriptionStatus::Absent,
    }
}

/// `fallback` is only used when CloudFront sent no error code (timeouts,
/// connection failures), so the reason never carries the raw response.
fn provider_error<E: ProvideErrorMetadata>(operation: &'static str, distribution_id: &str, service_err: &E, fallback: String) -> ProviderError {
    match service_err.code() {
        Some(code) => ProviderError::service(operation, distribution_id, code, service_err.message()),
        None => ProviderError::new(operation, distribution_id, ProviderErrorKind::Other, fallback),
    }
}

#[async_trait]
impl SubscriptionProvider for CloudFrontProvider {
    async fn get_subscription_status(&self, distribution_id: &str) -> Result<SubscriptionStatus, ProviderError> {
        match self.client.get_monitoring_subscription().distribution_id(distribution_id).send().await {
            Ok(out) => Ok(status_of(out.monitoring_subscription())),
            Err(e) => {
                let fallback = format!("{}", DisplayErrorContext(&e));
                let service_err = e.into_service_error();
                if service_err.is_no_such_monitoring_subscription() {
                    return Ok(SubscriptionStatus::Absent);
                }
                Err(provider_error("GetMonitoringSubscription", distribution_id, &service_err, fallback))
            }
        }
    }

    async fn create_subscription(&self, distribution_id: &str) -> Result<(), ProviderError> {
        let config = RealtimeMetricsSubscriptionConfig::builder()
            .realtime_metrics_subscription_status(RealtimeMetricsSubscriptionStatus::Enabled)
            .build();
        let subscription = MonitoringSubscription::builder()
            .realtime_metrics_subscription_config(config)
            .build();
        let result = self.client
            .create_monitoring_subscription()
            .distribution_id(distribution_id)
            .monitoring_subscription(subscription)
            .send()
            .await;
        if let Err(e) = result {
            let fallback = format!("{}", DisplayErrorContext(&e));
            return Err(provider_error("CreateMonitoringSubscription", distribution_id, &e.into_service_error(), fallback));
        }
        Ok(())
    }

    async fn delete_subscription(&self, distribution_id: &str) -> Result<(), ProviderError> {
        match self.client.delete_monitoring_subscription().distribution_id(distribution_id).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let fallback = format!("{}", DisplayErrorContext(&e));
                let service_err = e.into_service_error();
                if service_err.is_no_such_monitoring_subscription() {
                    debug!(distribution_id, "no monitoring subscription to delete");
                    return Ok(());
                }
                Err(provider_error("DeleteMonitoringSubscription", distribution_id, &service_err, fallback))
            }
        }
    }
}
