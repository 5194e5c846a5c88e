//! Drives a distribution's realtime metrics subscription toward the desired state.
//!
//! Teardown is deliberately asymmetric: a `Delete` event never touches
//! CloudFront. The subscription is an account level setting that may be
//! wanted long after this custom resource is gone, so removing the resource
//! (or the whole stack) leaves it exactly as it is. Turning metrics off is
//! done by deploying with the desired state set to `false`, never by deleting.

use aws_cloudfront_monitoring::identity;
use tracing::info;

use crate::error::ReconcileError;
use crate::provider::{SubscriptionProvider, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationRequest {
    Create {
        distribution_id: String,
        desired: bool,
    },
    Update {
        distribution_id: String,
        desired: bool,
        /// desired state of the previous deployment, if it could be read
        prior_desired: Option<bool>,
    },
    Delete {
        distribution_id: Option<String>,
    },
}

impl ReconciliationRequest {
    /// distribution and desired state for Create/Update, `None` for Delete.
    pub fn target(&self) -> Option<(&str, bool)> {
        match self {
            ReconciliationRequest::Create { distribution_id, desired }
            | ReconciliationRequest::Update { distribution_id, desired, .. } => Some((distribution_id.as_str(), *desired)),
            ReconciliationRequest::Delete { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// a subscription was created
    Enabled,
    /// the subscription was already enabled, nothing was written
    AlreadyEnabled,
    /// the subscription was deleted, or there was none
    Disabled,
    /// delete event, CloudFront was left untouched
    Retained,
}

impl Outcome {
    /// subscription status after reconciling, `None` when we did not look.
    pub fn status(&self) -> Option<SubscriptionStatus> {
        match self {
            Outcome::Enabled | Outcome::AlreadyEnabled => Some(SubscriptionStatus::Enabled),
            Outcome::Disabled => Some(SubscriptionStatus::Disabled),
            Outcome::Retained => None,
        }
    }
}

/// physical resource id reported to CloudFormation on success.
/// stable for the same distribution and desired state.
pub fn physical_resource_id(distribution_id: &str, desired: bool) -> String {
    format!("{distribution_id}-realtime-metrics-{}", identity(desired))
}

pub async fn reconcile(request: &ReconciliationRequest, provider: &dyn SubscriptionProvider) -> Result<Outcome, ReconcileError> {
    let (distribution_id, desired) = match request {
        ReconciliationRequest::Delete { distribution_id } => {
            info!(
                distribution_id = distribution_id.as_deref().unwrap_or("unknown"),
                "delete requested, leaving the monitoring subscription as is"
            );
            return Ok(Outcome::Retained);
        }
        ReconciliationRequest::Create { distribution_id, desired }
        | ReconciliationRequest::Update { distribution_id, desired, .. } => (distribution_id.as_str(), *desired),
    };

    if !desired {
        provider.delete_subscription(distribution_id).await?;
        return Ok(Outcome::Disabled);
    }

    let status = provider.get_subscription_status(distribution_id).await?;
    if status == SubscriptionStatus::Enabled {
        return Ok(Outcome::AlreadyEnabled);
    }
    info!(distribution_id, current = ?status, "enabling realtime metrics subscription");
    provider.create_subscription(distribution_id).await?;
    Ok(Outcome::Enabled)
}
