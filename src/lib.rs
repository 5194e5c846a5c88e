//! Lambda backing the `AWS::CloudFormation::CustomResource` that toggles the
//! CloudFront realtime metrics subscription of a distribution.
//!
//! The resources that deploy and invoke it are declared by the
//! `aws_cloudfront_monitoring` crate.

pub mod error;
pub mod handler;
pub mod protocol;
pub mod provider;
pub mod reconcile;

pub use error::{HandlerError, ProviderError, ProviderErrorKind, ReconcileError};
pub use handler::handle;
pub use protocol::{CustomResourceRequest, CustomResourceResponse, HttpResponseSender, ResponseSender};
pub use provider::{CloudFrontProvider, SubscriptionProvider, SubscriptionStatus};
pub use reconcile::{reconcile, Outcome, ReconciliationRequest};
