use std::fmt;

/// Coarse classification of a failed CloudFront call, used in the
/// reason reported back to CloudFormation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Throttling,
    AccessDenied,
    NoSuchDistribution,
    Other,
}

impl ProviderErrorKind {
    /// classify from the error code CloudFront returned.
    pub fn from_code(code: &str) -> Self {
        match code {
            "Throttling" | "ThrottlingException" | "RequestLimitExceeded" | "TooManyRequestsException" => ProviderErrorKind::Throttling,
            "AccessDenied" | "AccessDeniedException" => ProviderErrorKind::AccessDenied,
            "NoSuchDistribution" => ProviderErrorKind::NoSuchDistribution,
            _ => ProviderErrorKind::Other,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::Throttling => "throttling",
            ProviderErrorKind::AccessDenied => "access denied",
            ProviderErrorKind::NoSuchDistribution => "no such distribution",
            ProviderErrorKind::Other => "provider error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {operation} failed for distribution {distribution_id}: {message}")]
pub struct ProviderError {
    pub operation: &'static str,
    pub distribution_id: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(operation: &'static str, distribution_id: &str, kind: ProviderErrorKind, message: String) -> Self {
        Self {
            operation,
            distribution_id: distribution_id.to_string(),
            kind,
            message,
        }
    }

    /// an error answered by CloudFront itself, with its code and message.
    pub fn service(operation: &'static str, distribution_id: &str, code: &str, message: Option<&str>) -> Self {
        let message = match message {
            Some(m) => format!("{code}: {m}"),
            None => code.to_string(),
        };
        Self::new(operation, distribution_id, ProviderErrorKind::from_code(code), message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors that make the lambda invocation itself fail. Reconciliation
/// failures are not in here: they are reported to CloudFormation as a
/// `FAILED` response instead.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("failed to serialize custom resource response: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to deliver custom resource response: {0}")]
    Delivery(String),
}
