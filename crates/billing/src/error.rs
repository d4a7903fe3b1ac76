//! Billing error types

use serde::Serialize;
use thiserror::Error;

/// Machine-readable error category callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Configuration,
    Gateway,
    Persistence,
    Conflict,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
            Self::Gateway => write!(f, "gateway"),
            Self::Persistence => write!(f, "persistence"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Seat billing errors
///
/// Every variant is returned to the calling workflow; none of them leave a
/// partially applied change behind.
#[derive(Debug, Error)]
pub enum BillingError {
    /// The request itself is invalid (negative seats, unsupported tier or provider)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider's plan tier or subscription is missing or misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The subscription gateway rejected or failed the update
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// The local store failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The ledger changed underneath the request
    #[error("Concurrent modification detected: {0}")]
    ConcurrentModification(String),
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::ConcurrentModification(_) => ErrorKind::Conflict,
        }
    }

    /// The human-readable message without the category prefix
    pub fn user_message(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::Gateway(msg)
            | Self::Persistence(msg)
            | Self::ConcurrentModification(msg) => msg,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        match &err {
            stripe::StripeError::Stripe(request)
                if request
                    .message
                    .as_deref()
                    .is_some_and(|m| m.contains("tax location")) =>
            {
                BillingError::Gateway(
                    "Your location wasn't recognized. Please ensure your country and postal code are valid."
                        .to_string(),
                )
            }
            _ => BillingError::Gateway(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Persistence(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
