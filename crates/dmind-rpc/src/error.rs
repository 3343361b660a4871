/// API ERRORS
///
/// Every failed request answers `{success: false, error, message}`. Domain
/// errors are routed through the `ErrorHandler`, which logs them and supplies
/// the user-facing `message`. Missing or invalid sessions reject with
/// `Unauthorized`, answered first by `handle_rejection`.

use dmind_auth::AuthError;
use dmind_core::{user_friendly_message, ErrorContext, ErrorHandler};
use dmind_economics::{BurnError, FeeError, StakingError, SubscriptionError};
use dmind_state::StoreError;
use std::convert::Infallible;
use std::fmt::Display;
use thiserror::Error;
use tracing::debug;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::dto::ErrorBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Authentication,
    Forbidden,
    Transaction,
    Network,
}

impl FailureKind {
    pub fn status(&self) -> StatusCode {
        match self {
            FailureKind::Validation => StatusCode::BAD_REQUEST,
            FailureKind::Authentication => StatusCode::UNAUTHORIZED,
            FailureKind::Forbidden => StatusCode::FORBIDDEN,
            FailureKind::Transaction => StatusCode::INTERNAL_SERVER_ERROR,
            FailureKind::Network => StatusCode::BAD_GATEWAY,
        }
    }
}

/// A domain error that can be answered over HTTP
pub trait ApiFailure: Display {
    fn kind(&self) -> FailureKind;
}

impl ApiFailure for StoreError {
    fn kind(&self) -> FailureKind {
        match self {
            StoreError::Network(_) => FailureKind::Network,
            _ => FailureKind::Transaction,
        }
    }
}

impl ApiFailure for BurnError {
    fn kind(&self) -> FailureKind {
        match self {
            BurnError::Store(e) => e.kind(),
            _ => FailureKind::Validation,
        }
    }
}

impl ApiFailure for SubscriptionError {
    fn kind(&self) -> FailureKind {
        match self {
            SubscriptionError::Store(e) => e.kind(),
            _ => FailureKind::Validation,
        }
    }
}

impl ApiFailure for StakingError {
    fn kind(&self) -> FailureKind {
        match self {
            StakingError::Store(e) => e.kind(),
            StakingError::NotOwner(_) => FailureKind::Forbidden,
            _ => FailureKind::Validation,
        }
    }
}

impl ApiFailure for FeeError {
    fn kind(&self) -> FailureKind {
        FailureKind::Validation
    }
}

impl ApiFailure for AuthError {
    fn kind(&self) -> FailureKind {
        match self {
            AuthError::InvalidWalletAddress(_) | AuthError::UnknownRole(_) => FailureKind::Validation,
            AuthError::SessionExpired
            | AuthError::SessionRevoked
            | AuthError::InvalidToken(_)
            | AuthError::InvalidSignature(_)
            | AuthError::SignInExpired
            | AuthError::SignatureReused => FailureKind::Authentication,
            AuthError::Forbidden(_) => FailureKind::Forbidden,
            AuthError::TokenIssue(_) => FailureKind::Transaction,
            AuthError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}", .body.error)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    /// Log `failure` with the handler matching its kind
    pub fn from_failure(handler: &ErrorHandler, failure: &dyn ApiFailure, context: ErrorContext) -> Self {
        let kind = failure.kind();
        let raw = failure.to_string();
        let message = match kind {
            FailureKind::Validation => handler.handle_validation_error(&raw, context),
            FailureKind::Authentication | FailureKind::Forbidden => handler.handle_authentication_error(&raw, context),
            FailureKind::Transaction => handler.handle_transaction_error(&raw, context),
            FailureKind::Network => handler.handle_network_error(&raw, context),
        };
        ApiError {
            status: kind.status(),
            body: ErrorBody::new(raw, message),
        }
    }

    pub fn unauthorized(handler: &ErrorHandler, reason: &str, context: ErrorContext) -> Self {
        let message = handler.handle_authentication_error(&reason, context);
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody::new(reason, message),
        }
    }

    pub fn into_response(self) -> warp::reply::Response {
        warp::reply::with_status(warp::reply::json(&self.body), self.status).into_response()
    }
}

/// Optional body that is present but not valid JSON
#[derive(Debug)]
pub struct BadJson;

impl warp::reject::Reject for BadJson {}

/// Request without a valid session
#[derive(Debug)]
pub struct Unauthorized(pub ApiError);

impl warp::reject::Reject for Unauthorized {}

/// Answer rejected requests (no session, unknown route, bad body) in the
/// same shape
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(Unauthorized(e)) = err.find::<Unauthorized>() {
        return Ok(e.clone().into_response());
    }
    let (status, error) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Validation failed: {}", e))
    } else if err.find::<BadJson>().is_some() {
        (StatusCode::BAD_REQUEST, "Validation failed: body is not valid JSON".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Validation failed: {}", e))
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Validation failed: request body is required".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Validation failed: request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        debug!(rejection = ?err, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };
    let body = ErrorBody::new(error.clone(), user_friendly_message(&error));
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmind_core::Severity;

    #[test]
    fn test_kinds_pick_status_and_severity() {
        let handler = ErrorHandler::new();
        let err = ApiError::from_failure(
            &handler,
            &BurnError::InvalidWalletAddress("x".to_string()),
            ErrorContext::action("burn"),
        );
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.error, "Invalid wallet address format");
        assert_eq!(err.body.message, "Please connect a valid Solana wallet to continue.");

        let err = ApiError::from_failure(&handler, &AuthError::SessionExpired, ErrorContext::action("session"));
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.body.message, "Please reconnect your wallet and try again.");

        let err = ApiError::from_failure(
            &handler,
            &SubscriptionError::Store(StoreError::Network("down".to_string())),
            ErrorContext::action("subscribe"),
        );
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let err = ApiError::from_failure(
            &handler,
            &AuthError::Forbidden("session does not belong to w".to_string()),
            ErrorContext::action("cancel_subscription"),
        );
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        let err = ApiError::from_failure(&handler, &StakingError::NotOwner("p1".to_string()), ErrorContext::action("unstake"));
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        assert_eq!(handler.logs(Some(Severity::Critical)).len(), 3);
        assert_eq!(handler.stats().total, 5);
    }
}
