use dmind_auth::{AuthService, NftOwnershipService, SessionClaims};
use dmind_core::{ErrorContext, ErrorHandler};
use dmind_economics::integration::DecentraMindEconomics;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection};

use crate::error::{ApiError, Unauthorized};

/// Services shared by every route
#[derive(Clone)]
pub struct AppState {
    pub economics: DecentraMindEconomics,
    pub auth: Arc<AuthService>,
    pub nft: Arc<NftOwnershipService>,
    pub errors: Arc<ErrorHandler>,
}

impl AppState {
    pub fn new(
        economics: DecentraMindEconomics,
        auth: Arc<AuthService>,
        nft: Arc<NftOwnershipService>,
        errors: Arc<ErrorHandler>,
    ) -> Self {
        AppState { economics, auth, nft, errors }
    }

    /// Verify the bearer token in an `Authorization` header
    pub fn authenticate(&self, authorization: Option<&str>, context: ErrorContext) -> Result<SessionClaims, ApiError> {
        let token = bearer_token(authorization).ok_or_else(|| {
            ApiError::unauthorized(&self.errors, "Authentication failed: missing bearer token", context.clone())
        })?;
        self.auth
            .verify_session(token)
            .map_err(|e| ApiError::from_failure(&self.errors, &e, context))
    }
}

pub(crate) fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

pub(crate) fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Claims of a valid session, or an `Unauthorized` rejection
pub(crate) fn with_session(state: AppState) -> impl Filter<Extract = (SessionClaims,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |authorization: Option<String>| {
        let state = state.clone();
        async move {
            state
                .authenticate(authorization.as_deref(), ErrorContext::action("session"))
                .map_err(|e| warp::reject::custom(Unauthorized(e)))
        }
    })
}
