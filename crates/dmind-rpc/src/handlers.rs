/// ROUTE HANDLERS
///
/// Each handler calls one service operation and answers JSON. Handlers never
/// reject: failures are converted into an error body here. Mutations take
/// the caller's `SessionClaims` and act only on the session's own wallet.

use chrono::{TimeZone, Utc};
use dmind_auth::{AuthError, SessionClaims, UserRole};
use dmind_core::{is_valid_wallet_address, timestamp, ErrorContext, DAO_TREASURY_ACCOUNT};
use dmind_economics::{fees, AgentKind, BurnEvent, BurnRequest, BurnSource};
use serde::Serialize;
use std::convert::Infallible;
use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use crate::dto::*;
use crate::error::ApiError;
use crate::state::{bearer_token, AppState};

pub type HandlerResult = Result<Response, Infallible>;

fn ok<T: Serialize>(value: &T) -> HandlerResult {
    Ok(warp::reply::json(value).into_response())
}

fn created<T: Serialize>(value: &T) -> HandlerResult {
    Ok(warp::reply::with_status(warp::reply::json(value), StatusCode::CREATED).into_response())
}

fn fail(err: ApiError) -> HandlerResult {
    Ok(err.into_response())
}

pub async fn health() -> HandlerResult {
    ok(&HealthResponse {
        status: "ok".to_string(),
        service: "decentramind".to_string(),
        timestamp: timestamp::now_millis(),
    })
}

/// Own wallet only; the DAO treasury account needs an admin session
fn authorize_account(claims: &SessionClaims, account: &str) -> Result<(), AuthError> {
    if account == DAO_TREASURY_ACCOUNT {
        claims.require_role(UserRole::Admin)
    } else {
        claims.require_subject(account)
    }
}

pub async fn burn(claims: SessionClaims, body: BurnBody, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("burn").with_user(body.user_id.clone());
    if let Err(e) = authorize_account(&claims, &body.user_id) {
        return fail(ApiError::from_failure(&state.errors, &e, context));
    }
    let request = match BurnRequest::try_from(body) {
        Ok(r) => r,
        Err(e) => return fail(ApiError::from_failure(&state.errors, &e, context)),
    };
    match state.economics.burning.burn(request).await {
        Ok(receipt) => created(&receipt),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn burn_metrics(state: AppState) -> HandlerResult {
    match state.economics.burning.metrics().await {
        Ok(metrics) => ok(&metrics),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, ErrorContext::action("burn_metrics"))),
    }
}

pub async fn burn_stats(state: AppState) -> HandlerResult {
    match state.economics.burning.stats().await {
        Ok(stats) => ok(&stats),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, ErrorContext::action("burn_stats"))),
    }
}

pub async fn burn_events(query: EventsQuery, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("burn_events");
    let burning = &state.economics.burning;

    let source = match query.source.as_deref().map(str::parse::<BurnSource>).transpose() {
        Ok(s) => s,
        Err(e) => return fail(ApiError::from_failure(&state.errors, &e, context)),
    };
    let events = match (&query.user_id, source) {
        (Some(user), _) => burning.user_events(user).await,
        (None, Some(source)) => burning.events_by_source(source).await,
        (None, None) => burning.all_events().await,
    };
    match events {
        Ok(events) => {
            let events: Vec<BurnEvent> = events
                .into_iter()
                .filter(|e| source.map_or(true, |s| e.source == s))
                .collect();
            ok(&events)
        }
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn subscription_tiers(state: AppState) -> HandlerResult {
    ok(&state.economics.subscriptions.tiers())
}

pub async fn subscription_stats(state: AppState) -> HandlerResult {
    match state.economics.subscriptions.stats().await {
        Ok(stats) => ok(&stats),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, ErrorContext::action("subscription_stats"))),
    }
}

pub async fn subscribe(claims: SessionClaims, body: SubscribeBody, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("subscribe").with_user(body.user_id.clone());
    if let Err(e) = claims.require_subject(&body.user_id) {
        return fail(ApiError::from_failure(&state.errors, &e, context));
    }
    match state
        .economics
        .subscriptions
        .subscribe(&body.user_id, &body.tier, body.payment_method.as_deref())
        .await
    {
        Ok(result) => created(&result),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn user_subscription(user_id: String, state: AppState) -> HandlerResult {
    match state.economics.subscriptions.user_subscription(&user_id).await {
        Ok(subscription) => ok(&subscription),
        Err(e) => fail(ApiError::from_failure(
            &state.errors,
            &e,
            ErrorContext::action("user_subscription").with_user(user_id),
        )),
    }
}

pub async fn use_credits(user_id: String, claims: SessionClaims, body: CreditsBody, state: AppState) -> HandlerResult {
    let subscriptions = &state.economics.subscriptions;
    let requested = body.requested();
    let context = ErrorContext::action("use_credits").with_user(user_id.clone());
    if let Err(e) = claims.require_subject(&user_id) {
        return fail(ApiError::from_failure(&state.errors, &e, context));
    }

    let used = match subscriptions.use_credits(&user_id, requested).await {
        Ok(used) => used,
        Err(e) => return fail(ApiError::from_failure(&state.errors, &e, context)),
    };
    match subscriptions.user_subscription(&user_id).await {
        Ok(subscription) => ok(&CreditsResponse {
            success: used,
            credits_requested: requested,
            credits_remaining: subscription.map(|s| s.credits_remaining),
        }),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn cancel_subscription(user_id: String, claims: SessionClaims, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("cancel_subscription").with_user(user_id.clone());
    if let Err(e) = claims.require_subject(&user_id) {
        return fail(ApiError::from_failure(&state.errors, &e, context));
    }
    match state.economics.subscriptions.cancel(&user_id).await {
        Ok(success) => ok(&CancelResponse { success }),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn stake(claims: SessionClaims, body: StakeBody, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("stake").with_user(body.user_id.clone());
    if let Err(e) = claims.require_subject(&body.user_id) {
        return fail(ApiError::from_failure(&state.errors, &e, context));
    }
    let amount = match body.amount() {
        Ok(amount) => amount,
        Err(e) => return fail(ApiError::from_failure(&state.errors, &e, context)),
    };
    match state
        .economics
        .staking
        .stake(&body.user_id, amount, body.lock_period, body.transaction_signature.as_deref())
        .await
    {
        Ok(receipt) => created(&receipt),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn staking_positions(user_id: String, state: AppState) -> HandlerResult {
    match state.economics.staking.positions(&user_id).await {
        Ok(positions) => ok(&positions),
        Err(e) => fail(ApiError::from_failure(
            &state.errors,
            &e,
            ErrorContext::action("staking_positions").with_user(user_id),
        )),
    }
}

pub async fn staking_stats(user_id: String, state: AppState) -> HandlerResult {
    match state.economics.staking.stats(&user_id).await {
        Ok(stats) => ok(&stats),
        Err(e) => fail(ApiError::from_failure(
            &state.errors,
            &e,
            ErrorContext::action("staking_stats").with_user(user_id),
        )),
    }
}

/// Unstake a position owned by the session's wallet
pub async fn unstake(position_id: String, claims: SessionClaims, body: UnstakeBody, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("unstake").with_user(claims.sub.clone());
    match state
        .economics
        .staking
        .unstake(&position_id, &claims.sub, body.transaction_signature.as_deref())
        .await
    {
        Ok(receipt) => ok(&receipt),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn marketplace_fee(query: MarketplaceFeeQuery, state: AppState) -> HandlerResult {
    match query.price().and_then(fees::marketplace_quote) {
        Ok(quote) => ok(&quote),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, ErrorContext::action("marketplace_fee"))),
    }
}

pub async fn agent_minting_fee(query: MintingFeeQuery, state: AppState) -> HandlerResult {
    let cost = query
        .agent_type
        .parse::<AgentKind>()
        .and_then(|kind| fees::agent_minting_cost(kind, query.level).map(|cost| (kind, cost)));
    match cost {
        Ok((agent_type, cost)) => ok(&MintingCostResponse {
            agent_type,
            level: query.level,
            cost,
        }),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, ErrorContext::action("agent_minting_fee"))),
    }
}

pub async fn agent_evolution_fee(query: EvolutionFeeQuery, state: AppState) -> HandlerResult {
    match fees::agent_evolution_cost(query.level, query.xp) {
        Ok(cost) => ok(&EvolutionCostResponse {
            level: query.level,
            xp: query.xp,
            cost,
        }),
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, ErrorContext::action("agent_evolution_fee"))),
    }
}

pub async fn wallet_role(wallet: String, state: AppState) -> HandlerResult {
    if !is_valid_wallet_address(&wallet) {
        let err = AuthError::InvalidWalletAddress(wallet.clone());
        return fail(ApiError::from_failure(
            &state.errors,
            &err,
            ErrorContext::action("wallet_role").with_wallet(wallet),
        ));
    }
    let (role, nft_ownership) = state.nft.resolve(&wallet).await;
    let nfts = state.nft.all_role_nfts(&wallet).await;
    ok(&RoleResponse {
        wallet_address: wallet,
        role,
        nft_ownership,
        nfts,
    })
}

pub async fn wallet_sign_in(body: WalletSignInBody, state: AppState) -> HandlerResult {
    match state
        .auth
        .sign_in_with_wallet(&body.wallet_address, &body.message, &body.signature)
        .await
    {
        Ok(session) => ok(&session),
        Err(e) => fail(ApiError::from_failure(
            &state.errors,
            &e,
            ErrorContext::action("wallet_sign_in").with_wallet(body.wallet_address),
        )),
    }
}

pub async fn session(authorization: Option<String>, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("session");
    let claims = match state.authenticate(authorization.as_deref(), context.clone()) {
        Ok(claims) => claims,
        Err(e) => return fail(e),
    };
    match Utc.timestamp_opt(claims.exp, 0).single() {
        Some(expires_at) => ok(&SessionResponse {
            wallet_address: claims.sub,
            role: claims.role,
            expires_at,
        }),
        None => fail(ApiError::from_failure(
            &state.errors,
            &AuthError::InvalidToken(format!("bad expiry {}", claims.exp)),
            context,
        )),
    }
}

pub async fn sign_out(authorization: Option<String>, state: AppState) -> HandlerResult {
    let context = ErrorContext::action("sign_out");
    let token = match bearer_token(authorization.as_deref()) {
        Some(t) => t,
        None => {
            return fail(ApiError::unauthorized(
                &state.errors,
                "Authentication failed: missing bearer token",
                context,
            ))
        }
    };
    match state.auth.sign_out(token) {
        Ok(()) => {
            info!("Session revoked over API");
            ok(&CancelResponse { success: true })
        }
        Err(e) => fail(ApiError::from_failure(&state.errors, &e, context)),
    }
}

pub async fn market_prices(state: AppState) -> HandlerResult {
    ok(&state.economics.market.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_treasury_burns_need_admin() {
        let claims = |sub: &str, role| SessionClaims {
            sub: sub.to_string(),
            role,
            iss: "decentramind".to_string(),
            iat: 0,
            exp: 0,
            jti: "j".to_string(),
        };
        let wallet = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
        assert!(authorize_account(&claims(wallet, UserRole::Guest), wallet).is_ok());
        assert!(authorize_account(&claims(wallet, UserRole::Provider), DAO_TREASURY_ACCOUNT).is_err());
        assert!(authorize_account(&claims(wallet, UserRole::Admin), DAO_TREASURY_ACCOUNT).is_ok());
        assert!(authorize_account(&claims(wallet, UserRole::Admin), "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU").is_err());
    }
}
