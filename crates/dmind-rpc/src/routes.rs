use std::net::SocketAddr;
use tracing::info;
use warp::Filter;

use crate::dto::{
    BurnBody, CreditsBody, EvolutionFeeQuery, EventsQuery, MarketplaceFeeQuery, MintingFeeQuery, StakeBody,
    SubscribeBody, UnstakeBody, WalletSignInBody,
};
use crate::error::{handle_rejection, BadJson};
use crate::handlers;
use crate::state::{with_session, with_state, AppState};

/// Largest accepted JSON body
const MAX_BODY_BYTES: u64 = 64 * 1024;

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn optional_json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Default + Send + 'static,
{
    warp::body::bytes()
        .and_then(|bytes: bytes::Bytes| async move {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(T::default());
            }
            serde_json::from_slice(&bytes).map_err(|_| warp::reject::custom(BadJson))
        })
}

/// All API routes, logged under the `dmind_rpc` target. Mutations on a
/// wallet's burns, subscription or stakes need that wallet's session.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::health);

    let burn = warp::path("burn")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body::<BurnBody>())
        .and(with_state(state.clone()))
        .and_then(handlers::burn);

    let burn_metrics = warp::path!("burn" / "metrics")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::burn_metrics);

    let burn_stats = warp::path!("burn" / "stats")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::burn_stats);

    let burn_events = warp::path!("burn" / "events")
        .and(warp::get())
        .and(warp::query::<EventsQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::burn_events);

    let tiers = warp::path!("subscriptions" / "tiers")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::subscription_tiers);

    let subscription_stats = warp::path!("subscriptions" / "stats")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::subscription_stats);

    let subscribe = warp::path("subscriptions")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body::<SubscribeBody>())
        .and(with_state(state.clone()))
        .and_then(handlers::subscribe);

    let user_subscription = warp::path!("subscriptions" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::user_subscription);

    let use_credits = warp::path!("subscriptions" / String / "credits")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(optional_json_body::<CreditsBody>())
        .and(with_state(state.clone()))
        .and_then(handlers::use_credits);

    let cancel = warp::path!("subscriptions" / String / "cancel")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::cancel_subscription);

    let stake = warp::path("staking")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body::<StakeBody>())
        .and(with_state(state.clone()))
        .and_then(handlers::stake);

    let unstake = warp::path!("staking" / "positions" / String / "unstake")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(optional_json_body::<UnstakeBody>())
        .and(with_state(state.clone()))
        .and_then(handlers::unstake);

    let staking_stats = warp::path!("staking" / String / "stats")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::staking_stats);

    let staking_positions = warp::path!("staking" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::staking_positions);

    let marketplace_fee = warp::path!("fees" / "marketplace")
        .and(warp::get())
        .and(warp::query::<MarketplaceFeeQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::marketplace_fee);

    let minting_fee = warp::path!("fees" / "agent-minting")
        .and(warp::get())
        .and(warp::query::<MintingFeeQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::agent_minting_fee);

    let evolution_fee = warp::path!("fees" / "agent-evolution")
        .and(warp::get())
        .and(warp::query::<EvolutionFeeQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::agent_evolution_fee);

    let roles = warp::path!("roles" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::wallet_role);

    let sign_in = warp::path!("auth" / "wallet")
        .and(warp::post())
        .and(json_body::<WalletSignInBody>())
        .and(with_state(state.clone()))
        .and_then(handlers::wallet_sign_in);

    let session = warp::path!("auth" / "session")
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_state(state.clone()))
        .and_then(handlers::session);

    let sign_out = warp::path!("auth" / "signout")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_state(state.clone()))
        .and_then(handlers::sign_out);

    let market = warp::path!("market" / "prices")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::market_prices);

    let burn_routes = burn.or(burn_metrics).or(burn_stats).or(burn_events);
    let subscription_routes = tiers
        .or(subscription_stats)
        .or(subscribe)
        .or(use_credits)
        .or(cancel)
        .or(user_subscription);
    let staking_routes = stake.or(unstake).or(staking_stats).or(staking_positions);
    let fee_routes = marketplace_fee.or(minting_fee).or(evolution_fee);
    let auth_routes = roles.or(sign_in).or(session).or(sign_out);

    health
        .or(burn_routes)
        .or(subscription_routes)
        .or(staking_routes)
        .or(fee_routes)
        .or(auth_routes)
        .or(market)
        .recover(handle_rejection)
        .with(warp::log("dmind_rpc"))
}

/// Serve the API until the process stops
pub async fn serve(addr: SocketAddr, state: AppState) {
    info!("DecentraMind API listening on http://{}", addr);
    warp::serve(routes(state)).run(addr).await;
}
