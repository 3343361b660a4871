/// CLIENT TESTS
///
/// These tests verify:
/// - Commands hit the matching route with the expected body
/// - Error bodies surface as ClientError::Api
/// - Session commands send the bearer token
/// - Staking mutations send the token and fee quotes send their query
/// - Sign-in messages are built locally

#[cfg(test)]
mod client_tests {
    use dmind_cli::*;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use warp::Filter;

    async fn stub_server() -> SocketAddr {
        let burn = warp::path("burn")
            .and(warp::post())
            .and(warp::body::json())
            .map(|body: Value| {
                if body["source"] == "minting" {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"success": true, "burnedAmount": 30.0, "echo": body})),
                        warp::http::StatusCode::CREATED,
                    )
                } else {
                    warp::reply::with_status(
                        warp::reply::json(&json!({
                            "success": false,
                            "error": "Invalid source: nope",
                            "message": "Please check your input and try again."
                        })),
                        warp::http::StatusCode::BAD_REQUEST,
                    )
                }
            });
        let session = warp::path!("auth" / "session")
            .and(warp::header::optional::<String>("authorization"))
            .map(|auth: Option<String>| warp::reply::json(&json!({"authorization": auth})));
        let events = warp::path!("burn" / "events")
            .and(warp::query::<std::collections::HashMap<String, String>>())
            .map(|q: std::collections::HashMap<String, String>| warp::reply::json(&q));

        let stake = warp::path!("staking")
            .and(warp::post())
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::body::json())
            .map(|auth: Option<String>, body: Value| warp::reply::json(&json!({"authorization": auth, "echo": body})));
        let unstake = warp::path!("staking" / "positions" / String / "unstake")
            .and(warp::post())
            .map(|id: String| warp::reply::json(&json!({"positionId": id})));
        let fees = warp::path!("fees" / String)
            .and(warp::query::<std::collections::HashMap<String, String>>())
            .map(|kind: String, q: std::collections::HashMap<String, String>| {
                warp::reply::json(&json!({"kind": kind, "query": q}))
            });

        let routes = burn.or(session).or(events).or(stake).or(unstake).or(fees);
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    fn client(addr: SocketAddr) -> ApiClient {
        ApiClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_burn_record_posts_camel_case_body() {
        let addr = stub_server().await;
        let command = Commands::Burn {
            action: BurnCommand::Record {
                amount: 100.0,
                source: "minting".to_string(),
                user: "W".to_string(),
                agent: Some("agent-1".to_string()),
                tier: None,
                tx_hash: None,
            },
        };
        let value = execute(&command, &client(addr)).await.unwrap();
        assert_eq!(value["burnedAmount"], 30.0);
        assert_eq!(value["echo"]["userId"], "W");
        assert_eq!(value["echo"]["agentId"], "agent-1");
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_error() {
        let addr = stub_server().await;
        let command = Commands::Burn {
            action: BurnCommand::Record {
                amount: 1.0,
                source: "nope".to_string(),
                user: "W".to_string(),
                agent: None,
                tier: None,
                tx_hash: None,
            },
        };
        match execute(&command, &client(addr)).await {
            Err(ClientError::Api { status, error, message }) => {
                assert_eq!(status, 400);
                assert_eq!(error, "Invalid source: nope");
                assert_eq!(message, "Please check your input and try again.");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_sends_bearer_token() {
        let addr = stub_server().await;
        let command = Commands::Auth { action: AuthCommand::Session };
        let api = client(addr).with_token(Some("tok".to_string()));
        let value = execute(&command, &api).await.unwrap();
        assert_eq!(value["authorization"], "Bearer tok");
    }

    #[tokio::test]
    async fn test_stake_posts_position_with_token() {
        let addr = stub_server().await;
        let command = Commands::Staking {
            action: StakingCommand::Stake {
                user: "W".to_string(),
                amount: 150.0,
                lock_days: 30,
                tx_signature: Some("sig".to_string()),
            },
        };
        let api = client(addr).with_token(Some("tok".to_string()));
        let value = execute(&command, &api).await.unwrap();
        assert_eq!(value["authorization"], "Bearer tok");
        assert_eq!(value["echo"]["userId"], "W");
        assert_eq!(value["echo"]["amount"], 150.0);
        assert_eq!(value["echo"]["lockPeriod"], 30);
        assert_eq!(value["echo"]["transactionSignature"], "sig");

        let command = Commands::Staking {
            action: StakingCommand::Unstake { position_id: "pos-1".to_string(), tx_signature: None },
        };
        let value = execute(&command, &client(addr)).await.unwrap();
        assert_eq!(value["positionId"], "pos-1");
    }

    #[tokio::test]
    async fn test_fee_commands_send_query() {
        let addr = stub_server().await;
        let command = Commands::Fees {
            action: FeeCommand::AgentMinting { agent_type: "master".to_string(), level: 3 },
        };
        let value = execute(&command, &client(addr)).await.unwrap();
        assert_eq!(value["kind"], "agent-minting");
        assert_eq!(value["query"], json!({"type": "master", "level": "3"}));

        let command = Commands::Fees {
            action: FeeCommand::Marketplace { price: "12.5".to_string() },
        };
        let value = execute(&command, &client(addr)).await.unwrap();
        assert_eq!(value["query"], json!({"price": "12.5"}));
    }

    #[tokio::test]
    async fn test_sign_in_message_needs_no_daemon() {
        let api = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let command = Commands::Auth { action: AuthCommand::Message { wallet: "W".to_string() } };
        let value = execute(&command, &api).await.unwrap();
        let message = value["message"].as_str().unwrap();
        assert!(message.starts_with("Sign in to DecentraMind\nWallet: W\n"));
        assert!(message.contains("Issued At: "));
    }

    #[tokio::test]
    async fn test_event_filters_become_query() {
        let addr = stub_server().await;
        let command = Commands::Burn {
            action: BurnCommand::Events { user: Some("W".to_string()), source: None },
        };
        let value = execute(&command, &client(addr)).await.unwrap();
        assert_eq!(value, json!({"userId": "W"}));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_network_error() {
        let api = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        assert!(matches!(execute(&Commands::Health, &api).await, Err(ClientError::Network(_))));
    }
}
