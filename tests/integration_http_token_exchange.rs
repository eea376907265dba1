//! Integration tests for `HttpTokenExchange` against a mock HTTP server
//! (SPEC_FULL.md §A.1 — the GitHub-App-shaped token exchange endpoint).

use chrono::{TimeZone, Utc};
use mockito::Server;
use swarm_operator::credentials::{HttpTokenExchange, TokenExchange};

fn mock_response_body() -> String {
    serde_json::json!({
        "token": "ghs_mockinstallationtoken",
        "expires_at": "2030-01-01T00:00:00Z",
    })
    .to_string()
}

#[tokio::test]
async fn exchange_success_parses_token_and_expiry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/app/installations/123/access_tokens")
        .match_header("authorization", "Bearer test-jwt")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_response_body())
        .create_async()
        .await;

    let exchange = HttpTokenExchange::new(format!(
        "{}/app/installations/123/access_tokens",
        server.url()
    ));
    let repos = vec!["acme/widgets".to_string()];
    let minted = exchange.exchange("test-jwt", &repos).await.unwrap();

    assert_eq!(minted.material, "ghs_mockinstallationtoken");
    assert_eq!(minted.expiry, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn exchange_rejects_non_success_status() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/exchange")
        .with_status(401)
        .with_body(r#"{"message": "Bad credentials"}"#)
        .create_async()
        .await;

    let exchange = HttpTokenExchange::new(format!("{}/exchange", server.url()));
    let result = exchange.exchange("bad-jwt", &["acme/widgets".to_string()]).await;

    assert!(result.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn exchange_sends_requested_repositories_in_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/exchange")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "repositories": ["acme/widgets", "acme/gadgets"],
        })))
        .with_status(200)
        .with_body(mock_response_body())
        .create_async()
        .await;

    let exchange = HttpTokenExchange::new(format!("{}/exchange", server.url()));
    let repos = vec!["acme/widgets".to_string(), "acme/gadgets".to_string()];
    exchange.exchange("test-jwt", &repos).await.unwrap();

    mock.assert_async().await;
}
