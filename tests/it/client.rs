use crate::{config, wallet_address, TX_HASH};
use ethers_core::types::{Address, U256};
use ethers_relay::{ContentSubmission, ErrorKind, RelayClient, RelayError};
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn fetches_nonce() {
    let server = MockServer::start_async().await;
    let address = wallet_address();
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/nonce/{address:?}"));
            then.status(200).json_body(json!({ "nonce": 7 }));
        })
        .await;

    let client = RelayClient::new(&config(&server)).unwrap();
    assert_eq!(client.get_nonce(address).await.unwrap(), U256::from(7u64));
    mock.assert_async().await;
}

#[tokio::test]
async fn unknown_address_is_not_nonce_zero() {
    let server = MockServer::start_async().await;
    let address = wallet_address();
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/nonce/{address:?}"));
            then.status(404).json_body(json!({ "detail": "Nonce not found" }));
        })
        .await;

    let client = RelayClient::new(&config(&server)).unwrap();
    let err = client.get_nonce(address).await.unwrap_err();
    assert!(matches!(err, RelayError::NonceNotFound(a) if a == address));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn error_without_detail_uses_status_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(500).body("upstream exploded");
        })
        .await;

    let client = RelayClient::new(&config(&server)).unwrap();
    match client.get_nonce(wallet_address()).await.unwrap_err() {
        RelayError::BackendRejection { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "Internal Server Error");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let client = RelayClient::new(&config(&server)).unwrap();
    let err = client.get_nonce(wallet_address()).await.unwrap_err();
    assert!(matches!(err, RelayError::Decode(_)));
}

#[tokio::test]
async fn add_publisher_posts_json() {
    let server = MockServer::start_async().await;
    let owner = wallet_address();
    let publisher: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/add-publisher")
                .json_body(json!({
                    "owner_address": format!("{owner:?}"),
                    "publisher_address": format!("{publisher:?}"),
                    "signature": "0xabcd",
                }));
            then.status(200).json_body(json!({ "txHash": TX_HASH }));
        })
        .await;

    let client = RelayClient::new(&config(&server)).unwrap();
    let result = client.add_publisher(owner, publisher, "0xabcd").await.unwrap();
    assert_eq!(result.tx_hash, TX_HASH.parse().unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn register_content_posts_multipart_form() {
    let server = MockServer::start_async().await;
    let publisher = wallet_address();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/register-content")
                .header_exists("content-type")
                .body_contains("name=\"publisher_address\"")
                .body_contains(format!("{publisher:?}"))
                .body_contains("name=\"p_hash\"")
                .body_contains("c3d2f1e0a9b8c7d6")
                .body_contains("name=\"title\"")
                .body_contains("Sunset over the harbour")
                .body_contains("name=\"description\"")
                .body_contains("name=\"signature\"")
                .body_contains("0xabcd");
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;

    let content = ContentSubmission {
        p_hash: "c3d2f1e0a9b8c7d6".to_string(),
        title: "Sunset over the harbour".to_string(),
        description: "Shot on film".to_string(),
    };
    let client = RelayClient::new(&config(&server)).unwrap();
    let result = client.register_content(publisher, &content, "0xabcd").await.unwrap();
    assert_eq!(result.tx_hash, TX_HASH.parse().unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn publisher_status() {
    let server = MockServer::start_async().await;
    let address = wallet_address();
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/publisher/{address:?}"));
            then.status(200).json_body(json!({ "is_authorized": true }));
        })
        .await;

    let client = RelayClient::new(&config(&server)).unwrap();
    assert!(client.publisher_status(address).await.unwrap().is_authorized);
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(200).delay(Duration::from_secs(2)).json_body(json!({ "nonce": 1 }));
        })
        .await;

    let http = reqwest::Client::builder().timeout(Duration::from_millis(200)).build().unwrap();
    let client = RelayClient::with_client(http, config(&server).backend_url);
    let err = client.get_nonce(wallet_address()).await.unwrap_err();
    assert!(matches!(&err, RelayError::Network(e) if e.is_timeout()));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let server = MockServer::start_async().await;
    let mut config = config(&server);
    config.backend_url = "http://127.0.0.1:1/".parse().unwrap();

    let client = RelayClient::new(&config).unwrap();
    let err = client.get_nonce(wallet_address()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
