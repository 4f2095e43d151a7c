use crate::{config, wallet, wallet_address, CHAIN_ID, TX_HASH};
use async_trait::async_trait;
use ethers_core::{
    abi::Token,
    types::{Address, Signature, U256},
};
use ethers_relay::{
    roles::{IS_PUBLISHER_SIGNATURE, OWNER_SIGNATURE},
    ChainReader, ErrorKind, FlowState, FlowStep, ForwardRequest, ForwardRequestPayload,
    GaslessFlow, NonceSource, PrivilegedAction, RelayConfig, RelayError, Role, RoleResolver,
    RoleState, Session, SigningProvider, TypedDataSigner,
};
use httpmock::prelude::*;
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::watch;

fn add_publisher() -> PrivilegedAction {
    PrivilegedAction::AddPublisher {
        publisher: "0x00000000000000000000000000000000000000aa".parse().unwrap(),
    }
}

fn register_content() -> PrivilegedAction {
    PrivilegedAction::RegisterContent {
        p_hash: "c3d2f1e0a9b8c7d6".to_string(),
        title: "Sunset over the harbour".to_string(),
        description: "Shot on film".to_string(),
    }
}

/// Signature the flow is expected to produce for `action` at `nonce`
async fn expected_signature(config: &RelayConfig, action: &PrivilegedAction, nonce: u64) -> String {
    let request =
        ForwardRequest::builder(wallet_address(), config.registry, action.encode().unwrap(), nonce)
            .gas(config.gas_limit)
            .build();
    let signer = TypedDataSigner::new(wallet(), config.domain());
    signer.sign(request).await.unwrap().signature_hex()
}

fn session() -> Session {
    Session::connected(wallet_address(), CHAIN_ID)
}

fn failure(state: FlowState) -> (FlowStep, ErrorKind, String) {
    match state {
        FlowState::Failed { at, kind, message } => (at, kind, message),
        other => panic!("expected a failed flow, got {other:?}"),
    }
}

#[tokio::test]
async fn add_publisher_is_relayed() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let from = wallet_address();
    let signature = expected_signature(&config, &add_publisher(), 7).await;

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/nonce/{from:?}"));
            then.status(200).json_body(json!({ "nonce": 7 }));
        })
        .await;
    let relay = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher").json_body(json!({
                "owner_address": format!("{from:?}"),
                "publisher_address": "0x00000000000000000000000000000000000000aa",
                "signature": signature,
            }));
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;

    let mut flow = GaslessFlow::new(config, wallet(), session()).unwrap();
    let output = flow.run(add_publisher()).await.unwrap();

    assert_eq!(output.tx_hash, TX_HASH.parse().unwrap());
    assert_eq!(output.content_hash, None);
    assert_eq!(flow.state(), FlowState::Done(output));
    relay.assert_async().await;
}

#[tokio::test]
async fn register_content_is_relayed() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let from = wallet_address();
    let signature = expected_signature(&config, &register_content(), 0).await;

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/publisher/{from:?}"));
            then.status(200).json_body(json!({ "is_authorized": true }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/nonce/{from:?}"));
            then.status(200).json_body(json!({ "nonce": 0 }));
        })
        .await;
    let relay = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/register-content")
                .body_contains("c3d2f1e0a9b8c7d6")
                .body_contains(signature.as_str());
            then.status(200).json_body(json!({ "txHash": TX_HASH }));
        })
        .await;

    let mut flow = GaslessFlow::new(config, wallet(), session()).unwrap();
    let output = flow.run(register_content()).await.unwrap();

    assert_eq!(output.content_hash.as_deref(), Some("c3d2f1e0a9b8c7d6"));
    relay.assert_async().await;
}

#[tokio::test]
async fn sequential_runs_use_increasing_nonces() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let from = wallet_address();
    let first = expected_signature(&config, &add_publisher(), 3).await;
    let second = expected_signature(&config, &add_publisher(), 4).await;

    let relay_first = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher").body_contains(first.as_str());
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;
    let relay_second = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher").body_contains(second.as_str());
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;

    let mut flow = GaslessFlow::new(config, wallet(), session()).unwrap();
    for nonce in [3u64, 4] {
        let mut mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/api/nonce/{from:?}"));
                then.status(200).json_body(json!({ "nonce": nonce }));
            })
            .await;
        flow.run(add_publisher()).await.unwrap();
        mock.assert_hits_async(1).await;
        mock.delete_async().await;
    }

    relay_first.assert_hits_async(1).await;
    relay_second.assert_hits_async(1).await;
}

#[tokio::test]
async fn signer_mismatch_fails_before_relay() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let expected: Address = "0x000000000000000000000000000000000000aaaa".parse().unwrap();

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/nonce/{expected:?}"));
            then.status(200).json_body(json!({ "nonce": 1 }));
        })
        .await;
    let relay = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher");
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;

    // the session believes 0xaaaa is connected, the signing wallet is another account
    let mut flow =
        GaslessFlow::new(config, wallet(), Session::connected(expected, CHAIN_ID)).unwrap();
    let err = flow.run(add_publisher()).await.unwrap_err();

    assert!(matches!(err, RelayError::WalletMismatch { expected: e, .. } if e == expected));
    let (at, kind, _) = failure(flow.state());
    assert_eq!(at, FlowStep::Sign);
    assert_eq!(kind, ErrorKind::WalletMismatch);
    relay.assert_hits_async(0).await;
}

#[tokio::test]
async fn backend_rejection_message_is_kept_verbatim() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let from = wallet_address();

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/nonce/{from:?}"));
            then.status(200).json_body(json!({ "nonce": 2 }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher");
            then.status(403).json_body(json!({ "detail": "Not an authorized publisher" }));
        })
        .await;

    let mut roles = RoleResolver::new(OwnerRegistry, config.registry, Duration::from_secs(3600));
    let mut role_updates = roles.subscribe();
    roles.connect(from);
    let before = loop {
        let state = *role_updates.borrow_and_update();
        if let RoleState::Ready { .. } = state {
            break state
        }
        role_updates.changed().await.unwrap();
    };

    let mut flow = GaslessFlow::new(config, wallet(), session()).unwrap();
    let err = flow.run(add_publisher()).await.unwrap_err();
    assert!(matches!(err, RelayError::BackendRejection { status: 403, .. }));

    let (at, kind, message) = failure(flow.state());
    assert_eq!(at, FlowStep::Submit);
    assert_eq!(kind, ErrorKind::BackendRejection);
    assert_eq!(message, "Not an authorized publisher");

    assert_eq!(roles.state(), before);
    assert_eq!(roles.role(), Role { is_publisher: false, is_owner: true, is_loading: false });
    assert!(!role_updates.has_changed().unwrap());
}

/// Registry owned by the test wallet, with no publishers
#[derive(Debug)]
struct OwnerRegistry;

#[async_trait]
impl ChainReader for OwnerRegistry {
    async fn read(
        &self,
        _contract: Address,
        signature: &str,
        _args: &[Token],
    ) -> ethers_relay::Result<Vec<Token>> {
        match signature {
            IS_PUBLISHER_SIGNATURE => Ok(vec![Token::Bool(false)]),
            OWNER_SIGNATURE => Ok(vec![Token::Address(wallet_address())]),
            other => Err(RelayError::ChainRead(format!("unexpected call {other}"))),
        }
    }
}

/// Hands out consecutive nonces starting at `next`
#[derive(Debug)]
struct CountingNonces {
    next: AtomicU64,
}

#[async_trait]
impl NonceSource for CountingNonces {
    async fn get_nonce(&self, _address: Address) -> ethers_relay::Result<U256> {
        Ok(U256::from(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

#[tokio::test]
async fn nonces_come_from_the_injected_source() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let first = expected_signature(&config, &add_publisher(), 11).await;
    let second = expected_signature(&config, &add_publisher(), 12).await;

    let backend_nonce = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(200).json_body(json!({ "nonce": 0 }));
        })
        .await;
    let relay_first = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher").body_contains(first.as_str());
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;
    let relay_second = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher").body_contains(second.as_str());
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;

    let nonces = Arc::new(CountingNonces { next: AtomicU64::new(11) });
    let mut flow = GaslessFlow::new(config, wallet(), session())
        .unwrap()
        .with_nonce_source(Arc::clone(&nonces));
    flow.run(add_publisher()).await.unwrap();
    flow.run(add_publisher()).await.unwrap();

    assert_eq!(nonces.next.load(Ordering::SeqCst), 13);
    relay_first.assert_hits_async(1).await;
    relay_second.assert_hits_async(1).await;
    backend_nonce.assert_hits_async(0).await;
}

#[tokio::test]
async fn unauthorized_publisher_is_stopped_at_wallet_check() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let from = wallet_address();

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/api/publisher/{from:?}"));
            then.status(200).json_body(json!({ "is_authorized": false }));
        })
        .await;
    let nonce = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(200).json_body(json!({ "nonce": 0 }));
        })
        .await;

    let mut flow = GaslessFlow::new(config, wallet(), session()).unwrap();
    let err = flow.run(register_content()).await.unwrap_err();

    assert!(matches!(err, RelayError::NotAuthorized(a) if a == from));
    assert_eq!(failure(flow.state()).0, FlowStep::WalletCheck);
    nonce.assert_hits_async(0).await;
}

#[tokio::test]
async fn unknown_nonce_fails_the_run() {
    let server = MockServer::start_async().await;
    let config = config(&server);

    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(404).json_body(json!({ "detail": "Nonce not found" }));
        })
        .await;

    let mut flow = GaslessFlow::new(config, wallet(), session()).unwrap();
    let err = flow.run(add_publisher()).await.unwrap_err();

    assert!(matches!(err, RelayError::NonceNotFound(_)));
    let (at, kind, _) = failure(flow.state());
    assert_eq!(at, FlowStep::NonceFetch);
    assert_eq!(kind, ErrorKind::NotFound);
}

/// Wallet whose user dismisses every prompt. Records the flow state shown
/// while the prompt was open.
#[derive(Debug, Default)]
struct DismissingWallet {
    progress: Mutex<Option<watch::Receiver<FlowState>>>,
    seen: Mutex<Option<FlowState>>,
}

#[derive(Debug, thiserror::Error)]
#[error("User denied message signature")]
struct Dismissed;

#[async_trait]
impl SigningProvider for DismissingWallet {
    type Error = Dismissed;

    async fn address(&self) -> Result<Address, Self::Error> {
        Ok(wallet_address())
    }

    async fn sign_typed_data(
        &self,
        _payload: &ForwardRequestPayload,
    ) -> Result<Signature, Self::Error> {
        let state = self.progress.lock().unwrap().as_ref().map(|rx| rx.borrow().clone());
        *self.seen.lock().unwrap() = state;
        Err(Dismissed)
    }

    fn is_rejection(_error: &Self::Error) -> bool {
        true
    }
}

#[tokio::test]
async fn dismissed_prompt_is_a_user_rejection() {
    let server = MockServer::start_async().await;
    let config = config(&server);

    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(200).json_body(json!({ "nonce": 5 }));
        })
        .await;
    let relay = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher");
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;

    let signer = Arc::new(DismissingWallet::default());
    let mut flow = GaslessFlow::new(config, Arc::clone(&signer), session()).unwrap();
    *signer.progress.lock().unwrap() = Some(flow.subscribe());

    let err = flow.run(add_publisher()).await.unwrap_err();
    assert!(matches!(err, RelayError::UserRejected));
    assert!(err.is_recoverable());

    let seen = signer.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen, FlowState::Running(FlowStep::Sign));
    assert_eq!(seen.label(), "Waiting for signature...");

    let (at, kind, _) = failure(flow.state());
    assert_eq!(at, FlowStep::Sign);
    assert_eq!(kind, ErrorKind::UserRejected);
    relay.assert_hits_async(0).await;
}

#[tokio::test]
async fn session_on_another_chain_is_rejected() {
    let server = MockServer::start_async().await;
    let config = config(&server);
    let nonce = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/nonce/");
            then.status(200).json_body(json!({ "nonce": 0 }));
        })
        .await;

    let (tx, rx) = watch::channel(Session::connected(wallet_address(), 1));
    let mut flow = GaslessFlow::new(config, wallet(), rx).unwrap();
    let err = flow.run(add_publisher()).await.unwrap_err();
    assert!(matches!(err, RelayError::WrongChain { expected: CHAIN_ID, actual: 1 }));
    nonce.assert_hits_async(0).await;

    // the wallet switched networks, a new run reads the new session
    tx.send(session()).unwrap();
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/add-publisher");
            then.status(200).json_body(json!({ "tx_hash": TX_HASH }));
        })
        .await;
    flow.run(add_publisher()).await.unwrap();
    nonce.assert_hits_async(1).await;
}
