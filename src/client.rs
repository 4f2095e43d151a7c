//! HTTP client for the relayer backend.

use crate::{config::RelayConfig, errors::RelayError, request::SignedRequest, Result};
use async_trait::async_trait;
use ethers_core::types::{serde_helpers::deserialize_stringified_numeric, Address, H256, U256};
use reqwest::{header, multipart, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use tracing::{debug, error, trace};

/// Source of the next usable forwarder nonce for a wallet.
///
/// Implementations must not cache: the forwarder's counter moves every time a
/// request from the wallet is executed, by this client or by anyone else.
#[async_trait]
pub trait NonceSource: Send + Sync + Debug {
    async fn get_nonce(&self, address: Address) -> Result<U256>;
}

#[async_trait]
impl<T: NonceSource + ?Sized> NonceSource for std::sync::Arc<T> {
    async fn get_nonce(&self, address: Address) -> Result<U256> {
        (**self).get_nonce(address).await
    }
}

/// Hash of the transaction the relayer submitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RelayResult {
    #[serde(alias = "txHash")]
    pub tx_hash: H256,
}

/// Whether the backend considers an address a whitelisted publisher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct PublisherStatus {
    pub is_authorized: bool,
}

#[derive(Deserialize)]
struct NonceResponse {
    #[serde(deserialize_with = "deserialize_stringified_numeric")]
    nonce: U256,
}

#[derive(Serialize)]
struct AddPublisherBody<'a> {
    owner_address: String,
    publisher_address: String,
    signature: &'a str,
}

/// Content registration fields, sent as a multipart form
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentSubmission {
    /// Perceptual hash of the content, computed upstream
    pub p_hash: String,
    pub title: String,
    pub description: String,
}

/// Client for the relayer backend.
///
/// Requests time out after [`RelayConfig::request_timeout`]. Submissions are
/// fire-once: the relayer answers with the transaction hash and this client
/// never polls for confirmation nor retries.
#[derive(Clone, Debug)]
pub struct RelayClient {
    client: reqwest::Client,
    backend_url: Url,
}

impl RelayClient {
    /// Creates a client for the backend in `config`
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(client, config.backend_url.clone()))
    }

    /// Creates a client that issues its requests through `client`
    pub fn with_client(client: reqwest::Client, backend_url: Url) -> Self {
        Self { client, backend_url }
    }

    pub fn backend_url(&self) -> &Url {
        &self.backend_url
    }

    /// Fetches the next forwarder nonce of `address`.
    ///
    /// A 404 means the backend has no record for the address and is reported
    /// as [`RelayError::NonceNotFound`], never as nonce zero.
    pub async fn get_nonce(&self, address: Address) -> Result<U256> {
        let url = self.endpoint(&format!("api/nonce/{address:?}"))?;
        trace!(target: "relay", "GET {}", url);
        let res = self.client.get(url).header(header::ACCEPT, "application/json").send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            debug!(target: "relay", ?address, "no nonce record");
            return Err(RelayError::NonceNotFound(address))
        }
        let NonceResponse { nonce } = self.sanitize_response(res).await?;
        debug!(target: "relay", ?address, %nonce, "fetched nonce");
        Ok(nonce)
    }

    /// Asks the backend whether `address` may register content
    pub async fn publisher_status(&self, address: Address) -> Result<PublisherStatus> {
        let url = self.endpoint(&format!("api/publisher/{address:?}"))?;
        trace!(target: "relay", "GET {}", url);
        let res = self.client.get(url).header(header::ACCEPT, "application/json").send().await?;
        self.sanitize_response(res).await
    }

    /// Relays an `addPublisher` call signed by the registry owner
    pub async fn add_publisher(
        &self,
        owner: Address,
        publisher: Address,
        signature: &str,
    ) -> Result<RelayResult> {
        let url = self.endpoint("api/add-publisher")?;
        let body = AddPublisherBody {
            owner_address: format!("{owner:?}"),
            publisher_address: format!("{publisher:?}"),
            signature,
        };
        trace!(target: "relay", "POST {}", url);
        let res = self.client.post(url).json(&body).send().await?;
        let result: RelayResult = self.sanitize_response(res).await?;
        debug!(target: "relay", tx_hash = ?result.tx_hash, "relayed addPublisher");
        Ok(result)
    }

    /// Relays a `registerContent` call signed by `publisher`
    pub async fn register_content(
        &self,
        publisher: Address,
        content: &ContentSubmission,
        signature: &str,
    ) -> Result<RelayResult> {
        let url = self.endpoint("api/register-content")?;
        let form = multipart::Form::new()
            .text("publisher_address", format!("{publisher:?}"))
            .text("p_hash", content.p_hash.clone())
            .text("title", content.title.clone())
            .text("description", content.description.clone())
            .text("signature", signature.to_string());
        trace!(target: "relay", "POST {}", url);
        let res = self.client.post(url).multipart(form).send().await?;
        let result: RelayResult = self.sanitize_response(res).await?;
        debug!(target: "relay", tx_hash = ?result.tx_hash, "relayed registerContent");
        Ok(result)
    }

    /// Submits a signed `addPublisher` request
    pub async fn submit_add_publisher(
        &self,
        signed: &SignedRequest,
        publisher: Address,
    ) -> Result<RelayResult> {
        self.add_publisher(signed.signer(), publisher, &signed.signature_hex()).await
    }

    /// Submits a signed `registerContent` request
    pub async fn submit_register_content(
        &self,
        signed: &SignedRequest,
        content: &ContentSubmission,
    ) -> Result<RelayResult> {
        self.register_content(signed.signer(), content, &signed.signature_hex()).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.backend_url
            .join(path)
            .map_err(|err| RelayError::Configuration(format!("invalid endpoint `{path}`: {err}")))
    }

    /// Classifies non-2xx answers and deserializes the body of 2xx answers.
    async fn sanitize_response<T: DeserializeOwned>(&self, res: Response) -> Result<T> {
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            let detail = rejection_detail(status, &body);
            debug!(target: "relay", status = status.as_u16(), %detail, "backend rejected request");
            return Err(RelayError::BackendRejection { status: status.as_u16(), detail })
        }
        serde_json::from_str(&body).map_err(|err| {
            error!(target: "relay", ?body, "Failed to deserialize response: {}", err);
            RelayError::Decode(err)
        })
    }
}

#[async_trait]
impl NonceSource for RelayClient {
    async fn get_nonce(&self, address: Address) -> Result<U256> {
        RelayClient::get_nonce(self, address).await
    }
}

/// Extracts the backend's `detail` message, falling back to the bare status text.
fn rejection_detail(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|mut value| value.get_mut("detail").map(serde_json::Value::take));
    match detail {
        Some(serde_json::Value::String(detail)) => detail,
        Some(serde_json::Value::Null) | None => {
            status.canonical_reason().unwrap_or_else(|| status.as_str()).to_string()
        }
        Some(other) => other.to_string(),
    }
}
