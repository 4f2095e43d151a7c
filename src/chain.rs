//! Read-only contract calls over JSON-RPC.

use crate::{abi, config::RelayConfig, errors::RelayError, Result};
use async_trait::async_trait;
use ethers_core::{
    abi::Token,
    types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest},
};
use ethers_providers::{Http, Middleware, Provider};
use std::{fmt::Debug, sync::Arc};
use tracing::trace;

/// Read-only access to contract state.
///
/// `signature` is the human readable declaration of the view method including
/// its outputs, e.g. `function owner() view returns (address)`.
#[async_trait]
pub trait ChainReader: Send + Sync + Debug {
    /// Calls `signature` on `contract` and returns the decoded outputs
    async fn read(&self, contract: Address, signature: &str, args: &[Token]) -> Result<Vec<Token>>;

    /// Calls a view method returning a single `bool`
    async fn read_bool(&self, contract: Address, signature: &str, args: &[Token]) -> Result<bool> {
        match self.read(contract, signature, args).await?.as_slice() {
            [Token::Bool(value)] => Ok(*value),
            other => Err(unexpected_output(signature, "bool", other)),
        }
    }

    /// Calls a view method returning a single `address`
    async fn read_address(
        &self,
        contract: Address,
        signature: &str,
        args: &[Token],
    ) -> Result<Address> {
        match self.read(contract, signature, args).await?.as_slice() {
            [Token::Address(value)] => Ok(*value),
            other => Err(unexpected_output(signature, "address", other)),
        }
    }
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for Arc<T> {
    async fn read(&self, contract: Address, signature: &str, args: &[Token]) -> Result<Vec<Token>> {
        (**self).read(contract, signature, args).await
    }
}

fn unexpected_output(signature: &str, expected: &str, tokens: &[Token]) -> RelayError {
    RelayError::ChainRead(format!("`{signature}` returned {tokens:?}, expected one {expected}"))
}

/// [`ChainReader`] backed by any [`Middleware`].
#[derive(Debug)]
pub struct ContractReader<M> {
    client: Arc<M>,
}

impl<M> Clone for ContractReader<M> {
    fn clone(&self) -> Self {
        Self { client: Arc::clone(&self.client) }
    }
}

impl<M: Middleware> ContractReader<M> {
    pub fn new(client: M) -> Self {
        Self { client: Arc::new(client) }
    }

    /// Returns a reference to the underlying client
    pub fn client(&self) -> &M {
        &self.client
    }
}

impl ContractReader<Provider<Http>> {
    /// Connects to the JSON-RPC endpoint of `config`. Calls time out after
    /// [`RelayConfig::request_timeout`].
    ///
    /// Fails with [`RelayError::Configuration`] if no RPC url is configured.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let url = config
            .rpc_url
            .clone()
            .ok_or_else(|| RelayError::Configuration("rpc url is not set".to_string()))?;
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::new(Provider::new(Http::new_with_client(url, client))))
    }
}

#[async_trait]
impl<M: Middleware> ChainReader for ContractReader<M> {
    async fn read(&self, contract: Address, signature: &str, args: &[Token]) -> Result<Vec<Token>> {
        let function = abi::parse_function(signature)?;
        let data = abi::encode_function(&function, args)?;
        let tx: TypedTransaction = TransactionRequest::new().to(contract).data(data).into();

        trace!(target: "relay", ?contract, %signature, "eth_call");
        let output = self
            .client
            .call(&tx, None)
            .await
            .map_err(|err| RelayError::ChainRead(err.to_string()))?;
        abi::decode_output(&function, &output)
    }
}
