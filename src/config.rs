//! Deployment configuration: endpoints, contract addresses and timings.

use crate::{
    errors::RelayError,
    request::{forwarder_domain, DEFAULT_GAS_LIMIT},
    Result,
};
use ethers_core::types::{transaction::eip712::EIP712Domain, Address};
use reqwest::{IntoUrl, Url};
use std::{env, str::FromStr, time::Duration};

/// Default interval between two role polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default timeout for backend calls. Relayed calls wait for the transaction
/// to be mined, which can be slow.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration shared by the relay client, the flows and the role resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Base URL of the relayer backend, e.g. `https://api.example.com/`
    pub backend_url: Url,
    /// JSON-RPC endpoint used for read-only contract calls
    pub rpc_url: Option<Url>,
    /// Address of the trusted forwarder, the EIP-712 verifying contract
    pub forwarder: Address,
    /// Address of the registry contract whose methods are forwarded
    pub registry: Address,
    /// Chain the forwarder and the registry are deployed on
    pub chain_id: u64,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Gas forwarded to the target call
    pub gas_limit: u64,
}

impl RelayConfig {
    /// Creates a `RelayConfigBuilder`, same as `RelayConfigBuilder::default()`.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Loads the configuration from the environment.
    ///
    /// Required: `RELAY_BACKEND_URL`, `RELAY_FORWARDER_ADDRESS`, `RELAY_REGISTRY_ADDRESS`,
    /// `RELAY_CHAIN_ID`. Optional: `RELAY_RPC_URL`, `RELAY_POLL_INTERVAL_MS`,
    /// `RELAY_TIMEOUT_SECS`, `RELAY_GAS_LIMIT`.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder()
            .with_backend_url(required_var("RELAY_BACKEND_URL")?)?
            .forwarder(required_parsed("RELAY_FORWARDER_ADDRESS")?)
            .registry(required_parsed("RELAY_REGISTRY_ADDRESS")?)
            .chain_id(required_parsed("RELAY_CHAIN_ID")?);

        if let Ok(rpc) = env::var("RELAY_RPC_URL") {
            builder = builder.with_rpc_url(rpc)?;
        }
        if let Ok(ms) = env::var("RELAY_POLL_INTERVAL_MS") {
            builder = builder
                .poll_interval(Duration::from_millis(parse_var("RELAY_POLL_INTERVAL_MS", &ms)?));
        }
        if let Ok(secs) = env::var("RELAY_TIMEOUT_SECS") {
            let secs = parse_var("RELAY_TIMEOUT_SECS", &secs)?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Ok(gas) = env::var("RELAY_GAS_LIMIT") {
            builder = builder.gas_limit(parse_var("RELAY_GAS_LIMIT", &gas)?);
        }
        builder.build()
    }

    /// The forwarder's EIP-712 domain
    pub fn domain(&self) -> EIP712Domain {
        forwarder_domain(self.chain_id, self.forwarder)
    }

    /// Fails if either contract address is unset
    pub fn ensure_contracts(&self) -> Result<()> {
        if self.forwarder.is_zero() {
            return Err(RelayError::Configuration("forwarder address is not set".to_string()))
        }
        if self.registry.is_zero() {
            return Err(RelayError::Configuration("registry address is not set".to_string()))
        }
        Ok(())
    }
}

fn required_var(key: &str) -> Result<String> {
    env::var(key).map_err(|err| RelayError::Configuration(format!("{key}: {err}")))
}

fn required_parsed<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_var(key, &required_var(key)?)
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| RelayError::Configuration(format!("{key}: invalid value `{value}`: {err}")))
}

#[derive(Clone, Debug, Default)]
pub struct RelayConfigBuilder {
    backend_url: Option<Url>,
    rpc_url: Option<Url>,
    forwarder: Option<Address>,
    registry: Option<Address>,
    chain_id: Option<u64>,
    poll_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    gas_limit: Option<u64>,
}

// === impl RelayConfigBuilder ===

impl RelayConfigBuilder {
    /// Configures the backend url. A trailing slash is appended if missing so
    /// endpoint paths resolve below it.
    ///
    /// # Errors
    ///
    /// Fails if `backend_url` is not a valid `Url`
    pub fn with_backend_url(mut self, backend_url: impl IntoUrl) -> Result<Self> {
        let mut url = backend_url
            .into_url()
            .map_err(|err| RelayError::Configuration(format!("backend url: {err}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.backend_url = Some(url);
        Ok(self)
    }

    /// Configures the JSON-RPC url
    ///
    /// # Errors
    ///
    /// Fails if `rpc_url` is not a valid `Url`
    pub fn with_rpc_url(mut self, rpc_url: impl IntoUrl) -> Result<Self> {
        self.rpc_url = Some(
            rpc_url.into_url().map_err(|err| RelayError::Configuration(format!("rpc url: {err}")))?,
        );
        Ok(self)
    }

    pub fn forwarder(mut self, forwarder: Address) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn registry(mut self, registry: Address) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Returns a `RelayConfig` that uses this builder's configuration.
    ///
    /// # Errors
    /// if required fields are missing:
    ///   - `backend_url`
    ///   - `forwarder`
    ///   - `registry`
    ///   - `chain_id`
    ///
    /// or if the poll interval is zero
    pub fn build(self) -> Result<RelayConfig> {
        let RelayConfigBuilder {
            backend_url,
            rpc_url,
            forwarder,
            registry,
            chain_id,
            poll_interval,
            request_timeout,
            gas_limit,
        } = self;

        let missing = |field: &str| RelayError::Configuration(format!("{field} is not set"));
        let poll_interval = poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(RelayError::Configuration("poll interval must be non-zero".to_string()))
        }
        Ok(RelayConfig {
            backend_url: backend_url.ok_or_else(|| missing("backend url"))?,
            rpc_url,
            forwarder: forwarder.ok_or_else(|| missing("forwarder address"))?,
            registry: registry.ok_or_else(|| missing("registry address"))?,
            chain_id: chain_id.ok_or_else(|| missing("chain id"))?,
            poll_interval,
            request_timeout: request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            gas_limit: gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
        })
    }
}
