#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code, rustdoc::broken_intra_doc_links)]
//! # Ethers Relay
//!
//! Client side of a gasless transaction relay. A connected wallet authorizes a
//! privileged registry call by signing an EIP-712 `ForwardRequest`; a relayer
//! backend submits it to a `MinimalForwarder` and pays the gas.
//!
//! ## Components
//! - [`RelayClient`]: talks to the relayer backend (nonces, submissions)
//! - [`ForwardRequest`]: the request tuple and its EIP-712 encoding
//! - [`TypedDataSigner`]: signs requests after checking the signer's identity
//! - [`GaslessFlow`]: runs a [`PrivilegedAction`] end to end and reports progress
//! - [`RoleResolver`]: polls whether the connected wallet is a publisher or the
//!   registry owner
//!
//! ## Example
//!
//! ```no_run
//! use ethers_relay::{
//!     ContractReader, GaslessFlow, PrivilegedAction, RelayConfig, RoleResolver, Session,
//! };
//! use ethers_signers::{LocalWallet, Signer};
//!
//! # async fn foo() -> ethers_relay::Result<()> {
//! let config = RelayConfig::from_env()?;
//! let wallet: LocalWallet =
//!     "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".parse().unwrap();
//! let address = wallet.address();
//!
//! let mut roles = RoleResolver::from_config(ContractReader::from_config(&config)?, &config);
//! roles.connect(address);
//!
//! let session = Session::connected(address, config.chain_id);
//! let mut flow = GaslessFlow::new(config, wallet, session)?;
//! let output = flow
//!     .run(PrivilegedAction::RegisterContent {
//!         p_hash: "c3d2f1e0a9b8c7d6".to_string(),
//!         title: "Harbour".to_string(),
//!         description: String::new(),
//!     })
//!     .await?;
//! println!("registered in {:?}", output.tx_hash);
//!
//! // pick up the new on-chain state
//! roles.refresh().await?;
//! # Ok(())
//! # }
//! ```

pub mod abi;

/// Read-only contract calls used for role lookups
pub mod chain;
pub use chain::{ChainReader, ContractReader};

pub mod client;
pub use client::{ContentSubmission, NonceSource, PublisherStatus, RelayClient, RelayResult};

pub mod config;
pub use config::RelayConfig;

pub mod errors;
pub use errors::{ErrorKind, RelayError};

pub mod flow;
pub use flow::{FlowOutput, FlowState, FlowStep, GaslessFlow, PrivilegedAction};

pub mod request;
pub use request::{ForwardRequest, ForwardRequestPayload, SignedRequest};

pub mod roles;
pub use roles::{Role, RoleResolver, RoleState};

pub mod session;
pub use session::{Session, SessionSource};

/// The signing capability a wallet provides to the relay flows
pub mod signer;
pub use signer::{sign_request, SigningProvider, TypedDataSigner};

pub mod similarity;

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
