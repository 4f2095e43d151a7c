use ethers_core::{
    abi::{AbiError, ParseError},
    types::Address,
};
use std::fmt;

/// Coarse classification of a [`RelayError`], stable enough to drive UI
/// decisions (which prompt to show, whether to offer a retry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConnected,
    Configuration,
    WalletMismatch,
    WrongChain,
    UserRejected,
    Network,
    NotFound,
    BackendRejection,
    NotAuthorized,
    Signing,
    Encoding,
    ChainRead,
    Decode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotConnected => "not connected",
            ErrorKind::Configuration => "configuration",
            ErrorKind::WalletMismatch => "wallet mismatch",
            ErrorKind::WrongChain => "wrong chain",
            ErrorKind::UserRejected => "user rejected",
            ErrorKind::Network => "network",
            ErrorKind::NotFound => "not found",
            ErrorKind::BackendRejection => "backend rejection",
            ErrorKind::NotAuthorized => "not authorized",
            ErrorKind::Signing => "signing",
            ErrorKind::Encoding => "encoding",
            ErrorKind::ChainRead => "chain read",
            ErrorKind::Decode => "decode",
        };
        f.write_str(s)
    }
}

/// Errors raised anywhere along the gasless relay path.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Thrown when a flow is started without a connected wallet session
    #[error("no wallet connected, connect a wallet to continue")]
    NotConnected,

    /// Thrown when the deployment is missing an address or endpoint
    #[error("invalid relay configuration: {0}")]
    Configuration(String),

    /// Thrown if a signature is requested from a different address than the
    /// one the request is issued from
    #[error(
        "connected signer {actual:?} does not match the expected wallet {expected:?}, \
         reconnect the correct wallet"
    )]
    WalletMismatch { expected: Address, actual: Address },

    /// Thrown if the wallet is connected to another chain than the forwarder's
    #[error("wallet is connected to chain {actual}, but the forwarder lives on chain {expected}")]
    WrongChain { expected: u64, actual: u64 },

    /// Thrown when the user dismisses the signing prompt
    #[error("signature request was rejected by the user")]
    UserRejected,

    /// Thrown when the backend could not be reached or timed out
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// Thrown when the backend has no nonce record for the address
    #[error("no nonce found for address {0:?}")]
    NonceNotFound(Address),

    /// Thrown when the backend answers with a non-2xx status. Displays the
    /// backend's message verbatim.
    #[error("{detail}")]
    BackendRejection { status: u16, detail: String },

    /// Thrown when the backend reports the wallet is not a whitelisted publisher
    #[error("{0:?} is not an authorized publisher")]
    NotAuthorized(Address),

    /// Thrown when the signing capability fails for a reason other than rejection
    #[error("failed to sign request: {0}")]
    Signing(String),

    /// Thrown when calldata cannot be encoded or decoded
    #[error(transparent)]
    Encoding(#[from] AbiError),

    /// Thrown when a human readable signature cannot be parsed
    #[error(transparent)]
    Signature(#[from] ParseError),

    /// Thrown when a read-only contract call fails
    #[error("contract read failed: {0}")]
    ChainRead(String),

    /// Thrown when a backend response cannot be deserialized
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

impl RelayError {
    /// Returns the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::NotConnected => ErrorKind::NotConnected,
            RelayError::Configuration(_) => ErrorKind::Configuration,
            RelayError::WalletMismatch { .. } => ErrorKind::WalletMismatch,
            RelayError::WrongChain { .. } => ErrorKind::WrongChain,
            RelayError::UserRejected => ErrorKind::UserRejected,
            RelayError::Network(_) => ErrorKind::Network,
            RelayError::NonceNotFound(_) => ErrorKind::NotFound,
            RelayError::BackendRejection { .. } => ErrorKind::BackendRejection,
            RelayError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            RelayError::Signing(_) => ErrorKind::Signing,
            RelayError::Encoding(_) | RelayError::Signature(_) => ErrorKind::Encoding,
            RelayError::ChainRead(_) => ErrorKind::ChainRead,
            RelayError::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Whether restarting the whole flow may succeed without any external action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserRejected | ErrorKind::Network | ErrorKind::ChainRead)
    }
}
