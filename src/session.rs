//! Wallet session as exposed by the wallet-connection layer.

use crate::{errors::RelayError, Result};
use ethers_core::types::Address;
use tokio::sync::watch;

/// Snapshot of the wallet connection. Owned and mutated by the
/// wallet-connection layer on connect, disconnect and chain switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub wallet_address: Option<Address>,
    pub chain_id: u64,
    pub is_connected: bool,
}

impl Session {
    pub fn connected(wallet_address: Address, chain_id: u64) -> Self {
        Self { wallet_address: Some(wallet_address), chain_id, is_connected: true }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Returns the connected wallet, or [`RelayError::NotConnected`]
    pub fn wallet(&self) -> Result<Address> {
        match self.wallet_address {
            Some(address) if self.is_connected => Ok(address),
            _ => Err(RelayError::NotConnected),
        }
    }
}

/// Read access to the current [`Session`].
///
/// Flows read the session exactly once, when they start, and work on that
/// snapshot. A wallet switch during a flow is caught by the signer check.
pub trait SessionSource: Send + Sync {
    fn session(&self) -> Session;
}

impl SessionSource for Session {
    fn session(&self) -> Session {
        *self
    }
}

impl SessionSource for watch::Receiver<Session> {
    fn session(&self) -> Session {
        *self.borrow()
    }
}

impl<T: SessionSource + ?Sized> SessionSource for std::sync::Arc<T> {
    fn session(&self) -> Session {
        (**self).session()
    }
}
