//! Publisher and owner roles of the connected wallet, polled from the registry.

use crate::{chain::ChainReader, config::RelayConfig, errors::RelayError, Result};
use ethers_core::{abi::Token, types::Address};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, trace, warn};

/// Registry view listing whitelisted publishers
pub const IS_PUBLISHER_SIGNATURE: &str =
    "function authorizedPublishers(address) view returns (bool)";

/// Registry view returning the contract owner
pub const OWNER_SIGNATURE: &str = "function owner() view returns (address)";

/// Shortest interval between two role polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the connected wallet may do on the registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Role {
    pub is_publisher: bool,
    pub is_owner: bool,
    /// True until the first successful read for the wallet
    pub is_loading: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoleState {
    /// No wallet was ever connected
    #[default]
    Idle,
    /// A wallet is connected but no read has succeeded yet
    Loading { wallet: Address },
    Ready { wallet: Address, is_publisher: bool, is_owner: bool },
    Disconnected,
}

impl RoleState {
    /// The wallet the state belongs to
    pub fn wallet(&self) -> Option<Address> {
        match self {
            RoleState::Loading { wallet } | RoleState::Ready { wallet, .. } => Some(*wallet),
            RoleState::Idle | RoleState::Disconnected => None,
        }
    }

    pub fn role(&self) -> Role {
        match *self {
            RoleState::Loading { .. } => Role { is_loading: true, ..Default::default() },
            RoleState::Ready { is_publisher, is_owner, .. } => {
                Role { is_publisher, is_owner, is_loading: false }
            }
            RoleState::Idle | RoleState::Disconnected => Role::default(),
        }
    }
}

/// Keeps the [`Role`] of the connected wallet up to date.
///
/// On [`connect`](Self::connect) a background task reads the registry
/// immediately and then every poll interval. A failed read leaves the state
/// untouched, so a transient RPC error never revokes a role the wallet holds.
/// Results that arrive for a wallet which is no longer connected are dropped.
///
/// The task runs until [`disconnect`](Self::disconnect) or until the resolver
/// is dropped. `connect` must be called from within a tokio runtime.
#[derive(Debug)]
pub struct RoleResolver<R> {
    reader: Arc<R>,
    registry: Address,
    interval: Duration,
    state: Arc<watch::Sender<RoleState>>,
    task: Option<JoinHandle<()>>,
}

impl<R: ChainReader + 'static> RoleResolver<R> {
    /// Creates an idle resolver. Intervals below [`MIN_POLL_INTERVAL`] are
    /// raised to it.
    pub fn new(reader: R, registry: Address, interval: Duration) -> Self {
        let (state, _) = watch::channel(RoleState::Idle);
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self { reader: Arc::new(reader), registry, interval, state: Arc::new(state), task: None }
    }

    /// Creates a resolver for the registry and poll interval of `config`
    pub fn from_config(reader: R, config: &RelayConfig) -> Self {
        Self::new(reader, config.registry, config.poll_interval)
    }

    /// Starts tracking `wallet`. Connecting the wallet that is already tracked
    /// is a no-op while its polling task is alive.
    pub fn connect(&mut self, wallet: Address) {
        if self.state.borrow().wallet() == Some(wallet) && self.is_polling() {
            return
        }
        self.stop();
        debug!(target: "roles", ?wallet, "tracking wallet");
        self.state.send_replace(RoleState::Loading { wallet });

        let reader = Arc::clone(&self.reader);
        let state = Arc::clone(&self.state);
        let (registry, period) = (self.registry, self.interval);
        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // first tick resolves immediately
                interval.tick().await;
                if let Err(err) = resolve(&*reader, registry, wallet, &state).await {
                    warn!(target: "roles", ?wallet, %err, "role poll failed, keeping state");
                }
            }
        }));
    }

    /// Stops polling and clears the role
    pub fn disconnect(&mut self) {
        self.stop();
        debug!(target: "roles", "wallet disconnected");
        self.state.send_replace(RoleState::Disconnected);
    }

    /// Reads the roles of the current wallet once, outside the polling schedule.
    ///
    /// Typically called after a flow changed on-chain state. Fails with
    /// [`RelayError::NotConnected`] if no wallet is tracked.
    pub async fn refresh(&self) -> Result<Role> {
        let wallet = self.state.borrow().wallet().ok_or(RelayError::NotConnected)?;
        resolve(&*self.reader, self.registry, wallet, &self.state).await
    }

    /// Returns a receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<RoleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RoleState {
        *self.state.borrow()
    }

    pub fn role(&self) -> Role {
        self.state().role()
    }

    /// Whether the polling task is running
    pub fn is_polling(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<R> Drop for RoleResolver<R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Reads both roles of `wallet` and publishes them if `wallet` is still the
/// tracked one.
async fn resolve<R: ChainReader + ?Sized>(
    reader: &R,
    registry: Address,
    wallet: Address,
    state: &watch::Sender<RoleState>,
) -> Result<Role> {
    trace!(target: "roles", ?wallet, "reading roles");
    let is_publisher =
        reader.read_bool(registry, IS_PUBLISHER_SIGNATURE, &[Token::Address(wallet)]).await?;
    let owner = reader.read_address(registry, OWNER_SIGNATURE, &[]).await?;
    let is_owner = owner == wallet;

    let applied = state.send_if_modified(|current| {
        if current.wallet() != Some(wallet) {
            return false
        }
        let next = RoleState::Ready { wallet, is_publisher, is_owner };
        let changed = *current != next;
        *current = next;
        changed
    });
    if !applied && state.borrow().wallet() != Some(wallet) {
        debug!(target: "roles", ?wallet, "discarding roles of a stale wallet");
    }
    Ok(Role { is_publisher, is_owner, is_loading: false })
}
