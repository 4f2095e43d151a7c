//! Gasless execution of privileged registry calls.
//!
//! A [`GaslessFlow`] walks a fixed sequence of steps:
//!
//! ```text
//! Init -> WalletCheck -> NonceFetch -> Encode -> Sign -> Submit -> Done
//!                                                                 \-> Failed
//! ```
//!
//! Every step may fail, which ends the run in [`FlowState::Failed`]. A failed
//! run is never resumed: running again starts over at `Init` and fetches a
//! fresh nonce. Nothing leaves the client before `Submit`, so a run abandoned
//! earlier has no side effect.

use crate::{
    abi,
    client::{ContentSubmission, NonceSource, RelayClient},
    config::RelayConfig,
    errors::{ErrorKind, RelayError},
    request::ForwardRequest,
    session::{Session, SessionSource},
    signer::{SigningProvider, TypedDataSigner},
    Result,
};
use ethers_core::{
    abi::Token,
    types::{Address, Bytes, H256},
};
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Registry method granting publisher rights, callable by the owner
pub const ADD_PUBLISHER_SIGNATURE: &str = "addPublisher(address)";

/// Registry method recording a content hash, callable by publishers
pub const REGISTER_CONTENT_SIGNATURE: &str = "registerContent(string,string,string)";

/// A registry call executed through the forwarder
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrivilegedAction {
    AddPublisher { publisher: Address },
    RegisterContent { p_hash: String, title: String, description: String },
}

impl PrivilegedAction {
    /// Human readable signature of the registry method
    pub fn signature(&self) -> &'static str {
        match self {
            PrivilegedAction::AddPublisher { .. } => ADD_PUBLISHER_SIGNATURE,
            PrivilegedAction::RegisterContent { .. } => REGISTER_CONTENT_SIGNATURE,
        }
    }

    /// Calldata of the registry call
    pub fn encode(&self) -> Result<Bytes> {
        let args = match self {
            PrivilegedAction::AddPublisher { publisher } => vec![Token::Address(*publisher)],
            PrivilegedAction::RegisterContent { p_hash, title, description } => vec![
                Token::String(p_hash.clone()),
                Token::String(title.clone()),
                Token::String(description.clone()),
            ],
        };
        abi::encode_call(self.signature(), &args)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowStep {
    Init,
    WalletCheck,
    NonceFetch,
    Encode,
    Sign,
    Submit,
}

impl FlowStep {
    pub fn label(&self) -> &'static str {
        match self {
            FlowStep::Init => "Starting...",
            FlowStep::WalletCheck => "Checking wallet...",
            FlowStep::NonceFetch => "Getting nonce...",
            FlowStep::Encode => "Encoding call...",
            FlowStep::Sign => "Waiting for signature...",
            FlowStep::Submit => "Submitting to relayer...",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of a successful run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowOutput {
    pub tx_hash: H256,
    /// The registered content hash, for `RegisterContent`
    pub content_hash: Option<String>,
}

/// Progress of a [`GaslessFlow`], published on every transition
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FlowState {
    #[default]
    Idle,
    Running(FlowStep),
    Done(FlowOutput),
    Failed { at: FlowStep, kind: ErrorKind, message: String },
}

impl FlowState {
    /// Label to display for this state
    pub fn label(&self) -> &str {
        match self {
            FlowState::Idle => "",
            FlowState::Running(step) => step.label(),
            FlowState::Done(_) => "Done",
            FlowState::Failed { message, .. } => message,
        }
    }

    /// Whether the run has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Done(_) | FlowState::Failed { .. })
    }
}

/// Runs [`PrivilegedAction`]s without the wallet paying gas.
///
/// The wallet only signs a `ForwardRequest`; the relayer backend submits it
/// to the forwarder and pays for the transaction. Re-read the role of the
/// wallet after a successful run if the action changed it.
///
/// Nonces come from `N`, the relay backend itself unless replaced with
/// [`with_nonce_source`](Self::with_nonce_source).
#[derive(Debug)]
pub struct GaslessFlow<S, C = Session, N = RelayClient> {
    config: RelayConfig,
    client: RelayClient,
    nonces: N,
    signer: TypedDataSigner<S>,
    session: C,
    state: watch::Sender<FlowState>,
}

impl<S, C> GaslessFlow<S, C>
where
    S: SigningProvider,
    C: SessionSource,
{
    /// Creates a flow talking to the backend of `config`
    pub fn new(config: RelayConfig, signer: S, session: C) -> Result<Self> {
        let client = RelayClient::new(&config)?;
        Ok(Self::with_client(config, client, signer, session))
    }

    pub fn with_client(config: RelayConfig, client: RelayClient, signer: S, session: C) -> Self {
        let signer = TypedDataSigner::new(signer, config.domain());
        let (state, _) = watch::channel(FlowState::Idle);
        Self { config, nonces: client.clone(), client, signer, session, state }
    }
}

impl<S, C, N> GaslessFlow<S, C, N>
where
    S: SigningProvider,
    C: SessionSource,
    N: NonceSource,
{
    /// Fetches nonces from `nonces` instead of the relay backend
    pub fn with_nonce_source<T: NonceSource>(self, nonces: T) -> GaslessFlow<S, C, T> {
        let GaslessFlow { config, client, signer, session, state, .. } = self;
        GaslessFlow { config, client, nonces, signer, session, state }
    }

    /// Returns a receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    /// Runs `action` from the start.
    ///
    /// The outcome is returned and also published as the terminal
    /// [`FlowState`]. Errors are never retried.
    pub async fn run(&mut self, action: PrivilegedAction) -> Result<FlowOutput> {
        let mut step = FlowStep::Init;
        self.enter(&mut step, FlowStep::Init);

        match self.execute(&action, &mut step).await {
            Ok(output) => {
                debug!(target: "flow", tx_hash = ?output.tx_hash, "flow done");
                self.state.send_replace(FlowState::Done(output.clone()));
                Ok(output)
            }
            Err(err) => {
                warn!(target: "flow", at = ?step, %err, "flow failed");
                self.state.send_replace(FlowState::Failed {
                    at: step,
                    kind: err.kind(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn execute(&self, action: &PrivilegedAction, step: &mut FlowStep) -> Result<FlowOutput> {
        self.enter(step, FlowStep::WalletCheck);
        let wallet = self.check_wallet(action).await?;

        self.enter(step, FlowStep::NonceFetch);
        let nonce = self.nonces.get_nonce(wallet).await?;

        self.enter(step, FlowStep::Encode);
        let data = action.encode()?;
        let request = ForwardRequest::builder(wallet, self.config.registry, data, nonce)
            .gas(self.config.gas_limit)
            .build();

        self.enter(step, FlowStep::Sign);
        let signed = self.signer.sign(request).await?;

        self.enter(step, FlowStep::Submit);
        match action {
            PrivilegedAction::AddPublisher { publisher } => {
                let result = self.client.submit_add_publisher(&signed, *publisher).await?;
                Ok(FlowOutput { tx_hash: result.tx_hash, content_hash: None })
            }
            PrivilegedAction::RegisterContent { p_hash, title, description } => {
                let content = ContentSubmission {
                    p_hash: p_hash.clone(),
                    title: title.clone(),
                    description: description.clone(),
                };
                let result = self.client.submit_register_content(&signed, &content).await?;
                Ok(FlowOutput { tx_hash: result.tx_hash, content_hash: Some(content.p_hash) })
            }
        }
    }

    /// Takes the session snapshot for this run and validates it
    async fn check_wallet(&self, action: &PrivilegedAction) -> Result<Address> {
        let session = self.session.session();
        let wallet = session.wallet()?;
        if session.chain_id != self.config.chain_id {
            return Err(RelayError::WrongChain {
                expected: self.config.chain_id,
                actual: session.chain_id,
            })
        }
        self.config.ensure_contracts()?;

        if let PrivilegedAction::RegisterContent { .. } = action {
            if !self.client.publisher_status(wallet).await?.is_authorized {
                return Err(RelayError::NotAuthorized(wallet))
            }
        }
        Ok(wallet)
    }

    fn enter(&self, current: &mut FlowStep, next: FlowStep) {
        *current = next;
        debug!(target: "flow", step = ?next, "{}", next.label());
        self.state.send_replace(FlowState::Running(next));
    }
}
