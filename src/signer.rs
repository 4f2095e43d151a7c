use crate::{
    errors::RelayError,
    request::{ForwardRequest, ForwardRequestPayload, SignedRequest},
    Result,
};
use async_trait::async_trait;
use ethers_core::types::{transaction::eip712::EIP712Domain, Address, Signature};
use ethers_signers::{LocalWallet, Signer};
use std::{fmt::Debug, sync::Arc};
use tracing::{debug, trace};

/// The wallet's signing capability, injected into the relay flows.
///
/// Implement this trait for browser bridges, remote signers or hardware
/// wallets. Both methods may suspend for as long as the user takes to answer
/// the wallet prompt.
#[async_trait]
pub trait SigningProvider: Debug + Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolves the address this provider actually signs with.
    async fn address(&self) -> std::result::Result<Address, Self::Error>;

    /// Signs the EIP-712 digest of the forward request payload
    async fn sign_typed_data(
        &self,
        payload: &ForwardRequestPayload,
    ) -> std::result::Result<Signature, Self::Error>;

    /// Returns true if `error` means the user dismissed the wallet prompt
    fn is_rejection(_error: &Self::Error) -> bool {
        false
    }
}

#[async_trait]
impl SigningProvider for LocalWallet {
    type Error = <LocalWallet as Signer>::Error;

    async fn address(&self) -> std::result::Result<Address, Self::Error> {
        Ok(Signer::address(self))
    }

    async fn sign_typed_data(
        &self,
        payload: &ForwardRequestPayload,
    ) -> std::result::Result<Signature, Self::Error> {
        Signer::sign_typed_data(self, payload).await
    }
}

#[async_trait]
impl<S: SigningProvider> SigningProvider for Arc<S> {
    type Error = S::Error;

    async fn address(&self) -> std::result::Result<Address, Self::Error> {
        (**self).address().await
    }

    async fn sign_typed_data(
        &self,
        payload: &ForwardRequestPayload,
    ) -> std::result::Result<Signature, Self::Error> {
        (**self).sign_typed_data(payload).await
    }

    fn is_rejection(error: &Self::Error) -> bool {
        S::is_rejection(error)
    }
}

/// Signs [`ForwardRequest`]s under a fixed forwarder domain, compatible with
/// any implementer of [`SigningProvider`].
///
/// Before anything is signed the address behind the signing capability is
/// resolved and compared with the request's `from`. This catches setups where
/// the address the caller believes is connected and the actual signing
/// provider diverge, e.g. several wallet extensions competing for the page.
#[derive(Clone, Debug)]
pub struct TypedDataSigner<S> {
    signer: S,
    domain: EIP712Domain,
}

impl<S: SigningProvider> TypedDataSigner<S> {
    pub fn new(signer: S, domain: EIP712Domain) -> Self {
        Self { signer, domain }
    }

    /// Returns a reference to the signing capability
    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Returns the domain requests are signed under
    pub fn domain(&self) -> &EIP712Domain {
        &self.domain
    }

    /// Signs the request.
    ///
    /// # Errors
    ///
    /// - [`RelayError::WalletMismatch`] if the signer does not control `request.from`. The signing
    ///   primitive is not called.
    /// - [`RelayError::Configuration`] if the verifying contract or `request.to` is unset.
    /// - [`RelayError::UserRejected`] if the user dismissed the prompt.
    pub async fn sign(&self, request: ForwardRequest) -> Result<SignedRequest> {
        sign_request(&self.signer, self.domain.clone(), request).await
    }
}

/// Verifies the signer's identity and the domain, then signs `request`.
/// See [`TypedDataSigner::sign`].
pub async fn sign_request<S: SigningProvider>(
    signer: &S,
    domain: EIP712Domain,
    request: ForwardRequest,
) -> Result<SignedRequest> {
    let actual = signer.address().await.map_err(signer_error::<S>)?;
    if actual != request.from {
        debug!(target: "signer", expected = ?request.from, ?actual, "signer does not match");
        return Err(RelayError::WalletMismatch { expected: request.from, actual })
    }

    match domain.verifying_contract {
        Some(forwarder) if !forwarder.is_zero() => {}
        _ => return Err(RelayError::Configuration("forwarder address is not set".to_string())),
    }
    if request.to.is_zero() {
        return Err(RelayError::Configuration("target contract address is not set".to_string()))
    }

    let payload = ForwardRequestPayload::new(domain, request);
    trace!(
        target: "signer",
        from = ?payload.request.from,
        nonce = %payload.request.nonce,
        "requesting signature"
    );
    let signature = signer.sign_typed_data(&payload).await.map_err(signer_error::<S>)?;
    Ok(SignedRequest::new(payload, signature))
}

fn signer_error<S: SigningProvider>(err: S::Error) -> RelayError {
    if S::is_rejection(&err) {
        RelayError::UserRejected
    } else {
        RelayError::Signing(err.to_string())
    }
}
