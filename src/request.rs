//! The `ForwardRequest` struct consumed by `MinimalForwarder` and its EIP-712
//! encoding.

use ethers_core::{
    abi::{encode, Token},
    types::{
        transaction::eip712::{EIP712Domain, Eip712, Eip712Error, TypedData},
        Address, Bytes, Signature, U256,
    },
    utils::keccak256,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Name of the forwarder's EIP-712 signing domain
pub const FORWARDER_NAME: &str = "MinimalForwarder";

/// Version of the forwarder's EIP-712 signing domain
pub const FORWARDER_VERSION: &str = "1.0.0";

/// Gas forwarded to the target call unless specified otherwise
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

/// Primary type name of the forwarded request
pub const FORWARD_REQUEST_TYPE: &str =
    "ForwardRequest(address from,address to,uint256 value,uint256 gas,uint256 nonce,bytes data)";

/// A call to be executed by the forwarder on behalf of `from`.
///
/// `to` is the target contract whose method is invoked, not the forwarder.
/// The field names and their order are part of the wire contract with the
/// forwarder and must not be altered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: U256,
    pub nonce: U256,
    pub data: Bytes,
}

impl ForwardRequest {
    /// Starts building a request with the default gas limit and zero value
    pub fn builder(
        from: Address,
        to: Address,
        data: impl Into<Bytes>,
        nonce: impl Into<U256>,
    ) -> ForwardRequestBuilder {
        ForwardRequestBuilder {
            from,
            to,
            data: data.into(),
            nonce: nonce.into(),
            gas: U256::from(DEFAULT_GAS_LIMIT),
            value: U256::zero(),
        }
    }

    /// `keccak256` of [`FORWARD_REQUEST_TYPE`]
    pub fn type_hash() -> [u8; 32] {
        keccak256(FORWARD_REQUEST_TYPE)
    }

    /// EIP-712 `hashStruct` of this request
    pub fn struct_hash(&self) -> [u8; 32] {
        let tokens = [
            Token::Uint(U256::from(Self::type_hash())),
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::Uint(self.gas),
            Token::Uint(self.nonce),
            Token::Uint(U256::from(keccak256(&self.data))),
        ];
        keccak256(encode(&tokens))
    }
}

/// Assembles a [`ForwardRequest`]. Performs no validation beyond types, the
/// `from` address is checked when the request is signed.
#[derive(Clone, Debug)]
#[must_use]
pub struct ForwardRequestBuilder {
    from: Address,
    to: Address,
    data: Bytes,
    nonce: U256,
    gas: U256,
    value: U256,
}

impl ForwardRequestBuilder {
    /// Sets the gas limit forwarded to the target call
    pub fn gas(mut self, gas: impl Into<U256>) -> Self {
        self.gas = gas.into();
        self
    }

    /// Sets the wei value forwarded to the target call
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = value.into();
        self
    }

    pub fn build(self) -> ForwardRequest {
        let ForwardRequestBuilder { from, to, data, nonce, gas, value } = self;
        ForwardRequest { from, to, value, gas, nonce, data }
    }
}

/// Returns the forwarder's signing domain on `chain_id`.
///
/// The verifying contract is the forwarder itself, never the target contract.
pub fn forwarder_domain(chain_id: u64, forwarder: Address) -> EIP712Domain {
    EIP712Domain {
        name: Some(FORWARDER_NAME.to_string()),
        version: Some(FORWARDER_VERSION.to_string()),
        chain_id: Some(chain_id.into()),
        verifying_contract: Some(forwarder),
        salt: None,
    }
}

/// A [`ForwardRequest`] bound to the domain it is signed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardRequestPayload {
    pub domain: EIP712Domain,
    pub request: ForwardRequest,
}

impl ForwardRequestPayload {
    pub fn new(domain: EIP712Domain, request: ForwardRequest) -> Self {
        Self { domain, request }
    }

    /// Converts the payload into the JSON document expected by
    /// `eth_signTypedData_v4`, for wallets that sign in the browser.
    pub fn to_typed_data(&self) -> Result<TypedData, Eip712Error> {
        let ForwardRequest { from, to, value, gas, nonce, data } = &self.request;
        let typed = json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "ForwardRequest": [
                    { "name": "from", "type": "address" },
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "gas", "type": "uint256" },
                    { "name": "nonce", "type": "uint256" },
                    { "name": "data", "type": "bytes" }
                ]
            },
            "primaryType": "ForwardRequest",
            "domain": self.domain,
            "message": {
                "from": from,
                "to": to,
                "value": value.to_string(),
                "gas": gas.to_string(),
                "nonce": nonce.to_string(),
                "data": data
            }
        });
        Ok(serde_json::from_value(typed)?)
    }
}

impl Eip712 for ForwardRequestPayload {
    type Error = Eip712Error;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(self.domain.clone())
    }

    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(ForwardRequest::type_hash())
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        Ok(self.request.struct_hash())
    }
}

/// A forward request together with its signature. Immutable, any change to
/// the request requires a new signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    payload: ForwardRequestPayload,
    signature: Signature,
}

impl SignedRequest {
    pub(crate) fn new(payload: ForwardRequestPayload, signature: Signature) -> Self {
        Self { payload, signature }
    }

    pub fn request(&self) -> &ForwardRequest {
        &self.payload.request
    }

    pub fn domain(&self) -> &EIP712Domain {
        &self.payload.domain
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The signer address
    pub fn signer(&self) -> Address {
        self.payload.request.from
    }

    /// The 65-byte signature as `0x` prefixed hex, the format the relayer expects
    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature.to_vec()))
    }

    /// Recovers the address that produced the signature
    pub fn recover(&self) -> Result<Address, ethers_core::types::SignatureError> {
        self.signature.recover_typed_data(&self.payload)
    }
}
