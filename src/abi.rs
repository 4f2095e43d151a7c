//! Calldata encoding for forwarded calls.
//!
//! The forwarder replays `data` verbatim against the target contract, so the
//! encoded arguments must match the target's parameter order and types
//! exactly. A mismatch is not detected on-chain: it silently selects another
//! overload or corrupts the arguments. Encoding is therefore always driven by
//! the human readable signature of the target method and never by guessing
//! types from the values.

use crate::{errors::RelayError, Result};
use ethers_core::{
    abi::{AbiError, AbiParser, Function, Token},
    types::{Bytes, Selector},
};

/// Parses a human readable function signature such as
/// `registerContent(string,string,string)` or
/// `function owner() view returns (address)`.
pub fn parse_function(signature: &str) -> Result<Function> {
    Ok(AbiParser::default().parse_function(signature)?)
}

/// Returns the 4-byte selector of the function described by `signature`
pub fn selector(signature: &str) -> Result<Selector> {
    Ok(parse_function(signature)?.short_signature())
}

/// ABI encodes a call to `signature` with the positional `args`.
///
/// Fails with [`RelayError::Encoding`] if the number or the types of the
/// arguments do not match the signature.
///
/// ```
/// use ethers_core::abi::Token;
/// use ethers_relay::abi::{decode_call, encode_call};
///
/// let args = vec![
///     Token::String("0xabc".into()),
///     Token::String("title".into()),
///     Token::String("".into()),
/// ];
/// let data = encode_call("registerContent(string,string,string)", &args).unwrap();
/// assert_eq!(decode_call("registerContent(string,string,string)", &data).unwrap(), args);
/// ```
pub fn encode_call(signature: &str, args: &[Token]) -> Result<Bytes> {
    let function = parse_function(signature)?;
    encode_function(&function, args)
}

/// Same as [`encode_call`] but for an already parsed [`Function`]
pub fn encode_function(function: &Function, args: &[Token]) -> Result<Bytes> {
    let data = function.encode_input(args).map_err(AbiError::from)?;
    Ok(data.into())
}

/// Decodes calldata produced for `signature` back into its arguments.
///
/// The selector must match, otherwise [`AbiError::WrongSelector`] is returned.
pub fn decode_call(signature: &str, data: &[u8]) -> Result<Vec<Token>> {
    let function = parse_function(signature)?;
    if data.len() < 4 || data[..4] != function.short_signature() {
        return Err(RelayError::Encoding(AbiError::WrongSelector))
    }
    Ok(function.decode_input(&data[4..]).map_err(AbiError::from)?)
}

/// Decodes the return data of a call to `function`
pub fn decode_output(function: &Function, data: &[u8]) -> Result<Vec<Token>> {
    Ok(function.decode_output(data).map_err(AbiError::from)?)
}
