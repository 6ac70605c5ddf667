//! Wire messages.
//!
//! One message per line: an upper-case verb followed by space-separated
//! arguments. Integers are unsigned decimal; encrypted payloads are hex,
//! two digits per byte, accepted in either case and emitted in lower case.

use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;
use crate::verbs::{
    VERB_ACK, VERB_BYE, VERB_ENC_SHARE, VERB_ERR, VERB_IV, VERB_MSG, VERB_OK, VERB_PARAM,
    VERB_PUB, VERB_RSA_PUB, VERB_SHARED,
};

/// A single protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Param { modulus: u64, generator: u64 },
    Ack,
    Pub(u64),
    Shared(u64),
    /// `OK`
    Confirm,
    /// `ERR`
    Reject,
    RsaPub { modulus: u64, exponent: u64 },
    EncShare(u64),
    Iv(u8),
    Msg(Vec<u8>),
    Bye,
}

impl Message {
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Param { .. } => VERB_PARAM,
            Self::Ack => VERB_ACK,
            Self::Pub(_) => VERB_PUB,
            Self::Shared(_) => VERB_SHARED,
            Self::Confirm => VERB_OK,
            Self::Reject => VERB_ERR,
            Self::RsaPub { .. } => VERB_RSA_PUB,
            Self::EncShare(_) => VERB_ENC_SHARE,
            Self::Iv(_) => VERB_IV,
            Self::Msg(_) => VERB_MSG,
            Self::Bye => VERB_BYE,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb();
        match self {
            Self::Param { modulus, generator } => write!(f, "{verb} {modulus} {generator}"),
            Self::RsaPub { modulus, exponent } => write!(f, "{verb} {modulus} {exponent}"),
            Self::Pub(v) | Self::Shared(v) | Self::EncShare(v) => write!(f, "{verb} {v}"),
            Self::Iv(v) => write!(f, "{verb} {v}"),
            Self::Msg(bytes) if bytes.is_empty() => f.write_str(verb),
            Self::Msg(bytes) => write!(f, "{verb} {}", encode_hex(bytes)),
            Self::Ack | Self::Confirm | Self::Reject | Self::Bye => f.write_str(verb),
        }
    }
}

impl FromStr for Message {
    type Err = SessionError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_ascii_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| SessionError::Protocol("empty line".into()))?;
        let args: Vec<&str> = parts.collect();

        let msg = match verb {
            VERB_PARAM => {
                let [p, g] = expect_args::<2>(verb, &args)?;
                Self::Param {
                    modulus: parse_uint(verb, p)?,
                    generator: parse_uint(verb, g)?,
                }
            }
            VERB_RSA_PUB => {
                let [n, e] = expect_args::<2>(verb, &args)?;
                Self::RsaPub {
                    modulus: parse_uint(verb, n)?,
                    exponent: parse_uint(verb, e)?,
                }
            }
            VERB_PUB => Self::Pub(parse_single(verb, &args)?),
            VERB_SHARED => Self::Shared(parse_single(verb, &args)?),
            VERB_ENC_SHARE => Self::EncShare(parse_single(verb, &args)?),
            VERB_IV => Self::Iv(parse_single(verb, &args)?),
            VERB_MSG => match args.as_slice() {
                [] => Self::Msg(Vec::new()),
                [payload] => Self::Msg(hex::decode(payload).map_err(|e| {
                    SessionError::Protocol(format!("{verb}: bad hex payload: {e}"))
                })?),
                _ => return Err(arity_error(verb, 1, args.len())),
            },
            VERB_ACK | VERB_OK | VERB_ERR | VERB_BYE => {
                expect_args::<0>(verb, &args)?;
                match verb {
                    VERB_ACK => Self::Ack,
                    VERB_OK => Self::Confirm,
                    VERB_ERR => Self::Reject,
                    _ => Self::Bye,
                }
            }
            other => return Err(SessionError::Protocol(format!("unknown verb '{other}'"))),
        };
        Ok(msg)
    }
}

fn arity_error(verb: &str, expected: usize, actual: usize) -> SessionError {
    SessionError::Protocol(format!(
        "{verb}: expected {expected} argument(s), got {actual}"
    ))
}

fn expect_args<'a, const N: usize>(
    verb: &str,
    args: &[&'a str],
) -> Result<[&'a str; N], SessionError> {
    <[&str; N]>::try_from(args).map_err(|_| arity_error(verb, N, args.len()))
}

fn parse_single<T: FromStr>(verb: &str, args: &[&str]) -> Result<T, SessionError> {
    let [raw] = expect_args::<1>(verb, args)?;
    parse_uint(verb, raw)
}

/// Digits only: no sign, no whitespace, no radix prefix.
fn parse_uint<T: FromStr>(verb: &str, raw: &str) -> Result<T, SessionError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SessionError::Protocol(format!(
            "{verb}: '{raw}' is not an unsigned decimal integer"
        )));
    }
    raw.parse()
        .map_err(|_| SessionError::Protocol(format!("{verb}: '{raw}' is out of range")))
}

/// Lower-case hex, two digits per byte.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex without failing: odd-length or non-hex input yields an empty
/// vector. The wire parser uses the strict path instead.
pub fn decode_hex_lenient(text: &str) -> Vec<u8> {
    hex::decode(text).unwrap_or_default()
}
