//! dhlink wire protocol
//!
//! Line-oriented messages over a reliable byte stream, plus the drivers
//! that run a key agreement and the encrypted message session on top.
//!
//! - [`message`]: the `Message` enum and its text encoding
//! - [`channel`]: `LineChannel`, one message per line over tokio I/O
//! - [`handshake`]: initiator and responder for both key agreements
//! - [`session`]: `MessageSender` / `MessageReceiver` after the handshake

pub mod channel;
pub mod error;
pub mod handshake;
pub mod message;
pub mod session;
pub mod verbs;

pub use channel::{LineChannel, MAX_LINE_BYTES};
pub use error::SessionError;
pub use handshake::{HandshakeOptions, HandshakeState, confirm_secret, initiate, respond};
pub use message::{Message, decode_hex_lenient, encode_hex};
pub use session::{MessageReceiver, MessageSender, Received};
