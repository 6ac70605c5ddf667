//! Encrypted message stream after the handshake.
//!
//! The initiator announces CBC by sending `IV v` before its first `MSG`.
//! Until an `IV` arrives the receiver decrypts in ECB. `BYE` or end of
//! stream ends the session and moves the link to
//! [`HandshakeState::Closed`].

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use dhlink_crypto::{Chaining, CipherMode, SessionCodec, SharedSecret, generate_iv};

use crate::channel::LineChannel;
use crate::error::SessionError;
use crate::handshake::HandshakeState;
use crate::message::Message;

/// Sending half of a message session.
#[derive(Debug)]
pub struct MessageSender {
    codec: SessionCodec,
    sent: u64,
}

impl MessageSender {
    /// Key the codec from `secret`. In CBC mode a fresh IV is drawn and
    /// announced to the peer before returning.
    pub async fn open<R, W, G>(
        chan: &mut LineChannel<R, W>,
        secret: SharedSecret,
        mode: CipherMode,
        rng: &mut G,
    ) -> Result<Self, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        G: Rng + ?Sized,
    {
        let chaining = match mode {
            CipherMode::Ecb => Chaining::Ecb,
            CipherMode::Cbc => {
                let iv = generate_iv(rng);
                chan.send(&Message::Iv(iv)).await?;
                debug!(iv, "Announced CBC initialization vector");
                Chaining::Cbc { iv }
            }
        };
        let codec = SessionCodec::new(secret, chaining);
        info!(mode = ?codec.mode(), "Message session open");
        Ok(Self { codec, sent: 0 })
    }

    pub const fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Encrypt `plaintext` and send it as one `MSG` line.
    pub async fn send<R, W>(
        &mut self,
        chan: &mut LineChannel<R, W>,
        plaintext: &[u8],
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ciphertext = self.codec.encrypt(plaintext);
        chan.send(&Message::Msg(ciphertext)).await?;
        self.sent += 1;
        Ok(())
    }

    /// Send `BYE` and shut down the write half. Returns the message count.
    pub async fn finish<R, W>(self, chan: &mut LineChannel<R, W>) -> Result<u64, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        chan.send(&Message::Bye).await?;
        chan.close().await?;
        debug!(to = ?HandshakeState::Closed, "Link state change");
        info!(sent = self.sent, "Message session closed");
        Ok(self.sent)
    }
}

/// A decrypted message together with what came over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub ciphertext: Vec<u8>,
    pub plaintext: Vec<u8>,
}

impl Received {
    /// Plaintext as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.plaintext).into_owned()
    }
}

/// Receiving half of a message session.
#[derive(Debug)]
pub struct MessageReceiver {
    codec: SessionCodec,
    received: u64,
    state: Option<HandshakeState>,
}

impl MessageReceiver {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            codec: SessionCodec::new(secret, Chaining::Ecb),
            received: 0,
            state: None,
        }
    }

    /// `Some(Closed)` once the peer has ended the session.
    pub const fn state(&self) -> Option<HandshakeState> {
        self.state
    }

    fn close(&mut self) {
        debug!(to = ?HandshakeState::Closed, "Link state change");
        self.state = Some(HandshakeState::Closed);
    }

    pub const fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    pub const fn received(&self) -> u64 {
        self.received
    }

    /// Wait for the next message. `Ok(None)` once the peer says `BYE` or
    /// closes the stream.
    pub async fn next_message<R, W>(
        &mut self,
        chan: &mut LineChannel<R, W>,
    ) -> Result<Option<Received>, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.state.is_some() {
            return Ok(None);
        }
        loop {
            match chan.recv().await? {
                Some(Message::Iv(iv)) => {
                    debug!(iv, "Peer switched to CBC");
                    self.codec.set_chaining(Chaining::Cbc { iv });
                }
                Some(Message::Msg(ciphertext)) => {
                    let plaintext = self.codec.decrypt(&ciphertext);
                    self.received += 1;
                    return Ok(Some(Received {
                        ciphertext,
                        plaintext,
                    }));
                }
                Some(Message::Bye) => {
                    info!(received = self.received, "Peer ended the session");
                    self.close();
                    return Ok(None);
                }
                None => {
                    info!(received = self.received, "Peer closed without BYE");
                    self.close();
                    return Ok(None);
                }
                Some(other) => {
                    return Err(SessionError::Protocol(format!(
                        "unexpected {} during message session",
                        other.verb()
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dhlink_crypto::{KeyAgreement, PrimePool, perform_key_exchange, test_codec_pair};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

    use super::*;

    type TestChannel = LineChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair() -> (TestChannel, TestChannel) {
        let (a, b) = duplex(64 * 1024);
        let (ar, aw) = split(a);
        let (br, bw) = split(b);
        (LineChannel::new(ar, aw), LineChannel::new(br, bw))
    }

    #[tokio::test]
    async fn cbc_session_announces_iv_and_decrypts() {
        let (mut tx, mut rx) = pair();
        let mut rng = StdRng::seed_from_u64(1);

        let mut sender =
            MessageSender::open(&mut tx, SharedSecret::new(709), CipherMode::Cbc, &mut rng)
                .await
                .unwrap();
        sender.send(&mut tx, b"hello").await.unwrap();
        sender.send(&mut tx, b"hello").await.unwrap();
        assert_eq!(sender.finish(&mut tx).await.unwrap(), 2);

        let mut receiver = MessageReceiver::new(SharedSecret::new(709));
        let first = receiver.next_message(&mut rx).await.unwrap().unwrap();
        let second = receiver.next_message(&mut rx).await.unwrap().unwrap();
        assert_eq!(first.text(), "hello");
        // every message restarts from the session IV
        assert_eq!(first.ciphertext, second.ciphertext);
        assert_eq!(receiver.codec().mode(), CipherMode::Cbc);
        assert!(receiver.next_message(&mut rx).await.unwrap().is_none());
        assert_eq!(receiver.received(), 2);
        assert_eq!(receiver.state(), Some(HandshakeState::Closed));
    }

    #[tokio::test]
    async fn session_keyed_from_agreed_secrets() {
        let (mut tx, mut rx) = pair();
        let mut rng = StdRng::seed_from_u64(3);
        let pool = PrimePool::from(vec![101, 103, 107, 109, 113]);
        let (ours, theirs) =
            perform_key_exchange(KeyAgreement::RsaKeyTransport, &pool, &mut rng).unwrap();

        let mut sender = MessageSender::open(&mut tx, ours, CipherMode::Cbc, &mut rng)
            .await
            .unwrap();
        sender.send(&mut tx, b"over rsa").await.unwrap();
        sender.finish(&mut tx).await.unwrap();

        let mut receiver = MessageReceiver::new(theirs);
        let got = receiver.next_message(&mut rx).await.unwrap().unwrap();
        assert_eq!(got.text(), "over rsa");
    }

    #[tokio::test]
    async fn receiver_matches_a_standalone_codec() {
        let (mut tx, mut rx) = pair();
        let (sealer, _) = test_codec_pair(0x155, Chaining::Cbc { iv: 0x3c });
        tx.send(&Message::Iv(0x3c)).await.unwrap();
        tx.send(&Message::Msg(sealer.encrypt(b"abc"))).await.unwrap();

        let mut receiver = MessageReceiver::new(SharedSecret::new(0x155));
        let got = receiver.next_message(&mut rx).await.unwrap().unwrap();
        assert_eq!(got.plaintext, b"abc");
    }

    #[tokio::test]
    async fn ecb_session_sends_no_iv() {
        let (mut tx, mut rx) = pair();
        let mut rng = StdRng::seed_from_u64(2);

        let mut sender =
            MessageSender::open(&mut tx, SharedSecret::new(0x2c5), CipherMode::Ecb, &mut rng)
                .await
                .unwrap();
        sender.send(&mut tx, b"hello").await.unwrap();

        assert_eq!(
            rx.expect().await.unwrap(),
            Message::Msg(vec![0xfc, 0x64, 0x59, 0x59, 0xdd])
        );
    }

    #[tokio::test]
    async fn eof_without_bye_ends_session() {
        let (mut tx, mut rx) = pair();
        tx.close().await.unwrap();
        let mut receiver = MessageReceiver::new(SharedSecret::new(1));
        assert_eq!(receiver.state(), None);
        assert!(receiver.next_message(&mut rx).await.unwrap().is_none());
        assert_eq!(receiver.state(), Some(HandshakeState::Closed));
        // a closed session stays closed
        assert!(receiver.next_message(&mut rx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handshake_verb_mid_session_is_protocol_error() {
        let (mut tx, mut rx) = pair();
        tx.send(&Message::Pub(3)).await.unwrap();
        let mut receiver = MessageReceiver::new(SharedSecret::new(1));
        assert!(matches!(
            receiver.next_message(&mut rx).await,
            Err(SessionError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn empty_message_decrypts_to_empty() {
        let (mut tx, mut rx) = pair();
        tx.send(&Message::Msg(Vec::new())).await.unwrap();
        let mut receiver = MessageReceiver::new(SharedSecret::new(1));
        let got = receiver.next_message(&mut rx).await.unwrap().unwrap();
        assert!(got.plaintext.is_empty());
    }
}
