//! Handshake drivers.
//!
//! Runs either key agreement over a [`LineChannel`]. The client is always
//! the initiator; the responder learns the variant from the first line.
//!
//! ```text
//! Diffie-Hellman                          RSA transport
//! I ── PARAM p g ──► R                    I ── RSA_PUB n e ──► R
//! I ◄──── ACK ────── R                    I ◄── ENC_SHARE c ── R
//! I ──── PUB A ────► R
//! I ◄─── PUB B ───── R
//! I ── SHARED s ───► R   (optional)
//! I ◄── OK | ERR ─── R
//! ```
//!
//! The `SHARED` step sends the secret itself in cleartext. It is kept only
//! so that older peers interoperate and must not be mistaken for key
//! confirmation; a MAC over a transcript would be the sound replacement.
//!
//! [`respond`] stops once the secret is computed. The responder answers an
//! optional `SHARED` through [`confirm_secret`], which waits for whatever the
//! initiator sends next and so must not run under a handshake deadline.
//!
//! Any failure closes the channel before the error is returned. On success
//! the channel stays open for the message session, which reaches
//! [`HandshakeState::Closed`] on `BYE` or end of stream.

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use dhlink_crypto::{
    DhExchange, DhParameters, ExponentPolicy, KeyAgreement, MAX_DH_MODULUS, PrimePool,
    RsaInitiator, RsaPublicKey, SharedSecret, transport_secret,
};

use crate::channel::LineChannel;
use crate::error::SessionError;
use crate::message::Message;
use crate::verbs::{VERB_ACK, VERB_ENC_SHARE, VERB_PUB};

/// Protocol position, tracked for logging and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    // Diffie-Hellman
    ParamsExchanged,
    PublicsExchanged,
    SecretComputed,
    Verified,
    // RSA transport
    PubKeySent,
    SecretDelivered,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Initiator,
    Responder,
}

/// Handshake knobs. The responder only reads `max_dh_modulus` and follows
/// the initiator for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Echo the Diffie-Hellman secret for comparison (insecure, see module docs).
    pub verify_secret: bool,
    pub exponent_policy: ExponentPolicy,
    /// Largest `PARAM` modulus the responder accepts.
    pub max_dh_modulus: u64,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            verify_secret: true,
            exponent_policy: ExponentPolicy::default(),
            max_dh_modulus: MAX_DH_MODULUS,
        }
    }
}

struct Progress {
    role: Role,
    state: HandshakeState,
}

impl Progress {
    const fn new(role: Role) -> Self {
        Self::resume(role, HandshakeState::Init)
    }

    const fn resume(role: Role, state: HandshakeState) -> Self {
        Self { role, state }
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!(role = ?self.role, from = ?self.state, to = ?next, "Handshake state change");
        self.state = next;
    }

    fn unexpected(&self, expected: &str, got: &Message) -> SessionError {
        SessionError::Protocol(format!(
            "expected {expected} in state {:?}, got {}",
            self.state,
            got.verb()
        ))
    }
}

/// Run the initiator side of `agreement` and return the shared secret.
pub async fn initiate<R, W, G>(
    chan: &mut LineChannel<R, W>,
    agreement: KeyAgreement,
    pool: &PrimePool,
    rng: &mut G,
    options: &HandshakeOptions,
) -> Result<SharedSecret, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: Rng + ?Sized,
{
    info!(%agreement, "Starting handshake as initiator");
    let mut progress = Progress::new(Role::Initiator);
    let result = match agreement {
        KeyAgreement::DiffieHellman => {
            initiate_dh(chan, &mut progress, pool, rng, options).await
        }
        KeyAgreement::RsaKeyTransport => {
            initiate_rsa(chan, &mut progress, pool, rng, options).await
        }
    };
    close_on_error(chan, &mut progress, result).await
}

/// Run the responder side, detecting the variant from the first message.
///
/// Returns as soon as the secret is known. Follow up with
/// [`confirm_secret`] before reading session messages.
pub async fn respond<R, W, G>(
    chan: &mut LineChannel<R, W>,
    pool: &PrimePool,
    rng: &mut G,
    options: &HandshakeOptions,
) -> Result<(KeyAgreement, SharedSecret), SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: Rng + ?Sized,
{
    let mut progress = Progress::new(Role::Responder);
    let result = async {
        match chan.expect().await? {
            Message::Param { modulus, generator } => {
                info!(modulus, generator, "Peer proposed Diffie-Hellman");
                let params = DhParameters::with_limit(modulus, generator, options.max_dh_modulus)?;
                let secret = respond_dh(chan, &mut progress, params, pool, rng).await?;
                Ok((KeyAgreement::DiffieHellman, secret))
            }
            Message::RsaPub { modulus, exponent } => {
                info!(modulus, exponent, "Peer proposed RSA transport");
                let secret =
                    respond_rsa(chan, &mut progress, modulus, exponent, pool, rng).await?;
                Ok((KeyAgreement::RsaKeyTransport, secret))
            }
            other => Err(progress.unexpected("PARAM or RSA_PUB", &other)),
        }
    }
    .await;
    close_on_error(chan, &mut progress, result).await
}

/// Answer the initiator's optional `SHARED` echo after a Diffie-Hellman
/// handshake.
///
/// Reads the next line: `SHARED` is compared with `secret` and answered with
/// `OK` or `ERR`; anything else belongs to the message session and is pushed
/// back onto the channel. RSA transport has no echo step.
pub async fn confirm_secret<R, W>(
    chan: &mut LineChannel<R, W>,
    agreement: KeyAgreement,
    secret: &SharedSecret,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if agreement != KeyAgreement::DiffieHellman {
        return Ok(());
    }
    let mut progress = Progress::resume(Role::Responder, HandshakeState::SecretComputed);
    let result = async {
        match chan.recv().await? {
            Some(Message::Shared(claimed)) => {
                if secret.matches(claimed) {
                    chan.send(&Message::Confirm).await?;
                    progress.advance(HandshakeState::Verified);
                } else {
                    chan.send(&Message::Reject).await?;
                    return Err(SessionError::SecretMismatch);
                }
            }
            Some(other) => {
                debug!(verb = other.verb(), "Peer skipped secret verification");
                chan.unread(other);
            }
            None => {}
        }
        Ok(())
    }
    .await;
    close_on_error(chan, &mut progress, result).await
}

async fn close_on_error<R, W, T>(
    chan: &mut LineChannel<R, W>,
    progress: &mut Progress,
    result: Result<T, SessionError>,
) -> Result<T, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = &result {
        warn!(error = %e, state = ?progress.state, "Handshake failed, closing channel");
        progress.advance(HandshakeState::Closed);
        if let Err(close_err) = chan.close().await {
            debug!(error = %close_err, "Channel close after failure also failed");
        }
    }
    result
}

async fn initiate_dh<R, W, G>(
    chan: &mut LineChannel<R, W>,
    progress: &mut Progress,
    pool: &PrimePool,
    rng: &mut G,
    options: &HandshakeOptions,
) -> Result<SharedSecret, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: Rng + ?Sized,
{
    let params = DhParameters::generate(pool, rng)?;
    info!(
        modulus = params.modulus(),
        generator = params.generator(),
        "Using DH parameters"
    );
    chan.send(&Message::Param {
        modulus: params.modulus(),
        generator: params.generator(),
    })
    .await?;
    match chan.expect().await? {
        Message::Ack => progress.advance(HandshakeState::ParamsExchanged),
        other => return Err(progress.unexpected(VERB_ACK, &other)),
    }

    let exchange = DhExchange::new(params, pool, rng)?;
    debug!(public = exchange.public_value(), "Computed public value");
    chan.send(&Message::Pub(exchange.public_value())).await?;
    let peer_public = match chan.expect().await? {
        Message::Pub(v) => v,
        other => return Err(progress.unexpected(VERB_PUB, &other)),
    };
    debug!(peer_public, "Received peer public value");
    progress.advance(HandshakeState::PublicsExchanged);

    let secret = exchange.complete(peer_public)?;
    progress.advance(HandshakeState::SecretComputed);

    if options.verify_secret {
        chan.send(&Message::Shared(secret.value())).await?;
        match chan.expect().await? {
            Message::Confirm => progress.advance(HandshakeState::Verified),
            Message::Reject => return Err(SessionError::SecretMismatch),
            other => return Err(progress.unexpected("OK or ERR", &other)),
        }
    }

    info!("Diffie-Hellman handshake complete");
    Ok(secret)
}

async fn respond_dh<R, W, G>(
    chan: &mut LineChannel<R, W>,
    progress: &mut Progress,
    params: DhParameters,
    pool: &PrimePool,
    rng: &mut G,
) -> Result<SharedSecret, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: Rng + ?Sized,
{
    chan.send(&Message::Ack).await?;
    progress.advance(HandshakeState::ParamsExchanged);

    let peer_public = match chan.expect().await? {
        Message::Pub(v) => v,
        other => return Err(progress.unexpected(VERB_PUB, &other)),
    };
    debug!(peer_public, "Received peer public value");

    let exchange = DhExchange::new(params, pool, rng)?;
    debug!(public = exchange.public_value(), "Computed public value");
    chan.send(&Message::Pub(exchange.public_value())).await?;
    progress.advance(HandshakeState::PublicsExchanged);

    let secret = exchange.complete(peer_public)?;
    progress.advance(HandshakeState::SecretComputed);

    info!("Diffie-Hellman handshake complete");
    Ok(secret)
}

async fn initiate_rsa<R, W, G>(
    chan: &mut LineChannel<R, W>,
    progress: &mut Progress,
    pool: &PrimePool,
    rng: &mut G,
    options: &HandshakeOptions,
) -> Result<SharedSecret, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: Rng + ?Sized,
{
    let initiator = RsaInitiator::new(pool, rng, options.exponent_policy)?;
    let public = initiator.public_key();
    info!(
        modulus = public.modulus(),
        exponent = public.exponent(),
        "Sending RSA public key"
    );
    chan.send(&Message::RsaPub {
        modulus: public.modulus(),
        exponent: public.exponent(),
    })
    .await?;
    progress.advance(HandshakeState::PubKeySent);

    let ciphertext = match chan.expect().await? {
        Message::EncShare(c) => c,
        other => return Err(progress.unexpected(VERB_ENC_SHARE, &other)),
    };
    let secret = initiator.complete(ciphertext)?;
    progress.advance(HandshakeState::SecretDelivered);

    info!("RSA transport handshake complete");
    Ok(secret)
}

async fn respond_rsa<R, W, G>(
    chan: &mut LineChannel<R, W>,
    progress: &mut Progress,
    modulus: u64,
    exponent: u64,
    pool: &PrimePool,
    rng: &mut G,
) -> Result<SharedSecret, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: Rng + ?Sized,
{
    let public = RsaPublicKey::new(modulus, exponent)?;
    progress.advance(HandshakeState::PubKeySent);

    let (secret, ciphertext) = transport_secret(&public, pool, rng)?;
    chan.send(&Message::EncShare(ciphertext)).await?;
    progress.advance(HandshakeState::SecretDelivered);

    info!("RSA transport handshake complete");
    Ok(secret)
}
