//! `dhlink serve`: accept one client and print what it sends.

use std::time::Duration;

use anyhow::{Context, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info};

use dhlink_core::Config;
use dhlink_crypto::{CipherMode, KeyAgreement, PrimePool};
use dhlink_proto::{
    HandshakeOptions, LineChannel, MessageReceiver, confirm_secret, encode_hex, respond,
};

use crate::settings;

/// What a finished session looked like from the server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub agreement: KeyAgreement,
    pub mode: CipherMode,
    pub messages: Vec<String>,
}

/// Responder settings taken from the config.
#[derive(Debug, Clone)]
pub struct ServerPlan {
    pub options: HandshakeOptions,
    pub handshake_timeout: Duration,
}

impl ServerPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            options: settings::handshake_options(&config.handshake),
            handshake_timeout: settings::handshake_timeout(config),
        }
    }
}

/// Bind, accept a single client and run its session to completion.
pub async fn run(config: &Config, pool: &PrimePool) -> anyhow::Result<SessionSummary> {
    let addr = settings::address(config);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "Listening for one client");

    let (stream, peer) = listener.accept().await?;
    info!(%peer, "Client connected");
    let summary = serve_connection(
        LineChannel::from_tcp(stream),
        pool,
        &ServerPlan::from_config(config),
    )
    .await?;
    info!(%peer, received = summary.messages.len(), "Client session finished");
    Ok(summary)
}

/// Responder handshake followed by the receive loop.
///
/// Only the key agreement runs under the handshake timeout. The optional
/// secret echo and everything after it wait on the user at the other end.
pub async fn serve_connection<R, W>(
    mut chan: LineChannel<R, W>,
    pool: &PrimePool,
    plan: &ServerPlan,
) -> anyhow::Result<SessionSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rng = StdRng::from_entropy();
    let (agreement, secret) = tokio::time::timeout(
        plan.handshake_timeout,
        respond(&mut chan, pool, &mut rng, &plan.options),
    )
    .await
    .map_err(|_| anyhow!("Handshake timed out after {:?}", plan.handshake_timeout))??;
    confirm_secret(&mut chan, agreement, &secret).await?;

    let mut receiver = MessageReceiver::new(secret);
    info!(%agreement, "Handshake complete");
    debug!(key = receiver.codec().key().bits(), "Derived cipher key");

    let mut messages = Vec::new();
    while let Some(received) = receiver.next_message(&mut chan).await? {
        let text = received.text();
        info!(
            ciphertext = %encode_hex(&received.ciphertext),
            text = %text,
            "Received message"
        );
        messages.push(text);
    }

    Ok(SessionSummary {
        agreement,
        mode: receiver.codec().mode(),
        messages,
    })
}
