//! `dhlink connect`: handshake with a server and send stdin line by line.

use std::time::Duration;

use anyhow::{Context, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use dhlink_core::Config;
use dhlink_crypto::{CipherMode, KeyAgreement, PrimePool};
use dhlink_proto::{HandshakeOptions, LineChannel, MessageSender, initiate};

use crate::settings;

/// Typed at the prompt to end the session.
pub const QUIT_COMMAND: &str = "/quit";

/// Everything the initiator needs besides the channel and its input.
#[derive(Debug, Clone)]
pub struct ClientPlan {
    pub agreement: KeyAgreement,
    pub mode: CipherMode,
    pub options: HandshakeOptions,
    pub handshake_timeout: Duration,
}

impl ClientPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            agreement: settings::key_agreement(config.handshake.agreement),
            mode: settings::cipher_mode(config.cipher.mode),
            options: settings::handshake_options(&config.handshake),
            handshake_timeout: settings::handshake_timeout(config),
        }
    }
}

/// Connect to the configured server and stream stdin to it.
pub async fn run(config: &Config, pool: &PrimePool) -> anyhow::Result<u64> {
    let addr = settings::address(config);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    info!(%addr, "Connected");

    let input = BufReader::new(tokio::io::stdin());
    run_session(
        LineChannel::from_tcp(stream),
        input,
        pool,
        &ClientPlan::from_config(config),
    )
    .await
}

/// Initiator handshake, then one `MSG` per input line until `/quit` or
/// end of input. Returns the number of messages sent.
pub async fn run_session<R, W, I>(
    mut chan: LineChannel<R, W>,
    input: I,
    pool: &PrimePool,
    plan: &ClientPlan,
) -> anyhow::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
{
    let mut rng = StdRng::from_entropy();
    let secret = tokio::time::timeout(
        plan.handshake_timeout,
        initiate(&mut chan, plan.agreement, pool, &mut rng, &plan.options),
    )
    .await
    .map_err(|_| anyhow!("Handshake timed out after {:?}", plan.handshake_timeout))??;
    info!(agreement = %plan.agreement, "Handshake complete");

    let mut sender = MessageSender::open(&mut chan, secret, plan.mode, &mut rng).await?;
    debug!(key = sender.codec().key().bits(), "Derived cipher key");
    info!("Type messages, {QUIT_COMMAND} to finish");

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line == QUIT_COMMAND {
            break;
        }
        sender.send(&mut chan, line.as_bytes()).await?;
        debug!(len = line.len(), "Sent message");
    }

    Ok(sender.finish(&mut chan).await?)
}
