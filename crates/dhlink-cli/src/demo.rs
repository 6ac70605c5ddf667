//! `dhlink demo`: both roles in one process.
//!
//! By default each key agreement runs over an in-memory pipe through the
//! real protocol drivers and carries one sample message. `--fixed` instead
//! performs the textbook exchange over p=23, g=5 without any channel.

use anyhow::anyhow;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{duplex, split};
use tracing::{info, warn};

use dhlink_crypto::{
    Chaining, CipherKey, CipherMode, DhExchange, DhParameters, KeyAgreement, PrimePool,
    SessionCodec, generate_iv,
};
use dhlink_proto::{
    HandshakeOptions, LineChannel, MessageReceiver, MessageSender, SessionError, confirm_secret,
    encode_hex, initiate, respond,
};

pub const SAMPLE_MESSAGE: &str = "Hello from the dhlink demo";

const FIXED_MODULUS: u64 = 23;
const FIXED_GENERATOR: u64 = 5;
const PIPE_CAPACITY: usize = 64 * 1024;

/// Outcome of one demo run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub agreement: KeyAgreement,
    pub initiator_secret: u64,
    pub responder_secret: u64,
    pub ciphertext: Vec<u8>,
    pub decrypted: String,
}

impl DemoReport {
    pub const fn secrets_match(&self) -> bool {
        self.initiator_secret == self.responder_secret
    }

    fn log(&self) {
        info!(
            agreement = %self.agreement,
            initiator_secret = self.initiator_secret,
            responder_secret = self.responder_secret,
            key = CipherKey::from_secret(self.initiator_secret).bits(),
            "Shared secrets"
        );
        info!(
            ciphertext = %encode_hex(&self.ciphertext),
            decrypted = %self.decrypted,
            "Sample message"
        );
        if self.secrets_match() {
            info!("Success: shared secrets match");
        } else {
            warn!("Shared secrets differ");
        }
    }
}

/// Run the demo and return one report per key agreement performed.
pub async fn run(
    pool: &PrimePool,
    fixed: bool,
    mode: CipherMode,
) -> anyhow::Result<Vec<DemoReport>> {
    let mut rng = StdRng::from_entropy();
    let reports = if fixed {
        vec![textbook_exchange(pool, &mut rng, mode)?]
    } else {
        let mut reports = Vec::with_capacity(2);
        for agreement in [KeyAgreement::DiffieHellman, KeyAgreement::RsaKeyTransport] {
            reports.push(wire_exchange(agreement, pool, mode, &mut rng).await?);
        }
        reports
    };

    for report in &reports {
        report.log();
    }
    if reports.iter().all(DemoReport::secrets_match) {
        Ok(reports)
    } else {
        Err(anyhow!("Demo produced mismatched secrets"))
    }
}

/// Private values from the pool, fixed public parameters.
fn textbook_exchange(
    pool: &PrimePool,
    rng: &mut StdRng,
    mode: CipherMode,
) -> anyhow::Result<DemoReport> {
    let params = DhParameters::new(FIXED_MODULUS, FIXED_GENERATOR)?;
    info!(
        modulus = FIXED_MODULUS,
        generator = FIXED_GENERATOR,
        "Using fixed DH parameters"
    );

    let alice = DhExchange::new(params, pool, rng)?;
    let bob = DhExchange::new(params, pool, rng)?;
    info!(
        alice_public = alice.public_value(),
        bob_public = bob.public_value(),
        "Public values"
    );
    let (alice_public, bob_public) = (alice.public_value(), bob.public_value());
    let alice_secret = alice.complete(bob_public)?;
    let bob_secret = bob.complete(alice_public)?;

    let chaining = match mode {
        CipherMode::Ecb => Chaining::Ecb,
        CipherMode::Cbc => Chaining::Cbc {
            iv: generate_iv(rng),
        },
    };
    let (initiator_secret, responder_secret) = (alice_secret.value(), bob_secret.value());
    let sealer = SessionCodec::new(alice_secret, chaining);
    let opener = SessionCodec::new(bob_secret, chaining);
    let ciphertext = sealer.encrypt(SAMPLE_MESSAGE.as_bytes());
    let decrypted = String::from_utf8_lossy(&opener.decrypt(&ciphertext)).into_owned();

    Ok(DemoReport {
        agreement: KeyAgreement::DiffieHellman,
        initiator_secret,
        responder_secret,
        ciphertext,
        decrypted,
    })
}

/// Both drivers over an in-memory pipe, one message from initiator to
/// responder.
async fn wire_exchange(
    agreement: KeyAgreement,
    pool: &PrimePool,
    mode: CipherMode,
    rng: &mut StdRng,
) -> anyhow::Result<DemoReport> {
    let (a, b) = duplex(PIPE_CAPACITY);
    let (ar, aw) = split(a);
    let (br, bw) = split(b);
    let mut client = LineChannel::new(ar, aw);
    let mut server = LineChannel::new(br, bw);
    let mut server_rng = StdRng::from_rng(&mut *rng)?;
    let options = HandshakeOptions::default();

    let initiator = async {
        let secret = initiate(&mut client, agreement, pool, rng, &options).await?;
        let value = secret.value();
        let mut sender = MessageSender::open(&mut client, secret, mode, rng).await?;
        sender.send(&mut client, SAMPLE_MESSAGE.as_bytes()).await?;
        sender.finish(&mut client).await?;
        Ok::<_, SessionError>(value)
    };
    let responder = async {
        let (agreed, secret) = respond(&mut server, pool, &mut server_rng, &options).await?;
        confirm_secret(&mut server, agreed, &secret).await?;
        let value = secret.value();
        let mut receiver = MessageReceiver::new(secret);
        let first = receiver.next_message(&mut server).await?;
        while receiver.next_message(&mut server).await?.is_some() {}
        Ok::<_, SessionError>((value, first))
    };

    let (initiator_secret, responder) = tokio::join!(initiator, responder);
    let initiator_secret = initiator_secret?;
    let (responder_secret, first) = responder?;
    let received = first.ok_or_else(|| anyhow!("Responder received no message"))?;

    Ok(DemoReport {
        agreement,
        initiator_secret,
        responder_secret,
        decrypted: received.text(),
        ciphertext: received.ciphertext,
    })
}
