//! Resolved runtime settings.
//!
//! Applies command-line overrides on top of the loaded [`Config`] and maps
//! config-level names onto the protocol types.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use dhlink_core::config::{AgreementKind, ChainingMode, HandshakeConfig};
use dhlink_core::{Config, primes};
use dhlink_crypto::{CipherMode, ExponentPolicy, KeyAgreement, PrimePool};
use dhlink_proto::HandshakeOptions;

/// Highest-priority layer: flags given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub prime_file: Option<PathBuf>,
    pub agreement: Option<AgreementKind>,
    pub mode: Option<ChainingMode>,
    pub no_verify: bool,
    pub log_level: Option<String>,
    pub log_json: bool,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.network.host = host;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(path) = self.prime_file {
            config.handshake.prime_file = path;
        }
        if let Some(agreement) = self.agreement {
            config.handshake.agreement = agreement;
        }
        if let Some(mode) = self.mode {
            config.cipher.mode = mode;
        }
        if self.no_verify {
            config.handshake.verify_secret = false;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        config.logging.json |= self.log_json;
    }
}

pub const fn key_agreement(kind: AgreementKind) -> KeyAgreement {
    match kind {
        AgreementKind::DiffieHellman => KeyAgreement::DiffieHellman,
        AgreementKind::Rsa => KeyAgreement::RsaKeyTransport,
    }
}

pub const fn cipher_mode(mode: ChainingMode) -> CipherMode {
    match mode {
        ChainingMode::Ecb => CipherMode::Ecb,
        ChainingMode::Cbc => CipherMode::Cbc,
    }
}

pub const fn handshake_options(cfg: &HandshakeConfig) -> HandshakeOptions {
    HandshakeOptions {
        verify_secret: cfg.verify_secret,
        exponent_policy: ExponentPolicy {
            default_exponent: cfg.rsa_default_exponent,
            search_limit: cfg.rsa_exponent_search_limit,
        },
        max_dh_modulus: cfg.max_dh_modulus,
    }
}

pub const fn handshake_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.network.handshake_timeout_secs)
}

pub fn address(config: &Config) -> String {
    format!("{}:{}", config.network.host, config.network.port)
}

/// Load the configured prime list. An empty list is fatal.
pub fn load_pool(cfg: &HandshakeConfig) -> anyhow::Result<PrimePool> {
    let list = primes::load_primes(&cfg.prime_file)
        .with_context(|| "Cannot start without a prime list")?;
    if list.is_empty() {
        bail!(
            "Prime list {} contains no usable entries",
            cfg.prime_file.display()
        );
    }
    Ok(PrimePool::new(list))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let mut config = Config::default();
        Overrides {
            port: Some(9999),
            agreement: Some(AgreementKind::Rsa),
            mode: Some(ChainingMode::Ecb),
            no_verify: true,
            log_json: true,
            ..Overrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.network.port, 9999);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.handshake.agreement, AgreementKind::Rsa);
        assert_eq!(config.cipher.mode, ChainingMode::Ecb);
        assert!(!config.handshake.verify_secret);
        assert!(config.logging.json);
    }

    #[test]
    fn empty_overrides_change_nothing() {
        let mut config = Config::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn names_map_onto_protocol_types() {
        assert_eq!(
            key_agreement(AgreementKind::Rsa),
            KeyAgreement::RsaKeyTransport
        );
        assert_eq!(cipher_mode(ChainingMode::Cbc), CipherMode::Cbc);

        let options = handshake_options(&HandshakeConfig::default());
        assert!(options.verify_secret);
        assert_eq!(options.exponent_policy, ExponentPolicy::default());
        assert_eq!(options.max_dh_modulus, dhlink_crypto::MAX_DH_MODULUS);
        assert_eq!(address(&Config::default()), "127.0.0.1:8421");
    }

    #[test]
    fn pool_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primes.csv");
        std::fs::write(&path, "prime\n101\n103\n").unwrap();
        let cfg = HandshakeConfig {
            prime_file: path,
            ..HandshakeConfig::default()
        };
        assert_eq!(load_pool(&cfg).unwrap().as_slice(), &[101, 103]);
    }

    #[test]
    fn empty_pool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primes.csv");
        std::fs::write(&path, "prime\n\n").unwrap();
        let cfg = HandshakeConfig {
            prime_file: path,
            ..HandshakeConfig::default()
        };
        assert!(load_pool(&cfg).is_err());
    }
}
