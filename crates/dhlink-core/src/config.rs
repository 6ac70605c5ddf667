//! Configuration resolution for dhlink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/dhlink/settings.json`)
//! 3. Project config (`.dhlink/settings.json`)
//! 4. Environment variables (`DHLINK_*`)
//! 5. CLI arguments (highest priority, applied by the binary)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const ENV_HOST: &str = "DHLINK_HOST";
pub const ENV_PORT: &str = "DHLINK_PORT";
pub const ENV_PRIME_FILE: &str = "DHLINK_PRIME_FILE";
pub const ENV_AGREEMENT: &str = "DHLINK_AGREEMENT";
pub const ENV_CIPHER_MODE: &str = "DHLINK_CIPHER_MODE";
pub const ENV_LOG_LEVEL: &str = "DHLINK_LOG_LEVEL";

/// Complete dhlink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub cipher: CipherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the whole handshake, in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8421,
            handshake_timeout_secs: 30,
        }
    }
}

/// Which key agreement the initiator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementKind {
    #[default]
    DiffieHellman,
    Rsa,
}

impl FromStr for AgreementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "diffie_hellman" | "diffie-hellman" | "dh" => Ok(Self::DiffieHellman),
            "rsa" => Ok(Self::Rsa),
            other => Err(Error::Config(format!("Unknown key agreement '{other}'"))),
        }
    }
}

impl fmt::Display for AgreementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DiffieHellman => "diffie_hellman",
            Self::Rsa => "rsa",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub agreement: AgreementKind,
    /// Echo the DH secret for comparison. Reveals the secret on the wire.
    pub verify_secret: bool,
    pub prime_file: PathBuf,
    pub rsa_default_exponent: u64,
    pub rsa_exponent_search_limit: u64,
    /// Largest Diffie-Hellman modulus a peer may propose.
    pub max_dh_modulus: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            agreement: AgreementKind::default(),
            verify_secret: true,
            prime_file: PathBuf::from("./primes.csv"),
            rsa_default_exponent: 65_537,
            rsa_exponent_search_limit: 65_537,
            max_dh_modulus: 1 << 20,
        }
    }
}

/// Block chaining for the message session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainingMode {
    Ecb,
    #[default]
    Cbc,
}

impl FromStr for ChainingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ecb" => Ok(Self::Ecb),
            "cbc" => Ok(Self::Cbc),
            other => Err(Error::Config(format!("Unknown cipher mode '{other}'"))),
        }
    }
}

impl fmt::Display for ChainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ecb => "ecb",
            Self::Cbc => "cbc",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CipherConfig {
    pub mode: ChainingMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Reject values no subcommand can work with.
    pub fn validate(&self) -> Result<()> {
        if self.network.host.trim().is_empty() {
            return Err(Error::Config("network.host must not be empty".into()));
        }
        if self.network.handshake_timeout_secs == 0 {
            return Err(Error::Config(
                "network.handshake_timeout_secs must be positive".into(),
            ));
        }
        if self.handshake.rsa_exponent_search_limit < 3 {
            return Err(Error::Config(
                "handshake.rsa_exponent_search_limit must be at least 3".into(),
            ));
        }
        if self.handshake.max_dh_modulus < 3 {
            return Err(Error::Config(
                "handshake.max_dh_modulus must be at least 3".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(Error::Config("logging.level must not be empty".into()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let global = global_config_path();
    load_layers(global.as_deref(), project_dir, |key| std::env::var(key).ok())
}

/// Resolve defaults, files and environment with an explicit env lookup.
fn load_layers(
    global_path: Option<&Path>,
    project_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(path) = global_path.filter(|p| p.exists()) {
        debug!(path = %path.display(), "Loading global config");
        merge_config(&mut merged, load_config_file(path)?);
    }

    if let Some(dir) = project_dir {
        let project_path = project_config_path(dir);
        if project_path.exists() {
            debug!(path = %project_path.display(), "Loading project config");
            merge_config(&mut merged, load_config_file(&project_path)?);
        }
    }

    let mut config: Config = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// `<config dir>/dhlink/settings.json`, where the config dir is
/// `$XDG_CONFIG_HOME` or `~/.config` on Linux.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dhlink").join("settings.json"))
}

pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".dhlink").join("settings.json")
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Overlay one config layer on another, key by key. Objects merge
/// recursively; any other value replaces what was there.
fn merge_config(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_config(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(val) = env(ENV_HOST) {
        config.network.host = val;
    }
    if let Some(val) = env(ENV_PORT) {
        match val.parse() {
            Ok(port) => config.network.port = port,
            Err(_) => warn!(value = %val, "Ignoring invalid {ENV_PORT}"),
        }
    }
    if let Some(val) = env(ENV_PRIME_FILE) {
        config.handshake.prime_file = PathBuf::from(val);
    }
    if let Some(val) = env(ENV_AGREEMENT) {
        match val.parse() {
            Ok(kind) => config.handshake.agreement = kind,
            Err(e) => warn!(error = %e, "Ignoring invalid {ENV_AGREEMENT}"),
        }
    }
    if let Some(val) = env(ENV_CIPHER_MODE) {
        match val.parse() {
            Ok(mode) => config.cipher.mode = mode,
            Err(e) => warn!(error = %e, "Ignoring invalid {ENV_CIPHER_MODE}"),
        }
    }
    if let Some(val) = env(ENV_LOG_LEVEL) {
        config.logging.level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_settings(dir: &Path, json: &str) -> PathBuf {
        let path = project_config_path(dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.network.port, 8421);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.handshake.agreement, AgreementKind::DiffieHellman);
        assert!(config.handshake.verify_secret);
        assert_eq!(config.handshake.rsa_default_exponent, 65_537);
        assert_eq!(config.handshake.max_dh_modulus, 1_048_576);
        assert_eq!(config.cipher.mode, ChainingMode::Cbc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_layers(None, Some(dir.path()), no_env).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn project_file_overrides_global() {
        let global_dir = tempfile::tempdir().unwrap();
        let global = global_dir.path().join("settings.json");
        std::fs::write(&global, r#"{"network": {"port": 9000}, "cipher": {"mode": "ecb"}}"#)
            .unwrap();

        let project = tempfile::tempdir().unwrap();
        write_settings(project.path(), r#"{"network": {"port": 9100}}"#);

        let config = load_layers(Some(&global), Some(project.path()), no_env).unwrap();
        assert_eq!(config.network.port, 9100);
        // cipher section untouched by the project file
        assert_eq!(config.cipher.mode, ChainingMode::Ecb);
    }

    #[test]
    fn project_file_keeps_unrelated_global_keys() {
        let global_dir = tempfile::tempdir().unwrap();
        let global = global_dir.path().join("settings.json");
        std::fs::write(
            &global,
            r#"{"cipher": {"mode": "ecb"}, "network": {"host": "10.0.0.1", "port": 9000}}"#,
        )
        .unwrap();

        let project = tempfile::tempdir().unwrap();
        write_settings(project.path(), r#"{"network": {"port": 9100}}"#);

        let config = load_layers(Some(&global), Some(project.path()), no_env).unwrap();
        assert_eq!(config.cipher.mode, ChainingMode::Ecb);
        // sibling keys inside a shared section survive too
        assert_eq!(config.network.host, "10.0.0.1");
        assert_eq!(config.network.port, 9100);
        assert_eq!(config.network.handshake_timeout_secs, 30);
    }

    #[test]
    fn merge_is_recursive_and_replaces_leaves() {
        let mut base = serde_json::json!({"a": {"b": 1, "c": [1, 2]}, "d": true});
        merge_config(
            &mut base,
            serde_json::json!({"a": {"c": [3]}, "e": "new"}),
        );
        assert_eq!(
            base,
            serde_json::json!({"a": {"b": 1, "c": [3]}, "d": true, "e": "new"})
        );
    }

    #[test]
    fn wrongly_typed_value_is_json_error() {
        let project = tempfile::tempdir().unwrap();
        write_settings(project.path(), r#"{"cipher": {"mode": "ofb"}}"#);
        let err = load_layers(None, Some(project.path()), no_env).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn tiny_modulus_limit_fails_validation() {
        let project = tempfile::tempdir().unwrap();
        write_settings(project.path(), r#"{"handshake": {"max_dh_modulus": 2}}"#);
        assert!(load_layers(None, Some(project.path()), no_env).is_err());
    }

    #[test]
    fn env_overrides_files() {
        let project = tempfile::tempdir().unwrap();
        write_settings(
            project.path(),
            r#"{"handshake": {"agreement": "diffie_hellman"}, "network": {"port": 9100}}"#,
        );
        let env = env_from(&[
            (ENV_AGREEMENT, "rsa"),
            (ENV_PORT, "7000"),
            (ENV_CIPHER_MODE, "ECB"),
            (ENV_PRIME_FILE, "/tmp/p.csv"),
        ]);

        let config = load_layers(None, Some(project.path()), env).unwrap();
        assert_eq!(config.handshake.agreement, AgreementKind::Rsa);
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.cipher.mode, ChainingMode::Ecb);
        assert_eq!(config.handshake.prime_file, PathBuf::from("/tmp/p.csv"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let env = env_from(&[(ENV_PORT, "not-a-port"), (ENV_AGREEMENT, "quantum")]);
        let config = load_layers(None, None, env).unwrap();
        assert_eq!(config.network.port, 8421);
        assert_eq!(config.handshake.agreement, AgreementKind::DiffieHellman);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let project = tempfile::tempdir().unwrap();
        write_settings(project.path(), "{ not json");
        let err = load_layers(None, Some(project.path()), no_env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let project = tempfile::tempdir().unwrap();
        write_settings(
            project.path(),
            r#"{"network": {"handshake_timeout_secs": 0}}"#,
        );
        assert!(load_layers(None, Some(project.path()), no_env).is_err());
    }

    #[test]
    fn enum_names_parse_and_display() {
        assert_eq!("dh".parse::<AgreementKind>().unwrap(), AgreementKind::DiffieHellman);
        assert_eq!(AgreementKind::Rsa.to_string(), "rsa");
        assert_eq!(ChainingMode::Ecb.to_string(), "ecb");
        assert!("ofb".parse::<ChainingMode>().is_err());
    }

    #[test]
    fn serializes_with_snake_case_variants() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["handshake"]["agreement"], "diffie_hellman");
        assert_eq!(json["cipher"]["mode"], "cbc");
    }
}
