//! Prime list loading.
//!
//! One integer per line with an optional `prime` header. Values are not
//! checked for primality; the list is trusted input.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Read and parse a prime list file.
pub fn load_primes(path: &Path) -> Result<Vec<u64>> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::PrimeList {
        path: path.to_path_buf(),
        source,
    })?;
    let primes = parse_primes(&content);
    info!(path = %path.display(), count = primes.len(), "Loaded prime list");
    Ok(primes)
}

/// Parse prime list text, skipping the header, blank lines and anything
/// that is not an unsigned integer.
pub fn parse_primes(content: &str) -> Vec<u64> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = raw.trim();
            if line.is_empty() || (idx == 0 && line.eq_ignore_ascii_case("prime")) {
                return None;
            }
            match line.parse() {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(
                        line = idx + 1,
                        value = line,
                        error = %e,
                        "Skipping invalid prime entry"
                    );
                    None
                }
            }
        })
        .collect()
}
