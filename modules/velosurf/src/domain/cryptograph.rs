//! Obfuscation of column values exposed outside the application

use crate::contract::{Result, VelosurfError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Reversible obfuscation strategy
pub trait Cryptograph: Send + Sync {
    fn obfuscate(&self, plain: &str) -> String;

    fn deobfuscate(&self, obfuscated: &str) -> Result<String>;
}

/// Deterministic XOR keystream derived from a seed with SHA-256 in counter
/// mode, encoded as URL-safe base64. Equal inputs give equal outputs, so
/// obfuscated keys are stable in URLs.
#[derive(Clone)]
pub struct KeystreamCryptograph {
    key: [u8; 32],
}

impl KeystreamCryptograph {
    pub fn new(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for (block, chunk) in data.chunks(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update((block as u64).to_be_bytes());
            let pad = hasher.finalize();
            out.extend(chunk.iter().zip(pad.iter()).map(|(b, p)| b ^ p));
        }
        out
    }
}

impl Default for KeystreamCryptograph {
    fn default() -> Self {
        Self::new("velosurf")
    }
}

impl Cryptograph for KeystreamCryptograph {
    fn obfuscate(&self, plain: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.apply(plain.as_bytes()))
    }

    fn deobfuscate(&self, obfuscated: &str) -> Result<String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(obfuscated.trim())
            .map_err(|e| VelosurfError::Obfuscation(format!("'{}': {}", obfuscated, e)))?;
        String::from_utf8(self.apply(&bytes))
            .map_err(|_| VelosurfError::Obfuscation(format!("'{}': not a valid value", obfuscated)))
    }
}
