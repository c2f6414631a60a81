use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::Rng;

use super::{AnchorRequest, LedgerEntry};

const DOMAIN: &str = "anchorvault-anchor-v1";

/// Canonical bytes covered by an anchor signature.
pub fn anchor_message(request: &AnchorRequest) -> Vec<u8> {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        DOMAIN, request.file_id, request.version, request.locator, request.content_hash
    )
    .into_bytes()
}

/// Ed25519 identity that signs ledger anchors. Its public key is the entry `owner`.
#[derive(Clone)]
pub struct AnchorSigner {
    key: SigningKey,
}

impl std::fmt::Debug for AnchorSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorSigner")
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}

impl AnchorSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Random signer (avoids rand_core version conflict with ed25519-dalek).
    pub fn generate() -> Self {
        Self::from_seed(rand::rng().random())
    }

    pub fn from_hex(seed_hex: &str) -> Result<Self, String> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|e| format!("signer key is not hex: {}", e))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("signer key must be 32 bytes, got {}", b.len()))?;
        Ok(Self::from_seed(seed))
    }

    /// Load or generate the anchor signing seed at `{data_dir}/ledger_signer.key`.
    pub fn load_or_generate(data_dir: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let key_path = Path::new(data_dir).join("ledger_signer.key");

        if key_path.exists() {
            let seed_bytes = std::fs::read(&key_path)?;
            let seed: [u8; 32] = seed_bytes.try_into().map_err(|b: Vec<u8>| {
                format!(
                    "{} must be a 32-byte Ed25519 seed, found {} bytes",
                    key_path.display(),
                    b.len()
                )
            })?;
            let signer = Self::from_seed(seed);
            tracing::info!("Ledger signer {} (loaded from {})", signer.owner(), key_path.display());
            return Ok(signer);
        }

        std::fs::create_dir_all(data_dir)?;
        let seed: [u8; 32] = rand::rng().random();
        std::fs::write(&key_path, seed)?;
        let signer = Self::from_seed(seed);
        tracing::info!(
            "Ledger signer {} (generated, saved to {})",
            signer.owner(),
            key_path.display()
        );
        Ok(signer)
    }

    pub fn owner(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }

    pub fn sign(&self, request: &AnchorRequest) -> String {
        hex::encode(self.key.sign(&anchor_message(request)).to_bytes())
    }
}

/// Check that `entry.signature` was produced by `entry.owner` over the entry's fields.
pub fn verify_entry(entry: &LedgerEntry) -> bool {
    let Some(owner) = decode_array::<32>(&entry.owner) else {
        return false;
    };
    let Some(sig) = decode_array::<64>(&entry.signature) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&owner) else {
        return false;
    };
    key.verify(&anchor_message(&entry.request()), &Signature::from_bytes(&sig))
        .is_ok()
}

fn decode_array<const N: usize>(hex_str: &str) -> Option<[u8; N]> {
    hex::decode(hex_str).ok()?.try_into().ok()
}
