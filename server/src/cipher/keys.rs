use std::path::Path;

use rand::Rng;

use super::KEY_LEN;

/// Load or generate the payload encryption key (256-bit random).
/// Stored as raw bytes in data_dir/cipher_key. Only used when no key is
/// injected through configuration.
pub fn load_or_generate_cipher_key(
    data_dir: &str,
) -> Result<[u8; KEY_LEN], Box<dyn std::error::Error>> {
    let key_path = Path::new(data_dir).join("cipher_key");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        // Never regenerate over an existing file: every stored object would become unreadable.
        let key: [u8; KEY_LEN] = key.try_into().map_err(|k: Vec<u8>| {
            format!(
                "{} has wrong size ({} bytes, expected {})",
                key_path.display(),
                k.len(),
                KEY_LEN
            )
        })?;
        tracing::info!("Cipher key loaded from {}", key_path.display());
        return Ok(key);
    }

    std::fs::create_dir_all(data_dir)?;
    let key: [u8; KEY_LEN] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("Cipher key generated at {}", key_path.display());
    Ok(key)
}
