use anyhow::{Result, anyhow};

pub const ETHEREUM_ADDRESS_BYTES: usize = 20;
pub const RECOVERABLE_SIGNATURE_BYTES: usize = 65;
pub const MAX_HANDLE_LEN: usize = 15;
pub const MAX_SIGNATURE_LEN: usize = 4096;

const _: [(); 16_384 - MAX_SIGNATURE_LEN] = [(); 16_384 - MAX_SIGNATURE_LEN];

/// Decodes a `0x`-prefixed (or bare) hex signature into raw bytes.
pub fn decode_hex_signature(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Signature cannot be empty"));
    }
    let bytes = hex::decode(strip_hex_prefix(trimmed))
        .map_err(|err| anyhow!("Failed to decode signature as hex: {err}"))?;
    if bytes.is_empty() {
        return Err(anyhow!("Signature cannot be empty"));
    }
    if bytes.len() > MAX_SIGNATURE_LEN {
        return Err(anyhow!(
            "Signature exceeds {MAX_SIGNATURE_LEN} byte limit"
        ));
    }
    Ok(bytes)
}

/// Validates an Ethereum address and returns its lowercase `0x` form.
pub fn sanitize_wallet_address(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Wallet address cannot be empty"));
    }
    let body = strip_hex_prefix(trimmed);
    if body.len() == trimmed.len() {
        return Err(anyhow!("Wallet address must start with 0x"));
    }
    let bytes =
        hex::decode(body).map_err(|err| anyhow!("Failed to decode wallet address: {err}"))?;
    if bytes.len() != ETHEREUM_ADDRESS_BYTES {
        return Err(anyhow!(
            "Wallet address must be {ETHEREUM_ADDRESS_BYTES} bytes, got {}",
            bytes.len()
        ));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Normalizes a twitter handle: drops a leading `@` and lowercases.
pub fn normalize_handle(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let without_at = trimmed.strip_prefix('@').unwrap_or(trimmed);
    if without_at.is_empty() {
        return Err(anyhow!("Handle cannot be empty"));
    }
    if without_at.chars().count() > MAX_HANDLE_LEN {
        return Err(anyhow!("Handle exceeds {MAX_HANDLE_LEN} character limit"));
    }
    if let Some(bad) = without_at
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(anyhow!("Handle contains unsupported character '{bad}'"));
    }
    Ok(without_at.to_ascii_lowercase())
}

pub(crate) fn strip_hex_prefix(value: &str) -> &str {
    if value.starts_with("0x") || value.starts_with("0X") {
        &value[2..]
    } else {
        value
    }
}
