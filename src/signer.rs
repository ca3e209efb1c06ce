//! Wallet signing and public key recovery.
//!
//! Messages are signed EIP-191 style (`personal_sign`): the digest is
//! keccak256 over `"\x19Ethereum Signed Message:\n" || len || message`, and
//! signatures travel as `0x` + hex of `r || s || v` with `v` in {27, 28}.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{eip191_hash_message, keccak256};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::identity::{RECOVERABLE_SIGNATURE_BYTES, decode_hex_signature, strip_hex_prefix};

const SECRET_KEY_BYTES: usize = 32;
const LEGACY_V_OFFSET: u8 = 27;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("wallet declined to sign the message")]
    UserRejected,
    #[error("no wallet is connected")]
    SigningUnavailable,
    #[error("message to sign cannot be empty")]
    EmptyMessage,
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid wallet key: {0}")]
    InvalidKey(String),
}

/// A connected wallet able to sign messages on the user's behalf.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> String;

    /// Returns the EIP-191 signature as `0x` + hex.
    async fn sign_message(&self, message: &str) -> Result<String, SigningError>;
}

/// Wallet backed by an in-process secp256k1 key.
#[derive(Clone)]
pub struct LocalWallet {
    key: SigningKey,
    address: String,
}

impl LocalWallet {
    pub fn from_hex(secret: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(strip_hex_prefix(secret.trim()))
            .map_err(|err| SigningError::InvalidKey(format!("not hex: {err}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SigningError> {
        if bytes.len() != SECRET_KEY_BYTES {
            return Err(SigningError::InvalidKey(format!(
                "expected {SECRET_KEY_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(bytes)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        let address = address_from_public_key(key.verifying_key());
        Ok(Self { key, address })
    }

    pub fn public_key_hex(&self) -> String {
        encode_public_key(self.key.verifying_key())
    }

    fn sign_sync(&self, message: &str) -> Result<String, SigningError> {
        let digest = eip191_hash_message(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|err| SigningError::InvalidSignature(err.to_string()))?;

        let mut bytes = Vec::with_capacity(RECOVERABLE_SIGNATURE_BYTES);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(recovery_id.to_byte() + LEGACY_V_OFFSET);
        assert_eq!(
            bytes.len(),
            RECOVERABLE_SIGNATURE_BYTES,
            "recoverable signature must be 65 bytes"
        );
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign_message(&self, message: &str) -> Result<String, SigningError> {
        self.sign_sync(message)
    }
}

/// Signs through whichever wallet is connected for the current attempt.
#[derive(Clone, Default)]
pub struct SigningAdapter {
    wallet: Option<Arc<dyn Wallet>>,
}

impl SigningAdapter {
    pub fn new(wallet: Option<Arc<dyn Wallet>>) -> Self {
        Self { wallet }
    }

    pub fn connected_address(&self) -> Option<String> {
        self.wallet.as_ref().map(|wallet| wallet.address())
    }

    /// One-shot; a declined signature is reported, never retried.
    pub async fn sign(&self, message: &str) -> Result<String, SigningError> {
        if message.is_empty() {
            return Err(SigningError::EmptyMessage);
        }
        let wallet = self
            .wallet
            .as_ref()
            .ok_or(SigningError::SigningUnavailable)?;
        wallet.sign_message(message).await
    }

    pub fn recover_public_key(
        &self,
        message: &str,
        signature: &str,
    ) -> Result<RecoveredKey, SigningError> {
        recover_public_key(message, signature)
    }
}

/// Signer identity recovered from one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredKey {
    /// Uncompressed SEC1 key, `0x04…`.
    pub public_key: String,
    pub address: String,
}

/// Recovers the signer of an EIP-191 signature over `message`.
pub fn recover_public_key(message: &str, signature: &str) -> Result<RecoveredKey, SigningError> {
    let key = recover_verifying_key(message, signature)?;
    Ok(RecoveredKey {
        public_key: encode_public_key(&key),
        address: address_from_public_key(&key),
    })
}

fn recover_verifying_key(message: &str, signature: &str) -> Result<VerifyingKey, SigningError> {
    if message.is_empty() {
        return Err(SigningError::EmptyMessage);
    }
    let bytes = decode_hex_signature(signature)
        .map_err(|err| SigningError::InvalidSignature(err.to_string()))?;
    if bytes.len() != RECOVERABLE_SIGNATURE_BYTES {
        return Err(SigningError::InvalidSignature(format!(
            "expected {RECOVERABLE_SIGNATURE_BYTES} bytes, got {}",
            bytes.len()
        )));
    }

    let v = bytes[RECOVERABLE_SIGNATURE_BYTES - 1];
    let normalized_v = if v >= LEGACY_V_OFFSET {
        v - LEGACY_V_OFFSET
    } else {
        v
    };
    let recovery_id = RecoveryId::from_byte(normalized_v)
        .ok_or_else(|| SigningError::InvalidSignature(format!("unsupported recovery byte {v}")))?;
    let signature = Signature::from_slice(&bytes[..RECOVERABLE_SIGNATURE_BYTES - 1])
        .map_err(|err| SigningError::InvalidSignature(err.to_string()))?;

    let digest = eip191_hash_message(message);
    VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|err| SigningError::InvalidSignature(format!("recovery failed: {err}")))
}

fn encode_public_key(key: &VerifyingKey) -> String {
    format!("0x{}", hex::encode(key.to_encoded_point(false).as_bytes()))
}

/// Ethereum address: last 20 bytes of keccak256 over the uncompressed key
/// without its `0x04` tag.
pub fn address_from_public_key(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}
