// crates/aligned-core/src/crypto.rs

use alloy_primitives::keccak256;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::CoreError;
use crate::task::{ResponseDigest, TaskSignature};
use crate::traits::TaskSigner;

/// Hash bytes with legacy Keccak-256 (the EVM `keccak256`, not NIST SHA3-256).
pub fn digest(data: &[u8]) -> ResponseDigest {
    keccak256(data)
}

/// An ed25519 operator key that signs response digests.
///
/// The secret half never leaves this struct.
pub struct Ed25519Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519Signer {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Build a signer from a 32-byte secret.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    /// Build a signer from a hex-encoded 32-byte secret (optional `0x` prefix).
    pub fn from_hex(secret_hex: &str) -> Result<Self, CoreError> {
        let trimmed = secret_hex.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CoreError::Crypto(format!(
                "Operator secret must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_secret(&secret))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get the public key bytes (32 bytes).
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

impl TaskSigner for Ed25519Signer {
    fn sign_digest(&self, digest: &ResponseDigest) -> Result<TaskSignature, CoreError> {
        let signature = self.signing_key.try_sign(digest.as_slice())?;
        Ok(TaskSignature(signature.to_bytes().to_vec()))
    }

    fn public_key(&self) -> Vec<u8> {
        self.public_key_bytes().to_vec()
    }

    fn scheme(&self) -> &'static str {
        "ed25519"
    }
}

/// Verify an ed25519 signature.
///
/// Returns `true` if the signature is valid for the given message and public key.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<bool, CoreError> {
    let public_key: [u8; 32] = public_key_bytes
        .try_into()
        .map_err(|_| CoreError::Crypto("Public key must be exactly 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&public_key)
        .map_err(|e| CoreError::Crypto(format!("Invalid public key: {}", e)))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| CoreError::Crypto("Signature must be exactly 64 bytes".to_string()))?;

    let signature = ed25519_dalek::Signature::from_bytes(&signature_array);

    match verifying_key.verify(message, &signature) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi;
    use crate::task::TaskResponse;

    #[test]
    fn test_digest_known_vectors() {
        assert_eq!(
            hex::encode(digest(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            hex::encode(digest(b"abc")),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_digest_of_encoded_response() {
        let encoded = abi::encode(&TaskResponse::new(7, true)).unwrap();
        let d = digest(&encoded);
        assert_eq!(d.len(), 32);
        assert_eq!(
            hex::encode(d),
            "dc686ec4a0ff239c70e7c7c36e8f853eced3bc8618f48d2b816da2a74311237e"
        );
        assert_eq!(d, digest(&encoded));
    }

    #[test]
    fn test_sign_digest_verifies() {
        let signer = Ed25519Signer::generate();
        let d = digest(b"task response");

        let signature = signer.sign_digest(&d).unwrap();
        let pubkey = signer.public_key();

        assert!(verify_signature(&pubkey, d.as_slice(), signature.as_bytes()).unwrap());

        let other = digest(b"another response");
        assert!(!verify_signature(&pubkey, other.as_slice(), signature.as_bytes()).unwrap());
    }

    #[test]
    fn test_known_key_is_deterministic() {
        let signer = Ed25519Signer::from_secret(&[7u8; 32]);
        let encoded = abi::encode(&TaskResponse::new(7, true)).unwrap();
        let d = digest(&encoded);

        let first = signer.sign_digest(&d).unwrap();
        let second = signer.sign_digest(&d).unwrap();
        assert_eq!(first, second);
        assert!(verify_signature(&signer.public_key(), d.as_slice(), first.as_bytes()).unwrap());
    }

    #[test]
    fn test_from_hex() {
        let secret = [9u8; 32];
        let from_hex = Ed25519Signer::from_hex(&format!("0x{}\n", hex::encode(secret))).unwrap();
        assert_eq!(
            from_hex.public_key_bytes(),
            Ed25519Signer::from_secret(&secret).public_key_bytes()
        );

        assert!(matches!(
            Ed25519Signer::from_hex("abcd"),
            Err(CoreError::Crypto(_))
        ));
        assert!(matches!(
            Ed25519Signer::from_hex("zz"),
            Err(CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        assert!(verify_signature(&[0u8; 31], b"m", &[0u8; 64]).is_err());
        let signer = Ed25519Signer::generate();
        assert!(verify_signature(&signer.public_key(), b"m", &[0u8; 63]).is_err());
    }
}
