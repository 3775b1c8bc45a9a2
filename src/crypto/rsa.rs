//! RSA operations for wrapping and unwrapping short secrets.
//!
//! The service protects the per-user content key with RSA PKCS#1 v1.5; the
//! key pair itself travels as PEM (public clear, private AES-enciphered,
//! see [`crate::crypto::kdf::decrypt_private_key`]).

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{DriveError, Result};

/// Parse an RSA private key from PEM, accepting PKCS#8 or PKCS#1 framing.
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| DriveError::Crypto(format!("invalid RSA private key: {}", e)))
}

/// Parse an RSA public key from PEM, accepting SPKI or PKCS#1 framing.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| DriveError::Crypto(format!("invalid RSA public key: {}", e)))
}

/// Encrypt a short secret under the public key (PKCS#1 v1.5).
///
/// Plaintext length is limited by the modulus (key size minus the 11-byte
/// PKCS#1 v1.5 overhead); this is only ever used for key material.
pub fn rsa_encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    public_key
        .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| DriveError::Crypto(format!("RSA encryption failed: {}", e)))
}

/// Decrypt a short secret with the private key (PKCS#1 v1.5).
pub fn rsa_decrypt(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    private_key
        .decrypt(Pkcs1v15Encrypt, ciphertext)
        .map_err(|e| DriveError::Crypto(format!("RSA decryption failed: {}", e)))
}
