//! AES-128-CBC encryption primitives.
//!
//! The service stores file content pre-encrypted server-side; CBC here is
//! used purely for key material — the enciphered RSA private key blob and
//! the fkey sent with node creation.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use rand::RngCore;

use crate::crypto::kdf::derive_bytes;
use crate::error::{DriveError, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Output of a password-based encryption: the ciphertext together with the
/// salt and IV needed to decrypt it again.
#[derive(Debug, Clone)]
pub struct AesEncrypted {
    /// Random salt fed to the key derivation.
    pub salt: [u8; 16],
    /// Random CBC initialization vector.
    pub iv: [u8; 16],
    /// PKCS#7-padded ciphertext.
    pub ciphertext: Vec<u8>,
}

/// AES-128-CBC encrypt with an explicit key and IV (PKCS#7 padding).
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// AES-128-CBC decrypt with an explicit key and IV (PKCS#7 padding).
///
/// # Errors
/// Returns [`DriveError::Crypto`] when the padding is invalid, which is what
/// a wrong key or corrupted ciphertext looks like at this layer.
pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DriveError::Crypto("AES-CBC decryption failed (bad padding)".to_string()))
}

/// Encrypt `plaintext` under a password-derived key.
///
/// Generates a fresh random salt and IV, derives a 16-byte AES key from
/// `(password, salt)` and CBC-encrypts. The salt and IV are returned with
/// the ciphertext; both are required for [`aes_decrypt`].
pub fn aes_encrypt(password: &str, plaintext: &[u8]) -> Result<AesEncrypted> {
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let key: [u8; 16] = derive_bytes(password.as_bytes(), &salt)?;
    let ciphertext = aes_cbc_encrypt(&key, &iv, plaintext);

    Ok(AesEncrypted {
        salt,
        iv,
        ciphertext,
    })
}

/// Decrypt ciphertext produced by [`aes_encrypt`].
pub fn aes_decrypt(
    password: &str,
    salt: &[u8],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let key: [u8; 16] = derive_bytes(password.as_bytes(), salt)?;
    aes_cbc_decrypt(&key, iv, ciphertext)
}
