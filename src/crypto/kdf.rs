//! Key derivation chain: login password, master password, RSA private key
//! decryption and content-key unwrap.
//!
//! Every transfer operation depends on the content key produced at the end
//! of this chain, so failures here are surfaced immediately and never
//! retried.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use sha2::Sha256;

use crate::crypto::aes::aes_cbc_decrypt;
use crate::crypto::rsa::parse_private_key_pem;
use crate::error::{DriveError, Result};

/// PBKDF2 iteration count for password derivation.
pub const KDF_ITERATIONS: u32 = 1024;

/// Fixed suffix appended to the login when salting the login-password KDF.
const LOGIN_SALT_SUFFIX: &str = "@drive/login";

/// The user's clear content key ("node key"), kept in its base64 wire
/// representation. Derived once per authenticated session and cached; see
/// [`crate::crypto::cache::ContentKeyCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey(String);

impl ContentKey {
    /// Wrap an already-base64 key string.
    pub fn from_base64(b64: impl Into<String>) -> Self {
        ContentKey(b64.into())
    }

    /// The base64 wire form.
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Decode to the 32 raw key bytes.
    pub fn to_bytes(&self) -> Result<[u8; 32]> {
        let raw = BASE64.decode(&self.0)?;
        if raw.len() != 32 {
            return Err(DriveError::Crypto(format!(
                "content key must be 32 bytes, got {}",
                raw.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw);
        Ok(out)
    }

    /// Split the key into the (AES key, IV) pair used to encrypt fkeys:
    /// first 16 bytes are the key, next 16 the IV.
    pub fn key_iv(&self) -> Result<([u8; 16], [u8; 16])> {
        let raw = self.to_bytes()?;
        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&raw[..16]);
        iv.copy_from_slice(&raw[16..]);
        Ok((key, iv))
    }
}

/// PBKDF2-HMAC-SHA256 with a const-generic output width.
///
/// All derivations in this module and in [`crate::crypto::identity`] go
/// through here so the KDF parameters live in one place.
pub(crate) fn derive_bytes<const N: usize>(secret: &[u8], salt: &[u8]) -> Result<[u8; N]> {
    derive_bytes_with(secret, salt, KDF_ITERATIONS)
}

pub(crate) fn derive_bytes_with<const N: usize>(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    pbkdf2::<Hmac<Sha256>>(secret, salt, iterations, &mut out)
        .map_err(|_| DriveError::Crypto("PBKDF2 failed".to_string()))?;
    Ok(out)
}

/// Derive the login password sent during authentication.
///
/// PBKDF2-HMAC-SHA256 over the clear password, salted by the login plus a
/// fixed suffix, 16-byte output, base64-encoded.
///
/// # Examples
/// ```
/// use drivelib::crypto::calculate_login_password;
///
/// # fn example() -> drivelib::Result<()> {
/// let lp = calculate_login_password("user@example.com", "secret")?;
/// assert_eq!(lp, calculate_login_password("user@example.com", "secret")?);
/// # Ok(())
/// # }
/// ```
pub fn calculate_login_password(login: &str, password: &str) -> Result<String> {
    let salt = format!("{}{}", login, LOGIN_SALT_SUFFIX);
    let key: [u8; 16] = derive_bytes(password.as_bytes(), salt.as_bytes())?;
    Ok(BASE64.encode(key))
}

/// Derive the master password from the server-issued per-user salt.
///
/// Same KDF as [`calculate_login_password`]; the result protects the user's
/// RSA private key material.
pub fn calculate_master_password(salt: &str, password: &str) -> Result<String> {
    let key: [u8; 16] = derive_bytes(password.as_bytes(), salt.as_bytes())?;
    Ok(BASE64.encode(key))
}

/// Decrypt the user's RSA private key.
///
/// The PEM blob is AES-128-CBC encrypted under a key derived from the
/// master password and `aes_salt`, with `aes_iv` as the CBC IV.
///
/// # Arguments
/// * `master_password` - Output of [`calculate_master_password`]
/// * `aes_salt` - Per-key salt from the user's `RsaKeyMaterial`
/// * `aes_iv` - CBC IV from the user's `RsaKeyMaterial`
/// * `encrypted_private_key` - The enciphered PEM bytes
pub fn decrypt_private_key(
    master_password: &str,
    aes_salt: &[u8],
    aes_iv: &[u8; 16],
    encrypted_private_key: &[u8],
) -> Result<RsaPrivateKey> {
    let key: [u8; 16] = derive_bytes(master_password.as_bytes(), aes_salt)?;
    let pem_bytes = aes_cbc_decrypt(&key, aes_iv, encrypted_private_key)?;
    let pem = String::from_utf8(pem_bytes)
        .map_err(|_| DriveError::Crypto("decrypted private key is not valid UTF-8".to_string()))?;
    parse_private_key_pem(&pem)
}

/// Unwrap the server-held wrapped node key into the clear [`ContentKey`].
///
/// RSA-PKCS#1v1.5-decrypts the blob, then normalizes the payload. The
/// server has shipped the key in three historical encodings, distinguished
/// only by length:
/// - exactly 32 bytes: raw key, base64-encode it;
/// - longer than 44 bytes: base64 text that itself decodes to the base64
///   wire form, decode one layer;
/// - anything else: already the base64 wire form, use as-is.
///
/// Which representation is authoritative is unknown; the heuristic is kept
/// literally and pinned by regression tests.
pub fn unwrap_content_key(private_key: &RsaPrivateKey, wrapped: &[u8]) -> Result<ContentKey> {
    let payload = private_key
        .decrypt(Pkcs1v15Encrypt, wrapped)
        .map_err(|e| DriveError::Crypto(format!("RSA unwrap failed: {}", e)))?;

    if payload.len() == 32 {
        return Ok(ContentKey(BASE64.encode(&payload)));
    }

    if payload.len() > 44 {
        let inner = BASE64
            .decode(&payload)
            .map_err(|_| DriveError::Crypto("wrapped key outer base64 invalid".to_string()))?;
        let text = String::from_utf8(inner)
            .map_err(|_| DriveError::Crypto("wrapped key inner encoding invalid".to_string()))?;
        return Ok(ContentKey(text));
    }

    let text = String::from_utf8(payload)
        .map_err(|_| DriveError::Crypto("wrapped key is not valid UTF-8".to_string()))?;
    Ok(ContentKey(text))
}
