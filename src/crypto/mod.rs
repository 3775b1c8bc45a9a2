//! Cryptographic operations: key derivation chain, symmetric and
//! asymmetric primitives, content identity.

pub mod aes;
pub mod cache;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod rsa;

pub use aes::{aes_cbc_decrypt, aes_cbc_encrypt, aes_decrypt, aes_encrypt, AesEncrypted};
pub use cache::ContentKeyCache;
pub use hash::{sha1_file, sha1_file_session, sha1_hex};
pub use identity::ContentIdentity;
pub use kdf::{
    calculate_login_password, calculate_master_password, decrypt_private_key,
    unwrap_content_key, ContentKey, KDF_ITERATIONS,
};
pub use rsa::{parse_private_key_pem, parse_public_key_pem, rsa_decrypt, rsa_encrypt};
