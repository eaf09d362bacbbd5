//! Cryptographic utilities for `ActivityPub` signatures.
//!
//! This module provides RSA key generation and parsing utilities used for
//! HTTP Signatures in `ActivityPub` federation.
//!
//! # Examples
//!
//! ```
//! use tern_common::crypto::{generate_rsa_keypair, parse_private_key, parse_public_key};
//!
//! // Generate a new key pair
//! let keypair = generate_rsa_keypair().expect("Failed to generate keypair");
//!
//! // The keys are in PEM format
//! assert!(keypair.public_key_pem.contains("BEGIN PUBLIC KEY"));
//! assert!(keypair.private_key_pem.contains("BEGIN PRIVATE KEY"));
//!
//! // Parse the keys back
//! let _private = parse_private_key(&keypair.private_key_pem).expect("Failed to parse");
//! let _public = parse_public_key(&keypair.public_key_pem).expect("Failed to parse");
//! ```

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
};

use crate::{AppError, AppResult};

/// RSA key pair for `ActivityPub` HTTP Signatures.
#[derive(Debug, Clone)]
pub struct RsaKeypair {
    /// Public key in PEM format (SPKI encoding).
    pub public_key_pem: String,
    /// Private key in PEM format (PKCS#8 encoding).
    pub private_key_pem: String,
}

/// Default RSA key size (2048 bits).
const RSA_KEY_SIZE: usize = 2048;

/// Generate a new RSA key pair for `ActivityPub` HTTP Signatures.
///
/// Creates a 2048-bit RSA key pair and returns both keys in PEM format.
/// The private key uses PKCS#8 encoding and the public key uses SPKI encoding.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if key generation or PEM encoding fails.
pub fn generate_rsa_keypair() -> AppResult<RsaKeypair> {
    let mut rng = rand::thread_rng();

    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
        .map_err(|e| AppError::Internal(format!("Failed to generate RSA key: {e}")))?;

    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(format!("Failed to encode private key: {e}")))?
        .to_string();

    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(format!("Failed to encode public key: {e}")))?;

    Ok(RsaKeypair {
        public_key_pem,
        private_key_pem,
    })
}

/// Parse an RSA private key from PEM format.
///
/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and, for keys imported from older
/// installations, PKCS#1 (`BEGIN RSA PRIVATE KEY`).
///
/// # Errors
///
/// Returns [`AppError::Config`]: an unreadable signing key is a deployment
/// problem, not something a retry can fix.
pub fn parse_private_key(pem: &str) -> AppResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| pkcs8_err)
        })
        .map_err(|e| AppError::Config(format!("Failed to parse private key: {e}")))
}

/// Parse an RSA public key from PEM format (SPKI).
///
/// # Errors
///
/// Returns [`AppError::BadRequest`] if the PEM is not a valid SPKI RSA key.
pub fn parse_public_key(pem: &str) -> AppResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| AppError::BadRequest(format!("Failed to parse public key: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding as Pkcs1LineEnding};

    #[test]
    fn test_generate_keypair() {
        let keypair = generate_rsa_keypair().unwrap();

        assert!(keypair.public_key_pem.contains("BEGIN PUBLIC KEY"));
        assert!(keypair.private_key_pem.contains("BEGIN PRIVATE KEY"));

        let _private = parse_private_key(&keypair.private_key_pem).unwrap();
        let _public = parse_public_key(&keypair.public_key_pem).unwrap();
    }

    #[test]
    fn test_parse_pkcs1_private_key() {
        let keypair = generate_rsa_keypair().unwrap();
        let key = parse_private_key(&keypair.private_key_pem).unwrap();
        let pkcs1 = key.to_pkcs1_pem(Pkcs1LineEnding::LF).unwrap();

        let reparsed = parse_private_key(&pkcs1).unwrap();
        assert_eq!(reparsed, key);
    }

    #[test]
    fn test_garbage_key_is_config_error() {
        let err = parse_private_key("not a key").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
