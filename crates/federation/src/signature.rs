//! HTTP Signature implementation for `ActivityPub`.
//!
//! Implements draft-cavage-http-signatures (`rsa-sha256`) for signing
//! outgoing deliveries. The signed header set is fixed:
//! `(request-target) host date digest`.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::SigningKey;
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, Signer};
use tern_common::{AppError, authority, crypto::parse_private_key};
use tracing::debug;
use url::Url;

/// Headers covered by every signature we produce.
pub const SIGNED_HEADERS: &str = "(request-target) host date digest";

/// HTTP Signature error.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<SignatureError> for AppError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::InvalidPrivateKey(msg) => Self::Config(msg),
            other => Self::Federation(other.to_string()),
        }
    }
}

/// Values for the headers a signed request must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// `Host`.
    pub host: String,
    /// `Date`, IMF-fixdate.
    pub date: String,
    /// `Digest`, `SHA-256=<base64>`.
    pub digest: String,
    /// `Signature`.
    pub signature: String,
}

impl SignedHeaders {
    /// Header name/value pairs, in signing order.
    #[must_use]
    pub fn into_pairs(self) -> [(&'static str, String); 4] {
        [
            ("Host", self.host),
            ("Date", self.date),
            ("Digest", self.digest),
            ("Signature", self.signature),
        ]
    }
}

/// HTTP Signature signer for outgoing requests.
pub struct HttpSigner {
    signing_key: SigningKey<Sha256>,
    key_id: String,
}

impl std::fmt::Debug for HttpSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl HttpSigner {
    /// Create a new HTTP signer from a PEM-encoded private key
    /// (PKCS#8, or PKCS#1 for legacy keys).
    pub fn new(private_key_pem: &str, key_id: impl Into<String>) -> Result<Self, SignatureError> {
        let private_key = parse_private_key(private_key_pem)
            .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            key_id: key_id.into(),
        })
    }

    /// The `keyId` placed in signatures.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a request made at `date`.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        date: DateTime<Utc>,
    ) -> Result<SignedHeaders, SignatureError> {
        let host = authority(url);
        if host.is_empty() {
            return Err(SignatureError::InvalidUrl(format!("no host in {url}")));
        }
        let date = http_date(date);
        let digest = calculate_digest(body);

        let signing_string = signing_string(method, url, &host, &date, &digest);
        debug!(signing_string = %signing_string, "Signing string");

        let signature_bytes = self
            .signing_key
            .try_sign(signing_string.as_bytes())
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        let signature = BASE64.encode(signature_bytes.to_bytes());

        let signature_header = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{SIGNED_HEADERS}\",signature=\"{signature}\"",
            self.key_id
        );

        Ok(SignedHeaders {
            host,
            date,
            digest,
            signature: signature_header,
        })
    }
}

/// `(request-target)` value: lowercase method, path, and query if any.
#[must_use]
pub fn request_target(method: &str, url: &Url) -> String {
    let query = url.query().map_or(String::new(), |q| format!("?{q}"));
    format!("{} {}{query}", method.to_lowercase(), url.path())
}

/// The newline-joined string that gets signed.
#[must_use]
pub fn signing_string(method: &str, url: &Url, host: &str, date: &str, digest: &str) -> String {
    format!(
        "(request-target): {}\nhost: {host}\ndate: {date}\ndigest: {digest}",
        request_target(method, url)
    )
}

/// RFC 7231 IMF-fixdate.
#[must_use]
pub fn http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Calculate SHA-256 digest of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Verify that a digest header matches the body.
#[must_use]
pub fn verify_digest(body: &[u8], digest_header: &str) -> bool {
    calculate_digest(body) == digest_header
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rsa::pkcs1v15::VerifyingKey;
    use rsa::pkcs8::DecodePublicKey;
    use signature::Verifier;
    use tern_common::generate_rsa_keypair;

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    fn signature_param<'a>(header: &'a str, name: &str) -> &'a str {
        header
            .split(',')
            .find_map(|part| part.strip_prefix(&format!("{name}=")))
            .unwrap()
            .trim_matches('"')
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = generate_rsa_keypair().unwrap();
        let signer = HttpSigner::new(
            &keypair.private_key_pem,
            "https://example.com/users/alice#main-key",
        )
        .unwrap();

        let url = Url::parse("https://remote.example/inbox?x=1").unwrap();
        let body = br#"{"type":"Create"}"#;
        let headers = signer.sign("POST", &url, body, fixed_date()).unwrap();

        assert_eq!(headers.host, "remote.example");
        assert_eq!(headers.date, "Fri, 14 Mar 2025 09:26:53 GMT");
        assert_eq!(
            signature_param(&headers.signature, "keyId"),
            "https://example.com/users/alice#main-key"
        );
        assert_eq!(signature_param(&headers.signature, "algorithm"), "rsa-sha256");
        assert_eq!(signature_param(&headers.signature, "headers"), SIGNED_HEADERS);

        let expected = signing_string("POST", &url, &headers.host, &headers.date, &headers.digest);
        assert!(expected.starts_with("(request-target): post /inbox?x=1\nhost: remote.example\n"));

        let raw = BASE64
            .decode(signature_param(&headers.signature, "signature"))
            .unwrap();
        let public_key = rsa::RsaPublicKey::from_public_key_pem(&keypair.public_key_pem).unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let sig = rsa::pkcs1v15::Signature::try_from(raw.as_slice()).unwrap();
        assert!(verifying_key.verify(expected.as_bytes(), &sig).is_ok());
    }

    #[test]
    fn test_host_keeps_non_default_port() {
        let keypair = generate_rsa_keypair().unwrap();
        let signer = HttpSigner::new(&keypair.private_key_pem, "k").unwrap();
        let url = Url::parse("https://remote.example:8443/inbox").unwrap();
        let headers = signer.sign("POST", &url, b"", fixed_date()).unwrap();
        assert_eq!(headers.host, "remote.example:8443");
    }

    #[test]
    fn test_invalid_private_key() {
        let err = HttpSigner::new("not a key", "k").unwrap_err();
        assert!(matches!(err, SignatureError::InvalidPrivateKey(_)));
        assert!(matches!(AppError::from(err), AppError::Config(_)));
    }

    #[test]
    fn test_digest_round_trip() {
        let body = br#"{"type":"Follow"}"#;
        let digest = calculate_digest(body);
        assert!(digest.starts_with("SHA-256="));
        let decoded = BASE64.decode(digest.trim_start_matches("SHA-256=")).unwrap();
        assert_eq!(decoded.as_slice(), Sha256::digest(body).as_slice());
        assert!(verify_digest(body, &digest));
        assert!(!verify_digest(b"wrong body", &digest));
    }
}
