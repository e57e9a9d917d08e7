//! Access token verification.
//!
//! Access tokens are HS256 JWTs signed with a secret shared with the
//! backend. [`TokenVerifier`] is the single place tokens are checked; the
//! auth relay consumes it for every session lookup.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;

use verdant_types::Claims;

type HmacSha256 = Hmac<Sha256>;

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// Not three dot-separated base64url segments.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Header names an algorithm other than HS256.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signature does not match the payload.
    #[error("Invalid signature")]
    BadSignature,

    /// `exp` is in the past.
    #[error("Token expired")]
    Expired,

    /// `nbf` is in the future.
    #[error("Token not yet valid")]
    NotYetValid,

    /// Segment is not the expected JSON.
    #[error("Failed to decode token: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Verifies HS256 access tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
    leeway_secs: i64,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("secret", &"<redacted>")
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            leeway_secs: 0,
        }
    }

    /// Tolerate clock skew when checking `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, secs: i64) -> Self {
        self.leeway_secs = secs.max(0);
        self
    }

    /// Verify `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verify `token` as of the unix timestamp `now`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let (header_b64, payload_b64, signature_b64) = split(token)?;

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64.trim_end_matches('='))
            .map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(payload_b64)?;
        if let Some(exp) = claims.exp
            && now >= exp + self.leeway_secs
        {
            return Err(TokenError::Expired);
        }
        if let Some(nbf) = claims.nbf
            && now + self.leeway_secs < nbf
        {
            return Err(TokenError::NotYetValid);
        }
        Ok(claims)
    }

    /// Produce a signed HS256 token carrying `claims`.
    ///
    /// Used by the mock backend and tests.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload_json =
            serde_json::to_vec(claims).map_err(|e| TokenError::Decode(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(payload_json);

        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}.{}", header, payload, signature))
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::Decode(format!("unusable secret: {}", e)))
    }
}

/// Decode the payload without checking the signature or expiry.
///
/// Only for display right after sign-in; never for access decisions.
pub fn decode_unverified(token: &str) -> Result<Claims, TokenError> {
    let (_, payload, _) = split(token)?;
    decode_segment(payload)
}

fn split(token: &str) -> Result<(&str, &str, &str), TokenError> {
    let mut parts = token.trim().split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => Ok((h, p, s)),
        _ => Err(TokenError::Malformed(
            "expected three dot-separated segments".to_string(),
        )),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_712_311_200; // 2024-04-05 10:00 UTC

    fn claims(exp: i64) -> Claims {
        Claims {
            sub: Some("u1".to_string()),
            email: Some("grace@farm.io".to_string()),
            role: Some("admin".to_string()),
            iat: Some(NOW - 60),
            exp: Some(exp),
            ..Default::default()
        }
    }

    #[test]
    fn test_sign_then_verify() {
        let verifier = TokenVerifier::new("secret");
        let token = verifier.sign(&claims(NOW + 3600)).unwrap();

        let decoded = verifier.verify_at(&token, NOW).unwrap();
        assert_eq!(decoded.user_id(), Some("u1"));
        assert!(decoded.is_admin());
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let token = TokenVerifier::new("secret").sign(&claims(NOW + 3600)).unwrap();
        let err = TokenVerifier::new("other").verify_at(&token, NOW).unwrap_err();
        assert_eq!(err, TokenError::BadSignature);
    }

    #[test]
    fn test_rejects_expired_and_premature() {
        let verifier = TokenVerifier::new("secret");
        let token = verifier.sign(&claims(NOW - 1)).unwrap();
        assert_eq!(verifier.verify_at(&token, NOW), Err(TokenError::Expired));

        // leeway lets a just-expired token through
        let lenient = TokenVerifier::new("secret").with_leeway(30);
        assert!(lenient.verify_at(&token, NOW).is_ok());

        let mut future = claims(NOW + 7200);
        future.nbf = Some(NOW + 600);
        let token = verifier.sign(&future).unwrap();
        assert_eq!(verifier.verify_at(&token, NOW), Err(TokenError::NotYetValid));
    }

    #[test]
    fn test_rejects_tampered_payload() {
        let verifier = TokenVerifier::new("secret");
        let token = verifier.sign(&claims(NOW + 3600)).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"intruder","role":"admin"}"#);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged;

        let err = verifier.verify_at(&parts.join("."), NOW).unwrap_err();
        assert_eq!(err, TokenError::BadSignature);
    }

    #[test]
    fn test_rejects_other_algorithms() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1"}"#);
        let token = format!("{}.{}.", header, payload);

        let err = TokenVerifier::new("secret").verify_at(&token, NOW).unwrap_err();
        assert_eq!(err, TokenError::UnsupportedAlgorithm("none".to_string()));
    }

    #[test]
    fn test_malformed_tokens() {
        let verifier = TokenVerifier::new("secret");
        assert!(matches!(verifier.verify_at("", NOW), Err(TokenError::Malformed(_))));
        assert!(matches!(verifier.verify_at("a.b", NOW), Err(TokenError::Malformed(_))));
        assert!(matches!(
            verifier.verify_at("a.b.c.d", NOW),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            verifier.verify_at("!!.??.zz", NOW),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_unverified_ignores_signature() {
        let token = TokenVerifier::new("secret").sign(&claims(NOW - 10)).unwrap();
        let decoded = decode_unverified(&token).unwrap();
        assert_eq!(decoded.email.as_deref(), Some("grace@farm.io"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let printed = format!("{:?}", TokenVerifier::new("hunter2"));
        assert!(!printed.contains("hunter2"));
    }
}
