// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact token decoding and signature verification.
//!
//! [`decode`] splits a token into header, payload and signature without
//! trusting any of it. [`verify_signature`] checks the signature against
//! explicit key material and an explicit algorithm allow-list; claim checks
//! are left to the validation policy.

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{decode as jwt_decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::claims::Claims;
use super::error::AuthError;
use super::keys;

/// Algorithms accepted for keys obtained from a JWKS or a configured public key.
pub const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// JOSE header of a compact token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A structurally valid token whose contents have not been verified.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: TokenHeader,
    pub payload: Claims,
    pub signature: Vec<u8>,
}

/// Coarse shape of a raw bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenShape {
    /// Three dot-separated segments (JWS compact serialization)
    Jwt,
    /// Five segments (JWE), which only the issuer can read
    Encrypted,
    /// No dots at all, typically a provider reference token
    Reference,
    /// Any other segment count
    Malformed,
}

impl TokenShape {
    pub fn classify(token: &str) -> Self {
        match token.split('.').count() {
            1 => TokenShape::Reference,
            3 => TokenShape::Jwt,
            5 => TokenShape::Encrypted,
            _ => TokenShape::Malformed,
        }
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, AuthError> {
    Base64UrlUnpadded::decode_vec(segment)
        .map_err(|_| AuthError::MalformedToken(format!("{name} is not valid base64url")))
}

/// Decode a compact token without verifying it.
pub fn decode(token: &str) -> Result<DecodedToken, AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    if header.is_empty() || payload.is_empty() {
        return Err(AuthError::MalformedToken("empty header or payload".to_string()));
    }

    let header: TokenHeader = serde_json::from_slice(&decode_segment(header, "header")?)
        .map_err(|e| AuthError::MalformedToken(format!("header is not a JOSE object: {e}")))?;
    let payload: Claims = serde_json::from_slice(&decode_segment(payload, "payload")?)
        .map_err(|e| AuthError::MalformedToken(format!("payload is not a claims object: {e}")))?;
    let signature = decode_segment(signature, "signature")?;

    Ok(DecodedToken {
        header,
        payload,
        signature,
    })
}

/// Family of key material, used to reject algorithm/key mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
}

fn family_of(alg: Algorithm) -> Option<KeyFamily> {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Some(KeyFamily::Hmac),
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some(KeyFamily::Rsa),
        Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
        _ => None,
    }
}

/// Verification-ready key material.
#[derive(Clone, PartialEq, Eq)]
pub enum VerificationKey {
    /// Shared HMAC secret
    Secret(Vec<u8>),
    /// PEM public key (`PUBLIC KEY` or `RSA PUBLIC KEY`)
    PublicKeyPem(String),
    /// PEM X.509 certificate; its subject public key is used
    CertificatePem(String),
    /// RSA modulus and exponent from JWK `n`/`e` (base64url)
    RsaComponents { n: String, e: String },
    /// Elliptic-curve point from JWK `x`/`y` (base64url)
    EcPoint { x: String, y: String },
}

// Key bytes stay out of logs.
impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationKey::Secret(_) => f.write_str("Secret(<redacted>)"),
            VerificationKey::PublicKeyPem(_) => f.write_str("PublicKeyPem(..)"),
            VerificationKey::CertificatePem(_) => f.write_str("CertificatePem(..)"),
            VerificationKey::RsaComponents { .. } => f.write_str("RsaComponents(..)"),
            VerificationKey::EcPoint { .. } => f.write_str("EcPoint(..)"),
        }
    }
}

fn public_key_from_pem(pem: &[u8]) -> Result<(DecodingKey, KeyFamily), AuthError> {
    if let Ok(key) = DecodingKey::from_rsa_pem(pem) {
        return Ok((key, KeyFamily::Rsa));
    }
    DecodingKey::from_ec_pem(pem)
        .map(|key| (key, KeyFamily::Ec))
        .map_err(|_| AuthError::UnsupportedKeyFormat("PEM is not an RSA or EC public key".into()))
}

impl VerificationKey {
    /// Convert into a `jsonwebtoken` decoding key.
    pub fn to_decoding_key(&self) -> Result<(DecodingKey, KeyFamily), AuthError> {
        match self {
            VerificationKey::Secret(secret) => {
                Ok((DecodingKey::from_secret(secret), KeyFamily::Hmac))
            }
            VerificationKey::PublicKeyPem(pem) => public_key_from_pem(pem.as_bytes()),
            VerificationKey::CertificatePem(cert) => {
                let spki = keys::public_key_pem_from_certificate(cert)?;
                public_key_from_pem(spki.as_bytes())
            }
            VerificationKey::RsaComponents { n, e } => DecodingKey::from_rsa_components(n, e)
                .map(|key| (key, KeyFamily::Rsa))
                .map_err(|e| {
                    AuthError::UnsupportedKeyFormat(format!("invalid RSA parameters: {e}"))
                }),
            VerificationKey::EcPoint { x, y } => DecodingKey::from_ec_components(x, y)
                .map(|key| (key, KeyFamily::Ec))
                .map_err(|e| AuthError::UnsupportedKeyFormat(format!("invalid EC point: {e}"))),
        }
    }
}

/// Verify the token signature and return the algorithm that was used.
///
/// The header `alg` must be in `allowed` and belong to the same family as
/// `key`. Expiry, audience and issuer are not checked here.
pub fn verify_signature(
    token: &str,
    key: &VerificationKey,
    allowed: &[Algorithm],
) -> Result<Algorithm, AuthError> {
    let header = decode_header(token)
        .map_err(|e| AuthError::MalformedToken(format!("unreadable header: {e}")))?;
    let algorithm = header.alg;

    if !allowed.contains(&algorithm) {
        tracing::debug!(?algorithm, "Rejected token algorithm outside the allow-list");
        return Err(AuthError::InvalidSignature);
    }

    let (decoding_key, family) = key.to_decoding_key()?;
    if family_of(algorithm) != Some(family) {
        tracing::debug!(?algorithm, ?family, "Token algorithm does not match key family");
        return Err(AuthError::InvalidSignature);
    }

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    jwt_decode::<serde_json::Value>(token, &decoding_key, &validation).map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::MalformedToken(e.to_string())
            }
            ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
                AuthError::UnsupportedKeyFormat(e.to_string())
            }
            _ => AuthError::InvalidSignature,
        }
    })?;

    Ok(algorithm)
}
