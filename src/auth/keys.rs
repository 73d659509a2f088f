// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! X.509 handling for published signing keys.
//!
//! JWKS entries may carry their key as an `x5c` chain of standard base64 DER
//! certificates. The leaf is kept as PEM and its subject public key is handed
//! to `jsonwebtoken` as a `PUBLIC KEY` block.

use base64ct::{Base64, Encoding};
use ::pem::Pem;
use x509_parser::prelude::*;

use super::error::AuthError;

fn unsupported(reason: impl Into<String>) -> AuthError {
    AuthError::UnsupportedKeyFormat(reason.into())
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, AuthError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| unsupported(format!("invalid X.509 certificate: {e}")))?;
    Ok(cert)
}

/// Wrap the first `x5c` certificate (standard base64 DER) as a PEM block.
pub fn certificate_pem(x5c: &str) -> Result<String, AuthError> {
    let der = Base64::decode_vec(x5c.trim())
        .map_err(|_| unsupported("x5c certificate is not valid base64"))?;
    parse_certificate(&der)?;
    Ok(::pem::encode(&Pem::new("CERTIFICATE", der)))
}

/// Extract the subject public key of a PEM certificate as a `PUBLIC KEY` PEM.
pub fn public_key_pem_from_certificate(cert_pem: &str) -> Result<String, AuthError> {
    let block = ::pem::parse(cert_pem).map_err(|e| unsupported(format!("invalid PEM: {e}")))?;
    if block.tag() != "CERTIFICATE" {
        return Err(unsupported(format!("expected CERTIFICATE, got {}", block.tag())));
    }
    let cert = parse_certificate(block.contents())?;
    let spki = cert.public_key().raw.to_vec();
    Ok(::pem::encode(&Pem::new("PUBLIC KEY", spki)))
}
