// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Builds the ordered validator chain for an authentication mode.

use std::sync::Arc;

use jsonwebtoken::Algorithm;
use tracing::{info, warn};

use super::clock::Clock;
use super::codec::VerificationKey;
use super::internal::InternalIssuer;
use super::jwks::KeyDirectory;
use super::mode::AuthMode;
use super::policy::ValidationPolicy;
use super::providers::IssuerHintRegistry;
use super::validators::{
    AutoDiscoveryValidator, ClerkValidator, ConfiguredIssuerValidator, Discovery,
    FixedKeyValidator, InternalValidator, Validator,
};
use crate::config::AuthConfig;

/// Long-lived collaborators shared by every chain.
#[derive(Clone)]
pub struct AuthDependencies {
    pub directory: Arc<KeyDirectory>,
    pub internal: Arc<InternalIssuer>,
    pub hints: Arc<IssuerHintRegistry>,
    pub clock: Arc<dyn Clock>,
}

/// Ordered chain for `mode`, most specific first.
///
/// `ConfiguredIssuer` installs a single JWKS validator: dispatch never falls
/// through after a match, so a second validator for the same issuer could not
/// be reached.
pub fn build(config: &AuthConfig, mode: AuthMode, deps: &AuthDependencies) -> Vec<Validator> {
    let policy = ValidationPolicy::new(config, Arc::clone(&deps.clock), Arc::clone(&deps.hints));
    let discovery = || Discovery::new(Arc::clone(&deps.directory), policy.clone());
    let internal = || Validator::Internal(InternalValidator::new(Arc::clone(&deps.internal)));

    let chain = match mode {
        AuthMode::ConfiguredIssuer => match &config.external_issuer {
            Some(issuer) => vec![Validator::ConfiguredIssuer(ConfiguredIssuerValidator::new(
                issuer.clone(),
                discovery(),
            ))],
            None => {
                warn!("ConfiguredIssuer mode without EXTERNAL_JWT_ISSUER, accepting internal tokens only");
                vec![internal()]
            }
        },
        AuthMode::LegacyKey => match fixed_key(config) {
            Some((key, algorithm)) => vec![Validator::FixedKey(FixedKeyValidator::new(
                key,
                algorithm,
                policy.clone(),
            ))],
            None => {
                warn!("LegacyKey mode without a key or secret, accepting internal tokens only");
                vec![internal()]
            }
        },
        AuthMode::AutoDiscovery => vec![
            Validator::Clerk(ClerkValidator::new(discovery(), Arc::clone(&deps.hints))),
            Validator::AutoDiscovery(AutoDiscoveryValidator::new(discovery())),
            internal(),
        ],
        AuthMode::Anonymous => vec![internal()],
    };

    let validators: Vec<&str> = chain.iter().map(|v| v.kind().name()).collect();
    info!(
        mode = %mode,
        rationale = mode.rationale(),
        validators = ?validators,
        production = config.is_production(),
        "Authentication mode selected"
    );

    chain
}

/// Public key wins over secret: RS256 for a PEM, HS256 for a secret.
fn fixed_key(config: &AuthConfig) -> Option<(VerificationKey, Algorithm)> {
    if let Some(pem) = &config.external_public_key {
        let key = if pem.contains("BEGIN CERTIFICATE") {
            VerificationKey::CertificatePem(pem.clone())
        } else {
            VerificationKey::PublicKeyPem(pem.clone())
        };
        return Some((key, Algorithm::RS256));
    }
    config
        .external_secret
        .as_ref()
        .map(|secret| (VerificationKey::Secret(secret.as_bytes().to_vec()), Algorithm::HS256))
}
