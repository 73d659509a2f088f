// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity provider detection and remediation hints.
//!
//! Issuers are matched against known provider signatures (host and path
//! patterns). When the issuer is unrecognised, a few claim heuristics are
//! tried. The result only drives error enrichment and opaque-token detection,
//! never trust decisions.

use serde::Serialize;
use url::Url;

use super::claims::Claims;
use super::error::{AuthError, AuthFailure};

/// Known identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Auth0,
    Clerk,
    Firebase,
    Supabase,
    Cognito,
    Okta,
    Entra,
    Google,
    Keycloak,
}

impl Provider {
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Auth0 => "Auth0",
            Provider::Clerk => "Clerk",
            Provider::Firebase => "Firebase",
            Provider::Supabase => "Supabase",
            Provider::Cognito => "AWS Cognito",
            Provider::Okta => "Okta",
            Provider::Entra => "Microsoft Entra ID",
            Provider::Google => "Google",
            Provider::Keycloak => "Keycloak",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    Suffix(String),
    Prefix(String),
}

impl HostPattern {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(h) => host == h,
            HostPattern::Suffix(s) => host.ends_with(s.as_str()),
            HostPattern::Prefix(p) => host.starts_with(p.as_str()),
        }
    }
}

/// Issuer pattern identifying one provider.
///
/// A signature matches when any of its host patterns matches the issuer host
/// (or it has none) and the issuer path contains its path marker (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSignature {
    provider: Provider,
    hosts: Vec<HostPattern>,
    path_marker: Option<String>,
    opaque_access_tokens: bool,
}

impl ProviderSignature {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            hosts: Vec::new(),
            path_marker: None,
            opaque_access_tokens: false,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(HostPattern::Exact(host.into().to_ascii_lowercase()));
        self
    }

    /// Match hosts ending with `suffix`, e.g. `.auth0.com`.
    pub fn host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.hosts.push(HostPattern::Suffix(suffix.into().to_ascii_lowercase()));
        self
    }

    pub fn host_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hosts.push(HostPattern::Prefix(prefix.into().to_ascii_lowercase()));
        self
    }

    pub fn path_marker(mut self, marker: impl Into<String>) -> Self {
        self.path_marker = Some(marker.into());
        self
    }

    /// The provider may hand out access tokens that are not verifiable JWTs.
    pub fn issues_opaque_tokens(mut self) -> Self {
        self.opaque_access_tokens = true;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn matches(&self, issuer: &Url) -> bool {
        let Some(host) = issuer.host_str() else {
            return false;
        };
        if self.hosts.is_empty() && self.path_marker.is_none() {
            return false;
        }
        let host_ok = self.hosts.is_empty() || self.hosts.iter().any(|p| p.matches(host));
        let path_ok = self
            .path_marker
            .as_deref()
            .is_none_or(|marker| issuer.path().contains(marker));
        host_ok && path_ok
    }
}

fn builtin_signatures() -> Vec<ProviderSignature> {
    vec![
        ProviderSignature::new(Provider::Auth0)
            .host_suffix(".auth0.com")
            .issues_opaque_tokens(),
        ProviderSignature::new(Provider::Clerk)
            .host_suffix(".clerk.accounts.dev")
            .host_suffix(".clerk.com")
            .host_prefix("clerk."),
        ProviderSignature::new(Provider::Firebase).host("securetoken.google.com"),
        ProviderSignature::new(Provider::Supabase)
            .host_suffix(".supabase.co")
            .path_marker("/auth/v1"),
        ProviderSignature::new(Provider::Cognito)
            .host_prefix("cognito-idp.")
            .path_marker("_"),
        ProviderSignature::new(Provider::Okta)
            .host_suffix(".okta.com")
            .host_suffix(".oktapreview.com"),
        ProviderSignature::new(Provider::Entra)
            .host("login.microsoftonline.com")
            .host("sts.windows.net"),
        ProviderSignature::new(Provider::Google).host("accounts.google.com"),
        ProviderSignature::new(Provider::Keycloak).path_marker("/realms/"),
    ]
}

/// Registry of provider signatures.
#[derive(Debug, Clone)]
pub struct IssuerHintRegistry {
    signatures: Vec<ProviderSignature>,
}

impl Default for IssuerHintRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IssuerHintRegistry {
    /// Registry with the built-in provider signatures.
    pub fn new() -> Self {
        Self {
            signatures: builtin_signatures(),
        }
    }

    /// Add a signature, e.g. an Auth0 custom domain. Custom signatures are
    /// consulted before the built-in ones.
    pub fn register(&mut self, signature: ProviderSignature) {
        self.signatures.insert(0, signature);
    }

    fn signature_for(&self, issuer: &str) -> Option<&ProviderSignature> {
        let url = Url::parse(issuer).ok()?;
        self.signatures.iter().find(|s| s.matches(&url))
    }

    /// Provider whose signature matches `issuer`.
    pub fn detect(&self, issuer: &str) -> Option<Provider> {
        self.signature_for(issuer).map(ProviderSignature::provider)
    }

    /// Provider from the issuer, falling back to claim heuristics.
    pub fn detect_from_claims(&self, claims: &Claims) -> Option<Provider> {
        if let Some(provider) = claims.issuer().and_then(|iss| self.detect(iss)) {
            return Some(provider);
        }

        if claims.azp.as_deref().is_some_and(|azp| azp.contains("clerk")) {
            return Some(Provider::Clerk);
        }
        if claims.extra.contains_key("firebase") {
            return Some(Provider::Firebase);
        }
        let authenticated_role = claims
            .extra
            .get("role")
            .and_then(serde_json::Value::as_str)
            == Some("authenticated");
        if authenticated_role && claims.extra.contains_key("aal") {
            return Some(Provider::Supabase);
        }
        None
    }

    /// Whether `issuer` belongs to a provider known for opaque access tokens.
    pub fn is_opaque_issuer(&self, issuer: &str) -> bool {
        self.signature_for(issuer)
            .is_some_and(|s| s.opaque_access_tokens)
    }

    /// Remediation text for `error` raised on a token from `provider`.
    pub fn remediation(&self, provider: Option<Provider>, error: &AuthError) -> String {
        provider
            .and_then(|p| provider_remediation(p, error))
            .unwrap_or_else(|| generic_remediation(error))
            .to_string()
    }

    /// Attach the detected provider and a remediation hint to `error`.
    ///
    /// `claims` are the unverified token claims, used for detection only.
    pub fn enrich(&self, error: AuthError, claims: Option<&Claims>) -> AuthFailure {
        let provider = claims.and_then(|c| self.detect_from_claims(c));
        let hint = self.remediation(provider, &error);
        AuthFailure::new(error).with_hint(provider, hint)
    }
}

fn provider_remediation(provider: Provider, error: &AuthError) -> Option<&'static str> {
    use AuthError::*;

    let hint = match (provider, error) {
        (Provider::Auth0, OpaqueToken) => {
            "Auth0 issued an opaque access token. Request the token with an API audience \
             (authorizationParams.audience) so Auth0 issues a JWT."
        }
        (Provider::Auth0, AudienceMismatch { .. }) => {
            "Configure an audience in your Auth0 API settings and request tokens for that \
             API identifier."
        }
        (Provider::Clerk, Expired | InvalidClaims(_)) => {
            "Clerk session tokens are short-lived. Call getToken() before each request \
             instead of caching the token."
        }
        (Provider::Clerk, NoMatchingKey | InvalidSignature) => {
            "The token was not signed by the Clerk instance named in its issuer. Check the \
             frontend API URL of your Clerk application."
        }
        (Provider::Firebase, FetchError(_) | FetchTimeout | NoMatchingKey) => {
            "Firebase does not publish keys at the issuer's well-known JWKS path. Set \
             EXTERNAL_JWT_PUBLIC_KEY to the project's signing certificate."
        }
        (Provider::Supabase, FetchError(_) | NoMatchingKey | InvalidSignature) => {
            "Projects signing with the legacy Supabase JWT secret publish no JWKS. Set \
             EXTERNAL_JWT_SECRET or enable asymmetric signing keys in Supabase."
        }
        (Provider::Cognito, AudienceMismatch { .. }) => {
            "Cognito access tokens carry client_id rather than aud. Send the ID token or \
             leave EXTERNAL_JWT_AUDIENCE unset."
        }
        (Provider::Entra, AudienceMismatch { .. }) => {
            "Request the token for your API's application ID URI so its aud matches \
             EXTERNAL_JWT_AUDIENCE."
        }
        (Provider::Okta, AudienceMismatch { .. }) => {
            "Okta's org authorization server issues tokens for Okta APIs only. Use a custom \
             authorization server whose audience matches EXTERNAL_JWT_AUDIENCE."
        }
        (Provider::Keycloak, AudienceMismatch { .. }) => {
            "Add an audience mapper to the Keycloak client so tokens carry the expected aud."
        }
        _ => return None,
    };
    Some(hint)
}

fn generic_remediation(error: &AuthError) -> &'static str {
    use AuthError::*;

    match error {
        MissingAuthHeader | InvalidAuthHeader => {
            "Send the token as 'Authorization: Bearer <token>'."
        }
        MalformedToken(_) => "The credential is not a well-formed JWT.",
        Expired | NotYetValid | InvalidClaims(_) => {
            "Obtain a fresh token from your identity provider and check the server clock."
        }
        InvalidSignature | NoMatchingKey => {
            "The token was not signed by a key its issuer publishes."
        }
        InvalidIssuer(_) | IssuerMismatch { .. } => {
            "Tokens must come from an HTTPS issuer; set EXTERNAL_JWT_ISSUER to the issuer \
             you expect."
        }
        AudienceMismatch { .. } => {
            "Request the token for the audience configured in EXTERNAL_JWT_AUDIENCE."
        }
        MissingIdentityClaims => {
            "The token must carry one of the claims sub, user_id, userId or email."
        }
        OpaqueToken => "Send a JWT access token, not an opaque reference token.",
        UnsupportedKeyFormat(_) => {
            "The issuer publishes keys without x5c or RSA n/e parameters."
        }
        FetchError(_) | FetchTimeout | FormatError(_) => {
            "The issuer's JWKS endpoint could not be used. Check that \
             /.well-known/jwks.json under the issuer URL is reachable."
        }
        NoMatchingValidator => {
            "No validator accepts this issuer. Configure EXTERNAL_JWT_ISSUER or use a \
             token from the internal issuer."
        }
        VerificationAborted => "Retry the request.",
    }
}
