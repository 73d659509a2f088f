// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behaviour
//!
//! - Key sets are fetched from `{issuer}/.well-known/jwks.json`
//! - Entries are cached per issuer with a TTL (default one hour) in a bounded
//!   LRU; expiry is lazy, there is no background refresh
//! - Concurrent misses for one issuer share a single fetch
//! - Every fetch is bounded by a timeout
//! - A token naming an unknown `kid` triggers one forced refresh, at most
//!   once per [`MIN_FORCED_REFRESH_INTERVAL`] per issuer
//!
//! The directory is an explicit component: build one at start-up and share it
//! through `Arc`. Entries are replaced wholesale, never patched in place.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::codec::VerificationKey;
use super::error::AuthError;
use super::keys;
use super::single_flight::{SingleFlight, SingleFlightStats};

/// Default JWKS cache TTL (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default bound on a single JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of issuers kept in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Minimum age of a cached key set before an unknown `kid` may force a refresh.
pub const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A single published key.
///
/// Kept separate from `jsonwebtoken::jwk::Jwk`, which rejects unknown key
/// shapes and has no field for the non-standard `pem` some issuers publish.
/// Every field except `kty` is optional so one odd entry never fails the set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Certificate chain (standard base64 DER), leaf first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// Ready-made PEM public key (non-standard, emitted by some issuers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem: Option<String>,
}

/// A provider's published key set. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Parse a JWKS document.
    ///
    /// The document must contain a `keys` array. Entries that are not valid
    /// keys are skipped.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, AuthError> {
        let entries = document
            .get("keys")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| AuthError::FormatError("response has no keys array".to_string()))?;

        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Jwk>(entry.clone()) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(error = %e, "Skipping unreadable JWKS entry"),
            }
        }
        Ok(Self { keys })
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, AuthError> {
        let document: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AuthError::FormatError(format!("response is not JSON: {e}")))?;
        Self::from_json(&document)
    }

    pub fn contains_kid(&self, kid: &str) -> bool {
        self.keys.iter().any(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Source of JWKS documents.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<KeySet, AuthError>;
}

/// HTTPS fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::FetchError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn fetch_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::FetchTimeout
    } else {
        AuthError::FetchError(e.to_string())
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, url: &str) -> Result<KeySet, AuthError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(fetch_error)?;

        if !response.status().is_success() {
            return Err(AuthError::FetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(fetch_error)?;
        KeySet::from_slice(&body)
    }
}

/// Strip trailing slashes so `https://a/` and `https://a` share a cache entry.
pub fn normalize_issuer(issuer: &str) -> &str {
    issuer.trim_end_matches('/')
}

/// Well-known JWKS location for an issuer.
pub fn jwks_url(issuer: &str) -> String {
    format!("{}{JWKS_PATH}", normalize_issuer(issuer))
}

/// Locate the key that signed a token.
///
/// Exact `kid` match first; otherwise the first RSA signing key; otherwise the
/// first key in the set.
pub fn find_key<'a>(key_set: &'a KeySet, kid: Option<&str>) -> Option<&'a Jwk> {
    if let Some(kid) = kid {
        if let Some(key) = key_set.keys.iter().find(|k| k.kid.as_deref() == Some(kid)) {
            return Some(key);
        }
    }

    key_set
        .keys
        .iter()
        .find(|k| k.kty == "RSA" && k.key_use.as_deref().is_none_or(|u| u == "sig"))
        .or_else(|| key_set.keys.first())
}

/// Convert a published key into verification-ready material.
///
/// `x5c` wins over `n`/`e`; a ready-made `pem` or an EC point are accepted
/// after those.
pub fn to_verification_key(key: &Jwk) -> Result<VerificationKey, AuthError> {
    if let Some(cert) = key.x5c.as_ref().and_then(|chain| chain.first()) {
        return Ok(VerificationKey::CertificatePem(keys::certificate_pem(cert)?));
    }

    if let (Some(n), Some(e)) = (&key.n, &key.e) {
        return Ok(VerificationKey::RsaComponents {
            n: n.clone(),
            e: e.clone(),
        });
    }

    if let Some(pem) = &key.pem {
        return Ok(VerificationKey::PublicKeyPem(pem.clone()));
    }

    if key.kty == "EC" {
        if let (Some(x), Some(y)) = (&key.x, &key.y) {
            return Ok(VerificationKey::EcPoint {
                x: x.clone(),
                y: y.clone(),
            });
        }
    }

    Err(AuthError::UnsupportedKeyFormat(format!(
        "{} key carries no usable public key",
        key.kty
    )))
}

/// JWKS cache entry.
#[derive(Clone)]
struct CacheEntry {
    key_set: Arc<KeySet>,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Cache state of one issuer, for operational tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub issuer: String,
    pub key_count: usize,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

type KeyCache = Mutex<LruCache<String, CacheEntry>>;

/// Time of the last forced refresh per issuer, successful or not.
type RefreshLog = Mutex<LruCache<String, DateTime<Utc>>>;

fn lock<V>(cache: &Mutex<LruCache<String, V>>) -> MutexGuard<'_, LruCache<String, V>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_lru<V>(capacity: usize) -> Mutex<LruCache<String, V>> {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
}

fn fresh_entry(cache: &KeyCache, issuer: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
    lock(cache)
        .get(issuer)
        .filter(|entry| now < entry.expires_at)
        .cloned()
}

fn add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// JWKS directory with per-issuer caching and fetch coalescing.
pub struct KeyDirectory {
    fetcher: Arc<dyn JwksFetcher>,
    clock: Arc<dyn Clock>,
    cache: Arc<KeyCache>,
    refreshes: RefreshLog,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    flights: SingleFlight<String, Result<Arc<KeySet>, AuthError>>,
}

impl KeyDirectory {
    pub fn new(fetcher: Arc<dyn JwksFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            clock,
            cache: Arc::new(new_lru(DEFAULT_CACHE_CAPACITY)),
            refreshes: new_lru(DEFAULT_CACHE_CAPACITY),
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            flights: SingleFlight::new(),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Bound the number of cached issuers. Drops anything already cached.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.cache = Arc::new(new_lru(capacity));
        self.refreshes = new_lru(capacity);
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Key set for `issuer`, from cache or from its well-known endpoint.
    pub async fn get_key_set(&self, issuer: &str) -> Result<Arc<KeySet>, AuthError> {
        let issuer = normalize_issuer(issuer);
        if let Some(entry) = fresh_entry(&self.cache, issuer, self.clock.now()) {
            debug!(issuer, "Using cached JWKS");
            return Ok(entry.key_set);
        }
        self.fetch(issuer.to_string(), false).await
    }

    /// Key that signed a token from `issuer` with header `kid`.
    ///
    /// An unknown `kid` forces one refresh when the cached set is older than
    /// [`MIN_FORCED_REFRESH_INTERVAL`], to pick up rotated keys.
    pub async fn signing_key(&self, issuer: &str, kid: Option<&str>) -> Result<Jwk, AuthError> {
        let mut key_set = self.get_key_set(issuer).await?;

        if let Some(kid) = kid {
            if !key_set.contains_kid(kid) && self.may_force_refresh(issuer) {
                debug!(issuer, kid, "Unknown key id, refreshing JWKS");
                match self.fetch(normalize_issuer(issuer).to_string(), true).await {
                    Ok(refreshed) => key_set = refreshed,
                    Err(e) => warn!(issuer, error = %e, "JWKS refresh for unknown key id failed"),
                }
            }
        }

        find_key(&key_set, kid)
            .cloned()
            .ok_or(AuthError::NoMatchingKey)
    }

    /// Claim the issuer's forced-refresh slot.
    ///
    /// The cached set must be older than [`MIN_FORCED_REFRESH_INTERVAL`] and so
    /// must the previous forced refresh, whether or not that one succeeded.
    fn may_force_refresh(&self, issuer: &str) -> bool {
        let issuer = normalize_issuer(issuer);
        let now = self.clock.now();
        let settled = |at: DateTime<Utc>| add(at, MIN_FORCED_REFRESH_INTERVAL) <= now;

        let stale = lock(&self.cache)
            .peek(issuer)
            .is_some_and(|entry| settled(entry.fetched_at));
        if !stale {
            return false;
        }

        let mut refreshes = lock(&self.refreshes);
        if refreshes.peek(issuer).is_some_and(|at| !settled(*at)) {
            return false;
        }
        refreshes.put(issuer.to_string(), now);
        true
    }

    async fn fetch(&self, issuer: String, force: bool) -> Result<Arc<KeySet>, AuthError> {
        let fetcher = Arc::clone(&self.fetcher);
        let clock = Arc::clone(&self.clock);
        let cache = Arc::clone(&self.cache);
        let ttl = self.cache_ttl;
        let timeout = self.fetch_timeout;

        let operation = {
            let issuer = issuer.clone();
            async move {
                // Another caller may have filled the cache since our miss.
                if !force {
                    if let Some(entry) = fresh_entry(&cache, &issuer, clock.now()) {
                        return Ok(entry.key_set);
                    }
                }

                let url = jwks_url(&issuer);
                info!(issuer = %issuer, url = %url, "Fetching JWKS");

                let fetched = match tokio::time::timeout(timeout, fetcher.fetch(&url)).await {
                    Ok(result) => result,
                    Err(_) => Err(AuthError::FetchTimeout),
                };

                match fetched {
                    Ok(key_set) => {
                        let key_set = Arc::new(key_set);
                        let fetched_at = clock.now();
                        lock(&cache).put(
                            issuer.clone(),
                            CacheEntry {
                                key_set: Arc::clone(&key_set),
                                fetched_at,
                                expires_at: add(fetched_at, ttl),
                            },
                        );
                        info!(issuer = %issuer, key_count = key_set.keys.len(), "Cached JWKS");
                        Ok(key_set)
                    }
                    Err(e) => {
                        warn!(issuer = %issuer, error = %e, "JWKS fetch failed");
                        Err(e)
                    }
                }
            }
        };

        self.flights
            .run(issuer, operation)
            .await
            .unwrap_or_else(|e| Err(AuthError::FetchError(e.to_string())))
    }

    /// Check if a non-expired key set is cached for `issuer`.
    pub fn is_cached(&self, issuer: &str) -> bool {
        fresh_entry(&self.cache, normalize_issuer(issuer), self.clock.now()).is_some()
    }

    /// Drop one issuer's cached key set.
    pub fn invalidate(&self, issuer: &str) -> bool {
        lock(&self.cache).pop(normalize_issuer(issuer)).is_some()
    }

    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
        lock(&self.refreshes).clear();
        debug!("JWKS cache cleared");
    }

    pub fn cache_status(&self) -> Vec<CacheStatus> {
        let now = self.clock.now();
        let mut status: Vec<CacheStatus> = lock(&self.cache)
            .iter()
            .map(|(issuer, entry)| CacheStatus {
                issuer: issuer.clone(),
                key_count: entry.key_set.keys.len(),
                fetched_at: entry.fetched_at,
                expires_at: entry.expires_at,
                expired: now >= entry.expires_at,
            })
            .collect();
        status.sort_by(|a, b| a.issuer.cmp(&b.issuer));
        status
    }

    pub fn fetch_stats(&self) -> SingleFlightStats {
        self.flights.stats()
    }
}
