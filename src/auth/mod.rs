// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Multi-strategy bearer token verification for the Relational API gateway.
//!
//! ## Auth Flow
//!
//! 1. The client sends `Authorization: Bearer <JWT>`
//! 2. [`AuthMode`] is derived from configuration:
//!    - `EXTERNAL_JWT_ISSUER` set → only that issuer, via its JWKS
//!    - fixed key or secret set → that key only (RS256 / HS256)
//!    - outside production → any HTTPS issuer, discovered through
//!      `{issuer}/.well-known/jwks.json`
//!    - otherwise → internally minted tokens only
//! 3. The first validator in the chain whose `can_handle` accepts the token
//!    verifies it; there is no fallthrough after a match
//! 4. The verified identity resolves the user id from `sub`, `user_id`,
//!    `userId` or `email`
//!
//! ## Security
//!
//! - Auto-discovery is closed in production
//! - JWKS-backed validators accept asymmetric algorithms only
//! - JWKS responses are cached per issuer with a TTL; concurrent misses share
//!   one fetch
//! - Raw tokens are never logged or used as map keys (SHA-256 digests are)

pub mod authenticator;
pub mod claims;
pub mod clock;
pub mod codec;
pub mod error;
pub mod extractor;
pub mod factory;
pub mod internal;
pub mod jwks;
pub mod keys;
pub mod mode;
pub mod policy;
pub mod providers;
pub mod single_flight;
pub mod validators;

#[cfg(test)]
pub(crate) mod testutil;

pub use authenticator::{verify_request_token, Authenticator};
pub use claims::{Claims, VerifiedIdentity};
pub use clock::{Clock, SystemClock};
pub use error::{AuthError, AuthFailure};
pub use extractor::{Auth, OptionalAuth};
pub use factory::AuthDependencies;
pub use internal::InternalIssuer;
pub use jwks::{HttpJwksFetcher, KeyDirectory};
pub use mode::AuthMode;
pub use providers::{IssuerHintRegistry, Provider};
pub use validators::{Validator, ValidatorKind};
