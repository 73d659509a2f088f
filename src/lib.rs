// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Auth Gateway - multi-strategy JWT verification
//!
//! Accepts bearer tokens minted by the internal issuer as well as tokens from
//! external identity providers (Auth0, Clerk, Firebase, Supabase or any OIDC
//! issuer), discovered through their published JWKS.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (Axum): health probes and `/v1/me`
//! - `auth` - Mode detection, validator chain, JWKS cache, token verification
//! - `config` - Environment variables and configuration snapshots
//! - `state` - Shared application state

pub mod api;
pub mod auth;
pub mod config;
pub mod state;
