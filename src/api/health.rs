// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::auth::jwks::CacheStatus;
use crate::auth::{AuthMode, ValidatorKind};
use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Active authentication mode.
    pub auth_mode: AuthMode,
    /// Validator chain, in dispatch order.
    pub validators: Vec<ValidatorKind>,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
    /// Cached key sets.
    pub jwks_cache: Vec<CacheStatus>,
}

/// Individual health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// JWKS status of the configured issuer.
    /// Only present in configured-issuer mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Check that the configured issuer's keys are available.
async fn check_jwks(state: &AppState) -> Option<String> {
    if state.authenticator.mode() != AuthMode::ConfiguredIssuer {
        return None;
    }
    let issuer = state.config.external_issuer.as_deref()?;
    match state.directory.get_key_set(issuer).await {
        Ok(_) => Some("ok".to_string()),
        Err(e) => {
            tracing::warn!(issuer, error = %e, "JWKS unavailable for configured issuer");
            Some("unavailable".to_string())
        }
    }
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let jwks = check_jwks(&state).await;
    let all_ok = jwks.as_deref().is_none_or(|s| s == "ok");

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        auth_mode: state.authenticator.mode(),
        validators: state.authenticator.validators(),
        checks: HealthChecks {
            service: "ok".to_string(),
            jwks,
        },
        jwks_cache: state.directory.cache_status(),
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if all dependencies are available.
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}
