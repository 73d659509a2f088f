// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new().route("/me", get(users::me));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::testutil;
    use crate::config::AuthConfig;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn liveness_is_ok() {
        let app = router(testutil::app_state(AuthConfig::default()));
        let (status, body) = send(app, get("/health/live", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn health_reports_mode_and_chain() {
        let app = router(testutil::app_state(AuthConfig::default()));
        let (status, body) = send(app, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth_mode"], "auto_discovery");
        assert_eq!(body["validators"], json!(["clerk", "auto_discovery", "internal"]));
        assert!(body["checks"].get("jwks").is_none());
    }

    #[tokio::test]
    async fn readiness_checks_configured_issuer_keys() {
        let state = testutil::app_state(AuthConfig {
            external_issuer: Some("https://idp.example.com".into()),
            ..AuthConfig::default()
        });
        let (status, body) = send(router(state), get("/health/ready", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["jwks"], "ok");
        assert_eq!(body["jwks_cache"][0]["issuer"], "https://idp.example.com");
    }

    #[tokio::test]
    async fn me_requires_token() {
        let app = router(testutil::app_state(AuthConfig::default()));
        let (status, body) = send(app, get("/v1/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn me_returns_internal_identity() {
        let state = testutil::app_state(AuthConfig::default());
        let token = state.internal.mint(Some("u1")).unwrap();
        let (status, body) = send(router(state), get("/v1/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["validator"], "internal");
        assert_eq!(body["issuer"], "internal");
    }

    #[tokio::test]
    async fn me_explains_opaque_auth0_token() {
        let app = router(testutil::app_state(AuthConfig::default()));
        let token = testutil::sign_rs256(
            &json!({ "iss": "https://t.auth0.com/", "azp": "client1", "sub": "u" }),
            Some(testutil::TEST_KID),
        );
        let (status, body) = send(app, get("/v1/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "opaque_token");
        assert_eq!(body["provider"], "auth0");
        assert!(body["hint"].as_str().unwrap().contains("Auth0"));
    }
}
