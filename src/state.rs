// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AuthDependencies, Authenticator, InternalIssuer, KeyDirectory};
use crate::config::AuthConfig;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub directory: Arc<KeyDirectory>,
    pub internal: Arc<InternalIssuer>,
    pub config: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(config: AuthConfig, deps: AuthDependencies) -> Self {
        let authenticator = Authenticator::new(&config, &deps);
        Self {
            authenticator: Arc::new(authenticator),
            directory: deps.directory,
            internal: deps.internal,
            config: Arc::new(config),
        }
    }
}
