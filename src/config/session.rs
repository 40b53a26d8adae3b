use serde::Deserialize;

use crate::config::settings::SettingsConfig;

/// ================================
/// Full client configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// ================================
/// Session routes, refresh policy and storage
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_refresh_route")]
    pub refresh_route: String,
    /// field of the refresh payload carrying the new access credential
    #[serde(default = "default_refresh_token_field")]
    pub refresh_token_field: String,
    /// upper bound on a single refresh call; every waiter is rejected once it elapses
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_logout_route")]
    pub logout_route: String,
    #[serde(default = "default_user_route")]
    pub user_route: String,
    /// path fragments that never carry the Authorization header
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_route: default_refresh_route(),
            refresh_token_field: default_refresh_token_field(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            login_route: default_login_route(),
            logout_route: default_logout_route(),
            user_route: default_user_route(),
            public_routes: default_public_routes(),
            storage: StorageConfig::default(),
        }
    }
}

/// Where the credential and user identity survive restarts
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    File {
        path: String,
    },
}

pub const DEFAULT_REFRESH_ROUTE: &str = "/api/auth/token/refresh/";
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 15_000;

fn default_refresh_route() -> String {
    DEFAULT_REFRESH_ROUTE.to_owned()
}

fn default_refresh_token_field() -> String {
    "access".to_owned()
}

fn default_refresh_timeout_ms() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_MS
}

fn default_login_route() -> String {
    "/api/auth/login/".to_owned()
}

fn default_logout_route() -> String {
    "/api/auth/logout/".to_owned()
}

fn default_user_route() -> String {
    "/api/auth/user/".to_owned()
}

fn default_public_routes() -> Vec<String> {
    vec!["/auth/login".to_owned(), "/auth/register".to_owned()]
}
