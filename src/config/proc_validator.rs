//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates:
//!   * base url and request timeout
//!   * route shape and refresh route visibility
//!   * refresh payload field and timeout
//!   * storage and logging settings

use tracing::{error, info};

use crate::config::session::{ServiceConfig, SessionConfig, StorageConfig};
use crate::config::settings::SettingsConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_session(&cfg.session, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    let base_url = settings.base_url.trim();
    if base_url.is_empty() {
        errors.push("settings.base_url cannot be empty".to_string());
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(format!(
            "settings.base_url '{}' must start with http:// or https://",
            base_url
        ));
    }

    if settings.request_timeout_ms == 0 {
        errors.push("settings.request_timeout_ms must be > 0".to_string());
    }

    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }
}

/// SESSION VALIDATION
fn validate_session(session: &SessionConfig, errors: &mut Vec<String>) {
    let routes = [
        ("session.refresh_route", &session.refresh_route),
        ("session.login_route", &session.login_route),
        ("session.logout_route", &session.logout_route),
        ("session.user_route", &session.user_route),
    ];
    for (path, route) in routes {
        validate_route(path, route, errors);
    }

    // a public refresh route would be sent without the bearer token and never classified
    if let Some(public) = session
        .public_routes
        .iter()
        .find(|fragment| session.refresh_route.contains(fragment.as_str()))
    {
        errors.push(format!(
            "session.refresh_route '{}' must not match public route '{}'",
            session.refresh_route, public
        ));
    }

    if session.refresh_token_field.trim().is_empty() {
        errors.push("session.refresh_token_field cannot be empty".to_string());
    }

    if session.refresh_timeout_ms == 0 {
        errors.push("session.refresh_timeout_ms must be > 0".to_string());
    }

    if let StorageConfig::File { path } = &session.storage {
        if path.trim().is_empty() {
            errors.push("session.storage.path cannot be empty for file storage".to_string());
        }
    }
}

fn validate_route(path: &str, route: &str, errors: &mut Vec<String>) {
    if route.trim().is_empty() {
        errors.push(format!("{} cannot be empty", path));
    } else if !route.starts_with('/') {
        errors.push(format!("{} '{}' must start with '/'", path, route));
    }
}
