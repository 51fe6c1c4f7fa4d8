//! Secret resolution.
//!
//! Config stores env var **names** only (`database.url_env`). Binaries call
//! [`resolve_secrets`] once at startup and pass the result to constructors.
//! `Debug` output and every error message carry the variable name, never the
//! value.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::ConfigMode;

/// Env var read for the database URL when `database.url_env` is absent.
pub const DEFAULT_DATABASE_URL_ENV: &str = "RHM_DATABASE_URL";

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Name of the env var the URL came from.
    pub database_url_env: String,
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl ResolvedSecrets {
    /// The database URL, or an error naming the variable that should hold it.
    pub fn require_database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(url) => Ok(url),
            None => bail!(
                "SECRETS_MISSING: env var '{}' (database url) is not set or empty",
                self.database_url_env
            ),
        }
    }
}

/// Name of the env var holding the database URL.
pub fn database_url_env(config_json: &Value) -> String {
    config_json
        .pointer("/database/url_env")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_DATABASE_URL_ENV)
        .to_string()
}

fn resolve_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve secrets for a consumer.
///
/// Both the daemon and maintenance commands need the database, so a missing
/// URL fails closed with `SECRETS_MISSING` naming the variable.
pub fn resolve_secrets(config_json: &Value, mode: ConfigMode) -> Result<ResolvedSecrets> {
    let resolved = resolve_secrets_lenient(config_json);
    if resolved.database_url.is_none() {
        bail!(
            "SECRETS_MISSING mode={}: required env var '{}' (database url) is not set or empty",
            mode.as_str(),
            resolved.database_url_env
        );
    }
    Ok(resolved)
}

/// Resolve without enforcing presence. Commands that may run without a
/// database (e.g. `config-hash`) use this.
pub fn resolve_secrets_lenient(config_json: &Value) -> ResolvedSecrets {
    let database_url_env = database_url_env(config_json);
    let database_url = resolve_env(&database_url_env);
    ResolvedSecrets {
        database_url_env,
        database_url,
    }
}
