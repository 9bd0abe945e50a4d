//! Runtime configuration read from environment variables.
//!
//! | Variable       | Default                        |
//! |----------------|--------------------------------|
//! | `PORT`         | `5000`                         |
//! | `DATABASE_URL` | `sqlite:contacts.db?mode=rwc`  |
//! | `APP_ENV`      | `development`                  |
//! | `CLIENT_URL`   | `http://localhost:3000`        |

use std::env;

use anyhow::Context;
use axum::http::HeaderValue;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 5000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:contacts.db?mode=rwc";

/// Default origin allowed by CORS.
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Anything other than `production` counts as development.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub environment: Environment,
    /// The browser origin allowed to call the API with credentials.
    pub client_origin: HeaderValue,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            environment: Environment::Development,
            client_origin: HeaderValue::from_static(DEFAULT_CLIENT_URL),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => DEFAULT_PORT,
        };

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let environment = lookup("APP_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or_default();

        let client_url = lookup("CLIENT_URL").unwrap_or_else(|| DEFAULT_CLIENT_URL.to_string());
        let client_origin = HeaderValue::from_str(client_url.trim())
            .with_context(|| format!("CLIENT_URL is not a valid origin: {client_url:?}"))?;

        Ok(Self {
            port,
            database_url,
            environment,
            client_origin,
        })
    }
}
