//! API server configuration.

use std::fmt;

use parla_core::auth::jwt::resolve_secret;

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Signing secret for access tokens.
    pub access_token_secret: String,
    /// Signing secret for refresh tokens.
    pub refresh_token_secret: String,
    /// Whether session cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable               | Default                                 |
    /// |------------------------|-----------------------------------------|
    /// | `BIND_ADDR`            | `127.0.0.1:3100`                        |
    /// | `DATABASE_URL`         | `postgres://localhost:5432/parla`       |
    /// | `ACCESS_TOKEN_SECRET`  | generated & persisted to file           |
    /// | `REFRESH_TOKEN_SECRET` | generated & persisted to file           |
    /// | `COOKIE_SECURE`        | `false`                                 |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/parla".into()),
            access_token_secret: resolve_secret("ACCESS_TOKEN_SECRET", "access-token.secret"),
            refresh_token_secret: resolve_secret("REFRESH_TOKEN_SECRET", "refresh-token.secret"),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("pg_connection_url", &self.pg_connection_url)
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        for raw in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(raw), "{raw}");
        }
        for raw in ["", "0", "false", "off", "nope"] {
            assert!(!parse_flag(raw), "{raw}");
        }
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: "postgres://localhost/parla".into(),
            access_token_secret: "access-secret-value".into(),
            refresh_token_secret: "refresh-secret-value".into(),
            cookie_secure: true,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("access-secret-value"));
        assert!(!rendered.contains("refresh-secret-value"));
        assert!(rendered.contains("127.0.0.1:0"));
    }
}
