use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Serialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// A STUN or TURN server handed to clients for the peer-to-peer media path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub store_timeout: Duration,
    pub store_max_attempts: u32,
    pub session_room_capacity: Option<usize>,
    pub session_outbox_capacity: usize,
    pub ice_servers: Vec<IceServer>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or("PORT", 3000)?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "skillswap".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| parse_list(&origins))
                .unwrap_or_default(),
            store_timeout: Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 5000)?),
            store_max_attempts: parse_or("STORE_MAX_ATTEMPTS", 3)?,
            session_room_capacity: room_capacity(parse_optional("SESSION_ROOM_CAPACITY")?)?,
            session_outbox_capacity: parse_or("SESSION_OUTBOX_CAPACITY", 256)?,
            ice_servers: ice_servers_from_env(),
            rate_limit_per_second: parse_or("RATE_LIMIT_PER_SECOND", 10)?,
            rate_limit_burst: parse_or("RATE_LIMIT_BURST", 20)?,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a valid number", key)),
        _ => Ok(None),
    }
}

/// A cap of zero would refuse every join.
fn room_capacity(value: Option<usize>) -> Result<Option<usize>> {
    match value {
        Some(0) => anyhow::bail!(
            "SESSION_ROOM_CAPACITY must be at least 1, leave it unset for unlimited rooms"
        ),
        other => Ok(other),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn ice_servers_from_env() -> Vec<IceServer> {
    let mut servers = vec![IceServer {
        urls: env::var("STUN_SERVER")
            .unwrap_or_else(|_| "stun:stun.l.google.com:19302".to_string()),
        username: None,
        credential: None,
    }];

    if let Ok(turn) = env::var("TURN_SERVER") {
        servers.push(IceServer {
            urls: turn,
            username: env::var("TURN_USERNAME").ok(),
            credential: env::var("TURN_CREDENTIAL").ok(),
        });
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list("https://a.example, ,https://b.example,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_room_capacity_rejects_zero() {
        assert!(room_capacity(Some(0)).is_err());
        assert_eq!(room_capacity(Some(2)).unwrap(), Some(2));
        assert_eq!(room_capacity(None).unwrap(), None);
    }

    #[test]
    fn test_turn_credentials_omitted_when_absent() {
        let server = IceServer {
            urls: "stun:example".to_string(),
            username: None,
            credential: None,
        };
        assert_eq!(
            serde_json::to_value(server).unwrap(),
            serde_json::json!({"urls": "stun:example"})
        );
    }
}
