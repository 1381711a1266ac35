use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let port = var("ROOMCHAT_PORT", "3000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("ROOMCHAT_PORT is not a valid port: {port:?}"))?;

        let ttl = var("ROOMCHAT_TOKEN_TTL_HOURS", "720");
        let token_ttl_hours: i64 = ttl
            .parse()
            .ok()
            .filter(|hours| *hours > 0)
            .with_context(|| format!("ROOMCHAT_TOKEN_TTL_HOURS must be a positive integer: {ttl:?}"))?;

        Ok(Self {
            host: var("ROOMCHAT_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("ROOMCHAT_DB_PATH", "roomchat.db")),
            jwt_secret: var("ROOMCHAT_JWT_SECRET", DEFAULT_JWT_SECRET),
            token_ttl_hours,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr().unwrap(), "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_path, PathBuf::from("roomchat.db"));
        assert_eq!(config.token_ttl(), chrono::Duration::days(30));
        assert!(config.uses_default_secret());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("ROOMCHAT_HOST", "127.0.0.1"),
            ("ROOMCHAT_PORT", "8080"),
            ("ROOMCHAT_DB_PATH", "/var/lib/roomchat/chat.db"),
            ("ROOMCHAT_JWT_SECRET", "hunter2hunter2"),
            ("ROOMCHAT_TOKEN_TTL_HOURS", "1"),
        ])
        .unwrap();
        assert_eq!(config.addr().unwrap(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_path, PathBuf::from("/var/lib/roomchat/chat.db"));
        assert_eq!(config.token_ttl(), chrono::Duration::hours(1));
        assert!(!config.uses_default_secret());
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("ROOMCHAT_PORT", "http")]).is_err());
        assert!(config(&[("ROOMCHAT_PORT", "70000")]).is_err());
        assert!(config(&[("ROOMCHAT_TOKEN_TTL_HOURS", "soon")]).is_err());
        assert!(config(&[("ROOMCHAT_TOKEN_TTL_HOURS", "0")]).is_err());
    }
}
