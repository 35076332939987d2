use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Signing secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub webhook_secret: Option<String>,
    pub business_number: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("PARLEY_JWT_SECRET").unwrap_or_default();
        let jwt_secret = jwt_secret.trim();
        if jwt_secret.is_empty() {
            bail!("PARLEY_JWT_SECRET must be set");
        }
        if PLACEHOLDER_SECRETS.contains(&jwt_secret) {
            bail!("PARLEY_JWT_SECRET is still the placeholder value");
        }

        let port = match get("PARLEY_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PARLEY_PORT is not a port number: {}", raw))?,
            None => 3333,
        };

        Ok(Self {
            host: get("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(get("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into())),
            jwt_secret: jwt_secret.to_string(),
            webhook_secret: get("PARLEY_WEBHOOK_SECRET").filter(|s| !s.trim().is_empty()),
            business_number: get("PARLEY_BUSINESS_NUMBER").unwrap_or_else(|| "self".into()),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("PARLEY_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 3333);
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.business_number, "self");
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3333");
    }

    #[test]
    fn signing_secret_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("PARLEY_JWT_SECRET", "  ")]).is_err());
        assert!(config(&[("PARLEY_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("PARLEY_JWT_SECRET", "change-me")]).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            ("PARLEY_JWT_SECRET", "s3cret"),
            ("PARLEY_PORT", "8080"),
            ("PARLEY_WEBHOOK_SECRET", "hook"),
            ("PARLEY_BUSINESS_NUMBER", "+15550000000"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.webhook_secret.as_deref(), Some("hook"));
        assert_eq!(config.business_number, "+15550000000");

        assert!(super::Config::from_lookup(|k| match k {
            "PARLEY_JWT_SECRET" => Some("s3cret".into()),
            "PARLEY_PORT" => Some("not-a-port".into()),
            _ => None,
        })
        .is_err());
    }
}
