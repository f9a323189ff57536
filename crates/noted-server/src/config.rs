use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Runtime configuration, read once at startup from the environment
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from a key lookup, so tests can supply values without
    /// touching process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let bind_addr = lookup("NOTED_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let database_path = lookup("NOTED_DATABASE_PATH")
            .map_or_else(|| PathBuf::from("noted-server.db"), PathBuf::from);

        let jwt_secret = lookup("NOTED_JWT_SECRET")
            .ok_or_else(|| AppError::Config("NOTED_JWT_SECRET must be set".to_string()))?;
        if jwt_secret.trim().len() < 16 {
            return Err(AppError::Config(
                "NOTED_JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_defaults_applied_when_unset() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("NOTED_JWT_SECRET", "0123456789abcdef")]))
                .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("noted-server.db"));
    }

    #[test]
    fn test_missing_secret_is_a_config_error() {
        let error = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(error, AppError::Config(_)));
    }

    #[test]
    fn test_short_secret_rejected() {
        let error =
            AppConfig::from_lookup(lookup_from(&[("NOTED_JWT_SECRET", "short")])).unwrap_err();
        assert!(matches!(error, AppError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("NOTED_JWT_SECRET", "0123456789abcdef")]))
                .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("[REDACTED]"));
    }
}
