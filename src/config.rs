//! Run configuration loaded from the JSON config file.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::{ConfigError, IdentityError};
use crate::identity;

/// Environment variable consulted when the config file carries no SMTP password.
pub const PASSWORD_ENV: &str = "ROSTER_MAIL_SMTP_PASSWORD";

/// Implicit-TLS submission port, used when `smtp.port` is absent.
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// UUID-shaped namespace for identity derivation.
    pub namespace: String,
    pub smtp: SmtpConfig,
    /// VMess client template; its `id` is replaced per contact.
    #[serde(default)]
    pub v2: Option<Map<String, Value>>,
}

/// Sender identity and SMTP credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Display name used in the From header.
    pub name: String,
    /// Login user, also the sender address.
    pub user: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    pub server: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl SmtpConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SMTP_PORT)
    }

    /// The configured password, falling back to [`PASSWORD_ENV`].
    pub fn password(&self) -> Result<SecretString, ConfigError> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        std::env::var(PASSWORD_ENV)
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingRequired {
                key: "smtp.password".into(),
                hint: format!("Set it in the config file or export {PASSWORD_ENV}."),
            })
    }
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parsed namespace. Fails fast on a malformed value so no run starts with it.
    pub fn namespace(&self) -> Result<Uuid, IdentityError> {
        identity::parse_namespace(&self.namespace)
    }

    /// Template globals. The SMTP password is never exposed to templates.
    pub fn template_globals(&self) -> Map<String, Value> {
        let mut globals = Map::new();
        globals.insert("namespace".into(), Value::String(self.namespace.clone()));
        globals.insert(
            "smtp".into(),
            json!({
                "name": self.smtp.name,
                "user": self.smtp.user,
                "server": self.smtp.server,
                "port": self.smtp.port(),
            }),
        );
        globals.insert(
            "v2".into(),
            self.v2.clone().map(Value::Object).unwrap_or(Value::Null),
        );
        globals
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"{
        "namespace": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
        "smtp": {
            "name": "Ops Team",
            "user": "ops@example.com",
            "password": "hunter2",
            "server": "smtp.example.com"
        },
        "v2": {"v": "2", "add": "proxy.example.com", "port": "443", "id": ""}
    }"#;

    #[test]
    fn parses_full_document() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.smtp.name, "Ops Team");
        assert_eq!(config.smtp.port(), DEFAULT_SMTP_PORT);
        assert_eq!(
            config.smtp.password().unwrap().expose_secret(),
            "hunter2"
        );
        assert_eq!(config.v2.unwrap()["add"], "proxy.example.com");
    }

    #[test]
    fn explicit_port_wins() {
        let config = Config::from_json(
            r#"{"namespace": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
                "smtp": {"name": "n", "user": "u@x.com", "server": "s", "port": 2465}}"#,
        )
        .unwrap();
        assert_eq!(config.smtp.port(), 2465);
        assert!(config.v2.is_none());
    }

    #[test]
    fn missing_smtp_is_a_parse_error() {
        let err = Config::from_json(r#"{"namespace": "x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn malformed_namespace_is_rejected() {
        let config = Config::from_json(
            r#"{"namespace": "not-a-uuid",
                "smtp": {"name": "n", "user": "u@x.com", "server": "s"}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.namespace(),
            Err(IdentityError::InvalidNamespace { .. })
        ));
    }

    #[test]
    fn globals_hide_password() {
        let config = Config::from_json(SAMPLE).unwrap();
        let globals = config.template_globals();
        let smtp = globals["smtp"].as_object().unwrap();
        assert!(!smtp.contains_key("password"));
        assert_eq!(smtp["port"], 465);
        assert_eq!(globals["namespace"], "6ba7b810-9dad-11d1-80b4-00c04fd430c8");
    }

    #[test]
    fn load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
