//! Account configuration and issuer runtime settings.
//!
//! The account config is what an operator supplies (contact email, ACME
//! directory, DNS plugin and its credentials). It is only ever replaced as a
//! whole after validation, so a rejected update leaves the active config alone.

use std::{collections::BTreeMap, fmt, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{ValidateEmail, ValidateUrl};

use crate::issuance::plugins::DnsPlugin;

pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Email,
    Server,
    Plugin,
}

impl ConfigField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigField::Email => "email",
            ConfigField::Server => "server",
            ConfigField::Plugin => "plugin",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected configuration value, naming the field and why it was refused.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: ConfigField,
    pub reason: String,
}

impl ValidationError {
    fn new(field: ConfigField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Checks the account email and ACME directory URL.
pub fn validate(email: &str, server: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::new(
            ConfigField::Email,
            "email address is required",
        ));
    }
    if !email.validate_email() {
        return Err(ValidationError::new(
            ConfigField::Email,
            format!("'{email}' is not a valid email address"),
        ));
    }

    let server = server.trim();
    if server.is_empty() {
        return Err(ValidationError::new(
            ConfigField::Server,
            "ACME server URL is required",
        ));
    }
    // Url::parse only accepts absolute URLs, so a scheme is guaranteed here.
    if !server.validate_url() {
        return Err(ValidationError::new(
            ConfigField::Server,
            format!("'{server}' is not a valid absolute URL"),
        ));
    }
    Ok(())
}

fn default_server() -> String {
    LETS_ENCRYPT_STAGING.to_string()
}

/// Operator-supplied ACME account settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    #[serde(default = "default_server")]
    pub server: String,
    pub plugin: DnsPlugin,
    /// Passed to the ACME client as environment variables, never inspected.
    #[serde(default)]
    pub plugin_secrets: BTreeMap<String, String>,
}

impl AccountConfig {
    /// Builds and validates a config with no plugin secrets.
    pub fn new(
        email: impl Into<String>,
        server: impl Into<String>,
        plugin: DnsPlugin,
    ) -> Result<Self, ValidationError> {
        let config = Self {
            email: email.into().trim().to_string(),
            server: server.into().trim().to_string(),
            plugin,
            plugin_secrets: BTreeMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.plugin_secrets.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(&self.email, &self.server)?;
        if self.plugin.code().trim().is_empty() {
            return Err(ValidationError::new(
                ConfigField::Plugin,
                "DNS plugin identifier is required",
            ));
        }
        Ok(())
    }

    /// Loads a JSON account config from disk and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read account config at {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid account config at {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: AccountConfig =
            serde_json::from_str(raw).context("failed to parse account config JSON")?;
        config.email = config.email.trim().to_string();
        config.server = config.server.trim().to_string();
        config.validate()?;
        Ok(config)
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("email", &self.email)
            .field("server", &self.server)
            .field("plugin", &self.plugin)
            .field(
                "plugin_secrets",
                &self.plugin_secrets.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Where and how the ACME client runs inside the workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerSettings {
    pub binary: String,
    pub csr_path: String,
    pub certs_dir: String,
    pub working_dir: String,
    pub timeout_secs: u64,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            binary: "lego".to_string(),
            csr_path: "/tmp/csr.pem".to_string(),
            certs_dir: "/tmp/.lego/certificates".to_string(),
            working_dir: "/tmp".to_string(),
            timeout_secs: 300,
        }
    }
}

impl IssuerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Path of the bundle the ACME client writes for an artifact name.
    pub fn bundle_path(&self, artifact_name: &str) -> String {
        format!("{}/{}.crt", self.certs_dir.trim_end_matches('/'), artifact_name)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read issuer settings at {}", path.display()))?;
        let settings: IssuerSettings = serde_json::from_str(&raw)
            .with_context(|| format!("invalid issuer settings at {}", path.display()))?;
        if settings.timeout_secs == 0 {
            anyhow::bail!("issuer settings timeout_secs must be greater than zero");
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_email_and_server() {
        assert!(validate("example@email.com", LETS_ENCRYPT_PRODUCTION).is_ok());
        assert!(validate("  ops@example.org ", "http://localhost:14000/dir").is_ok());
    }

    #[test]
    fn rejects_invalid_email() {
        let err = validate("invalid email", LETS_ENCRYPT_PRODUCTION).unwrap_err();
        assert_eq!(err.field, ConfigField::Email);
        assert!(err.to_string().contains("invalid email"));
    }

    #[test]
    fn rejects_missing_email() {
        let err = validate("   ", LETS_ENCRYPT_PRODUCTION).unwrap_err();
        assert_eq!(err.field, ConfigField::Email);
    }

    #[test]
    fn rejects_relative_or_garbage_server() {
        let err = validate("example@email.com", "not a valid URL").unwrap_err();
        assert_eq!(err.field, ConfigField::Server);

        let err = validate("example@email.com", "/directory").unwrap_err();
        assert_eq!(err.field, ConfigField::Server);
    }

    #[test]
    fn account_config_from_json_applies_default_server() -> Result<()> {
        let config = AccountConfig::from_json(
            r#"{
                "email": "ops@example.com",
                "plugin": "namecheap",
                "plugin_secrets": {"NAMECHEAP_API_USER": "ops"}
            }"#,
        )?;
        assert_eq!(config.server, LETS_ENCRYPT_STAGING);
        assert_eq!(config.plugin, DnsPlugin::Namecheap);
        assert_eq!(
            config.plugin_secrets.get("NAMECHEAP_API_USER").map(String::as_str),
            Some("ops")
        );
        Ok(())
    }

    #[test]
    fn account_config_from_json_rejects_bad_email() {
        let err = AccountConfig::from_json(r#"{"email": "nope", "plugin": "route53"}"#)
            .unwrap_err();
        let validation = err
            .downcast_ref::<ValidationError>()
            .expect("expected a validation error");
        assert_eq!(validation.field, ConfigField::Email);
    }

    #[test]
    fn account_config_from_json_rejects_empty_plugin() {
        assert!(AccountConfig::from_json(r#"{"email": "ops@example.com", "plugin": ""}"#).is_err());
    }

    #[test]
    fn debug_output_hides_secret_values() -> Result<()> {
        let config = AccountConfig::new("ops@example.com", LETS_ENCRYPT_STAGING, DnsPlugin::Route53)?
            .with_secret("AWS_SECRET_ACCESS_KEY", "super-secret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!rendered.contains("super-secret"));
        Ok(())
    }

    #[test]
    fn settings_defaults_match_lego_layout() {
        let settings = IssuerSettings::default();
        assert_eq!(settings.binary, "lego");
        assert_eq!(settings.csr_path, "/tmp/csr.pem");
        assert_eq!(settings.working_dir, "/tmp");
        assert_eq!(settings.timeout(), Duration::from_secs(300));
        assert_eq!(
            settings.bundle_path("example.com"),
            "/tmp/.lego/certificates/example.com.crt"
        );
    }

    #[test]
    fn settings_from_path_fills_missing_fields() -> Result<()> {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "acme_bridge_settings_{}.json",
            uuid::Uuid::new_v4().as_simple()
        ));
        fs::write(&path, r#"{"timeout_secs": 60, "certs_dir": "/data/certs/"}"#)?;

        let settings = IssuerSettings::from_path(&path)?;
        assert_eq!(settings.timeout_secs, 60);
        assert_eq!(settings.binary, "lego");
        assert_eq!(settings.bundle_path("foo"), "/data/certs/foo.crt");

        fs::remove_file(&path)?;
        Ok(())
    }
}
