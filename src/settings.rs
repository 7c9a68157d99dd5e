use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration as StdDuration;
use thiserror::Error;
use url::Url;
use webauthn_rs::prelude::{Webauthn, WebauthnBuilder};

use crate::utils::crypto::MIN_SECRET_LEN;

/// Startup configuration problems; the server refuses to start on any of them
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to build WebAuthn verifier: {0}")]
    WebAuthn(String),
}

/// Deployment mode; decides which origin clients are expected to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = SettingsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(SettingsError::Invalid {
                name: "APP_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PasskeyServerSettings {
    pub application: ApplicationSettings,
    pub relying_party: RelyingPartySettings,
    pub identity: IdentitySettings,
    pub session: SessionSettings,
    pub ceremony: CeremonySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartySettings {
    /// Relying-party id (effective domain), e.g. `example.com`
    pub id: String,
    /// Display name shown by authenticators
    pub name: String,
    /// Port of the development frontend, used to build the dev origin
    pub dev_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Base URL of the identity gateway, including any API prefix
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub secret: String,
    pub token_ttl_minutes: i64,
    pub issuer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonySettings {
    /// Client-side ceremony timeout advertised in options
    pub timeout_seconds: u64,
    /// How long an issued challenge stays verifiable
    pub challenge_ttl_seconds: i64,
    /// Interval of the background expiry sweep
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: Environment::Development,
        }
    }
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            dev_port: 5173,
        }
    }
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_seconds: 10,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_minutes: 60,
            issuer: "passkey-server".to_string(),
        }
    }
}

impl Default for CeremonySettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            challenge_ttl_seconds: 300,
            sweep_interval_seconds: 60,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PasskeyServerSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - A required setting is missing or invalid after all overrides
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_base_settings()?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Initialize `env_logger` using the configured level as the default filter
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.logging.level.as_str());
        // A logger may already be installed (tests, embedding); keep it
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("PASSKEY_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ PASSKEY_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    ///
    /// # Errors
    ///
    /// Returns an error if `APP_ENV` names an unknown environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        if let Ok(environment) = std::env::var("APP_ENV") {
            self.application.environment = environment.parse()?;
        }
        apply_string_env_override("HOST", &mut self.application.host);
        apply_numeric_env_override("PORT", &mut self.application.port);

        apply_string_env_override("RP_ID", &mut self.relying_party.id);
        apply_string_env_override("RP_NAME", &mut self.relying_party.name);
        apply_numeric_env_override("RP_DEV_PORT", &mut self.relying_party.dev_port);

        apply_string_env_override("AUTH_URL", &mut self.identity.base_url);
        apply_numeric_env_override(
            "IDENTITY_TIMEOUT_SECONDS",
            &mut self.identity.request_timeout_seconds,
        );

        apply_string_env_override("JWT_SECRET", &mut self.session.secret);
        apply_numeric_env_override("SESSION_TTL_MINUTES", &mut self.session.token_ttl_minutes);

        apply_numeric_env_override(
            "CHALLENGE_TTL_SECONDS",
            &mut self.ceremony.challenge_ttl_seconds,
        );
        apply_numeric_env_override("CEREMONY_TIMEOUT_SECONDS", &mut self.ceremony.timeout_seconds);
        apply_numeric_env_override(
            "SWEEP_INTERVAL_SECONDS",
            &mut self.ceremony.sweep_interval_seconds,
        );

        apply_string_env_override("LOG_LEVEL", &mut self.logging.level);
        Ok(())
    }

    /// Check that every required setting is present and usable
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.relying_party.id.trim().is_empty() {
            return Err(SettingsError::Missing("RP_ID"));
        }
        if self.relying_party.name.trim().is_empty() {
            return Err(SettingsError::Missing("RP_NAME"));
        }
        if self.identity.base_url.trim().is_empty() {
            return Err(SettingsError::Missing("AUTH_URL"));
        }
        Url::parse(&self.identity.base_url).map_err(|e| SettingsError::Invalid {
            name: "AUTH_URL",
            reason: e.to_string(),
        })?;
        if self.session.secret.is_empty() {
            return Err(SettingsError::Missing("JWT_SECRET"));
        }
        if self.session.secret.len() < MIN_SECRET_LEN {
            return Err(SettingsError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }
        if self.session.token_ttl_minutes <= 0 {
            return Err(SettingsError::Invalid {
                name: "SESSION_TTL_MINUTES",
                reason: "must be positive".to_string(),
            });
        }
        if self.ceremony.challenge_ttl_seconds <= 0 {
            return Err(SettingsError::Invalid {
                name: "CHALLENGE_TTL_SECONDS",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Origin the browser reports in client data
    ///
    /// Development serves the frontend over plain http on a dev port;
    /// production requires https on the bare relying-party id.
    #[must_use]
    pub fn expected_origin(&self) -> String {
        match self.application.environment {
            Environment::Development => {
                format!("http://{}:{}", self.relying_party.id, self.relying_party.dev_port)
            }
            Environment::Production => format!("https://{}", self.relying_party.id),
        }
    }

    /// Build the `WebAuthn` verifier for the configured relying party
    ///
    /// # Errors
    ///
    /// Returns an error if the origin does not parse or does not belong to
    /// the relying-party id.
    pub fn create_webauthn(&self) -> Result<Webauthn, SettingsError> {
        let origin_str = self.expected_origin();
        let origin = Url::parse(&origin_str).map_err(|e| SettingsError::Invalid {
            name: "RP_ID",
            reason: format!("origin {origin_str} does not parse: {e}"),
        })?;

        WebauthnBuilder::new(&self.relying_party.id, &origin)
            .map_err(|e| SettingsError::WebAuthn(e.to_string()))?
            .rp_name(&self.relying_party.name)
            .timeout(StdDuration::from_secs(self.ceremony.timeout_seconds))
            .build()
            .map_err(|e| SettingsError::WebAuthn(e.to_string()))
    }

    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ceremony.challenge_ttl_seconds)
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session.token_ttl_minutes)
    }
}

fn apply_string_env_override(env_var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

/// Returns false when the variable is set but does not parse
///
/// Runs before the logger exists, so the warning goes to stdout.
fn apply_numeric_env_override<T: std::str::FromStr>(env_var: &str, target: &mut T) -> bool {
    let Ok(value_str) = std::env::var(env_var) else {
        return true;
    };
    if let Ok(value) = value_str.parse::<T>() {
        *target = value;
        true
    } else {
        println!("⚠ Ignoring unparsable {env_var}={value_str}");
        false
    }
}
