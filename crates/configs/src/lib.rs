//! # configs
//!
//! Layered settings: built-in defaults, then `config/default.toml`, then
//! `config/{APP_ENV}.toml`, then `PORTFOLIO__SECTION__KEY` environment
//! variables. A `.env` file is read first when present.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub limits: LimitSettings,
    pub mail: MailSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used to build block links.
    pub public_url: String,
    /// Built single-page frontend served for every non-API path.
    pub frontend_dir: PathBuf,
    pub max_upload_mb: usize,
    /// Extra origins allowed to call the API with credentials.
    pub cors_origins: Vec<String>,
}

impl ServerSettings {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// Absent means the in-memory store.
    pub url: Option<SecretString>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub session_secret: SecretString,
    pub admin_email: String,
    /// Plain text or an Argon2 PHC string.
    pub admin_password: SecretString,
    pub session_ttl_hours: u32,
    pub block_token_max_age_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct LimitSettings {
    pub window_minutes: u32,
    /// Messages allowed per IP inside the window; 0 disables the check.
    pub max_messages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransportKind {
    /// Log every email instead of sending it.
    Log,
    /// Pipe to the local MTA.
    Sendmail,
    /// Authenticated relay over TLS.
    Smtp,
}

#[derive(Debug, Deserialize)]
pub struct MailSettings {
    pub from: String,
    pub admin_address: String,
    pub owner_name: String,
    pub transport: MailTransportKind,
    /// Used by the `sendmail` transport.
    pub sendmail_path: PathBuf,
    /// The rest of the block is used by the `smtp` transport.
    pub host: Option<String>,
    /// 465 means implicit TLS; anything else upgrades with STARTTLS.
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub queue_capacity: usize,
    pub max_concurrent_sends: usize,
    pub send_timeout_secs: u64,
    pub dead_letter_path: Option<PathBuf>,
}

pub const SMTPS_PORT: u16 = 465;

impl MailSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn implicit_tls(&self) -> bool {
        self.port == SMTPS_PORT
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub url_prefix: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub timeout_secs: u64,
}

impl StorageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSettings {
    pub filter: String,
    pub format: LogFormat,
}

const MIN_SECRET_LEN: usize = 32;

impl Settings {
    /// Reads every layer from the process environment and working directory.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{app_env}")).required(false))
            .add_source(
                Environment::with_prefix("PORTFOLIO")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.public_url", "http://localhost:5000")?
            .set_default("server.frontend_dir", "frontend/dist")?
            .set_default("server.max_upload_mb", 100)?
            .set_default("server.cors_origins", Vec::<String>::new())?
            .set_default("database.max_connections", 10)?
            .set_default("database.connect_timeout_secs", 5)?
            .set_default("auth.session_ttl_hours", 12)?
            .set_default("auth.block_token_max_age_days", 30)?
            .set_default("limits.window_minutes", 10)?
            .set_default("limits.max_messages", 1)?
            .set_default("mail.from", "noreply@localhost")?
            .set_default("mail.admin_address", "admin@localhost")?
            .set_default("mail.owner_name", "Portfolio")?
            .set_default("mail.transport", "log")?
            .set_default("mail.sendmail_path", "/usr/sbin/sendmail")?
            .set_default("mail.port", i64::from(SMTPS_PORT))?
            .set_default("mail.queue_capacity", 256)?
            .set_default("mail.max_concurrent_sends", 4)?
            .set_default("mail.send_timeout_secs", 10)?
            .set_default("storage.root", "data/uploads")?
            .set_default("storage.url_prefix", "/uploads")?
            .set_default("storage.api_key", "local")?
            .set_default("storage.timeout_secs", 30)?
            .set_default("logging.filter", "info,tower_http=info,sqlx=warn")?
            .set_default("logging.format", "json")?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "auth.session_secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.auth.admin_password.expose_secret().is_empty() {
            return Err(ConfigError::Invalid("auth.admin_password is empty".into()));
        }
        if !self.auth.admin_email.contains('@') {
            return Err(ConfigError::Invalid("auth.admin_email is not an email".into()));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::Invalid("server.max_upload_mb must be positive".into()));
        }
        if self.auth.session_ttl_hours == 0 || self.auth.block_token_max_age_days == 0 {
            return Err(ConfigError::Invalid("auth lifetimes must be positive".into()));
        }
        if self.mail.transport == MailTransportKind::Smtp {
            let present = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());
            if !present(self.mail.host.as_deref())
                || !present(self.mail.username.as_deref())
                || !present(self.mail.password.as_ref().map(|p| p.expose_secret()))
            {
                return Err(ConfigError::Invalid(
                    "mail.transport 'smtp' needs mail.host, mail.username and mail.password".into(),
                ));
            }
        }
        Ok(())
    }

    /// Settings that load fine but deserve a line in the startup log.
    pub fn advisories(&self) -> Vec<&'static str> {
        let mut notes = Vec::new();
        if self.mail.transport == MailTransportKind::Log {
            notes.push("mail.transport is 'log'; emails will not leave this host");
        }
        if self.database.url.is_none() {
            notes.push("database.url not set; using the in-memory store, data is lost on restart");
        }
        notes
    }
}
