//! Plugin configuration: IMAP account settings and on-disk locations.
//!
//! The password can come from three places, tried in order:
//!
//! 1. **Direct value** - `mail_password` in the config file
//! 2. **File reference** - `mail_password_file`, for Docker secrets
//! 3. **Env var reference** - `mail_password_env_var`

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Settings supplied by the host when the plugin is loaded.
#[derive(Clone, Deserialize)]
pub struct MailConfig {
    /// IMAP server hostname (e.g., "imap.qq.com").
    pub mail_host: String,

    /// IMAP server port (default: 993 for IMAPS).
    #[serde(default = "default_imap_port")]
    pub mail_port: u16,

    /// Login address.
    #[serde(default)]
    pub mail_address: String,

    #[serde(default)]
    pub mail_password: Option<String>,

    #[serde(default)]
    pub mail_password_file: Option<String>,

    #[serde(default)]
    pub mail_password_env_var: Option<String>,

    /// Where attachments and rendered pages are written (default: "attachments").
    #[serde(default = "default_attachments_dir")]
    pub attachments_dir: PathBuf,

    /// Folder used when a command names none (default: "INBOX").
    #[serde(default = "default_folder")]
    pub default_folder: String,

    /// Search criteria used when a command names none (default: "UNSEEN").
    #[serde(default = "default_status")]
    pub default_status: String,

    /// Whether PDF attachments are delivered as page images (default: true).
    #[serde(default = "default_true")]
    pub render_pdf: bool,

    /// Page image resolution (default: 150).
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,

    /// Log filter used when `RUST_LOG` is unset (default: "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_imap_port() -> u16 {
    993
}

fn default_attachments_dir() -> PathBuf {
    PathBuf::from("attachments")
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_status() -> String {
    "UNSEEN".to_string()
}

fn default_true() -> bool {
    true
}

fn default_render_dpi() -> u32 {
    150
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MailConfig {
    /// Builds a config with a direct password and defaults for everything else.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        address: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            mail_host: host.into(),
            mail_port: port,
            mail_address: address.into(),
            mail_password: Some(password.into()),
            mail_password_file: None,
            mail_password_env_var: None,
            attachments_dir: default_attachments_dir(),
            default_folder: default_folder(),
            default_status: default_status(),
            render_pdf: default_true(),
            render_dpi: default_render_dpi(),
            log_level: default_log_level(),
        }
    }

    pub fn with_attachments_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.attachments_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Checks required fields. Called once, before any connection attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mail_host.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "mail_host is not set".to_string(),
            });
        }
        if self.mail_port == 0 {
            return Err(ConfigError::Validation {
                message: "mail_port must be between 1 and 65535".to_string(),
            });
        }
        if self.mail_address.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "mail_address is not set".to_string(),
            });
        }
        self.resolve_password()?;
        Ok(())
    }

    /// Resolves the password from the direct value, file or env var, in that order.
    pub fn resolve_password(&self) -> Result<SecretString, ConfigError> {
        if let Some(value) = non_empty(self.mail_password.as_deref()) {
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = non_empty(self.mail_password_file.as_deref()) {
            let expanded = expand_home(path);
            let content =
                std::fs::read_to_string(&expanded).map_err(|e| ConfigError::PasswordFile {
                    path: expanded.clone(),
                    source: e,
                })?;
            return non_empty_secret(content.trim(), "mail_password_file");
        }

        if let Some(name) = non_empty(self.mail_password_env_var.as_deref()) {
            let value = std::env::var(name).map_err(|_| ConfigError::PasswordEnvVar {
                name: name.to_string(),
            })?;
            return non_empty_secret(value.trim(), "mail_password_env_var");
        }

        Err(ConfigError::Validation {
            message: "mail_password is not set".to_string(),
        })
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("mail_host", &self.mail_host)
            .field("mail_port", &self.mail_port)
            .field("mail_address", &self.mail_address)
            .field("mail_password", &self.mail_password.as_ref().map(|_| "[REDACTED]"))
            .field("mail_password_file", &self.mail_password_file)
            .field("mail_password_env_var", &self.mail_password_env_var)
            .field("attachments_dir", &self.attachments_dir)
            .field("default_folder", &self.default_folder)
            .field("default_status", &self.default_status)
            .field("render_pdf", &self.render_pdf)
            .field("render_dpi", &self.render_dpi)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_secret(value: &str, source: &str) -> Result<SecretString, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation {
            message: format!("{} resolved to an empty password", source),
        });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MailConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<MailConfig, ConfigError> {
    let config: MailConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}
