use std::path::PathBuf;
use thiserror::Error;

use crate::email::EmailError;

#[derive(Error, Debug)]
pub enum MailfetchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Email(#[from] EmailError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Failed to read password file '{path}': {source}")]
    PasswordFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' is not set or not valid UTF-8")]
    PasswordEnvVar { name: String },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("'{path}' is not a readable PDF: {reason}")]
    InvalidPdf { path: PathBuf, reason: String },

    #[error("PDF renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("Failed to render page {page} of '{path}': {reason}")]
    PageFailed {
        path: PathBuf,
        page: usize,
        reason: String,
    },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MailfetchError>;
