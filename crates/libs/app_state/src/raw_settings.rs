use crate::constants::{DEFAULT_DOWNLOAD_THREADS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_RETRIES, DEFAULT_MFA_PORT};
use serde::Deserialize;
use std::path::PathBuf;

/// Settings exactly as they appear in the config file, before path
/// absolutization and credential resolution.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawSettings {
    #[serde(default)]
    pub library: RawLibrarySettings,
    #[serde(default)]
    pub mfa: RawMfaSettings,
    #[serde(default)]
    pub sync: RawSyncSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawLibrarySettings {
    /// Root of the mirrored library tree.
    pub data_dir: PathBuf,
}

impl Default for RawLibrarySettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawMfaSettings {
    /// Port the MFA submission endpoint listens on.
    #[serde(default = "default_mfa_port")]
    pub port: u16,
}

impl Default for RawMfaSettings {
    fn default() -> Self {
        Self {
            port: default_mfa_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawSyncSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_download_threads")]
    pub download_threads: usize,
    /// Cron expression for daemon mode. No expression means `daemon` refuses
    /// to start.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Delete non-favorite remote originals when archiving.
    #[serde(default)]
    pub remote_delete: bool,
}

impl Default for RawSyncSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            download_threads: default_download_threads(),
            schedule: None,
            remote_delete: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

fn default_mfa_port() -> u16 {
    DEFAULT_MFA_PORT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_download_threads() -> usize {
    DEFAULT_DOWNLOAD_THREADS
}
