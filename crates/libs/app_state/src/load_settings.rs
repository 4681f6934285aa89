use crate::constants::{APPLE_ID_PWD_ENV, APPLE_ID_USER_ENV, TRUST_TOKEN_ENV};
use crate::{AppSettings, RawSettings, SecretSettings};
use color_eyre::eyre::{Result, eyre};
use config::{Config, File};
use std::env;
use std::path::{Path, PathBuf};

/// Values the command line may override on top of the config file and the
/// environment. The front end fills this from its flags.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverlay {
    pub username: Option<String>,
    pub password: Option<String>,
    pub trust_token: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub schedule: Option<String>,
    pub max_retries: Option<u32>,
    pub download_threads: Option<usize>,
    pub force: bool,
    pub remote_delete: bool,
}

/// Load settings in three layers: optional config file, then the
/// environment (after reading `.env`), then command-line overrides.
///
/// Credentials are resolved here and nowhere else; call
/// [`crate::scrub_credential_env`] afterwards so they stop being visible to
/// the rest of the process.
pub fn load_settings(config_path: Option<&Path>, overlay: SettingsOverlay) -> Result<AppSettings> {
    // Load .env first so credentials can live next to the config file.
    dotenv::dotenv().ok();

    let raw = match config_path {
        Some(path) => Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<RawSettings>()?,
        None => RawSettings::default(),
    };

    let username = overlay
        .username
        .or_else(|| env::var(APPLE_ID_USER_ENV).ok())
        .ok_or_else(|| eyre!("No username given (flag or {APPLE_ID_USER_ENV})"))?;
    let password = overlay
        .password
        .or_else(|| env::var(APPLE_ID_PWD_ENV).ok())
        .ok_or_else(|| eyre!("No password given (flag or {APPLE_ID_PWD_ENV})"))?;
    let trust_token = overlay
        .trust_token
        .or_else(|| env::var(TRUST_TOKEN_ENV).ok());

    let mut settings = AppSettings::from_raw(
        raw,
        SecretSettings {
            username,
            password,
            trust_token,
        },
    );

    if let Some(data_dir) = overlay.data_dir {
        settings.library.data_dir = std::path::absolute(data_dir)?;
    }
    if let Some(port) = overlay.port {
        settings.mfa.port = port;
    }
    if let Some(schedule) = overlay.schedule {
        settings.sync.schedule = Some(schedule);
    }
    if let Some(max_retries) = overlay.max_retries {
        settings.sync.max_retries = max_retries;
    }
    if let Some(download_threads) = overlay.download_threads {
        settings.sync.download_threads = download_threads;
    }
    settings.library.force = overlay.force;
    settings.sync.remote_delete |= overlay.remote_delete;

    Ok(settings)
}
