use crate::{LoggingSettings, RawSettings};
use serde::Deserialize;
use std::fmt;
use std::path::{PathBuf, absolute};

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub library: LibrarySettings,
    pub mfa: MfaSettings,
    pub sync: SyncSettings,
    pub logging: LoggingSettings,
    pub secrets: SecretSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibrarySettings {
    pub data_dir: PathBuf,
    /// Override an existing library lock.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MfaSettings {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    pub max_retries: u32,
    pub download_threads: usize,
    pub schedule: Option<String>,
    pub remote_delete: bool,
}

/// Account credentials. `Debug` is redacted so a settings dump in a log or
/// crash report never leaks them.
#[derive(Deserialize, Clone)]
pub struct SecretSettings {
    pub username: String,
    pub password: String,
    pub trust_token: Option<String>,
}

impl fmt::Debug for SecretSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field(
                "trust_token",
                &self.trust_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl AppSettings {
    /// Combine file-level settings with resolved credentials, absolutizing
    /// the data dir so a later working-directory change cannot move the
    /// library.
    pub fn from_raw(raw: RawSettings, secrets: SecretSettings) -> Self {
        let data_dir = absolute(&raw.library.data_dir).expect("Invalid data_dir");
        Self {
            library: LibrarySettings {
                data_dir,
                force: false,
            },
            mfa: MfaSettings { port: raw.mfa.port },
            sync: SyncSettings {
                max_retries: raw.sync.max_retries,
                download_threads: raw.sync.download_threads,
                schedule: raw.sync.schedule,
                remote_delete: raw.sync.remote_delete,
            },
            logging: raw.logging,
            secrets,
        }
    }
}
