/// Environment variables the credentials may arrive through. They are
/// scrubbed from the process environment once parsing completes.
pub const APPLE_ID_USER_ENV: &str = "APPLE_ID_USER";
pub const APPLE_ID_PWD_ENV: &str = "APPLE_ID_PWD";
pub const TRUST_TOKEN_ENV: &str = "TRUST_TOKEN";

/// What a scrubbed environment variable is overwritten with.
pub const SCRUB_PLACEHOLDER: &str = "********";

pub const DEFAULT_MFA_PORT: u16 = 80;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DOWNLOAD_THREADS: usize = 16;
pub const DEFAULT_LOG_LEVEL: &str = "info";
