use crate::constants::{APPLE_ID_PWD_ENV, APPLE_ID_USER_ENV, SCRUB_PLACEHOLDER, TRUST_TOKEN_ENV};
use std::env;

/// Overwrite credential environment variables with placeholders.
///
/// Runs once startup parsing is complete, before any operation that could
/// surface the environment in an error report or a child process.
pub fn scrub_credential_env() {
    for key in [APPLE_ID_USER_ENV, APPLE_ID_PWD_ENV, TRUST_TOKEN_ENV] {
        if env::var_os(key).is_some() {
            // SAFETY: called from the single-threaded startup path, before
            // the async runtime spawns anything that reads the environment.
            unsafe { env::set_var(key, SCRUB_PLACEHOLDER) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_replaces_all_credential_vars() {
        unsafe {
            env::set_var(APPLE_ID_USER_ENV, "user@example.com");
            env::set_var(APPLE_ID_PWD_ENV, "hunter2");
            env::set_var(TRUST_TOKEN_ENV, "trusted");
        }
        scrub_credential_env();
        for key in [APPLE_ID_USER_ENV, APPLE_ID_PWD_ENV, TRUST_TOKEN_ENV] {
            assert_eq!(env::var(key).unwrap(), SCRUB_PLACEHOLDER);
        }
    }
}
