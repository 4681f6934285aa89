use common_types::RemoteError;
use thiserror::Error;

/// A failed step of the authentication state machine.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no MFA code arrived within the deadline")]
    MfaTimeout,
    #[error("authentication interrupted")]
    Interrupted,
    #[error("network failure during authentication")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status} from {endpoint}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("response missing required data: {0}")]
    MalformedResponse(String),
    #[error("could not persist trust token")]
    TrustToken(#[source] std::io::Error),
    #[error("MFA endpoint failed to start")]
    MfaServer(#[source] std::io::Error),
}

impl AuthError {
    /// Invalid credentials and MFA timeouts are final; transport problems
    /// and server-side errors are worth another attempt.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<AuthError> for RemoteError {
    fn from(error: AuthError) -> Self {
        Self::Auth {
            recoverable: error.is_recoverable(),
            source: Box::new(error),
        }
    }
}
