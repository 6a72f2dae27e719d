use taskcomm_remote::RemoteError;
use taskcomm_shared::ModelError;
use taskcomm_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the repository and the state holders.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The write call succeeded but a re-read disagrees with it.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// A backend row could not be interpreted.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("No chat thread is open")]
    NoOpenThread,

    /// The cache mutex was poisoned by a panicking holder.
    #[error("Cache unavailable")]
    CacheUnavailable,
}

/// Authentication failures, phrased for display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please verify your email to complete sign up")]
    VerifyEmail,

    #[error("Please confirm your email address. Check your inbox or spam folder, then try again.")]
    EmailNotConfirmed,

    /// The sign-in flavour of [`EmailNotConfirmed`](Self::EmailNotConfirmed).
    #[error("Please confirm your email address. We just sent a verification link if you haven’t confirmed yet.")]
    VerificationLinkSent,

    #[error("Profile creation failed: {0}")]
    ProfileCreation(String),

    #[error("Profile not found or invalid role")]
    InvalidProfile,

    #[error("Not authorized as user")]
    NotAuthorized,

    #[error("{0}")]
    Backend(String),
}

impl AuthError {
    /// Map a backend failure, replacing the unconfirmed-email message with
    /// a friendlier prompt.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_lowercase().contains("email not confirmed") {
            Self::EmailNotConfirmed
        } else {
            Self::Backend(message)
        }
    }
}

impl From<ClientError> for AuthError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Auth(auth) => auth,
            ClientError::Remote(remote) => remote.into(),
            other => Self::from_message(other.to_string()),
        }
    }
}

impl From<RemoteError> for AuthError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Status { message, .. } => Self::from_message(message),
            other => Self::from_message(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
