use dmind_core::CoreError;
use dmind_state::StoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid wallet address: {0}")]
    InvalidWalletAddress(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Authentication failed: session expired")]
    SessionExpired,
    #[error("Authentication failed: session revoked")]
    SessionRevoked,
    #[error("Authentication failed: {0}")]
    InvalidToken(String),
    #[error("Failed to issue session token: {0}")]
    TokenIssue(String),
    #[error("Wallet signature rejected: {0}")]
    InvalidSignature(String),
    #[error("Sign-in message has expired")]
    SignInExpired,
    #[error("Sign-in signature has already been used")]
    SignatureReused,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for AuthError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidWalletAddress(addr) => AuthError::InvalidWalletAddress(addr),
            other => AuthError::InvalidToken(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::SessionExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        }
    }
}
