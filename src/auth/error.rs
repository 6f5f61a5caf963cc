use thiserror::Error;

pub type CryptResult<T> = std::result::Result<T, CryptError>;

#[derive(Debug, Error)]
pub enum CryptError {
    #[error("argon2 error: {0}")]
    Argon2Error(#[from] argon2::password_hash::Error),
    #[error("jwt error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("unexpected token type, expected {expected}")]
    WrongTokenType { expected: &'static str },
    #[error("token subject is not a user id")]
    InvalidSubject,
}

pub type OAuthResult<T> = std::result::Result<T, OAuthError>;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("google oauth is not configured")]
    NotConfigured,
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("provider rejected request: {0}")]
    Provider(String),
    #[error("provider returned incomplete user info")]
    IncompleteProfile,
    #[error("google account email is not verified")]
    UnverifiedEmail,
}
