mod password;
pub use password::{PasswordPolicy, PasswordPolicyError, hash_password, verify_password};
mod jwt;
pub use jwt::{
    IssuedTokens, TokenPair, TokenType, UserClaims, generate_token, issue_token_pair,
    process_token,
};
mod error;
pub use error::{CryptError, CryptResult, OAuthError, OAuthResult};
pub mod lockout;
pub mod oauth;
pub mod token;
