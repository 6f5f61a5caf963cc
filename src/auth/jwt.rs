use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::error::{CryptError, CryptResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Present on refresh tokens only, keeps every issued refresh token unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl UserClaims {
    pub fn access(user_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            token_type: TokenType::Access,
            jti: None,
        }
    }

    pub fn refresh(user_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            token_type: TokenType::Refresh,
            jti: Some(crate::auth::token::generate_token()),
        }
    }

    pub fn user_id(&self) -> CryptResult<Uuid> {
        self.sub.parse().map_err(|_| CryptError::InvalidSubject)
    }
}

pub fn generate_token<K: AsRef<[u8]>>(claims: &UserClaims, key: K) -> CryptResult<String> {
    let header = Header::default();
    let key = EncodingKey::from_secret(key.as_ref());

    let token = jsonwebtoken::encode(&header, claims, &key)?;
    Ok(token)
}

/// Verifies signature and expiry, then checks the `type` claim.
pub fn process_token<K: AsRef<[u8]>>(
    token: &str,
    key: K,
    expected: TokenType,
) -> CryptResult<UserClaims> {
    let validation = Validation::default();
    let key = DecodingKey::from_secret(key.as_ref());

    let data = jsonwebtoken::decode::<UserClaims>(token, &key, &validation)?;
    if data.claims.token_type != expected {
        return Err(CryptError::WrongTokenType {
            expected: expected.as_str(),
        });
    }

    Ok(data.claims)
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Issued pair plus the refresh expiry needed to persist the refresh token.
pub struct IssuedTokens {
    pub pair: TokenPair,
    pub refresh_expires_at: chrono::DateTime<Utc>,
}

pub fn issue_token_pair(user_id: Uuid, auth: &crate::config::Auth) -> CryptResult<IssuedTokens> {
    let access = UserClaims::access(user_id, auth.access_token_ttl());
    let refresh = UserClaims::refresh(user_id, auth.refresh_token_ttl());

    let access_token = generate_token(&access, auth.jwt_secret())?;
    let refresh_token = generate_token(&refresh, auth.jwt_refresh_secret())?;

    Ok(IssuedTokens {
        pair: TokenPair {
            access_token,
            refresh_token,
            token_type: String::from("bearer"),
            expires_in: auth.access_token_ttl().num_seconds(),
        },
        refresh_expires_at: Utc::now() + auth.refresh_token_ttl(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const ACCESS: &str = "access-secret";
    const REFRESH: &str = "refresh-secret";

    #[test]
    fn access_token_roundtrip() {
        let id = Uuid::new_v4();
        let claims = UserClaims::access(id, Duration::minutes(15));
        let token = generate_token(&claims, ACCESS).unwrap();

        let decoded = process_token(&token, ACCESS, TokenType::Access).unwrap();
        assert_eq!(decoded.user_id().unwrap(), id);
        assert!(decoded.jti.is_none());
        assert_eq!(decoded.exp - decoded.iat, 15 * 60);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let claims = UserClaims::refresh(Uuid::new_v4(), Duration::days(7));
        let token = generate_token(&claims, ACCESS).unwrap();

        let err = process_token(&token, ACCESS, TokenType::Access).unwrap_err();
        assert!(matches!(err, CryptError::WrongTokenType { .. }));
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let claims = UserClaims::refresh(Uuid::new_v4(), Duration::days(7));
        let token = generate_token(&claims, REFRESH).unwrap();

        assert!(process_token(&token, ACCESS, TokenType::Refresh).is_err());
        assert!(process_token(&token, REFRESH, TokenType::Refresh).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = UserClaims::access(Uuid::new_v4(), Duration::minutes(-10));
        let token = generate_token(&claims, ACCESS).unwrap();

        let err = process_token(&token, ACCESS, TokenType::Access).unwrap_err();
        assert!(matches!(err, CryptError::JwtError(_)));
    }

    #[test]
    fn refresh_tokens_are_unique() {
        let id = Uuid::new_v4();
        let a = generate_token(&UserClaims::refresh(id, Duration::days(1)), REFRESH).unwrap();
        let b = generate_token(&UserClaims::refresh(id, Duration::days(1)), REFRESH).unwrap();
        assert_ne!(a, b);
    }
}
