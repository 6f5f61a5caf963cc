//! Google OAuth 2.0 authorization-code client.

use serde::Deserialize;
use url::Url;

use crate::auth::error::{OAuthError, OAuthResult};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

pub const GOOGLE_PROVIDER: &str = "google";

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl GoogleTokenResponse {
    pub fn expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub verified_email: bool,
    pub name: Option<String>,
}

/// Identity confirmed by Google plus the provider tokens to store.
#[derive(Debug, Clone)]
pub struct GoogleIdentity {
    pub provider_account_id: String,
    pub email: String,
    pub full_name: String,
    pub tokens: GoogleTokenResponse,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    pub fn from_config(oauth: &crate::config::OAuth) -> OAuthResult<Self> {
        let (client_id, client_secret, redirect_uri) =
            oauth.google().ok_or(OAuthError::NotConfigured)?;

        Ok(Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }

    pub fn authorization_url(&self) -> OAuthResult<Url> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        Ok(url)
    }

    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> OAuthResult<GoogleTokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("google token exchange failed: {} {}", status, body);
            return Err(OAuthError::Provider(format!("token exchange returned {status}")));
        }

        Ok(response.json().await?)
    }

    #[tracing::instrument(skip_all)]
    pub async fn fetch_userinfo(&self, access_token: &str) -> OAuthResult<GoogleUserInfo> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Provider(format!(
                "userinfo returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Code exchange followed by the userinfo lookup.
    pub async fn authenticate(&self, code: &str) -> OAuthResult<GoogleIdentity> {
        let tokens = self.exchange_code(code).await?;
        let info = self.fetch_userinfo(&tokens.access_token).await?;
        identity_from(info, tokens)
    }
}

fn identity_from(info: GoogleUserInfo, tokens: GoogleTokenResponse) -> OAuthResult<GoogleIdentity> {
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or(OAuthError::IncompleteProfile)?
        .to_lowercase();
    if info.sub.is_empty() {
        return Err(OAuthError::IncompleteProfile);
    }
    // the email links to local accounts, so Google must vouch for it
    if !info.verified_email {
        return Err(OAuthError::UnverifiedEmail);
    }

    let full_name = info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Ok(GoogleIdentity {
        provider_account_id: info.sub,
        email,
        full_name,
        tokens,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens() -> GoogleTokenResponse {
        GoogleTokenResponse {
            access_token: String::from("ya29"),
            refresh_token: None,
            expires_in: None,
        }
    }

    #[test]
    fn authorization_url_carries_client_and_redirect() {
        let client = GoogleOAuthClient {
            http: reqwest::Client::new(),
            client_id: String::from("cid"),
            client_secret: String::from("secret"),
            redirect_uri: String::from("http://localhost/cb"),
        };

        let url = client.authorization_url().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&(String::from("client_id"), String::from("cid"))));
        assert!(pairs.contains(&(
            String::from("redirect_uri"),
            String::from("http://localhost/cb")
        )));
        assert!(!url.as_str().contains("secret"));
    }

    #[test]
    fn name_falls_back_to_email_prefix() {
        let info = GoogleUserInfo {
            sub: String::from("123"),
            email: Some(String::from("Jane.Doe@Example.com")),
            verified_email: true,
            name: None,
        };
        let identity = identity_from(info, tokens()).unwrap();
        assert_eq!(identity.email, "jane.doe@example.com");
        assert_eq!(identity.full_name, "jane.doe");
    }

    #[test]
    fn missing_email_is_rejected() {
        let info = GoogleUserInfo {
            sub: String::from("123"),
            email: None,
            verified_email: true,
            name: Some(String::from("X")),
        };
        assert!(matches!(
            identity_from(info, tokens()),
            Err(OAuthError::IncompleteProfile)
        ));
    }

    #[test]
    fn unverified_email_is_rejected() {
        let info = GoogleUserInfo {
            sub: String::from("123"),
            email: Some(String::from("victim@example.com")),
            verified_email: false,
            name: Some(String::from("Mallory")),
        };
        assert!(matches!(
            identity_from(info, tokens()),
            Err(OAuthError::UnverifiedEmail)
        ));
    }

    #[test]
    fn userinfo_without_verified_flag_counts_as_unverified() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"sub":"123","email":"a@example.com"}"#).unwrap();
        assert!(!info.verified_email);
        assert!(matches!(
            identity_from(info, tokens()),
            Err(OAuthError::UnverifiedEmail)
        ));
    }
}
