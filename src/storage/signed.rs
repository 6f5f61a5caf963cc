//! HMAC-signed, time-limited download URLs.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use url::Url;

use crate::storage::StorageResult;

type HmacSha256 = Hmac<Sha256>;

/// Route the signed URLs point at.
pub static FILES_ROUTE: [&str; 3] = ["api", "v1", "files"];

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    base_url: String,
    ttl: Duration,
}

impl UrlSigner {
    pub fn new(key: &str, base_url: &str, ttl: Duration) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
            base_url: base_url.to_string(),
            ttl,
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        Self::new(
            config.storage().signing_key(),
            config.host().public_url(),
            Duration::seconds(config.storage().url_ttl_secs()),
        )
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC takes keys of any length
        HmacSha256::new_from_slice(&self.key).unwrap_or_else(|_| unreachable!())
    }

    fn signature(&self, path: &str, expires: i64) -> String {
        let mut mac = self.mac();
        mac.update(format!("{path}:{expires}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn sign(&self, path: &str, now: DateTime<Utc>) -> StorageResult<SignedUrl> {
        let expires_at = now + self.ttl;
        let expires = expires_at.timestamp();

        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(FILES_ROUTE)
            .extend(path.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.signature(path, expires));

        Ok(SignedUrl {
            url: url.to_string(),
            expires_at,
        })
    }

    /// Constant-time signature check plus expiry.
    pub fn verify(&self, path: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if expires < now.timestamp() {
            return false;
        }
        let Ok(raw) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(format!("{path}:{expires}").as_bytes());
        mac.verify_slice(&raw).is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("secret", "http://localhost:5000/", Duration::hours(1))
    }

    fn query(url: &str, key: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn signed_url_verifies_until_expiry() {
        let s = signer();
        let now = Utc::now();
        let path = "pathways/p/users/u/resources/r/2024_a b.pdf";
        let signed = s.sign(path, now).unwrap();

        assert!(signed.url.starts_with("http://localhost:5000/api/v1/files/pathways/p/"));
        assert!(signed.url.contains("a%20b.pdf"));

        let expires: i64 = query(&signed.url, "expires").parse().unwrap();
        let signature = query(&signed.url, "signature");
        assert_eq!(expires, (now + Duration::hours(1)).timestamp());

        assert!(s.verify(path, expires, &signature, now));
        assert!(!s.verify(path, expires, &signature, now + Duration::hours(2)));
    }

    #[test]
    fn tampering_is_detected() {
        let s = signer();
        let now = Utc::now();
        let signed = s.sign("a/b.pdf", now).unwrap();
        let expires: i64 = query(&signed.url, "expires").parse().unwrap();
        let signature = query(&signed.url, "signature");

        assert!(!s.verify("a/c.pdf", expires, &signature, now));
        assert!(!s.verify("a/b.pdf", expires + 60, &signature, now));
        assert!(!s.verify("a/b.pdf", expires, "zz", now));

        let other = UrlSigner::new("other", "http://localhost:5000", Duration::hours(1));
        assert!(!other.verify("a/b.pdf", expires, &signature, now));
    }
}
