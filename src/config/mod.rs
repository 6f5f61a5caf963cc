use serde::Deserialize;
use tokio::sync::OnceCell;

static CONFIG: OnceCell<Config> = OnceCell::const_new();

mod config_dir;
pub use config_dir::{CONFIG_PATH_VAR, find_config_file, read_config, read_config_from};

mod error;
pub use error::{ConfigError, ConfigResult};

#[derive(Debug, Deserialize)]
pub struct Config {
    host: Host,
    app: App,
    auth: Auth,
    #[serde(default)]
    oauth: OAuth,
    #[serde(default)]
    storage: Storage,
    #[serde(default)]
    email: Email,
    #[serde(default)]
    cache: Cache,
    admin: Option<Admin>,
}

#[derive(Debug, Deserialize)]
pub struct Host {
    bindto: String,
    #[serde(default = "default_public_url")]
    public_url: String,
    #[serde(default = "default_frontend_url")]
    frontend_url: String,
}

#[derive(Debug, Deserialize)]
pub struct App {
    database_uri: String,
    #[serde(default)]
    docs: bool,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    jwt_secret: String,
    jwt_refresh_secret: String,
    #[serde(default = "default_access_minutes")]
    access_token_minutes: i64,
    #[serde(default = "default_refresh_days")]
    refresh_token_days: i64,
    #[serde(default = "default_min_password")]
    min_password_length: usize,
    #[serde(default = "default_max_password")]
    max_password_length: usize,
    #[serde(default = "default_max_attempts")]
    max_login_attempts: i32,
    #[serde(default = "default_lockout_minutes")]
    lockout_minutes: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OAuth {
    google_client_id: Option<String>,
    google_client_secret: Option<String>,
    google_redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Storage {
    root: String,
    bucket: String,
    signing_key: String,
    url_ttl_secs: i64,
    max_upload_mb: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Email {
    #[serde(default)]
    enabled: bool,
    smtp_host: String,
    smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    from_email: String,
    from_name: String,
    #[serde(default)]
    admin_emails: Vec<String>,
    retry_attempts: u32,
    retry_delay_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
    redis_url: Option<String>,
    pool_size: usize,
    connection_timeout_secs: u64,
    default_ttl_secs: u64,
}

/// Bootstrap administrator, created on startup when absent.
#[derive(Debug, Deserialize)]
pub struct Admin {
    email: String,
    password: String,
    full_name: String,
}

fn default_public_url() -> String {
    String::from("http://127.0.0.1:5000")
}

fn default_frontend_url() -> String {
    String::from("http://localhost:3000")
}

fn default_access_minutes() -> i64 {
    15
}

fn default_refresh_days() -> i64 {
    7
}

fn default_min_password() -> usize {
    8
}

fn default_max_password() -> usize {
    128
}

fn default_max_attempts() -> i32 {
    5
}

fn default_lockout_minutes() -> i64 {
    30
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            root: String::from("./uploads"),
            bucket: String::from("learnpath-submissions"),
            signing_key: String::new(),
            url_ttl_secs: 3600,
            max_upload_mb: 100,
        }
    }
}

impl Default for Email {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::from("smtp.gmail.com"),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_email: String::from("noreply@learnpath.local"),
            from_name: String::from("Learnpath"),
            admin_emails: Vec::new(),
            retry_attempts: 3,
            retry_delay_secs: 2,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            redis_url: None,
            pool_size: 8,
            connection_timeout_secs: 2,
            default_ttl_secs: 3600,
        }
    }
}

impl Config {
    #[tracing::instrument]
    pub async fn get_or_init(use_local: bool) -> &'static Config {
        CONFIG
            .get_or_init(|| async {
                let read_cfg = |use_local| -> ConfigResult<Self> {
                    let bytes = read_config(use_local)?;
                    let mut config: Self = toml::from_slice(&bytes)?;
                    config.apply_overrides(|key| std::env::var(key).ok());
                    config.validate()?;
                    Ok(config)
                };

                match read_cfg(use_local) {
                    Ok(c) => c,
                    Err(e) => {
                        if !matches!(e, error::ConfigError::ConfigNotFound) {
                            crate::error::log_error(&e);
                        }
                        tracing::error!("Config not found.");
                        std::process::exit(1);
                    }
                }
            })
            .await
    }

    pub fn from_toml(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Replaces secrets and connection strings with values from `lookup`
    /// (the process environment at startup).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = lookup("DATABASE_URL") {
            self.app.database_uri = v;
        }
        if let Some(v) = lookup("JWT_SECRET_KEY") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("JWT_REFRESH_SECRET_KEY") {
            self.auth.jwt_refresh_secret = v;
        }
        if let Some(v) = lookup("GOOGLE_CLIENT_ID") {
            self.oauth.google_client_id = Some(v);
        }
        if let Some(v) = lookup("GOOGLE_CLIENT_SECRET") {
            self.oauth.google_client_secret = Some(v);
        }
        if let Some(v) = lookup("SMTP_USERNAME") {
            self.email.smtp_username = Some(v);
        }
        if let Some(v) = lookup("SMTP_PASSWORD") {
            self.email.smtp_password = Some(v);
        }
        if let Some(v) = lookup("REDIS_URL") {
            self.cache.redis_url = Some(v);
        }
        if let Some(v) = lookup("STORAGE_SIGNING_KEY") {
            self.storage.signing_key = v;
        }
    }

    /// Rejects secrets that would make tokens or signed URLs forgeable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.auth.jwt_secret.is_empty() || self.auth.jwt_refresh_secret.is_empty() {
            return Err(ConfigError::Invalid("jwt secrets must not be empty"));
        }
        if self.auth.jwt_secret == self.auth.jwt_refresh_secret {
            return Err(ConfigError::Invalid(
                "access and refresh tokens need distinct secrets",
            ));
        }
        if self.storage.signing_key.is_empty() {
            return Err(ConfigError::Invalid("storage signing key must not be empty"));
        }
        if self.storage.max_upload_mb == 0 {
            return Err(ConfigError::Invalid("storage.max_upload_mb must be positive"));
        }
        Ok(())
    }

    #[inline]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }

    #[inline]
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    #[inline]
    pub fn oauth(&self) -> &OAuth {
        &self.oauth
    }

    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[inline]
    pub fn email(&self) -> &Email {
        &self.email
    }

    #[inline]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    #[inline]
    pub fn admin(&self) -> Option<&Admin> {
        self.admin.as_ref()
    }
}

impl Host {
    #[inline]
    pub fn bindto(&self) -> &str {
        &self.bindto
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    pub fn frontend_url(&self) -> &str {
        self.frontend_url.trim_end_matches('/')
    }
}

impl App {
    #[inline]
    pub fn database_uri(&self) -> &str {
        &self.database_uri
    }

    #[inline]
    pub fn docs(&self) -> bool {
        self.docs
    }
}

impl Auth {
    #[inline]
    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    #[inline]
    pub fn jwt_refresh_secret(&self) -> &str {
        &self.jwt_refresh_secret
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_minutes)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_days)
    }

    pub fn access_token_minutes(&self) -> i64 {
        self.access_token_minutes
    }

    pub fn password_length(&self) -> (usize, usize) {
        (self.min_password_length, self.max_password_length)
    }

    pub fn max_login_attempts(&self) -> i32 {
        self.max_login_attempts
    }

    pub fn lockout_minutes(&self) -> i64 {
        self.lockout_minutes
    }
}

impl OAuth {
    /// Returns `(client_id, client_secret, redirect_uri)` when Google sign-in is fully configured.
    pub fn google(&self) -> Option<(&str, &str, &str)> {
        let id = self.google_client_id.as_deref().filter(|s| !s.is_empty())?;
        let secret = self
            .google_client_secret
            .as_deref()
            .filter(|s| !s.is_empty())?;
        let redirect = self.google_redirect_uri.as_deref()?;
        Some((id, secret, redirect))
    }
}

impl Storage {
    #[inline]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[inline]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[inline]
    pub fn signing_key(&self) -> &str {
        &self.signing_key
    }

    #[inline]
    pub fn url_ttl_secs(&self) -> i64 {
        self.url_ttl_secs
    }

    /// Largest file any resource may accept.
    #[inline]
    pub fn max_upload_mb(&self) -> usize {
        self.max_upload_mb
    }

    /// Request body cap for uploads: the largest file plus 1MB of multipart framing.
    pub fn upload_body_limit(&self) -> usize {
        (self.max_upload_mb + 1) * 1024 * 1024
    }
}

impl Email {
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn smtp_host(&self) -> &str {
        &self.smtp_host
    }

    pub fn smtp_port(&self) -> u16 {
        self.smtp_port
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.smtp_username.as_deref(), self.smtp_password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    pub fn from_email(&self) -> &str {
        &self.from_email
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn admin_emails(&self) -> &[String] {
        &self.admin_emails
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retry_delay_secs)
    }
}

impl Cache {
    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url.as_deref().filter(|s| !s.is_empty())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }
}

impl Admin {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}
