use std::sync::Arc;

use crate::{
    Config,
    cache::CacheManager,
    mail::EmailService,
    model::ModelManager,
    storage::{ObjectStore, UrlSigner},
};

#[derive(Debug, Clone)]
pub struct AppState {
    mm: ModelManager,
    config: &'static Config,
    storage: Arc<dyn ObjectStore>,
    signer: UrlSigner,
    mailer: EmailService,
    cache: CacheManager,
}

impl AppState {
    pub fn new(
        mm: ModelManager,
        config: &'static Config,
        storage: Arc<dyn ObjectStore>,
        mailer: EmailService,
        cache: CacheManager,
    ) -> Self {
        Self {
            mm,
            config,
            storage,
            signer: UrlSigner::from_config(config),
            mailer,
            cache,
        }
    }

    pub fn pool(&self) -> &ModelManager {
        &self.mm
    }

    pub fn config(&self) -> &'static Config {
        self.config
    }

    pub fn storage(&self) -> &dyn ObjectStore {
        self.storage.as_ref()
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub fn mailer(&self) -> &EmailService {
        &self.mailer
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }
}
