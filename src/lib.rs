use std::sync::Arc;

use crate::model::{CrudRepository, DbConnection, ModelManager, entity::UserEntity};
use crate::storage::{LocalObjectStore, ObjectStore};
use crate::utils::signal::shutdown_signal;
use crate::web::{AuthenticatedUser, UserRole};
use crate::{cache::CacheManager, error::AppResult, mail::EmailService, web::AppState};
use axum::Router;
use model::entity::UserEntityCreateUpdate;
use tokio::net::TcpListener;

pub mod config;
pub use config::{Config, ConfigError, ConfigResult};

pub mod auth;
pub mod cache;
pub mod error;
pub mod mail;
pub mod model;
pub mod progress;
pub mod storage;
pub mod utils;
pub mod web;

static APPLICATION_NAME: &str = "learnpath";

/// Creates the configured administrator when no account uses that email yet.
#[tracing::instrument(skip_all)]
pub async fn bootstrap_admin(mm: &ModelManager, config: &Config) -> AppResult<()> {
    let Some(admin) = config.admin() else {
        return Ok(());
    };

    if UserEntity::find_by_email(mm, admin.email()).await?.is_some() {
        return Ok(());
    }

    let hash = auth::hash_password(admin.password())?;
    let created = UserEntity::create(
        mm,
        &AuthenticatedUser::admin(),
        UserEntityCreateUpdate::with_password(admin.email(), admin.full_name(), hash)
            .role(UserRole::Admin),
    )
    .await?;
    tracing::info!("created bootstrap admin {}", created.email());
    Ok(())
}

fn assemble(
    mm: ModelManager,
    config: &'static Config,
    storage: Arc<dyn ObjectStore>,
    mailer: EmailService,
    cache: CacheManager,
) -> (AppState, Router) {
    let state = AppState::new(mm, config, storage, mailer, cache);
    let app = web::routes::build_app(state.clone(), config);
    (state, app)
}

pub async fn build_server() -> AppResult<(AppState, Router)> {
    let use_local = cfg!(debug_assertions);
    let config = config::Config::get_or_init(use_local).await;

    let db = DbConnection::connect(config.app().database_uri())?;
    db.migrate().await?;

    let mm = ModelManager::new(db);
    bootstrap_admin(&mm, config).await?;

    let storage = LocalObjectStore::from_config(config.storage());
    storage.ensure_dirs().await?;

    let mailer = EmailService::from_config(config.email())?;
    if !mailer.is_enabled() {
        tracing::warn!("email notifications are disabled");
    }
    let cache = CacheManager::from_config(config.cache());

    Ok(assemble(mm, config, Arc::new(storage), mailer, cache))
}

/// Test entry: existing pool, no mail, no cache, uploads under the temp dir.
pub async fn build_server_with_pool(db: DbConnection) -> AppResult<(AppState, Router)> {
    let config = config::Config::get_or_init(true).await;

    let mm = ModelManager::new(db);
    bootstrap_admin(&mm, config).await?;

    let storage = LocalObjectStore::new(
        std::env::temp_dir().join(format!("{APPLICATION_NAME}-tests")),
        config.storage().bucket(),
    );
    storage.ensure_dirs().await?;

    Ok(assemble(
        mm,
        config,
        Arc::new(storage),
        EmailService::disabled(),
        CacheManager::disabled(),
    ))
}

#[tracing::instrument]
pub async fn setup_workers() -> AppResult<()> {
    let (_, app) = build_server().await?;
    let config = Config::get_or_init(false).await;
    let listener = TcpListener::bind(config.host().bindto()).await?;

    tracing::info!("axum is starting at: {}", config.host().bindto());
    let axum_handle = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    axum_handle.await?;
    Ok(())
}

fn setup_trace() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

    // load .env file for RUST_LOG etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    tracing::debug!("tracing initialized.");
}

#[tracing::instrument]
pub async fn run() -> AppResult<()> {
    setup_trace();
    setup_workers().await?;
    Ok(())
}
