use thiserror::Error;

use crate::model::DatabaseError;

pub type ProgressResult<T> = std::result::Result<T, ProgressError>;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("module {0} not found")]
    ModuleNotFound(String),
    #[error("pathway {0} not found")]
    PathwayNotFound(String),
    #[error("module {module_id} does not belong to pathway {pathway_id}")]
    ModuleNotInPathway {
        module_id: String,
        pathway_id: String,
    },
    #[error("module has incomplete resources: {0:?}")]
    IncompleteResources(Vec<String>),
}

impl From<sqlx::Error> for ProgressError {
    fn from(value: sqlx::Error) -> Self {
        Self::DatabaseError(DatabaseError::SqlxError(value))
    }
}
