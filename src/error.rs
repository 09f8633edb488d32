use crate::logic::validate::ValidationErrors;
use crate::model::{EntityKind, Id};
use crate::store::traits::UpsertConflict;

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Id },
    #[error("{0}")]
    ConflictOnUpsert(String),
    #[error(transparent)]
    Store(anyhow::Error),
}

impl StagingError {
    pub fn not_found(kind: EntityKind, id: &Id) -> Self {
        StagingError::NotFound {
            kind,
            id: id.clone(),
        }
    }
}

impl From<ValidationErrors> for StagingError {
    fn from(errors: ValidationErrors) -> Self {
        StagingError::Validation(errors)
    }
}

impl From<anyhow::Error> for StagingError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<UpsertConflict>() {
            Some(conflict) => StagingError::ConflictOnUpsert(conflict.to_string()),
            None => StagingError::Store(err),
        }
    }
}
