use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension, Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::PaginationConfig;
use crate::error::StagingError;
use crate::logic::{FieldError, Proposal, StagingCoordinator};
use crate::model::{
    Entity, EntityKind, EntitySchema, Id, Page, PageRequest, StagePlan, StagedChange,
};
use crate::store::traits::Store;

/// Shared handler state: the store plus paging limits
pub struct AppState<S: ?Sized> {
    pub store: Arc<S>,
    pub pagination: PaginationConfig,
}

impl<S: ?Sized> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            pagination: self.pagination.clone(),
        }
    }
}

impl<S: ?Sized> AppState<S> {
    pub fn new(store: Arc<S>, pagination: PaginationConfig) -> Self {
        Self { store, pagination }
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            details: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DiscardResponse {
    pub discarded: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a staging failure onto a status code and response body
pub fn error_response(err: StagingError) -> ApiError {
    match err {
        StagingError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "Validation failed".to_string(),
                details: errors.errors,
            }),
        ),
        StagingError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new(&err.to_string())))
        }
        StagingError::ConflictOnUpsert(_) | StagingError::Store(_) => {
            log::error!("Request failed: {:#}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(&err.to_string())),
            )
        }
    }
}

fn schema(kind: EntityKind) -> &'static EntitySchema {
    EntitySchema::for_kind(kind)
}

pub async fn list_entities<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Entity>>, ApiError> {
    let request = PageRequest::new(
        query.page.unwrap_or(1),
        query
            .page_size
            .unwrap_or(state.pagination.default_page_size),
    )
    .normalized(state.pagination.max_page_size);

    StagingCoordinator::list(state.store.as_ref(), schema(kind), request)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn create_entity<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    RequestJson(proposal): RequestJson<Proposal>,
) -> Result<(StatusCode, Json<Entity>), ApiError> {
    StagingCoordinator::create(state.store.as_ref(), schema(kind), &proposal)
        .await
        .map(|entity| (StatusCode::CREATED, Json(entity)))
        .map_err(error_response)
}

pub async fn get_entity<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
) -> Result<Json<Entity>, ApiError> {
    StagingCoordinator::get(state.store.as_ref(), schema(kind), &id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn get_base_entity<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
) -> Result<Json<Entity>, ApiError> {
    StagingCoordinator::get_base(state.store.as_ref(), schema(kind), &id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn stage_update<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
    RequestJson(proposal): RequestJson<Proposal>,
) -> Result<Json<Entity>, ApiError> {
    StagingCoordinator::stage_update(state.store.as_ref(), schema(kind), &id, &proposal)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn preview_update<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
    RequestJson(proposal): RequestJson<Proposal>,
) -> Result<Json<StagePlan>, ApiError> {
    StagingCoordinator::preview(state.store.as_ref(), schema(kind), &id, &proposal)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_staged_changes<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
) -> Result<Json<Vec<StagedChange>>, ApiError> {
    StagingCoordinator::staged_changes(state.store.as_ref(), schema(kind), &id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn promote_entity<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
) -> Result<Json<Entity>, ApiError> {
    StagingCoordinator::promote(state.store.as_ref(), schema(kind), &id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn discard_staged_changes<S: Store + ?Sized>(
    State(state): State<AppState<S>>,
    Extension(kind): Extension<EntityKind>,
    Path(id): Path<Id>,
) -> Result<Json<DiscardResponse>, ApiError> {
    StagingCoordinator::discard(state.store.as_ref(), schema(kind), &id)
        .await
        .map(|discarded| Json(DiscardResponse { discarded }))
        .map_err(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{FieldErrorType, ValidationErrors};

    #[test]
    fn test_validation_maps_to_unprocessable_entity() {
        let errors = ValidationErrors {
            errors: vec![FieldError {
                attribute: "name".to_string(),
                error_type: FieldErrorType::Required,
                message: "can't be blank".to_string(),
            }],
        };
        let (status, Json(body)) = error_response(StagingError::Validation(errors));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.details.len(), 1);
        assert_eq!(body.details[0].attribute, "name");
    }

    #[test]
    fn test_not_found_and_store_errors() {
        let (status, Json(body)) =
            error_response(StagingError::not_found(EntityKind::Room, &"r-1".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "room r-1 not found");

        let (status, _) = error_response(StagingError::Store(anyhow::anyhow!("pool closed")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
