use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::api::handlers::{self, AppState};
use crate::model::EntityKind;
use crate::store::traits::Store;

pub fn create_router<S: Store + ?Sized + 'static>() -> Router<AppState<S>> {
    let router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check));

    EntityKind::all().into_iter().fold(router, |router, kind| {
        router.nest(&format!("/{}", kind.collection()), entity_router::<S>(kind))
    })
}

/// Routes shared by every entity kind; the kind reaches handlers as an extension
fn entity_router<S: Store + ?Sized + 'static>(kind: EntityKind) -> Router<AppState<S>> {
    Router::new()
        .route(
            "/",
            get(handlers::list_entities::<S>).post(handlers::create_entity::<S>),
        )
        .route(
            "/:id",
            get(handlers::get_entity::<S>).patch(handlers::stage_update::<S>),
        )
        .route("/:id/base", get(handlers::get_base_entity::<S>))
        .route("/:id/preview", post(handlers::preview_update::<S>))
        .route(
            "/:id/staged-changes",
            get(handlers::list_staged_changes::<S>)
                .delete(handlers::discard_staged_changes::<S>),
        )
        .route("/:id/promote", post(handlers::promote_entity::<S>))
        .layer(Extension(kind))
}
