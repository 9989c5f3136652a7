//! Route definitions for the `/materials` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::materials;
use crate::state::AppState;

/// Routes mounted at `/materials`.
///
/// ```text
/// GET    /                   -> list_materials
/// POST   /                   -> create_material
/// GET    /{id}               -> get_material
/// POST   /{id}/transcode     -> retranscode_material
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(materials::list_materials).post(materials::create_material),
        )
        .route("/{id}", get(materials::get_material))
        .route("/{id}/transcode", post(materials::retranscode_material))
}
