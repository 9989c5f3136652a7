//! Route definitions for the `/accounts` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::accounts;
use crate::state::AppState;

/// Routes mounted at `/accounts`.
///
/// ```text
/// GET    /                     -> list_accounts
/// POST   /                     -> create_account
/// GET    /{id}                 -> get_account
/// PUT    /{id}/login-status    -> update_login_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(accounts::list_accounts).post(accounts::create_account))
        .route("/{id}", get(accounts::get_account))
        .route("/{id}/login-status", put(accounts::update_login_status))
}
