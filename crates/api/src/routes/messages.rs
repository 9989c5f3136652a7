use axum::routing::get;
use axum::Router;

use crate::handlers::messages;
use crate::state::AppState;

/// Routes mounted at `/messages`.
///
/// ```text
/// GET    /    -> list_messages
/// POST   /    -> create_message
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(messages::list_messages).post(messages::create_message),
    )
}
