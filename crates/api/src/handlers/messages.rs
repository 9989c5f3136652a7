//! Handlers for the `/messages` resource (chat log per account).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fleet_core::error::CoreError;
use fleet_db::models::message::{CreateMessage, MessageListQuery};
use fleet_db::repositories::{page, AccountRepo, MessageRepo};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/messages
pub async fn create_message(
    State(state): State<AppState>,
    Json(input): Json<CreateMessage>,
) -> AppResult<impl IntoResponse> {
    if input.peer.trim().is_empty() {
        return Err(CoreError::Validation("peer must not be blank".into()).into());
    }
    AccountRepo::find_by_id(&state.pool, input.account_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Account",
            id: input.account_id,
        })?;

    let message = MessageRepo::create(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: message })))
}

/// GET /api/v1/messages?account_id=&peer=
///
/// Oldest first, so a conversation reads top to bottom.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<MessageListQuery>,
) -> AppResult<impl IntoResponse> {
    let (limit, offset) = page(params.limit, params.offset);
    let messages = MessageRepo::list(
        &state.pool,
        params.account_id,
        params.peer.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse { data: messages }))
}
