//! Handlers for the `/accounts` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fleet_core::error::CoreError;
use fleet_core::types::DbId;
use fleet_db::models::account::{AccountListQuery, CreateAccount, UpdateLoginStatus};
use fleet_db::models::device::Device;
use fleet_db::models::status::LoginStatus;
use fleet_db::repositories::{AccountRepo, DeviceRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_device(state: &AppState, device_id: &str) -> AppResult<Device> {
    DeviceRepo::find_by_device_id(&state.pool, device_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))
}

/// POST /api/v1/accounts
///
/// Accounts start `logged_out`. A duplicate name on the same device and
/// platform is a 409.
pub async fn create_account(
    State(state): State<AppState>,
    Json(input): Json<CreateAccount>,
) -> AppResult<impl IntoResponse> {
    if input.account_name.trim().is_empty() {
        return Err(CoreError::Validation("account_name must not be blank".into()).into());
    }
    let device = find_device(&state, &input.device_id).await?;
    let account = AccountRepo::create(&state.pool, device.id, &input).await?;

    tracing::info!(
        account_id = account.id,
        device_id = %device.device_id,
        platform = %account.platform,
        "Account created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: account })))
}

/// GET /api/v1/accounts?device_id=
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(params): Query<AccountListQuery>,
) -> AppResult<impl IntoResponse> {
    let device_pk = match params.device_id.as_deref() {
        Some(device_id) => Some(find_device(&state, device_id).await?.id),
        None => None,
    };
    let accounts = AccountRepo::list(&state.pool, device_pk).await?;
    Ok(Json(DataResponse { data: accounts }))
}

/// GET /api/v1/accounts/{id}
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let account = AccountRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Account",
            id,
        })?;
    Ok(Json(DataResponse { data: account }))
}

/// PUT /api/v1/accounts/{id}/login-status
///
/// Driven by the login flow on the device. Reaching `logged_in` stamps
/// `last_login_at` and stores fresh cookies when supplied.
pub async fn update_login_status(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateLoginStatus>,
) -> AppResult<impl IntoResponse> {
    let status = LoginStatus::from_name(&input.login_status).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown login status '{}'", input.login_status))
    })?;
    let account = AccountRepo::set_login_status(&state.pool, id, status, input.cookies.as_deref())
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Account",
            id,
        })?;

    tracing::info!(account_id = id, login_status = status.name(), "Account login status updated");

    Ok(Json(DataResponse { data: account }))
}
