//! Repository for the `accounts` table.

use fleet_core::types::DbId;
use sqlx::PgPool;

use crate::models::account::{Account, CreateAccount, DEFAULT_PLATFORM};
use crate::models::status::LoginStatus;

/// Column list for `accounts` queries.
const COLUMNS: &str = "\
    id, device_id, account_name, platform, cookies, login_status_id, \
    last_login_at, created_at, updated_at";

/// Provides CRUD and login-state updates for platform accounts.
pub struct AccountRepo;

impl AccountRepo {
    /// Create a logged-out account owned by the device with internal id
    /// `device_pk`.
    pub async fn create(
        pool: &PgPool,
        device_pk: DbId,
        input: &CreateAccount,
    ) -> Result<Account, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts (device_id, account_name, platform, cookies, login_status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(device_pk)
            .bind(&input.account_name)
            .bind(input.platform.as_deref().unwrap_or(DEFAULT_PLATFORM))
            .bind(&input.cookies)
            .bind(LoginStatus::LoggedOut.id())
            .fetch_one(pool)
            .await
    }

    /// Find an account by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Account>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List accounts, optionally restricted to one device (internal id).
    pub async fn list(pool: &PgPool, device_pk: Option<DbId>) -> Result<Vec<Account>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM accounts \
             WHERE ($1::BIGINT IS NULL OR device_id = $1) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(device_pk)
            .fetch_all(pool)
            .await
    }

    /// Record a login-flow transition.
    ///
    /// Entering `logged_in` stamps `last_login_at`. New cookies replace the
    /// stored ones; `None` keeps them.
    pub async fn set_login_status(
        pool: &PgPool,
        id: DbId,
        status: LoginStatus,
        cookies: Option<&str>,
    ) -> Result<Option<Account>, sqlx::Error> {
        let query = format!(
            "UPDATE accounts SET \
                 login_status_id = $2, \
                 cookies = COALESCE($3, cookies), \
                 last_login_at = CASE WHEN $2::SMALLINT = $4::SMALLINT THEN NOW() ELSE last_login_at END \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(status.id())
            .bind(cookies)
            .bind(LoginStatus::LoggedIn.id())
            .fetch_optional(pool)
            .await
    }
}
