//! Repository for the append-only `messages` table.

use fleet_core::types::DbId;
use sqlx::PgPool;

use crate::models::message::{CreateMessage, Message};

/// Column list for `messages` queries.
const COLUMNS: &str = "\
    id, account_id, peer, body, is_me, message_time, sent_at, created_at";

/// Appends and reads chat lines. There is no update or delete.
pub struct MessageRepo;

impl MessageRepo {
    /// Append one message.
    pub async fn create(pool: &PgPool, input: &CreateMessage) -> Result<Message, sqlx::Error> {
        let query = format!(
            "INSERT INTO messages (account_id, peer, body, is_me, message_time, sent_at) \
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW())) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(input.account_id)
            .bind(&input.peer)
            .bind(&input.body)
            .bind(input.is_me)
            .bind(&input.message_time)
            .bind(input.sent_at)
            .fetch_one(pool)
            .await
    }

    /// Messages of an account, optionally with one peer, oldest first.
    pub async fn list(
        pool: &PgPool,
        account_id: DbId,
        peer: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE account_id = $1 AND ($2::TEXT IS NULL OR peer = $2) \
             ORDER BY sent_at ASC, id ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(account_id)
            .bind(peer)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
