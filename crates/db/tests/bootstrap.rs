use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify lookup tables.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    fleet_db::health_check(&pool).await.unwrap();

    let tables = [
        ("login_statuses", 4),
        ("task_statuses", 4),
        ("material_statuses", 3),
        ("transcode_statuses", 4),
    ];

    for (table, expected) in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, expected, "{table} seed rows");
    }
}

/// Seed names line up with the Rust status enums.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_status_ids_match_enums(pool: PgPool) {
    use fleet_db::models::status::{LoginStatus, TaskStatus, TranscodeStatus};

    let id: i16 = sqlx::query_scalar("SELECT id FROM task_statuses WHERE name = 'running'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(id, TaskStatus::Running.id());

    let id: i16 = sqlx::query_scalar("SELECT id FROM login_statuses WHERE name = 'expired'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(id, LoginStatus::Expired.id());

    let id: i16 = sqlx::query_scalar("SELECT id FROM transcode_statuses WHERE name = 'done'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(id, TranscodeStatus::Done.id());
}
