use sqlx::SqlitePool;

/// Create the index schema. Safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // One row per (passage content, embedding model). `position` records
    // insertion order and breaks similarity ties.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            content_key TEXT NOT NULL,
            model TEXT NOT NULL,
            source TEXT NOT NULL,
            char_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            position INTEGER NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (content_key, model)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_passages_model_position ON passages(model, position)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_source ON passages(source)")
        .execute(pool)
        .await?;

    Ok(())
}
