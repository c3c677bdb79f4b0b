use crate::domain::ports::SyncStateStore;
use crate::domain::sync::SyncState;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use sqlx::PgPool;

/// PostgreSQLの同期状態ストア
#[derive(Clone)]
pub struct PgSyncStateStore {
    pool: PgPool,
}

impl PgSyncStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStateStore for PgSyncStateStore {
    async fn get(&self, source_id: &str) -> InfraResult<SyncState> {
        let state = sqlx::query_as::<_, SyncState>(
            r#"
            SELECT source_id, last_synced_at, last_article_id, total_synced
            FROM sync_state
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| InfraError::database_query("同期状態の取得", e))?;

        Ok(state.unwrap_or_else(|| SyncState::new(source_id)))
    }

    async fn update(&self, state: &SyncState) -> InfraResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (source_id, last_synced_at, last_article_id, total_synced)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_id) DO UPDATE SET
                last_synced_at = EXCLUDED.last_synced_at,
                last_article_id = EXCLUDED.last_article_id,
                total_synced = EXCLUDED.total_synced
            "#,
        )
        .bind(&state.source_id)
        .bind(state.last_synced_at)
        .bind(state.last_article_id)
        .bind(state.total_synced)
        .execute(&self.pool)
        .await
        .map_err(|e| InfraError::database_query("同期状態の更新", e))?;

        Ok(())
    }
}
