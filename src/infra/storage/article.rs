use super::db::PgTx;
use crate::domain::article::Article;
use crate::domain::ports::ArticleStore;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

/// PostgreSQLの記事ストア
#[derive(Clone)]
pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleStore<PgTx> for PgArticleStore {
    /// 記事をUPSERTする。
    /// 既存記事より last_modified が新しい場合のみ更新し、それ以外は既存のIDを返す。
    async fn upsert(&self, tx: &mut PgTx, article: &Article) -> InfraResult<i64> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO articles (
                source_id, external_id, title, description, summary, body, author,
                canonical_url, image_url, published_at, last_modified, duration
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (source_id, external_id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                summary = EXCLUDED.summary,
                body = EXCLUDED.body,
                author = EXCLUDED.author,
                canonical_url = EXCLUDED.canonical_url,
                image_url = EXCLUDED.image_url,
                last_modified = EXCLUDED.last_modified,
                duration = EXCLUDED.duration,
                updated_at = NOW()
            WHERE articles.last_modified < EXCLUDED.last_modified
            RETURNING id
            "#,
        )
        .bind(&article.source_id)
        .bind(article.external_id)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.summary)
        .bind(&article.body)
        .bind(&article.author)
        .bind(&article.canonical_url)
        .bind(&article.image_url)
        .bind(article.published_at)
        .bind(article.last_modified)
        .bind(article.duration)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| InfraError::database_query("記事のUPSERT", e))?;

        if let Some(id) = inserted {
            return Ok(id);
        }

        // 更新が抑止された（既存の方が新しいか同じ）場合は既存IDを取得
        sqlx::query_scalar("SELECT id FROM articles WHERE source_id = $1 AND external_id = $2")
            .bind(&article.source_id)
            .bind(article.external_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| InfraError::database_query("既存記事IDの取得", e))
    }

    async fn get_existing_last_modified(
        &self,
        source_id: &str,
        external_ids: &[i64],
    ) -> InfraResult<HashMap<i64, DateTime<Utc>>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT external_id, last_modified FROM articles WHERE source_id = $1 AND external_id = ANY($2)",
        )
        .bind(source_id)
        .bind(external_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| InfraError::database_query("既存記事の更新日時の取得", e))?;

        Ok(rows.into_iter().collect())
    }
}
