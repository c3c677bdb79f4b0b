use super::db::PgTx;
use crate::domain::article::Tag;
use crate::domain::ports::TagStore;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

/// PostgreSQLのタグストア
#[derive(Clone)]
pub struct PgTagStore {
    pool: PgPool,
}

impl PgTagStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 同一IDのタグを1件にまとめる（後に出現したラベルを採用、初出順を維持）
///
/// 1回のINSERT ... ON CONFLICTで同じ行を2度更新するとPostgreSQLがエラーにするため。
fn dedup_tags(tags: &[Tag]) -> Vec<Tag> {
    let mut order: Vec<i64> = Vec::new();
    let mut labels: HashMap<i64, &str> = HashMap::new();
    for tag in tags {
        if labels.insert(tag.id, &tag.label).is_none() {
            order.push(tag.id);
        }
    }
    order
        .into_iter()
        .map(|id| Tag::new(id, labels[&id]))
        .collect()
}

#[async_trait]
impl TagStore<PgTx> for PgTagStore {
    async fn upsert_batch(&self, tx: &mut PgTx, tags: &[Tag]) -> InfraResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let tags = dedup_tags(tags);

        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new("INSERT INTO tags (id, label) ");
        qb.push_values(&tags, |mut row, tag| {
            row.push_bind(tag.id).push_bind(&tag.label);
        });
        qb.push(" ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label");

        qb.build()
            .execute(&mut **tx)
            .await
            .map_err(|e| InfraError::database_query("タグの一括UPSERT", e))?;
        Ok(())
    }

    /// 既存の関連を削除してから新しいタグ集合を関連付ける
    async fn link_to_article(&self, tx: &mut PgTx, article_id: i64, tag_ids: &[i64]) -> InfraResult<()> {
        sqlx::query("DELETE FROM article_tags WHERE article_id = $1")
            .bind(article_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| InfraError::database_query("記事タグ関連の削除", e))?;

        if tag_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO article_tags (article_id, tag_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(article_id)
        .bind(tag_ids.to_vec())
        .execute(&mut **tx)
        .await
        .map_err(|e| InfraError::database_query("記事タグ関連の挿入", e))?;

        Ok(())
    }

    async fn tags_for_article(&self, article_id: i64) -> InfraResult<Vec<Tag>> {
        sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.label
            FROM tags t
            JOIN article_tags l ON l.tag_id = t.id
            WHERE l.article_id = $1
            ORDER BY t.id
            "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| InfraError::database_query("記事タグの取得", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_tags_keeps_last_label() {
        let tags = vec![Tag::new(2, "旧"), Tag::new(1, "a"), Tag::new(2, "新")];

        let deduped = dedup_tags(&tags);

        assert_eq!(deduped, vec![Tag::new(2, "新"), Tag::new(1, "a")]);
    }

    #[cfg(feature = "db-tests")]
    mod db {
        use super::*;
        use crate::domain::article::Article;
        use crate::domain::ports::{ArticleStore, UnitOfWork};
        use crate::infra::storage::article::PgArticleStore;
        use crate::infra::storage::db::PgUnitOfWork;
        use chrono::Utc;

        async fn insert_article(pool: &PgPool) -> i64 {
            let uow = PgUnitOfWork::new(pool.clone());
            let mut tx = uow.begin().await.unwrap();
            let now = Utc::now();
            let id = PgArticleStore::new(pool.clone())
                .upsert(&mut tx, &Article::new("test-source", 123, "記事", "https://example.com", now, now))
                .await
                .unwrap();
            uow.commit(tx).await.unwrap();
            id
        }

        async fn link(pool: &PgPool, article_id: i64, tags: &[Tag]) {
            let store = PgTagStore::new(pool.clone());
            let uow = PgUnitOfWork::new(pool.clone());
            let mut tx = uow.begin().await.unwrap();
            store.upsert_batch(&mut tx, tags).await.unwrap();
            let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
            store.link_to_article(&mut tx, article_id, &ids).await.unwrap();
            uow.commit(tx).await.unwrap();
        }

        #[sqlx::test]
        async fn test_upsert_batch_updates_label(pool: PgPool) -> Result<(), anyhow::Error> {
            let article_id = insert_article(&pool).await;
            link(&pool, article_id, &[Tag::new(1, "old-label"), Tag::new(2, "tag2")]).await;
            link(&pool, article_id, &[Tag::new(1, "new-label")]).await;

            let label: String = sqlx::query_scalar("SELECT label FROM tags WHERE id = $1")
                .bind(1i64)
                .fetch_one(&pool)
                .await?;
            assert_eq!(label, "new-label");

            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags").fetch_one(&pool).await?;
            assert_eq!(count, 2, "語彙のタグは削除されない");
            Ok(())
        }

        #[sqlx::test]
        async fn test_link_replaces_previous_links(pool: PgPool) -> Result<(), anyhow::Error> {
            let article_id = insert_article(&pool).await;
            link(&pool, article_id, &[Tag::new(1, "tag1"), Tag::new(2, "tag2")]).await;
            link(&pool, article_id, &[Tag::new(3, "tag3")]).await;

            let linked = PgTagStore::new(pool.clone()).tags_for_article(article_id).await?;

            assert_eq!(linked, vec![Tag::new(3, "tag3")]);
            Ok(())
        }
    }
}
