use crate::app::scheduler::Syncer;
use crate::domain::article::Article;
use crate::domain::ports::{
    ArticleStore, ChangePublisher, ContentSource, SyncStateStore, TagStore, UnitOfWork,
};
use crate::domain::sync::SyncStats;
use crate::types::{InfraResult, SyncConfig, SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 1つのコンテンツソースを同期するサービス
///
/// 取得 → 日付フィルタ → 変更フィルタ → 保存・配信 → 同期状態の更新 を1サイクルとして実行します。
pub struct SyncService<U: UnitOfWork> {
    source: Arc<dyn ContentSource>,
    articles: Arc<dyn ArticleStore<U::Tx>>,
    tags: Arc<dyn TagStore<U::Tx>>,
    sync_states: Arc<dyn SyncStateStore>,
    unit_of_work: U,
    publisher: Option<Arc<dyn ChangePublisher>>,
    config: SyncConfig,
}

impl<U: UnitOfWork> SyncService<U> {
    pub fn new(
        source: Arc<dyn ContentSource>,
        articles: Arc<dyn ArticleStore<U::Tx>>,
        tags: Arc<dyn TagStore<U::Tx>>,
        sync_states: Arc<dyn SyncStateStore>,
        unit_of_work: U,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            articles,
            tags,
            sync_states,
            unit_of_work,
            publisher: None,
            config,
        }
    }

    /// 変更通知の配信先を設定する（未設定の場合は配信しない）
    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// 同期サイクルを1回実行する
    #[instrument(name = "sync", skip(self), fields(source = %self.source.id()))]
    pub async fn sync(&self) -> SyncResult<SyncStats> {
        let started = Instant::now();
        let source_id = self.source.id().to_string();
        let mut stats = SyncStats::new(source_id.as_str());
        info!(name = self.source.name(), "同期を開始します");

        let fetched = self
            .source
            .fetch_articles(self.config.max_pages_per_sync)
            .await
            .map_err(SyncError::Fetch)?;

        let cutoff = history_cutoff(Utc::now(), self.config.max_historical_days);
        let before_filter = fetched.len();
        let articles = filter_by_date(fetched, cutoff);
        debug!(
            before = before_filter,
            after = articles.len(),
            cutoff = %cutoff,
            "日付フィルタを適用しました"
        );
        stats.fetched = articles.len();
        info!(fetched = stats.fetched, "記事を取得しました");

        let external_ids: Vec<i64> = articles.iter().map(|a| a.external_id).collect();
        let existing = self
            .articles
            .get_existing_last_modified(&source_id, &external_ids)
            .await
            .map_err(SyncError::Filter)?;
        let selected = select_for_sync(articles, &existing);
        stats.skipped = stats.fetched - selected.len();
        info!(
            selected = selected.len(),
            skipped = stats.skipped,
            "同期対象を抽出しました"
        );

        let mut last_article_id = None;
        for article in &selected {
            match self.save_article(&source_id, article).await {
                Ok(is_new) => {
                    if is_new {
                        stats.new += 1;
                    } else {
                        stats.updated += 1;
                    }
                    last_article_id = Some(article.external_id);
                    self.publish(article, is_new, &mut stats).await;
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!(
                        external_id = article.external_id,
                        error = %e,
                        "記事の保存に失敗しました"
                    );
                }
            }
        }

        let progress = self
            .update_sync_state(&source_id, stats.synced(), last_article_id)
            .await;
        stats.duration = started.elapsed();
        if let Err(e) = progress {
            return Err(SyncError::progress_update(stats, e));
        }

        info!("{}", stats);
        Ok(stats)
    }

    /// 記事を1つの作業単位で保存し、新規記事かどうかを返す
    async fn save_article(&self, source_id: &str, article: &Article) -> InfraResult<bool> {
        // 新規・更新の判定はこの単独照会の結果に従う
        let existing = self
            .articles
            .get_existing_last_modified(source_id, &[article.external_id])
            .await?;
        let is_new = !existing.contains_key(&article.external_id);

        self.unit_of_work
            .run(move |mut tx| async move {
                let result = self.persist(&mut tx, article).await;
                (tx, result)
            })
            .await?;

        Ok(is_new)
    }

    async fn persist(&self, tx: &mut U::Tx, article: &Article) -> InfraResult<()> {
        let article_id = self.articles.upsert(tx, article).await?;

        if !article.tags.is_empty() {
            self.tags.upsert_batch(tx, &article.tags).await?;
            self.tags
                .link_to_article(tx, article_id, &article.tag_ids())
                .await?;
        }
        Ok(())
    }

    async fn publish(&self, article: &Article, is_new: bool, stats: &mut SyncStats) {
        let Some(publisher) = &self.publisher else {
            return;
        };

        match publisher.publish(article, is_new).await {
            Ok(()) => stats.published += 1,
            Err(e) => {
                stats.errors += 1;
                warn!(
                    external_id = article.external_id,
                    error = %e,
                    "記事の変更通知の配信に失敗しました"
                );
            }
        }
    }

    async fn update_sync_state(
        &self,
        source_id: &str,
        synced: usize,
        last_article_id: Option<i64>,
    ) -> InfraResult<()> {
        let mut state = self.sync_states.get(source_id).await?;
        state.last_synced_at = Some(Utc::now());
        state.total_synced += i64::try_from(synced).unwrap_or(i64::MAX);
        if let Some(id) = last_article_id {
            state.last_article_id = id;
        }
        self.sync_states.update(&state).await
    }
}

#[async_trait]
impl<U: UnitOfWork> Syncer for SyncService<U> {
    fn source_id(&self) -> &str {
        self.source.id()
    }

    async fn sync(&self) -> SyncResult<SyncStats> {
        SyncService::sync(self).await
    }
}

/// 同期対象とする公開日時の下限。表現できる範囲を超える場合は最小日時
pub fn history_cutoff(now: DateTime<Utc>, max_historical_days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(chrono::Duration::days(i64::from(max_historical_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 公開日時が `cutoff` より後の記事のみを残す
pub fn filter_by_date(articles: Vec<Article>, cutoff: DateTime<Utc>) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|article| article.published_at > cutoff)
        .collect()
}

/// 保存済みの記事より新しいもの、または未保存のものを選ぶ
///
/// 同じ external_id が複数ある場合は last_modified が最大のもの（同値なら先に出現したもの）に
/// まとめ、初出の位置に置く。
pub fn select_for_sync(
    articles: Vec<Article>,
    existing: &HashMap<i64, DateTime<Utc>>,
) -> Vec<Article> {
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut unique: Vec<Article> = Vec::with_capacity(articles.len());

    for article in articles {
        match positions.get(&article.external_id) {
            Some(&index) => {
                if article.last_modified > unique[index].last_modified {
                    unique[index] = article;
                }
            }
            None => {
                positions.insert(article.external_id, unique.len());
                unique.push(article);
            }
        }
    }

    unique
        .into_iter()
        .filter(|article| match existing.get(&article.external_id) {
            Some(stored) => article.last_modified > *stored,
            None => true,
        })
        .collect()
}
