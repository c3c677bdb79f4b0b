use crate::domain::article::{Article, Tag};
use crate::domain::ports::{ArticleStore, SyncStateStore, TagStore, UnitOfWork};
use crate::domain::sync::SyncState;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// インメモリの作業単位ハンドル
///
/// 書き込みはコミットまで保留され、ロールバックまたは破棄で捨てられる。
#[derive(Debug, Default)]
pub struct MemoryTx {
    pending: Vec<PendingWrite>,
}

#[derive(Debug)]
enum PendingWrite {
    Article { id: i64, article: Article },
    Tags(Vec<Tag>),
    Links { article_id: i64, tag_ids: Vec<i64> },
}

#[derive(Debug, Clone)]
struct StoredArticle {
    id: i64,
    article: Article,
}

#[derive(Debug, Default)]
struct MemoryState {
    articles: HashMap<(String, i64), StoredArticle>,
    next_id: i64,
    tags: BTreeMap<i64, String>,
    links: HashMap<i64, Vec<i64>>,
    sync_states: HashMap<String, SyncState>,

    upsert_calls: Vec<i64>,
    existence_queries: usize,
    state_updates: usize,
    commits: usize,
    rollbacks: usize,

    fail_upsert_ids: HashSet<i64>,
    fail_existence_queries: bool,
    fail_existence_query_at: HashSet<usize>,
    seeds_before_existence_query: HashMap<usize, Vec<Article>>,
    fail_state_updates: bool,
    fail_tag_links: bool,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// 作業単位を経由せずに記事を保存する
    fn seed(&mut self, article: Article) -> i64 {
        let key = (article.source_id.clone(), article.external_id);
        let existing = self.articles.get(&key).map(|stored| stored.id);
        let id = match existing {
            Some(id) => id,
            None => self.allocate_id(),
        };
        for tag in &article.tags {
            self.tags.insert(tag.id, tag.label.clone());
        }
        self.links.insert(id, article.tag_ids());
        self.articles.insert(key, StoredArticle { id, article });
        id
    }

    /// 保留中の書き込みを反映する。記事は last_modified が厳密に新しい場合のみ上書き
    fn apply(&mut self, write: PendingWrite) {
        match write {
            PendingWrite::Article { id, article } => {
                let key = (article.source_id.clone(), article.external_id);
                match self.articles.get_mut(&key) {
                    Some(stored) if stored.article.last_modified >= article.last_modified => {}
                    Some(stored) => stored.article = article,
                    None => {
                        self.articles.insert(key, StoredArticle { id, article });
                    }
                }
            }
            PendingWrite::Tags(tags) => {
                for tag in tags {
                    self.tags.insert(tag.id, tag.label);
                }
            }
            PendingWrite::Links { article_id, tag_ids } => {
                let mut ids: Vec<i64> = Vec::new();
                for id in tag_ids {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                self.links.insert(article_id, ids);
            }
        }
    }
}

/// テストと開発用のインメモリストア
///
/// 記事・タグ・同期状態の各ストアと作業単位を1つの共有状態で実装します。
/// 呼び出し記録と失敗注入のためのヘルパーを持ちます。
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 作業単位を経由せずに記事を直接保存する（テストの事前データ用）
    pub fn insert_article(&self, article: Article) -> i64 {
        self.lock().seed(article)
    }

    /// `n` 回目（1始まり）の既存記事照会の直前に記事を保存する
    pub fn insert_before_existence_query(&self, n: usize, article: Article) {
        self.lock()
            .seeds_before_existence_query
            .entry(n)
            .or_default()
            .push(article);
    }

    pub fn article(&self, source_id: &str, external_id: i64) -> Option<Article> {
        self.lock()
            .articles
            .get(&(source_id.to_string(), external_id))
            .map(|stored| stored.article.clone())
    }

    pub fn article_id(&self, source_id: &str, external_id: i64) -> Option<i64> {
        self.lock()
            .articles
            .get(&(source_id.to_string(), external_id))
            .map(|stored| stored.id)
    }

    pub fn article_count(&self) -> usize {
        self.lock().articles.len()
    }

    pub fn tag_label(&self, id: i64) -> Option<String> {
        self.lock().tags.get(&id).cloned()
    }

    pub fn sync_state(&self, source_id: &str) -> Option<SyncState> {
        self.lock().sync_states.get(source_id).cloned()
    }

    /// upsert が呼ばれた記事の external_id（呼び出し順）
    pub fn upsert_calls(&self) -> Vec<i64> {
        self.lock().upsert_calls.clone()
    }

    pub fn existence_queries(&self) -> usize {
        self.lock().existence_queries
    }

    pub fn state_updates(&self) -> usize {
        self.lock().state_updates
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    /// 指定 external_id の upsert を失敗させる
    pub fn fail_upsert_for(&self, external_id: i64) {
        self.lock().fail_upsert_ids.insert(external_id);
    }

    pub fn fail_existence_queries(&self, fail: bool) {
        self.lock().fail_existence_queries = fail;
    }

    /// `n` 回目（1始まり）の既存記事照会のみを失敗させる
    pub fn fail_existence_query_at(&self, n: usize) {
        self.lock().fail_existence_query_at.insert(n);
    }

    pub fn fail_state_updates(&self, fail: bool) {
        self.lock().fail_state_updates = fail;
    }

    pub fn fail_tag_links(&self, fail: bool) {
        self.lock().fail_tag_links = fail;
    }
}

#[async_trait]
impl ArticleStore<MemoryTx> for MemoryStore {
    async fn upsert(&self, tx: &mut MemoryTx, article: &Article) -> InfraResult<i64> {
        let mut state = self.lock();
        state.upsert_calls.push(article.external_id);
        if state.fail_upsert_ids.contains(&article.external_id) {
            return Err(InfraError::backend(format!(
                "記事のUPSERTに失敗: external_id={}",
                article.external_id
            )));
        }

        let key = (article.source_id.clone(), article.external_id);
        let pending_id = tx.pending.iter().find_map(|write| match write {
            PendingWrite::Article { id, article: a }
                if a.source_id == article.source_id && a.external_id == article.external_id =>
            {
                Some(*id)
            }
            _ => None,
        });
        let existing = state.articles.get(&key).map(|stored| stored.id);
        let id = match existing.or(pending_id) {
            Some(id) => id,
            None => state.allocate_id(),
        };

        tx.pending.push(PendingWrite::Article {
            id,
            article: article.clone(),
        });
        Ok(id)
    }

    async fn get_existing_last_modified(
        &self,
        source_id: &str,
        external_ids: &[i64],
    ) -> InfraResult<HashMap<i64, DateTime<Utc>>> {
        let mut state = self.lock();
        state.existence_queries += 1;
        let n = state.existence_queries;
        if state.fail_existence_queries || state.fail_existence_query_at.contains(&n) {
            return Err(InfraError::backend("既存記事の照会に失敗"));
        }
        if let Some(seeds) = state.seeds_before_existence_query.remove(&n) {
            for article in seeds {
                state.seed(article);
            }
        }

        Ok(external_ids
            .iter()
            .filter_map(|id| {
                state
                    .articles
                    .get(&(source_id.to_string(), *id))
                    .map(|stored| (*id, stored.article.last_modified))
            })
            .collect())
    }
}

#[async_trait]
impl TagStore<MemoryTx> for MemoryStore {
    async fn upsert_batch(&self, tx: &mut MemoryTx, tags: &[Tag]) -> InfraResult<()> {
        if !tags.is_empty() {
            tx.pending.push(PendingWrite::Tags(tags.to_vec()));
        }
        Ok(())
    }

    async fn link_to_article(
        &self,
        tx: &mut MemoryTx,
        article_id: i64,
        tag_ids: &[i64],
    ) -> InfraResult<()> {
        if self.lock().fail_tag_links {
            return Err(InfraError::backend(format!(
                "記事タグ関連の保存に失敗: article_id={}",
                article_id
            )));
        }
        tx.pending.push(PendingWrite::Links {
            article_id,
            tag_ids: tag_ids.to_vec(),
        });
        Ok(())
    }

    async fn tags_for_article(&self, article_id: i64) -> InfraResult<Vec<Tag>> {
        let state = self.lock();
        let mut tags: Vec<Tag> = state
            .links
            .get(&article_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.tags.get(id).map(|label| Tag::new(*id, label.clone())))
            .collect();
        tags.sort_by_key(|tag| tag.id);
        Ok(tags)
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn get(&self, source_id: &str) -> InfraResult<SyncState> {
        Ok(self
            .lock()
            .sync_states
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| SyncState::new(source_id)))
    }

    async fn update(&self, sync_state: &SyncState) -> InfraResult<()> {
        let mut state = self.lock();
        state.state_updates += 1;
        if state.fail_state_updates {
            return Err(InfraError::backend("同期状態の更新に失敗"));
        }
        state
            .sync_states
            .insert(sync_state.source_id.clone(), sync_state.clone());
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> InfraResult<MemoryTx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> InfraResult<()> {
        let mut state = self.lock();
        for write in tx.pending {
            state.apply(write);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> InfraResult<()> {
        drop(tx);
        self.lock().rollbacks += 1;
        Ok(())
    }
}
