use crate::domain::article::Article;
use crate::domain::ports::ContentSource;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// テスト用のモックコンテンツソース
///
/// 設定された記事一覧（またはエラー）を毎回返し、呼び出し回数と要求ページ数を記録します。
pub struct MockContentSource {
    id: String,
    articles: Mutex<Vec<Article>>,
    error_message: Option<String>,
    fetch_calls: AtomicUsize,
    requested_pages: Mutex<Vec<u32>>,
}

impl MockContentSource {
    /// 成功レスポンスを返すモックソースを作成
    pub fn new_success<S: Into<String>>(id: S, articles: Vec<Article>) -> Self {
        Self {
            id: id.into(),
            articles: Mutex::new(articles),
            error_message: None,
            fetch_calls: AtomicUsize::new(0),
            requested_pages: Mutex::new(Vec::new()),
        }
    }

    /// エラーを返すモックソースを作成
    pub fn new_error<S: Into<String>>(id: S, error_message: &str) -> Self {
        Self {
            error_message: Some(error_message.to_string()),
            ..Self::new_success(id, Vec::new())
        }
    }

    /// 次回以降に返す記事一覧を差し替える
    pub fn set_articles(&self, articles: Vec<Article>) {
        *self.articles.lock().unwrap_or_else(PoisonError::into_inner) = articles;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn fetch_articles(&self, max_pages: u32) -> InfraResult<Vec<Article>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(max_pages);

        match &self.error_message {
            Some(message) => Err(InfraError::backend(format!("モックソースエラー: {}", message))),
            None => Ok(self
                .articles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()),
        }
    }
}
