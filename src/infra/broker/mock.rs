use crate::domain::article::Article;
use crate::domain::ports::ChangePublisher;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// テスト用のモックパブリッシャー
///
/// 配信された記事を `(external_id, is_new)` として記録します。
#[derive(Default)]
pub struct MockPublisher {
    published: Mutex<Vec<(i64, bool)>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に配信に失敗するモックを作成（呼び出しは記録される）
    pub fn new_failing() -> Self {
        let publisher = Self::default();
        publisher.fail.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn published(&self) -> Vec<(i64, bool)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangePublisher for MockPublisher {
    async fn publish(&self, article: &Article, is_new: bool) -> InfraResult<()> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((article.external_id, is_new));

        if self.fail.load(Ordering::SeqCst) {
            return Err(InfraError::backend("モック配信エラー"));
        }
        Ok(())
    }

    async fn close(&self) -> InfraResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
