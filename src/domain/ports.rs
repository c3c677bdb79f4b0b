//! 同期処理が依存する外部協調者の抽象化トレイト
//!
//! 実際のPostgreSQL・RabbitMQ・HTTP実装とインメモリ/モック実装を
//! 同期サービスを変更せずに差し替えられるようにするためのインターフェースです。
//!
//! 書き込み系の操作はトランザクションハンドル `Tx` を明示的に引数で受け取ります。
//! `Tx` は [`UnitOfWork`] が作成し、作業単位の終了時にコミットまたはロールバックします。

use crate::domain::article::{Article, Tag};
use crate::domain::sync::SyncState;
use crate::types::InfraResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use tracing::warn;

/// 正規化済み記事を一定量ずつ提供するコンテンツソース
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// ソースの安定した識別子（例: "ecb"）
    fn id(&self) -> &str;

    /// 表示用の名称
    fn name(&self) -> &str;

    /// 最大 `max_pages` ページ分の記事を取得する
    async fn fetch_articles(&self, max_pages: u32) -> InfraResult<Vec<Article>>;
}

/// 記事の永続化ストア
#[async_trait]
pub trait ArticleStore<Tx: Send>: Send + Sync {
    /// 記事を条件付きでUPSERTし、記事の内部IDを返す
    ///
    /// 既存記事は `last_modified` が厳密に新しい場合のみ更新される。
    /// 更新が抑止された場合も既存の内部IDを返す。
    async fn upsert(&self, tx: &mut Tx, article: &Article) -> InfraResult<i64>;

    /// 指定ソース内で既に保存されている記事の `last_modified` を取得する
    ///
    /// 戻り値のマップには存在する external_id のみが含まれる。
    async fn get_existing_last_modified(
        &self,
        source_id: &str,
        external_ids: &[i64],
    ) -> InfraResult<HashMap<i64, DateTime<Utc>>>;
}

/// タグ語彙と記事-タグ関連の永続化ストア
#[async_trait]
pub trait TagStore<Tx: Send>: Send + Sync {
    /// タグをまとめてUPSERTする（ラベルは最後の書き込みが優先）
    async fn upsert_batch(&self, tx: &mut Tx, tags: &[Tag]) -> InfraResult<()>;

    /// 記事のタグ関連を `tag_ids` で完全に置き換える
    async fn link_to_article(&self, tx: &mut Tx, article_id: i64, tag_ids: &[i64])
        -> InfraResult<()>;

    /// 記事に関連付けられたタグをID順で取得する
    async fn tags_for_article(&self, article_id: i64) -> InfraResult<Vec<Tag>>;
}

/// ソースごとの同期状態ストア
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// 同期状態を取得する。存在しない場合はゼロ値の状態を返す
    async fn get(&self, source_id: &str) -> InfraResult<SyncState>;

    async fn update(&self, state: &SyncState) -> InfraResult<()>;
}

/// 書き込みの作業単位（トランザクション）
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// 作業単位内の書き込みに渡されるハンドル
    type Tx: Send + 'static;

    async fn begin(&self) -> InfraResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> InfraResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> InfraResult<()>;

    /// `work` を1つの作業単位として実行する
    ///
    /// `work` はハンドルを受け取り、処理結果と共に返す。
    /// 結果が `Ok` ならコミット、`Err` ならロールバックする。
    async fn run<T, F, Fut>(&self, work: F) -> InfraResult<T>
    where
        T: Send,
        F: FnOnce(Self::Tx) -> Fut + Send,
        Fut: Future<Output = (Self::Tx, InfraResult<T>)> + Send,
    {
        let tx = self.begin().await?;
        let (tx, result) = work(tx).await;

        match result {
            Ok(value) => {
                self.commit(tx).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback(tx).await {
                    warn!(error = %rollback_err, "ロールバックに失敗しました");
                }
                Err(e)
            }
        }
    }
}

/// 記事の変更通知の配信先（ベストエフォート）
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(&self, article: &Article, is_new: bool) -> InfraResult<()>;

    async fn close(&self) -> InfraResult<()>;
}
