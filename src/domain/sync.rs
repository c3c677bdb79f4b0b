use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::time::Duration;

/// ソースごとの同期進捗（1ソース1行）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct SyncState {
    pub source_id: String,
    /// 一度も同期していない場合はNone
    pub last_synced_at: Option<DateTime<Utc>>,
    /// 最後に保存した記事のexternal_id（参考情報）
    pub last_article_id: i64,
    /// これまでに新規・更新された記事の累計
    pub total_synced: i64,
}

impl SyncState {
    /// 未同期ソースのゼロ値状態を作成
    pub fn new<S: Into<String>>(source_id: S) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }
}

/// 1回の同期サイクルの統計（永続化されない）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub source_id: String,
    /// 日付フィルタ通過後の件数
    pub fetched: usize,
    pub new: usize,
    pub updated: usize,
    /// 変更なしとして除外された件数
    pub skipped: usize,
    pub errors: usize,
    pub published: usize,
    pub duration: Duration,
}

impl SyncStats {
    pub fn new<S: Into<String>>(source_id: S) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }

    /// 新規と更新の合計（同期状態の累計に加算される値）
    pub fn synced(&self) -> usize {
        self.new + self.updated
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}同期完了: 取得{}件、新規{}件、更新{}件、スキップ{}件、エラー{}件、配信{}件（{:.2}秒）",
            self.source_id,
            self.fetched,
            self.new,
            self.updated,
            self.skipped,
            self.errors,
            self.published,
            self.duration.as_secs_f64()
        )
    }
}
