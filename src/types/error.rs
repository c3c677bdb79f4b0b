use crate::domain::sync::SyncStats;
use crate::types::InfraError;
use thiserror::Error;

/// 同期サイクル全体のエラー型
///
/// 記事単位の保存・配信エラーはここには現れず、`SyncStats::errors` に計上される。
#[derive(Error, Debug)]
pub enum SyncError {
    /// ソースからの取得に失敗（サイクル中断、状態は一切変更されない）
    #[error("記事の取得に失敗: {0}")]
    Fetch(#[source] InfraError),

    /// 既存記事の一括照会に失敗（永続化の前に中断）
    #[error("同期対象の抽出に失敗: {0}")]
    Filter(#[source] InfraError),

    /// 同期状態の更新に失敗。集計済みの統計は有効なまま返される
    #[error("同期状態の更新に失敗: {source}")]
    ProgressUpdate {
        stats: SyncStats,
        #[source]
        source: InfraError,
    },
}

impl SyncError {
    /// 同期状態更新エラーを作成
    pub fn progress_update(stats: SyncStats, source: InfraError) -> Self {
        Self::ProgressUpdate { stats, source }
    }

    /// エラーと共に返された統計（部分的成功の場合のみ）
    pub fn stats(&self) -> Option<&SyncStats> {
        match self {
            Self::ProgressUpdate { stats, .. } => Some(stats),
            Self::Fetch(_) | Self::Filter(_) => None,
        }
    }
}

/// 同期エラーのResult型エイリアス
pub type SyncResult<T> = std::result::Result<T, SyncError>;
