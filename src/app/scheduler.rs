use crate::domain::sync::SyncStats;
use crate::types::{SyncConfig, SyncError, SyncResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// スケジューラから呼び出される同期処理
#[async_trait]
pub trait Syncer: Send + Sync {
    fn source_id(&self) -> &str;

    async fn sync(&self) -> SyncResult<SyncStats>;
}

/// 1回の同期サイクルの結果
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(SyncStats),
    Failed(SyncError),
    TimedOut,
}

/// 一定間隔で同期サイクルを実行するスケジューラ
///
/// サイクルは重ならない。間隔を超えたサイクルの後は次の実行が遅れる。
pub struct Scheduler<S: Syncer> {
    syncer: S,
    interval: Duration,
    timeout: Duration,
}

impl<S: Syncer> Scheduler<S> {
    pub fn new(syncer: S, interval: Duration, timeout: Duration) -> Self {
        Self {
            syncer,
            interval,
            timeout,
        }
    }

    pub fn from_config(syncer: S, config: &SyncConfig) -> Self {
        Self::new(syncer, config.interval(), config.timeout())
    }

    /// 同期を1回、タイムアウト付きで実行する
    ///
    /// タイムアウト時は実行中のサイクルが破棄され、未コミットの書き込みはロールバックされる。
    pub async fn run_once(&self) -> CycleOutcome {
        match tokio::time::timeout(self.timeout, self.syncer.sync()).await {
            Ok(Ok(stats)) => CycleOutcome::Completed(stats),
            Ok(Err(e)) => {
                if let Some(stats) = e.stats() {
                    info!("{}", stats);
                }
                error!(source = self.syncer.source_id(), error = %e, "同期に失敗しました");
                CycleOutcome::Failed(e)
            }
            Err(_) => {
                error!(
                    source = self.syncer.source_id(),
                    timeout_secs = self.timeout.as_secs(),
                    "同期がタイムアウトしました"
                );
                CycleOutcome::TimedOut
            }
        }
    }

    /// `shutdown` がキャンセルされるまで同期を繰り返す。最初のサイクルは即時に実行する
    pub async fn start(&self, shutdown: CancellationToken) {
        info!(
            source = self.syncer.source_id(),
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "スケジューラを開始します"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!("シャットダウン要求により実行中の同期を中断しました");
                    break;
                }
                _ = self.run_once() => {}
            }
        }

        info!("スケジューラを停止しました");
    }
}
