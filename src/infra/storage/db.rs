use crate::domain::ports::UnitOfWork;
use crate::types::config::DatabaseConfig;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

/// PostgreSQLの作業単位で使うトランザクションハンドル
pub type PgTx = Transaction<'static, Postgres>;

/// データベース接続プールを作成
/// 接続先はDATABASE_URL環境変数、なければ設定値から決定します
pub async fn create_pool(config: &DatabaseConfig) -> InfraResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(&config.connection_url())
        .await
        .map_err(InfraError::database_connection)
}

/// データベースの初期化（マイグレーション実行）
pub async fn initialize_database(pool: &PgPool) -> InfraResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| InfraError::database_query("データベースマイグレーション実行", e.into()))
}

/// プールの作成とデータベース初期化を一括で行う便利関数
pub async fn setup_database(config: &DatabaseConfig) -> InfraResult<PgPool> {
    let pool = create_pool(config).await?;
    initialize_database(&pool).await?;
    info!(max_connections = config.max_connections, "データベースに接続しました");
    Ok(pool)
}

/// PostgreSQLトランザクションによる作業単位
///
/// ハンドルがコミットされずに破棄された場合、sqlxがロールバックを行う。
#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    type Tx = PgTx;

    async fn begin(&self) -> InfraResult<PgTx> {
        self.pool
            .begin()
            .await
            .map_err(|e| InfraError::database_query("トランザクションの開始", e))
    }

    async fn commit(&self, tx: PgTx) -> InfraResult<()> {
        tx.commit()
            .await
            .map_err(|e| InfraError::database_query("トランザクションのコミット", e))
    }

    async fn rollback(&self, tx: PgTx) -> InfraResult<()> {
        tx.rollback()
            .await
            .map_err(|e| InfraError::database_query("トランザクションのロールバック", e))
    }
}
