use anyhow::{Context, Result};
use clap::Parser;
use news_syncer::app::{CycleOutcome, Scheduler, SyncService};
use news_syncer::domain::ports::ChangePublisher;
use news_syncer::infra::api::ReqwestHttpClient;
use news_syncer::infra::broker::RabbitMqPublisher;
use news_syncer::infra::source::{EcbConfig, EcbSource};
use news_syncer::infra::storage::{
    setup_database, PgArticleStore, PgSyncStateStore, PgTagStore, PgUnitOfWork,
};
use news_syncer::types::{AppConfig, LogFormat};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// コンテンツAPIの記事をデータベースへ同期する
#[derive(Parser, Debug)]
#[command(name = "news-syncer", version, about)]
struct Cli {
    /// 設定ファイルのパス
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// 同期を1回だけ実行して終了する
    #[arg(long)]
    once: bool,
}

/// ログ出力を初期化する。RUST_LOGが設定されていれば log_level より優先
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (json, text) = match format {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Text => (None, Some(fmt::layer().compact())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// Ctrl-C または SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl-Cハンドラの登録に失敗しました");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERMハンドラの登録に失敗しました");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 環境変数を読み込み（.envファイルがあれば使用）
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("設定の読み込みに失敗: {}", cli.config))?;
    init_tracing(&config.log_level, config.log_format);

    let pool = setup_database(&config.database)
        .await
        .context("データベースの初期化に失敗")?;

    let publisher: Option<Arc<dyn ChangePublisher>> = if config.rabbitmq.is_enabled() {
        let publisher = RabbitMqPublisher::connect(&config.rabbitmq)
            .await
            .context("RabbitMQへの接続に失敗")?;
        Some(Arc::new(publisher))
    } else {
        info!("変更通知の配信は無効です");
        None
    };

    let http_client =
        ReqwestHttpClient::new(config.api.timeout()).context("HTTPクライアントの作成に失敗")?;
    let source = EcbSource::new(EcbConfig::from(&config.api), http_client);

    let mut service = SyncService::new(
        Arc::new(source),
        Arc::new(PgArticleStore::new(pool.clone())),
        Arc::new(PgTagStore::new(pool.clone())),
        Arc::new(PgSyncStateStore::new(pool.clone())),
        PgUnitOfWork::new(pool.clone()),
        config.sync.clone(),
    );
    if let Some(publisher) = &publisher {
        service = service.with_publisher(publisher.clone());
    }

    let scheduler = Scheduler::from_config(service, &config.sync);

    let result = if cli.once {
        match scheduler.run_once().await {
            CycleOutcome::Completed(stats) => {
                println!("{}", stats);
                Ok(())
            }
            CycleOutcome::Failed(e) => {
                if let Some(stats) = e.stats() {
                    println!("{}", stats);
                }
                Err(anyhow::Error::new(e).context("同期に失敗"))
            }
            CycleOutcome::TimedOut => Err(anyhow::anyhow!("同期がタイムアウトしました")),
        }
    } else {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("シャットダウンシグナルを受信しました");
            signal_token.cancel();
        });

        scheduler.start(shutdown).await;
        Ok(())
    };

    if let Some(publisher) = publisher {
        if let Err(e) = publisher.close().await {
            warn!(error = %e, "RabbitMQ接続のクローズに失敗しました");
        }
    }
    pool.close().await;
    info!("終了しました");

    result
}
