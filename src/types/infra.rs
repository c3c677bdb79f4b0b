use crate::types::ConfigError;
use thiserror::Error;

/// インフラストラクチャ層のエラー型
/// データベース、HTTP、メッセージブローカー、シリアライゼーションなど外部協調者のエラーを定義
#[derive(Error, Debug)]
pub enum InfraError {
    /// ファイルシステムエラー
    #[error("ファイルシステムエラー: {path} - {source}")]
    FileSystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// データベース接続エラー
    #[error("データベース接続エラー: {source}")]
    DatabaseConnection {
        #[source]
        source: sqlx::Error,
    },

    /// データベースクエリエラー
    #[error("データベースクエリエラー: {operation} - {source}")]
    DatabaseQuery {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// HTTP通信エラー
    #[error("HTTP通信エラー: {url} - {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// リトライ上限に達した
    #[error("{attempts}回試行しましたが失敗しました: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<InfraError>,
    },

    /// シリアライゼーションエラー
    #[error("シリアライゼーションエラー: {context} - {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// メッセージブローカーエラー
    #[error("メッセージブローカーエラー: {operation} - {source}")]
    Broker {
        operation: String,
        #[source]
        source: lapin::Error,
    },

    /// 具体的な原因型を持たないバックエンドエラー（インメモリ実装・モックなど）
    #[error("バックエンドエラー: {message}")]
    Backend { message: String },

    /// 設定エラー
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl InfraError {
    /// ファイルシステムエラーを作成
    pub fn file_system<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// データベース接続エラーを作成
    pub fn database_connection(source: sqlx::Error) -> Self {
        Self::DatabaseConnection { source }
    }

    /// データベースクエリエラーを作成
    pub fn database_query<O: Into<String>>(operation: O, source: sqlx::Error) -> Self {
        Self::DatabaseQuery {
            operation: operation.into(),
            source,
        }
    }

    /// HTTP通信エラーを作成
    pub fn http<U: Into<String>>(url: U, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    /// リトライ上限エラーを作成
    pub fn retry_exhausted(attempts: u32, source: InfraError) -> Self {
        Self::RetryExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// シリアライゼーションエラーを作成
    pub fn serialization<C: Into<String>>(context: C, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// メッセージブローカーエラーを作成
    pub fn broker<O: Into<String>>(operation: O, source: lapin::Error) -> Self {
        Self::Broker {
            operation: operation.into(),
            source,
        }
    }

    /// バックエンドエラーを作成
    pub fn backend<M: Into<String>>(message: M) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// インフラエラーのResult型エイリアス
pub type InfraResult<T> = std::result::Result<T, InfraError>;
