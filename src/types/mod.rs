//! 型定義モジュール
//!
//! アプリケーション全体で使用される共通的な型定義を管理します。
//! - エラー型: 設定・インフラ・同期サイクルの各層
//! - 設定型: config.yamlの構造

pub mod config;
pub mod error;
pub mod infra;

// 便利な再エクスポート
pub use config::{AppConfig, ConfigError, ConfigResult, LogFormat, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use infra::{InfraError, InfraResult};
