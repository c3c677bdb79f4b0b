use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const USER_AGENT: &str = concat!("news-syncer/", env!("CARGO_PKG_VERSION"));

/// HTTPクライアントの抽象化トレイト
///
/// このトレイトは、実際のHTTP通信とモック実装の両方を
/// 統一的に扱えるようにするためのインターフェースです。
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// 指定されたURLからJSONレスポンスの本文を取得する
    ///
    /// 2xx以外のステータスはエラーとして扱う。
    async fn get_text(&self, url: &str) -> InfraResult<String>;
}

/// `reqwest` を使用した本番用のHTTPクライアント実装
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// リクエスト単位のタイムアウトを指定してHTTPクライアントを作成
    pub fn new(timeout: Duration) -> InfraResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| InfraError::http("<client>", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_text(&self, url: &str) -> InfraResult<String> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| InfraError::http(url, e))?;

        response
            .error_for_status()
            .map_err(|e| InfraError::http(url, e))?
            .text()
            .await
            .map_err(|e| InfraError::http(url, e))
    }
}

/// テスト用のモックHTTPクライアント
///
/// この実装はテスト時にDIされ、実際のHTTPリクエストを行わずに
/// 定義済みのレスポンスやエラーを順番に返します。
/// 順番待ちのレスポンスが尽きた後は `fallback` を返し続けます。
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    requested_urls: Mutex<Vec<String>>,
}

impl MockHttpClient {
    /// 常に成功レスポンスを返すモッククライアントを作成
    pub fn new_success(mock_response: &str) -> Self {
        Self::from_sequence(Vec::new(), Ok(mock_response.to_string()))
    }

    /// 常にエラーを返すモッククライアントを作成
    pub fn new_error(error_message: &str) -> Self {
        Self::from_sequence(Vec::new(), Err(error_message.to_string()))
    }

    /// 指定した順番でレスポンスを返すモッククライアントを作成
    pub fn from_sequence(
        responses: Vec<Result<String, String>>,
        fallback: Result<String, String>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
            requested_urls: Mutex::new(Vec::new()),
        }
    }

    /// これまでにリクエストされたURLの一覧
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_text(&self, url: &str) -> InfraResult<String> {
        self.requested_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        next.map_err(|message| InfraError::backend(format!("モックHTTPエラー: {}", message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_mock_http_client_success() {
        let mock_client = MockHttpClient::new_success(r#"{"content":[]}"#);

        let result = mock_client.get_text("https://example.com/content").await;

        assert!(result.is_ok());
        assert!(result.unwrap().contains("content"));
        assert_eq!(mock_client.requested_urls(), vec!["https://example.com/content"]);
    }

    #[tokio::test]
    async fn test_mock_http_client_error() {
        let mock_client = MockHttpClient::new_error("接続失敗");

        let result = mock_client.get_text("https://example.com/content").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("接続失敗"));
    }

    #[tokio::test]
    async fn test_mock_http_client_sequence_then_fallback() {
        let mock_client = MockHttpClient::from_sequence(
            vec![Err("一時的な障害".to_string()), Ok("1回目".to_string())],
            Ok("以降".to_string()),
        );

        assert!(mock_client.get_text("u").await.is_err());
        assert_eq!(mock_client.get_text("u").await.unwrap(), "1回目");
        assert_eq!(mock_client.get_text("u").await.unwrap(), "以降");
        assert_eq!(mock_client.requested_urls().len(), 3);
    }

    #[tokio::test]
    async fn test_reqwest_client_against_mock_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/content")
                    .header("accept", "application/json");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"ok":true}"#);
            })
            .await;

        let client = ReqwestHttpClient::new(Duration::from_secs(5)).unwrap();
        let body = client.get_text(&server.url("/content")).await.unwrap();

        assert_eq!(body, r#"{"ok":true}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reqwest_client_rejects_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/content");
                then.status(503).body("unavailable");
            })
            .await;

        let client = ReqwestHttpClient::new(Duration::from_secs(5)).unwrap();
        let result = client.get_text(&server.url("/content")).await;

        assert!(
            matches!(result, Err(InfraError::Http { .. })),
            "503はHTTPエラーになるべき"
        );
    }
}
