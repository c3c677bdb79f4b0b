//! ECB Cricket コンテンツAPIのソース実装
//!
//! `GET {base_url}?pageSize={n}&page={p}` をページ単位で取得し、
//! 失敗したページは指数バックオフで再試行します。

use crate::domain::article::{Article, Tag};
use crate::domain::ports::ContentSource;
use crate::infra::api::http::HttpClient;
use crate::infra::parser::{parse_date, parse_epoch_millis};
use crate::types::config::ApiConfig;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const SOURCE_ID: &str = "ecb";
pub const SOURCE_NAME: &str = "ECB Cricket";

/// ECB APIのレスポンス構造
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub content: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    pub page: u32,
    pub num_pages: u32,
    pub page_size: u32,
    pub num_entries: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub canonical_url: String,
    pub body: Option<String>,
    pub tags: Option<Vec<ApiTag>>,
    pub lead_media: Option<LeadMedia>,
    pub summary: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub duration: i32,
    /// エポックからのミリ秒
    #[serde(default)]
    pub last_modified: i64,
}

#[derive(Debug, Deserialize)]
pub struct ApiTag {
    pub id: i64,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadMedia {
    pub image_url: Option<String>,
}

/// ECBソースの設定
#[derive(Debug, Clone)]
pub struct EcbConfig {
    pub base_url: String,
    pub page_size: u32,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&ApiConfig> for EcbConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            base_url: api.base_url.clone(),
            page_size: api.page_size,
            max_attempts: api.retry.max_attempts,
            initial_backoff: api.retry.initial_backoff(),
            max_backoff: api.retry.max_backoff(),
        }
    }
}

pub struct EcbSource<H: HttpClient> {
    client: H,
    config: EcbConfig,
}

impl<H: HttpClient> EcbSource<H> {
    pub fn new(config: EcbConfig, client: H) -> Self {
        Self { client, config }
    }

    fn page_url(&self, page: u32) -> String {
        let separator = if self.config.base_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}pageSize={}&page={}",
            self.config.base_url, separator, self.config.page_size, page
        )
    }

    /// 試行回数に応じたバックオフ時間: initial * 2^(attempt-1)、上限はmax_backoff
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .initial_backoff
            .saturating_mul(factor)
            .min(self.config.max_backoff)
    }

    async fn fetch_page(&self, page: u32) -> InfraResult<ApiResponse> {
        let url = self.page_url(page);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.request_page(&url).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt >= max_attempts => {
                    return Err(InfraError::retry_exhausted(max_attempts, e));
                }
                Err(e) => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        page,
                        attempt,
                        backoff_ms = backoff_millis(backoff),
                        error = %e,
                        "リクエストに失敗したため再試行します"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn request_page(&self, url: &str) -> InfraResult<ApiResponse> {
        let text = self.client.get_text(url).await?;
        serde_json::from_str(&text)
            .map_err(|e| InfraError::serialization(format!("ECBレスポンスの解析: {}", url), e))
    }
}

#[async_trait]
impl<H: HttpClient> ContentSource for EcbSource<H> {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_articles(&self, max_pages: u32) -> InfraResult<Vec<Article>> {
        let mut contents = Vec::new();

        for page in 0..max_pages {
            let response = self.fetch_page(page).await?;
            let received = response.content.len();
            contents.extend(response.content);

            debug!(page, articles = received, total = contents.len(), "ページを取得しました");

            if page + 1 >= response.page_info.num_pages {
                break;
            }
        }

        Ok(contents.into_iter().filter_map(to_article).collect())
    }
}

/// APIのコンテンツを記事に変換する。日付が解析できないものは除外する
fn to_article(content: Content) -> Option<Article> {
    let Some(published_at) = parse_date(&content.date) else {
        warn!(external_id = content.id, date = %content.date, "公開日時の解析に失敗したため記事をスキップします");
        return None;
    };
    let Some(last_modified) = parse_epoch_millis(content.last_modified) else {
        warn!(
            external_id = content.id,
            last_modified = content.last_modified,
            "更新日時の解析に失敗したため記事をスキップします"
        );
        return None;
    };

    let image_url = content
        .lead_media
        .and_then(|media| media.image_url)
        .filter(|url| !url.is_empty());
    let tags = content
        .tags
        .unwrap_or_default()
        .into_iter()
        .map(|tag| Tag::new(tag.id, tag.label))
        .collect();

    Some(Article {
        source_id: SOURCE_ID.to_string(),
        external_id: content.id,
        title: content.title,
        description: content.description,
        summary: content.summary,
        body: content.body,
        author: content.author,
        canonical_url: content.canonical_url,
        image_url,
        published_at,
        last_modified,
        duration: content.duration,
        tags,
    })
}

/// ログ出力用のミリ秒。u64に収まらない場合は u64::MAX
fn backoff_millis(backoff: Duration) -> u64 {
    u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::api::http::MockHttpClient;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn test_config() -> EcbConfig {
        EcbConfig {
            base_url: "https://api.example.com/content/ecb/text/EN/".to_string(),
            page_size: 2,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }

    // 指定したIDの記事を含むページのJSONを生成するヘルパー関数
    fn page_json(page: u32, num_pages: u32, ids: &[i64]) -> String {
        let content: Vec<_> = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "title": format!("記事{}", id),
                    "date": "2025-08-10T12:30:00Z",
                    "canonicalUrl": format!("https://example.com/{}", id),
                    "lastModified": 1_754_829_000_000i64,
                    "tags": [{"id": 1, "label": "cricket"}]
                })
            })
            .collect();
        json!({
            "pageInfo": {"page": page, "numPages": num_pages, "pageSize": 2, "numEntries": 10},
            "content": content
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_pagination_stops_at_last_page() {
        let client = MockHttpClient::from_sequence(
            vec![Ok(page_json(0, 2, &[1, 2])), Ok(page_json(1, 2, &[3, 4]))],
            Err("これ以上のページは要求されないはず".to_string()),
        );
        let source = EcbSource::new(test_config(), client);

        let articles = source.fetch_articles(5).await.unwrap();

        assert_eq!(articles.len(), 4, "2ページ分の記事が取得されるべき");
        assert_eq!(source.client.requested_urls().len(), 2);
        let ids: Vec<i64> = articles.iter().map(|a| a.external_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4], "ページ順が保たれるべき");
    }

    #[tokio::test]
    async fn test_pagination_respects_max_pages() {
        let client = MockHttpClient::new_success(&page_json(0, 10, &[1, 2]));
        let source = EcbSource::new(test_config(), client);

        let articles = source.fetch_articles(2).await.unwrap();

        assert_eq!(source.client.requested_urls().len(), 2, "最大ページ数で止まるべき");
        assert_eq!(articles.len(), 4);
    }

    #[tokio::test]
    async fn test_page_url_format() {
        let client = MockHttpClient::new_success(&page_json(0, 1, &[]));
        let source = EcbSource::new(test_config(), client);

        source.fetch_articles(1).await.unwrap();

        assert_eq!(
            source.client.requested_urls(),
            vec!["https://api.example.com/content/ecb/text/EN/?pageSize=2&page=0"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let client = MockHttpClient::from_sequence(
            vec![
                Err("タイムアウト".to_string()),
                Ok("{ 不正なJSON".to_string()),
                Ok(page_json(0, 1, &[7])),
            ],
            Err("想定外のリクエスト".to_string()),
        );
        let source = EcbSource::new(test_config(), client);

        let articles = source.fetch_articles(1).await.unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].external_id, 7);
        assert_eq!(source.client.requested_urls().len(), 3, "3回目で成功するはず");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let client = MockHttpClient::new_error("接続拒否");
        let source = EcbSource::new(test_config(), client);

        let result = source.fetch_articles(3).await;

        assert!(
            matches!(result, Err(InfraError::RetryExhausted { attempts: 3, .. })),
            "リトライ上限エラーになるべき"
        );
        assert_eq!(source.client.requested_urls().len(), 3);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let source = EcbSource::new(test_config(), MockHttpClient::new_success("{}"));

        assert_eq!(source.backoff_for(1), Duration::from_secs(1));
        assert_eq!(source.backoff_for(2), Duration::from_secs(2));
        assert_eq!(source.backoff_for(3), Duration::from_secs(4));
        assert_eq!(source.backoff_for(4), Duration::from_secs(5));
        assert_eq!(source.backoff_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_millis_saturates() {
        let mut config = test_config();
        config.max_backoff = Duration::MAX;
        config.initial_backoff = Duration::MAX;
        let source = EcbSource::new(config, MockHttpClient::new_success("{}"));

        assert_eq!(backoff_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(backoff_millis(source.backoff_for(3)), u64::MAX);
    }

    #[test]
    fn test_transform_rules() {
        let body = json!({
            "pageInfo": {"page": 0, "numPages": 1},
            "content": [
                {
                    "id": 10,
                    "title": "画像付き",
                    "date": "2025-08-10T12:30:00Z",
                    "canonicalUrl": "https://example.com/10",
                    "lastModified": 1_754_829_000_000i64,
                    "leadMedia": {"imageUrl": "https://example.com/10.jpg"},
                    "summary": "要約",
                    "duration": 120,
                    "tags": [{"id": 1, "label": "a"}, {"id": 2, "label": "b"}]
                },
                {
                    "id": 11,
                    "title": "画像URLが空",
                    "date": "2025-08-10T12:30:00Z",
                    "canonicalUrl": "https://example.com/11",
                    "lastModified": 1_754_829_000_000i64,
                    "leadMedia": {"imageUrl": ""},
                    "tags": null
                },
                {
                    "id": 12,
                    "title": "日付が不正",
                    "date": "not a date",
                    "canonicalUrl": "https://example.com/12",
                    "lastModified": 1_754_829_000_000i64
                }
            ]
        });
        let response: ApiResponse = serde_json::from_value(body).unwrap();
        let articles: Vec<Article> = response.content.into_iter().filter_map(to_article).collect();

        assert_eq!(articles.len(), 2, "日付が不正な記事は除外されるべき");

        let first = &articles[0];
        assert_eq!(first.source_id, SOURCE_ID);
        assert_eq!(first.image_url.as_deref(), Some("https://example.com/10.jpg"));
        assert_eq!(first.summary.as_deref(), Some("要約"));
        assert_eq!(first.duration, 120);
        assert_eq!(first.tag_ids(), vec![1, 2]);
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2025, 8, 10, 12, 30, 0).unwrap()
        );
        assert_eq!(first.last_modified.timestamp_millis(), 1_754_829_000_000);

        let second = &articles[1];
        assert!(second.image_url.is_none(), "空の画像URLはNoneになるべき");
        assert!(second.tags.is_empty());
        assert_eq!(second.duration, 0);
    }
}
