use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 記事エンティティ
///
/// 識別子は (source_id, external_id) の組で、ソース内でのみ一意。
/// 同一記事の競合は `last_modified` が厳密に新しい場合のみ上書きで解決される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// 取得元ソースの識別子（例: "ecb"）
    pub source_id: String,
    /// ソース側の記事ID
    pub external_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub canonical_url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// 動画などの再生時間（秒）
    #[serde(default)]
    pub duration: i32,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Article {
    /// 必須項目のみで記事を作成する（任意項目は未設定）
    pub fn new<S: Into<String>, T: Into<String>, U: Into<String>>(
        source_id: S,
        external_id: i64,
        title: T,
        canonical_url: U,
        published_at: DateTime<Utc>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            external_id,
            title: title.into(),
            description: None,
            summary: None,
            body: None,
            author: None,
            canonical_url: canonical_url.into(),
            image_url: None,
            published_at,
            last_modified,
            duration: 0,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags.iter().map(|tag| tag.id).collect()
    }
}

/// 全ソース共通のタグ語彙。ラベルは最後の書き込みが優先される
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Tag {
    pub fn new<L: Into<String>>(id: i64, label: L) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}
