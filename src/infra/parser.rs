use chrono::{DateTime, TimeZone, Utc};

/// 文字列を日付型に変換するヘルパー関数
///
/// `dateparser`クレートを利用して、様々な形式の日付文字列を解析し、
/// `DateTime<Utc>`型に変換する。解析できない場合はNoneを返す。
///
/// # サポート形式の例
/// - "2025-01-15T10:00:00Z"
/// - "2025-01-15T10:00:00.000+01:00"
/// - "Sun, 10 Aug 2025 12:00:00 +0000"
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.trim().is_empty() {
        return None;
    }
    // `dateparser`はタイムゾーンを持つ`DateTime`を返すため、UTCに変換する
    dateparser::parse(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// エポックからのミリ秒を`DateTime<Utc>`に変換する
pub fn parse_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
