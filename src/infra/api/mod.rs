pub mod http;

// 便利のため、よく使用される型を再エクスポート
pub use http::{HttpClient, MockHttpClient, ReqwestHttpClient};
