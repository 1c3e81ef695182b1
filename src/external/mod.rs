pub mod google_books;
pub mod open_library;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use google_books::{GoogleBooksClient, GoogleBooksConverter};
pub use open_library::{OpenLibraryClient, OpenLibraryConverter};

use crate::models::CoverRequest;

/// 外部API返回的图书记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub cover_url: Option<String>,
}

impl BookRecord {
    /// 转换为封面请求，没有封面URL的返回None
    pub fn to_cover_request(&self) -> Option<CoverRequest> {
        let url = self.cover_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(CoverRequest::new(url).with_title(self.title.clone()))
    }
}

/// 创建外部API共用的HTTP客户端
pub fn http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("bookcover-wallpaper/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

pub(crate) fn upgrade_to_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

/// 图书API客户端（Google Books + Open Library）
#[derive(Clone)]
pub struct BookApiClient {
    pub google: GoogleBooksClient,
    pub open_library: OpenLibraryClient,
}

impl BookApiClient {
    pub fn new(client: Client) -> Self {
        Self {
            google: GoogleBooksClient::new(client.clone()),
            open_library: OpenLibraryClient::new(client),
        }
    }

    pub fn from_parts(google: GoogleBooksClient, open_library: OpenLibraryClient) -> Self {
        Self {
            google,
            open_library,
        }
    }

    /// 按ISBN查询封面URL：先Google Books，再Open Library
    ///
    /// 两个接口都失败时返回None，错误只记录日志
    pub async fn cover_by_isbn(&self, isbn: &str) -> Option<String> {
        let isbn = isbn.trim();
        if isbn.is_empty() {
            return None;
        }

        match self.google.cover_by_isbn(isbn).await {
            Ok(Some(url)) => return Some(url),
            Ok(None) => {}
            Err(e) => tracing::debug!("Google Books ISBN lookup failed for {}: {}", isbn, e),
        }

        match self.open_library.cover_by_isbn(isbn).await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Open Library ISBN lookup failed for {}: {}", isbn, e);
                None
            }
        }
    }
}
