use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{upgrade_to_https, BookRecord};

/// Google Books API客户端
#[derive(Clone)]
pub struct GoogleBooksClient {
    client: Client,
    base_url: String,
}

impl GoogleBooksClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, "https://www.googleapis.com/books/v1")
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// 搜索图书
    ///
    /// 指定类型时追加 `subject:{genre}` 条件，只返回有封面的结果
    pub async fn search(&self, query: &str, genre: Option<&str>, limit: usize) -> Result<Vec<BookRecord>> {
        let q = match genre {
            Some(genre) => format!("{} subject:{}", query, genre),
            None => query.to_string(),
        };
        // 多取一些，过滤掉没有封面的
        let max_results = (limit * 2).clamp(1, 40);

        let response = self.volumes(&[
            ("q", q),
            ("maxResults", max_results.to_string()),
            ("orderBy", "relevance".to_string()),
            ("printType", "books".to_string()),
        ])
        .await?;

        let records: Vec<BookRecord> = response
            .items
            .iter()
            .filter_map(GoogleBooksConverter::volume_to_record)
            .take(limit)
            .collect();

        tracing::debug!("Google Books returned {} books with covers for '{}'", records.len(), query);
        Ok(records)
    }

    /// 按ISBN查询封面URL
    pub async fn cover_by_isbn(&self, isbn: &str) -> Result<Option<String>> {
        let response = self.volumes(&[("q", format!("isbn:{}", isbn))]).await?;

        Ok(response
            .items
            .first()
            .and_then(|item| item.volume_info.image_links.as_ref())
            .and_then(GoogleBooksConverter::cover_url))
    }

    async fn volumes(&self, params: &[(&str, String)]) -> Result<GoogleVolumesResponse> {
        let url = format!("{}/volumes", self.base_url);

        let response = self.client.get(&url).query(params).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Google Books API error: {}", response.status()));
        }

        let volumes: GoogleVolumesResponse = response.json().await?;
        Ok(volumes)
    }
}

/// Google Books 数据转换
pub struct GoogleBooksConverter;

impl GoogleBooksConverter {
    /// 转换为图书记录，没有封面的返回None
    pub fn volume_to_record(volume: &GoogleVolume) -> Option<BookRecord> {
        let info = &volume.volume_info;
        let cover_url = info.image_links.as_ref().and_then(Self::cover_url)?;

        let isbn = info
            .industry_identifiers
            .iter()
            .find(|id| id.kind == "ISBN_13" || id.kind == "ISBN_10")
            .map(|id| id.identifier.clone());

        Some(BookRecord {
            title: info.title.clone().unwrap_or_default(),
            author: info.authors.first().cloned(),
            isbn,
            cover_url: Some(cover_url),
        })
    }

    /// 选择最大的封面：large -> medium -> thumbnail
    pub fn cover_url(links: &ImageLinks) -> Option<String> {
        links
            .large
            .as_deref()
            .or(links.medium.as_deref())
            .or(links.thumbnail.as_deref())
            .filter(|url| !url.is_empty())
            .map(upgrade_to_https)
    }
}

// Google Books API 数据结构

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleVolumesResponse {
    #[serde(default)]
    pub items: Vec<GoogleVolume>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleVolume {
    #[serde(rename = "volumeInfo", default)]
    pub volume_info: GoogleVolumeInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleVolumeInfo {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "industryIdentifiers", default)]
    pub industry_identifiers: Vec<IndustryIdentifier>,
    #[serde(rename = "imageLinks")]
    pub image_links: Option<ImageLinks>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageLinks {
    pub thumbnail: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}
