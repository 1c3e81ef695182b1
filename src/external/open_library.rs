use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::BookRecord;

const COVERS_BASE_URL: &str = "https://covers.openlibrary.org/b/id";

/// Open Library API客户端
#[derive(Clone)]
pub struct OpenLibraryClient {
    client: Client,
    base_url: String,
}

impl OpenLibraryClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, "https://openlibrary.org")
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// 搜索图书
    ///
    /// 指定类型时追加到查询词，并要求主题（subject）中包含该类型
    pub async fn search(&self, query: &str, genre: Option<&str>, limit: usize) -> Result<Vec<BookRecord>> {
        let url = format!("{}/search.json", self.base_url);
        let q = match genre {
            Some(genre) => format!("{} {}", query, genre),
            None => query.to_string(),
        };
        let max_results = (limit * 2).clamp(1, 100);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", q),
                ("limit", max_results.to_string()),
                ("fields", "title,author_name,isbn,cover_i,subject".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Open Library API error: {}", response.status()));
        }

        let search_result: OpenLibrarySearchResponse = response.json().await?;
        let records: Vec<BookRecord> = search_result
            .docs
            .iter()
            .filter_map(|doc| OpenLibraryConverter::doc_to_record(doc, genre))
            .take(limit)
            .collect();

        tracing::debug!("Open Library returned {} books with covers for '{}'", records.len(), query);
        Ok(records)
    }

    /// 按ISBN查询封面URL
    pub async fn cover_by_isbn(&self, isbn: &str) -> Result<Option<String>> {
        let url = format!("{}/api/books", self.base_url);
        let bibkey = format!("ISBN:{}", isbn);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("bibkeys", bibkey.as_str()),
                ("format", "json"),
                ("jscmd", "data"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Open Library API error: {}", response.status()));
        }

        let books: HashMap<String, OpenLibraryBook> = response.json().await?;
        Ok(books
            .get(&bibkey)
            .and_then(|book| book.cover.as_ref())
            .and_then(OpenLibraryConverter::cover_url))
    }
}

/// Open Library 数据转换
pub struct OpenLibraryConverter;

impl OpenLibraryConverter {
    /// 转换为图书记录
    ///
    /// 没有封面、或主题与类型不匹配的返回None。没有主题信息时不做类型过滤。
    pub fn doc_to_record(doc: &OpenLibraryDoc, genre: Option<&str>) -> Option<BookRecord> {
        let cover_id = doc.cover_i?;

        if let Some(genre) = genre {
            let genre = genre.to_lowercase();
            if !doc.subject.is_empty()
                && !doc.subject.iter().any(|s| s.to_lowercase().contains(&genre))
            {
                return None;
            }
        }

        Some(BookRecord {
            title: doc.title.clone().unwrap_or_default(),
            author: doc.author_name.first().cloned(),
            isbn: doc.isbn.first().cloned(),
            cover_url: Some(Self::cover_id_url(cover_id)),
        })
    }

    pub fn cover_id_url(cover_id: u64) -> String {
        format!("{}/{}-L.jpg", COVERS_BASE_URL, cover_id)
    }

    /// 选择最大的封面：large -> medium -> small
    pub fn cover_url(cover: &OpenLibraryCover) -> Option<String> {
        cover
            .large
            .clone()
            .or_else(|| cover.medium.clone())
            .or_else(|| cover.small.clone())
            .filter(|url| !url.is_empty())
    }
}

// Open Library API 数据结构

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenLibrarySearchResponse {
    #[serde(default)]
    pub docs: Vec<OpenLibraryDoc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenLibraryDoc {
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Vec<String>,
    #[serde(default)]
    pub isbn: Vec<String>,
    pub cover_i: Option<u64>,
    #[serde(default)]
    pub subject: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenLibraryBook {
    pub cover: Option<OpenLibraryCover>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenLibraryCover {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_http_server, Route};

    const SEARCH_RESPONSE: &str = r#"{
        "numFound": 3,
        "docs": [
            {
                "title": "The Hobbit",
                "author_name": ["J.R.R. Tolkien"],
                "isbn": ["9780547928227", "054792822X"],
                "cover_i": 12345,
                "subject": ["Fantasy fiction", "Dragons"]
            },
            {
                "title": "Cookbook",
                "cover_i": 999,
                "subject": ["Cooking"]
            },
            {
                "title": "No Cover",
                "author_name": ["Anon"]
            }
        ]
    }"#;

    #[test]
    fn test_parse_search_without_genre() {
        let response: OpenLibrarySearchResponse = serde_json::from_str(SEARCH_RESPONSE).unwrap();
        let records: Vec<BookRecord> = response
            .docs
            .iter()
            .filter_map(|doc| OpenLibraryConverter::doc_to_record(doc, None))
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].isbn.as_deref(), Some("9780547928227"));
        assert_eq!(
            records[0].cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/12345-L.jpg")
        );
        assert_eq!(records[1].author, None);
    }

    #[test]
    fn test_genre_filters_subjects() {
        let response: OpenLibrarySearchResponse = serde_json::from_str(SEARCH_RESPONSE).unwrap();
        let records: Vec<BookRecord> = response
            .docs
            .iter()
            .filter_map(|doc| OpenLibraryConverter::doc_to_record(doc, Some("FANTASY")))
            .collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "The Hobbit");
    }

    #[test]
    fn test_cover_url_fallback() {
        let cover = OpenLibraryCover {
            small: Some("https://covers.openlibrary.org/s.jpg".to_string()),
            medium: None,
            large: None,
        };
        assert_eq!(
            OpenLibraryConverter::cover_url(&cover).as_deref(),
            Some("https://covers.openlibrary.org/s.jpg")
        );
        assert_eq!(OpenLibraryConverter::cover_url(&OpenLibraryCover::default()), None);
    }

    #[tokio::test]
    async fn test_cover_by_isbn_against_local_server() {
        let body = r#"{"ISBN:9780547928227": {"cover": {"medium": "https://covers.openlibrary.org/m.jpg"}}}"#;
        let (base_url, _) = spawn_http_server(vec![Route::new("/api/books", "200 OK", body)]).await;
        let client = OpenLibraryClient::with_base_url(Client::new(), base_url);

        let cover = client.cover_by_isbn("9780547928227").await.unwrap();
        assert_eq!(cover.as_deref(), Some("https://covers.openlibrary.org/m.jpg"));

        let missing = client.cover_by_isbn("0000000000").await.unwrap();
        assert_eq!(missing, None);
    }
}
