use std::collections::HashSet;

use async_trait::async_trait;

use super::{CoverSource, SourceError};
use crate::external::{BookApiClient, BookRecord};
use crate::models::CoverRequest;

/// 去重后可能不足，向每个接口多要一些
const EXTRA_RESULTS: usize = 10;

/// 网络搜索封面来源（Google Books + Open Library）
pub struct SearchSource {
    query: String,
    genre: Option<String>,
    api: BookApiClient,
}

impl SearchSource {
    pub fn new(query: String, genre: Option<String>, api: BookApiClient) -> Self {
        let genre = genre.filter(|g| !g.trim().is_empty());
        Self { query, genre, api }
    }
}

#[async_trait]
impl CoverSource for SearchSource {
    fn name(&self) -> &str {
        "search"
    }

    async fn cover_requests(&self, limit: usize) -> Result<Vec<CoverRequest>, SourceError> {
        let search_limit = limit + EXTRA_RESULTS;
        let genre = self.genre.as_deref();

        let google = match self.api.google.search(&self.query, genre, search_limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Google Books API error: {}", e);
                Vec::new()
            }
        };

        let open_library = match self
            .api
            .open_library
            .search(&self.query, genre, search_limit)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Open Library API error: {}", e);
                Vec::new()
            }
        };

        tracing::info!(
            "Search '{}': {} results from Google Books, {} from Open Library",
            self.query,
            google.len(),
            open_library.len()
        );

        let records: Vec<BookRecord> = google.into_iter().chain(open_library).collect();
        Ok(dedup_records(records, limit)
            .iter()
            .filter_map(BookRecord::to_cover_request)
            .collect())
    }
}

/// 按 ISBN 以及（小写书名, 小写作者）去重，保留先出现的
pub fn dedup_records(records: Vec<BookRecord>, limit: usize) -> Vec<BookRecord> {
    let mut seen_isbns: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<(String, String)> = HashSet::new();
    let mut unique = Vec::new();

    for record in records {
        if unique.len() >= limit {
            break;
        }

        if let Some(isbn) = record.isbn.as_deref() {
            if !seen_isbns.insert(isbn.to_string()) {
                continue;
            }
        }

        let title_key = (
            record.title.trim().to_lowercase(),
            record
                .author
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_lowercase(),
        );
        if !seen_titles.insert(title_key) {
            continue;
        }

        unique.push(record);
    }

    unique
}
