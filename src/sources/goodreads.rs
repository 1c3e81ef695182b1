use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use super::{CoverSource, SourceError};
use crate::external::BookApiClient;
use crate::models::CoverRequest;

const RSS_BASE_URL: &str = "https://www.goodreads.com/review/list_rss";
const COVER_BY_ID_URL: &str =
    "https://images-na.ssl-images-amazon.com/images/S/compressed.photo.goodreads.com/books";

/// Goodreads 输入：CSV 导出文件或 RSS 订阅地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoodreadsInput {
    Csv(PathBuf),
    Rss(String),
}

impl GoodreadsInput {
    /// 识别输入类型
    ///
    /// - http(s) 地址视为 RSS
    /// - 含路径分隔符或以 .csv 结尾视为 CSV 文件
    /// - 其他视为用户 ID，拼出该书架的 RSS 地址
    pub fn detect(input: &str, shelf: &str) -> Self {
        let input = input.trim();

        if input.starts_with("http://") || input.starts_with("https://") {
            return GoodreadsInput::Rss(input.to_string());
        }

        if input.contains('/') || input.contains('\\') || input.to_lowercase().ends_with(".csv") {
            return GoodreadsInput::Csv(PathBuf::from(input));
        }

        GoodreadsInput::Rss(format!(
            "{}/{}?shelf={}",
            RSS_BASE_URL,
            input,
            urlencoding::encode(shelf)
        ))
    }
}

/// CSV 导出中的一本书
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvBook {
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub cover_url: Option<String>,
    pub shelf: String,
    pub date_read: Option<NaiveDate>,
}

/// RSS 中的一本书
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub author_name: Option<String>,
    pub isbn: Option<String>,
    pub book_id: Option<String>,
    pub book_large_image_url: Option<String>,
    pub book_image_url: Option<String>,
}

impl RssItem {
    /// 封面地址：大图 -> 普通图 -> 按 book_id 拼接
    pub fn cover_url(&self) -> Option<String> {
        self.book_large_image_url
            .clone()
            .or_else(|| self.book_image_url.clone())
            .or_else(|| {
                self.book_id
                    .as_ref()
                    .map(|id| format!("{}/{}.jpg", COVER_BY_ID_URL, id))
            })
    }

    fn set_field(&mut self, name: &str, value: &str) {
        let value = value.trim();
        let non_empty = (!value.is_empty()).then(|| value.to_string());
        match name {
            "title" => self.title = value.to_string(),
            "author_name" => self.author_name = non_empty,
            "isbn" => self.isbn = non_empty,
            "book_id" => self.book_id = non_empty,
            "book_large_image_url" => self.book_large_image_url = non_empty,
            "book_image_url" => self.book_image_url = non_empty,
            _ => {}
        }
    }
}

/// Goodreads 封面来源
pub struct GoodreadsSource {
    input: GoodreadsInput,
    shelf: String,
    client: Client,
    lookup: BookApiClient,
}

impl GoodreadsSource {
    pub fn new(input: GoodreadsInput, shelf: String, client: Client, lookup: BookApiClient) -> Self {
        Self {
            input,
            shelf,
            client,
            lookup,
        }
    }

    async fn from_csv(&self, path: &Path, limit: usize) -> Result<Vec<CoverRequest>, SourceError> {
        if !path.exists() {
            return Err(SourceError::InvalidInput(format!(
                "CSV file not found: {}",
                path.display()
            )));
        }

        let text = tokio::fs::read_to_string(path).await?;
        let books = parse_csv_export(&text, &self.shelf)?;
        tracing::info!(
            "Goodreads CSV {}: {} books on shelf '{}'",
            path.display(),
            books.len(),
            self.shelf
        );

        let mut requests = Vec::new();
        for book in books.into_iter().take(limit) {
            let cover_url = match book.cover_url {
                Some(url) => Some(url),
                None => match &book.isbn {
                    Some(isbn) => self.lookup.cover_by_isbn(isbn).await,
                    None => None,
                },
            };

            match cover_url {
                Some(url) => requests.push(CoverRequest::new(url).with_title(book.title)),
                None => tracing::debug!("No cover found for '{}'", book.title),
            }
        }

        Ok(requests)
    }

    async fn from_rss(&self, url: &str, limit: usize) -> Result<Vec<CoverRequest>, SourceError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Http(format!(
                "Goodreads RSS error: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let items = parse_rss(&body)?;
        tracing::info!("Goodreads RSS returned {} items", items.len());

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let url = item.cover_url()?;
                Some(CoverRequest::new(url).with_title(item.title))
            })
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl CoverSource for GoodreadsSource {
    fn name(&self) -> &str {
        "goodreads"
    }

    async fn cover_requests(&self, limit: usize) -> Result<Vec<CoverRequest>, SourceError> {
        match &self.input {
            GoodreadsInput::Csv(path) => self.from_csv(path, limit).await,
            GoodreadsInput::Rss(url) => self.from_rss(url, limit).await,
        }
    }
}

/// 解析 Goodreads CSV 导出
///
/// 只保留指定书架的书，按阅读日期倒序（没有日期的排在最后）
pub fn parse_csv_export(text: &str, shelf: &str) -> Result<Vec<CsvBook>, SourceError> {
    let mut rows = parse_csv(text.trim_start_matches('\u{feff}'))?.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| SourceError::Parse("CSV is empty".to_string()))?;

    let columns: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();
    if !columns.contains_key("Title") {
        return Err(SourceError::Parse("CSV has no Title column".to_string()));
    }

    let shelf = shelf.to_lowercase();
    let mut books = Vec::new();
    for row in rows {
        let field = |name: &str| column_value(&columns, &row, name).to_string();
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

        let book_shelf = field("Exclusive Shelf").to_lowercase();
        if book_shelf != shelf {
            continue;
        }

        let isbn = clean_isbn(&field("ISBN13"));
        let isbn = if isbn.is_empty() {
            clean_isbn(&field("ISBN"))
        } else {
            isbn
        };

        let cover = field("Book Cover");
        let cover = if cover.is_empty() { field("Cover") } else { cover };

        books.push(CsvBook {
            title: field("Title"),
            author: non_empty(&field("Author")),
            isbn: non_empty(&isbn),
            cover_url: non_empty(&cover),
            shelf: book_shelf,
            date_read: parse_date_read(&field("Date Read")),
        });
    }

    // Option 的顺序中 None 最小，倒序后排在最后
    books.sort_by(|a, b| b.date_read.cmp(&a.date_read));
    Ok(books)
}

fn column_value<'a>(columns: &HashMap<&str, usize>, row: &'a [String], name: &str) -> &'a str {
    columns
        .get(name)
        .and_then(|&i| row.get(i))
        .map(|s| s.trim())
        .unwrap_or("")
}

/// 清理 Goodreads 的 ISBN 格式：`="0441172717"` -> `0441172717`
pub fn clean_isbn(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('=')
        .trim_matches('"')
        .to_string()
}

fn parse_date_read(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// 解析 CSV 文本（引号字段、字段内换行和 "" 转义由 csv 处理）
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| SourceError::Parse(format!("CSV error: {}", e)))
        })
        .collect()
}

/// 解析 Goodreads RSS
pub fn parse_rss(xml: &str) -> Result<Vec<RssItem>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<RssItem> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"item" {
                    current = Some(RssItem::default());
                }
                text.clear();
            }
            Ok(Event::Text(t)) => {
                if current.is_some() {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| SourceError::Parse(format!("RSS text: {}", e)))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(c)) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let local_name = e.local_name();
                let name = String::from_utf8_lossy(local_name.as_ref());
                if name == "item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                } else if let Some(item) = current.as_mut() {
                    item.set_field(&name, &text);
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SourceError::Parse(format!(
                    "RSS error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(items)
}
