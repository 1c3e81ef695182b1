use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;

use super::{CoverSource, SourceError};
use crate::models::CoverRequest;

/// 支持的图片文件扩展名
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// 本地目录封面来源
pub struct LocalSource {
    directory: PathBuf,
    recursive: bool,
    marker_regex: Regex,
}

impl LocalSource {
    pub fn new(directory: impl Into<PathBuf>, recursive: bool) -> Result<Self, SourceError> {
        // 匹配 [..] 和 (..) 标记，例如 [epub]、(2019)
        let marker_regex = Regex::new(r"\[.*?\]|\(.*?\)")
            .map_err(|e| SourceError::InvalidInput(format!("invalid marker pattern: {}", e)))?;

        Ok(Self {
            directory: directory.into(),
            recursive,
            marker_regex,
        })
    }

    /// 扫描目录中的图片文件，按路径排序
    pub fn scan(&self) -> Result<Vec<PathBuf>, SourceError> {
        let path = self.directory.as_path();

        if !path.exists() {
            return Err(SourceError::InvalidInput(format!(
                "路径不存在: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(SourceError::InvalidInput(format!(
                "不是有效的目录: {}",
                path.display()
            )));
        }

        let mut files = Vec::new();
        scan_dir(path, self.recursive, &mut files)?;
        files.sort();
        Ok(files)
    }

    /// 从文件名推断书名
    pub fn title_from_path(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_string_lossy();
        let without_markers = self.marker_regex.replace_all(&stem, "");
        let title = without_markers
            .replace(['_', '.', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        (!title.is_empty()).then_some(title)
    }
}

fn scan_dir(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<(), SourceError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_file() {
            if is_image_file(&path) {
                files.push(path);
            }
        } else if path.is_dir() && recursive {
            scan_dir(&path, recursive, files)?;
        }
    }

    Ok(())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl CoverSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn cover_requests(&self, limit: usize) -> Result<Vec<CoverRequest>, SourceError> {
        let files = self.scan()?;
        tracing::info!(
            "Found {} cover images in {}",
            files.len(),
            self.directory.display()
        );

        Ok(files
            .iter()
            .take(limit)
            .map(|path| {
                let request = CoverRequest::new(path.to_string_lossy());
                match self.title_from_path(path) {
                    Some(title) => request.with_title(title),
                    None => request,
                }
            })
            .collect())
    }
}
