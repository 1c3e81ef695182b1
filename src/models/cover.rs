use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::services::cache::DecodeError;

/// 封面请求
///
/// 由各封面来源产出，`source_id` 是跨运行稳定的来源标识（URL 或文件路径），
/// 也是缓存键的计算依据。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverRequest {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl CoverRequest {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = if title.trim().is_empty() {
            None
        } else {
            Some(title)
        };
        self
    }
}

/// 已解码的封面图片
///
/// 像素数据通过 `Arc` 共享，多个调用方拿到的是同一份只读数据。
#[derive(Clone)]
pub struct CoverImage {
    source_id: String,
    pixels: Arc<RgbaImage>,
}

impl CoverImage {
    /// 从 RGBA 像素创建封面，拒绝零尺寸图片
    pub fn from_rgba(source_id: impl Into<String>, pixels: RgbaImage) -> Result<Self, DecodeError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }

        Ok(Self {
            source_id: source_id.into(),
            pixels: Arc::new(pixels),
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// 宽高比（宽 / 高）
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width()) / f64::from(self.height())
    }
}

impl fmt::Debug for CoverImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverImage")
            .field("source_id", &self.source_id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
