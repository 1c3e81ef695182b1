// WebP 转换器 - 封面图片编解码
//
// 本模块提供封面图片的编解码功能，包括：
// - 原始来源字节解码（jpg、png、gif 首帧、webp）
// - 缓存文件编码为无损 WebP
// - 缓存文件解码
// - 异步包装（CPU 密集型操作放到阻塞线程池）

use crate::services::cache::error::DecodeError;
use image::RgbaImage;
use tokio::task;

/// WebP 转换器
pub struct WebPConverter;

impl WebPConverter {
    /// 解码来源图片字节为 RGBA 像素
    ///
    /// # 参数
    /// - `image_data`: 原始图片数据（jpg、png、gif、webp 等）
    ///
    /// # 返回
    /// - `Ok(RgbaImage)`: 解码后的像素
    /// - `Err(DecodeError)`: 格式无法识别、数据损坏或尺寸为零
    pub fn decode_source(image_data: &[u8]) -> Result<RgbaImage, DecodeError> {
        // 先识别格式，区分"不是图片"和"图片损坏"
        image::guess_format(image_data)
            .map_err(|e| DecodeError::UnsupportedFormat(format!("无法识别图片格式: {}", e)))?;

        let img = image::load_from_memory(image_data)
            .map_err(|e| DecodeError::DecodeFailed(format!("图片解码失败: {}", e)))?;

        let rgba = img.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }

        Ok(rgba)
    }

    /// 异步解码来源图片
    ///
    /// 使用 `tokio::task::spawn_blocking` 将 CPU 密集型操作移到阻塞线程池，
    /// 避免阻塞异步运行时。
    pub async fn decode_source_async(image_data: Vec<u8>) -> Result<RgbaImage, DecodeError> {
        task::spawn_blocking(move || Self::decode_source(&image_data))
            .await
            .map_err(|e| DecodeError::DecodeFailed(format!("任务执行失败: {}", e)))?
    }

    /// 将 RGBA 像素编码为无损 WebP（缓存文件格式）
    pub fn encode_lossless(rgba: &RgbaImage) -> Result<Vec<u8>, DecodeError> {
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyImage);
        }

        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
        let webp_data = encoder.encode_lossless();

        if webp_data.is_empty() {
            return Err(DecodeError::EncodeFailed("WebP 编码结果为空".to_string()));
        }

        Ok(webp_data.to_vec())
    }

    /// 解码缓存中的 WebP 文件
    pub fn decode_webp(webp_data: &[u8]) -> Result<RgbaImage, DecodeError> {
        let decoded = webp::Decoder::new(webp_data)
            .decode()
            .ok_or_else(|| DecodeError::DecodeFailed("WebP 数据损坏".to_string()))?;

        let rgba = decoded.to_image().to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }

        Ok(rgba)
    }

    /// 异步解码缓存中的 WebP 文件
    pub async fn decode_webp_async(webp_data: Vec<u8>) -> Result<RgbaImage, DecodeError> {
        task::spawn_blocking(move || Self::decode_webp(&webp_data))
            .await
            .map_err(|e| DecodeError::DecodeFailed(format!("任务执行失败: {}", e)))?
    }
}
