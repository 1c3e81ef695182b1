// 合成器 - 按放置方案把封面画到画布上
//
// - 背景色填充
// - 居中裁剪到目标宽高比后缩放（Lanczos3）
// - 超出画布的部分被裁掉
// - 导出为图片文件

use crate::models::{CanvasSpec, CoverImage, PlacementRect};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("图片编码失败: {0}")]
    Image(#[from] image::ImageError),

    #[error("写入文件失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 渲染参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// 背景色（RGB）
    pub background: [u8; 3],

    /// 封面之间的间隙（像素），每个放置矩形四周各缩进一半
    pub gutter: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            background: [30, 30, 30],
            gutter: 0,
        }
    }
}

/// 合成器
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    options: RenderOptions,
}

impl Compositor {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// 渲染画布
    ///
    /// # 参数
    /// - `images`: 已加载的封面
    /// - `placements`: 布局引擎给出的放置方案
    /// - `spec`: 画布规格
    ///
    /// 找不到对应封面的放置矩形会被跳过
    pub fn render(
        &self,
        images: &[CoverImage],
        placements: &[PlacementRect],
        spec: &CanvasSpec,
    ) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(spec.width(), spec.height(), Rgb(self.options.background));

        let by_id: HashMap<&str, &CoverImage> =
            images.iter().map(|image| (image.source_id(), image)).collect();
        let inset = self.options.gutter / 2;

        let mut drawn = 0;
        for rect in placements {
            let Some(image) = by_id.get(rect.source_id.as_str()) else {
                warn!("放置方案中的封面不存在，跳过: {}", rect.source_id);
                continue;
            };

            let tile_width = rect.width.saturating_sub(inset * 2);
            let tile_height = rect.height.saturating_sub(inset * 2);
            if tile_width == 0 || tile_height == 0 {
                debug!("间隙过大，封面不可见: {}", rect.source_id);
                continue;
            }

            let left = rect.x.saturating_add(inset);
            let top = rect.y.saturating_add(inset);
            if left >= spec.width() || top >= spec.height() {
                continue;
            }

            // 只缩放画布内可见的部分，超出底部的封面不分配整张图的内存
            let visible_height = tile_height.min(spec.height() - top);

            let (x, y, w, h) = fill_crop(image.width(), image.height(), tile_width, tile_height);
            let source_height = visible_rows(h, visible_height, tile_height);
            let cropped = imageops::crop_imm(image.pixels(), x, y, w, source_height).to_image();
            let resized =
                imageops::resize(&cropped, tile_width, visible_height, FilterType::Lanczos3);
            let tile = DynamicImage::ImageRgba8(resized).to_rgb8();

            // replace 会裁掉超出画布右侧的部分
            imageops::replace(&mut canvas, &tile, i64::from(left), i64::from(top));
            drawn += 1;
        }

        info!(
            "画布渲染完成: {}x{}, 绘制封面 {} 张",
            spec.width(),
            spec.height(),
            drawn
        );

        canvas
    }

    /// 导出画布
    ///
    /// 格式由扩展名决定（png、jpg、webp 等），无法识别时使用 PNG
    pub fn export(canvas: &RgbImage, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
        if format == ImageFormat::WebP {
            // image 只能解码 WebP，编码交给 webp
            let encoded =
                webp::Encoder::from_rgb(canvas.as_raw(), canvas.width(), canvas.height())
                    .encode_lossless();
            std::fs::write(path, &*encoded)?;
        } else {
            canvas.save_with_format(path, format)?;
        }

        info!("壁纸已保存: {} ({:?})", path.display(), format);
        Ok(())
    }
}

/// 裁剪窗口中对应可见高度的源图行数，向上取整，至少 1 行
fn visible_rows(window_height: u32, visible_height: u32, tile_height: u32) -> u32 {
    let tile_height = u64::from(tile_height.max(1));
    let rows = (u64::from(window_height) * u64::from(visible_height) + tile_height - 1) / tile_height;
    rows.clamp(1, u64::from(window_height.max(1))) as u32
}

/// 计算居中裁剪窗口，使裁剪后的宽高比等于目标宽高比
///
/// # 返回
/// `(x, y, width, height)`，位于源图片范围内
pub fn fill_crop(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> (u32, u32, u32, u32) {
    let (sw, sh) = (u64::from(src_width), u64::from(src_height));
    let (dw, dh) = (u64::from(dst_width.max(1)), u64::from(dst_height.max(1)));

    if sw * dh > dw * sh {
        // 源图片更宽，裁掉左右
        let w = ((sh * dw + dh / 2) / dh).clamp(1, sw.max(1)) as u32;
        ((src_width - w) / 2, 0, w, src_height)
    } else {
        // 源图片更高（或比例相同），裁掉上下
        let h = ((sw * dh + dw / 2) / dw).clamp(1, sh.max(1)) as u32;
        (0, (src_height - h) / 2, src_width, h)
    }
}
