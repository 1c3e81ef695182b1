// 瀑布流布局 - 把不同宽高比的封面排进固定画布
//
// 贪心策略：每张封面按输入顺序放进当前最短的一列（并列时取最左边），
// 宽度固定为列宽，高度按宽高比缩放。最短的列也已经到达画布底部时停止，
// 剩下的封面不放置。

use crate::models::{CanvasSpec, CoverImage, PlacementRect};
use tracing::debug;

/// 瀑布流布局引擎
///
/// 纯计算，相同的输入总是得到相同的结果
#[derive(Debug, Clone, Copy)]
pub struct MasonryLayout {
    spec: CanvasSpec,
}

impl MasonryLayout {
    pub fn new(spec: CanvasSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &CanvasSpec {
        &self.spec
    }

    /// 计算放置方案
    ///
    /// # 返回
    /// 每张被放置的封面一个矩形，顺序与输入一致；放不下的封面没有对应矩形
    ///
    /// # 示例
    /// ```
    /// use bookcover_wallpaper::models::{CanvasSpec, CoverImage};
    /// use bookcover_wallpaper::services::layout::MasonryLayout;
    /// use image::RgbaImage;
    ///
    /// let spec = CanvasSpec::new(600, 400, 3).unwrap();
    /// let covers = vec![
    ///     CoverImage::from_rgba("a", RgbaImage::new(200, 300)).unwrap(),
    ///     CoverImage::from_rgba("b", RgbaImage::new(200, 200)).unwrap(),
    /// ];
    ///
    /// let placements = MasonryLayout::new(spec).layout(&covers);
    /// assert_eq!(placements[0].x, 0);
    /// assert_eq!(placements[0].height, 300);
    /// assert_eq!(placements[1].x, 200);
    /// assert_eq!(placements[1].height, 200);
    /// ```
    pub fn layout(&self, images: &[CoverImage]) -> Vec<PlacementRect> {
        let column_width = self.spec.column_width();
        let mut heights = vec![0u32; self.spec.column_count() as usize];
        let mut placements = Vec::with_capacity(images.len());

        for image in images {
            // min_by_key 在并列时返回第一个，即最左边的列
            let Some((column, &top)) = heights.iter().enumerate().min_by_key(|(_, h)| **h) else {
                break;
            };

            if top >= self.spec.height() {
                debug!(
                    "画布已满，剩余 {} 张封面未放置",
                    images.len() - placements.len()
                );
                break;
            }

            let height = scaled_height(column_width, image.width(), image.height());
            placements.push(PlacementRect {
                source_id: image.source_id().to_string(),
                x: column as u32 * column_width,
                y: top,
                width: column_width,
                height,
            });
            heights[column] = top.saturating_add(height);
        }

        debug!(
            "布局完成: 放置 {}/{} 张封面, 列宽 {}",
            placements.len(),
            images.len(),
            column_width
        );

        placements
    }

    /// 各列的最终高度（列底部的 y 坐标）
    pub fn column_heights(&self, placements: &[PlacementRect]) -> Vec<u32> {
        let column_width = self.spec.column_width();
        let mut heights = vec![0u32; self.spec.column_count() as usize];

        for rect in placements {
            let column = (rect.x / column_width) as usize;
            if let Some(height) = heights.get_mut(column) {
                *height = (*height).max(rect.bottom());
            }
        }

        heights
    }
}

/// 按宽高比缩放到列宽后的高度，四舍五入，至少 1 像素
fn scaled_height(column_width: u32, width: u32, height: u32) -> u32 {
    let width = u64::from(width.max(1));
    let scaled = (u64::from(column_width) * u64::from(height) + width / 2) / width;
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}
