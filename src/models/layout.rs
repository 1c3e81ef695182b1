use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 画布参数错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Canvas size must be positive (got {width}x{height})")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Column count must be positive")]
    ZeroColumns,

    #[error("Tile width must be positive")]
    ZeroTileWidth,

    #[error("Column count {columns} exceeds canvas width {width}")]
    TooManyColumns { columns: u32, width: u32 },
}

/// 画布规格
///
/// 构造时校验，布局引擎拿到的一定是合法规格。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasSpec {
    width: u32,
    height: u32,
    column_count: u32,
}

impl CanvasSpec {
    pub fn new(width: u32, height: u32, column_count: u32) -> Result<Self, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::InvalidDimensions { width, height });
        }
        if column_count == 0 {
            return Err(LayoutError::ZeroColumns);
        }
        if column_count > width {
            return Err(LayoutError::TooManyColumns {
                columns: column_count,
                width,
            });
        }

        Ok(Self {
            width,
            height,
            column_count,
        })
    }

    /// 根据期望的封面宽度推算列数：round(width / tile_width)，至少 1 列
    pub fn with_tile_width(width: u32, height: u32, tile_width: u32) -> Result<Self, LayoutError> {
        if tile_width == 0 {
            return Err(LayoutError::ZeroTileWidth);
        }
        let columns = ((f64::from(width) / f64::from(tile_width)).round() as u32)
            .max(1)
            .min(width.max(1));
        Self::new(width, height, columns)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn column_count(&self) -> u32 {
        self.column_count
    }

    /// 列宽（整数除法，余下的像素留在画布右侧）
    pub fn column_width(&self) -> u32 {
        self.width / self.column_count
    }
}

/// 单张封面在画布上的放置矩形
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementRect {
    pub source_id: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PlacementRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// 两个矩形是否有重叠面积（仅相邻不算）
    pub fn intersects(&self, other: &PlacementRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: u32, y: u32, width: u32, height: u32) -> PlacementRect {
        PlacementRect {
            source_id: "r".to_string(),
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn test_canvas_validation() {
        assert!(CanvasSpec::new(1920, 1080, 6).is_ok());
        assert_eq!(
            CanvasSpec::new(0, 1080, 6),
            Err(LayoutError::InvalidDimensions {
                width: 0,
                height: 1080
            })
        );
        assert_eq!(CanvasSpec::new(100, 100, 0), Err(LayoutError::ZeroColumns));
        assert_eq!(
            CanvasSpec::new(4, 100, 5),
            Err(LayoutError::TooManyColumns {
                columns: 5,
                width: 4
            })
        );
    }

    #[test]
    fn test_columns_from_tile_width() {
        let spec = CanvasSpec::with_tile_width(1920, 1080, 320).unwrap();
        assert_eq!(spec.column_count(), 6);
        assert_eq!(spec.column_width(), 320);

        // 期望宽度大于画布时至少 1 列
        let spec = CanvasSpec::with_tile_width(200, 100, 1000).unwrap();
        assert_eq!(spec.column_count(), 1);

        assert_eq!(
            CanvasSpec::with_tile_width(200, 100, 0),
            Err(LayoutError::ZeroTileWidth)
        );
    }

    #[test]
    fn test_column_width_truncates() {
        let spec = CanvasSpec::new(1000, 500, 3).unwrap();
        assert_eq!(spec.column_width(), 333);
    }

    #[test]
    fn test_rect_intersection() {
        let a = rect(0, 0, 100, 100);
        assert!(a.intersects(&rect(50, 50, 100, 100)));
        // 相邻不算重叠
        assert!(!a.intersects(&rect(100, 0, 100, 100)));
        assert!(!a.intersects(&rect(0, 100, 100, 100)));
    }
}
