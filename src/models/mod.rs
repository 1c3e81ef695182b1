// 数据模型
//
// - 封面请求与已解码封面
// - 画布规格与放置矩形

pub mod cover;
pub mod layout;

pub use cover::{CoverImage, CoverRequest};
pub use layout::{CanvasSpec, LayoutError, PlacementRect};
