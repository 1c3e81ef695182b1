// 书籍封面壁纸生成库
//
// 本库提供壁纸生成的核心功能，包括：
// - 封面来源（本地目录、Goodreads、图书搜索）
// - 外部 API 集成
// - 封面缓存与并发加载
// - 瀑布流布局与合成

pub mod config;
pub mod external;
pub mod models;
pub mod services;
pub mod sources;

#[cfg(test)]
mod test_support;
