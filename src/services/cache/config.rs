// 缓存清理策略
//
// 只支持简单的上限：
// - 按创建时间（超过最大保存天数即删除）
// - 按总大小（超过上限时从最旧的开始删除）

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// 缓存清理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SweepPolicy {
    /// 最大保存天数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,

    /// 缓存文件总大小上限（字节）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
}

impl SweepPolicy {
    pub fn new(max_age_days: Option<u32>, max_bytes: Option<u64>) -> Self {
        Self {
            max_age_days,
            max_bytes,
        }
    }

    /// 是否没有任何上限（无需清理）
    pub fn is_unbounded(&self) -> bool {
        self.max_age_days.is_none() && self.max_bytes.is_none()
    }

    /// 最大保存时长
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_days.map(|days| Duration::days(i64::from(days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_unbounded() {
        let policy = SweepPolicy::default();
        assert!(policy.is_unbounded());
        assert!(policy.max_age().is_none());
    }

    #[test]
    fn test_policy_bounds() {
        let policy = SweepPolicy::new(Some(30), Some(1024));
        assert!(!policy.is_unbounded());
        assert_eq!(policy.max_age(), Some(Duration::days(30)));
        assert_eq!(policy.max_bytes, Some(1024));
    }

    #[test]
    fn test_policy_serialization() {
        let policy = SweepPolicy::new(Some(7), None);
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("max_age_days"));
        assert!(!json.contains("max_bytes"));

        let parsed: SweepPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }
}
