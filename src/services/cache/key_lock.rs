// 按缓存键加锁
//
// 同一个缓存键的获取/写入串行执行，不同缓存键互不影响（没有全局锁）。
// 锁表只保存弱引用：持有者或等待者都释放后，锁随之销毁，下次加锁时清理表项。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 缓存键锁表
#[derive(Clone)]
pub struct KeyLocks {
    locks: Arc<std::sync::Mutex<HashMap<String, Weak<Mutex<()>>>>>,
}

/// 持有某个缓存键的锁
///
/// 释放（drop）时自动解锁
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// 被锁定的缓存键
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.key).finish()
    }
}

impl KeyLocks {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// 获取缓存键的锁（等待其他持有者释放）
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = self.lock_for(key);

        KeyGuard {
            key: key.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// 取出（或创建）缓存键对应的锁，同时清理已无人引用的表项
    ///
    /// 只要还有持有者或等待者，强引用就存在，同一个键不会出现两把锁
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// 锁表中的表项数
    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}
