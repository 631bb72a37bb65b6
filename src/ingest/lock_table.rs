//! 锁表：动画期间的重排延迟
//!
//! 展示层在启动依赖条目位置的动画前加锁，动画结束解锁。
//! 锁定期间到达的指纹命中不落库，而是作为"待替换"排队在锁表里，
//! 至多保留一个（后到覆盖先到）。锁表纯内存、进程生命周期，
//! 不跨重启存活。

use std::collections::HashMap;

use crate::capture::CapturedContent;
use crate::platform::AppIdentity;

/// 解锁时待应用的置顶替换
///
/// 注意：负载（图片落盘等）延迟到应用时才持久化，
/// 被覆盖的待替换不会泄漏任何磁盘文件。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingReplacement {
    pub content: CapturedContent,
    pub source_app: Option<AppIdentity>,
}

/// 按条目 id 记录的锁状态集合
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    entries: HashMap<i64, Option<PendingReplacement>>,
}

impl LockTable {
    /// 加锁；已锁定时保持现状（含已排队的待替换）
    pub fn lock(&mut self, id: i64) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, None);
        true
    }

    pub fn is_locked(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// 为锁定条目排队待替换，后到覆盖先到
    ///
    /// 条目未锁定时返回 `false`，调用方应走正常替换路径。
    pub fn queue_replacement(&mut self, id: i64, pending: PendingReplacement) -> bool {
        match self.entries.get_mut(&id) {
            Some(slot) => {
                *slot = Some(pending);
                true
            }
            None => false,
        }
    }

    /// 解锁并取出锁状态
    ///
    /// - `None`：条目本就未锁定（重复解锁是安全的 no-op）
    /// - `Some(None)`：锁定期间无指纹命中
    /// - `Some(Some(_))`：锁定期间最后一次命中的待替换
    pub fn unlock(&mut self, id: i64) -> Option<Option<PendingReplacement>> {
        self.entries.remove(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
