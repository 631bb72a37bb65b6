//! 变更通知模块
//!
//! # 设计思路
//!
//! 推送而非轮询：展示层订阅广播通道接收变更事件。
//! `EntryAdded` / `EntryReordered` 按协调器处理顺序严格串行发出；
//! `ThumbnailReady` 来自并发的缩略图任务，相互之间以及与采集事件
//! 之间都没有顺序保证，消费方按 id 做幂等回填即可。
//!
//! # 实现思路
//!
//! 事件结构派生 `Serialize`，UI 进程可原样转发到自己的 IPC 通道。
//! 无订阅者时发送静默丢弃（守护进程可独立于 UI 运行）。

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::HistoryEntry;

const CHANNEL_CAPACITY: usize = 256;

/// 账本变更事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeEvent {
    /// 新条目入库；`replaced_id` 存在时表示这是一次"再复制置顶"，
    /// 展示层可按旧 id 原位替换而不是闪烁重建
    #[serde(rename_all = "camelCase")]
    EntryAdded {
        entry: HistoryEntry,
        replaced_id: Option<i64>,
    },
    /// 既有条目移到头部，内容未变
    #[serde(rename_all = "camelCase")]
    EntryReordered { id: i64 },
    /// 缩略图就绪（异步、乱序到达）
    #[serde(rename_all = "camelCase")]
    ThumbnailReady { id: i64, thumbnail: Vec<u8> },
}

/// 变更通知器
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        ChangeNotifier { tx }
    }

    /// 订阅后续变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: ChangeEvent) {
        // 无订阅者属于正常运行状态
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
