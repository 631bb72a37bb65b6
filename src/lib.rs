//! # 剪贴板采集与历史引擎 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              展示层（外部协作方，不在本库内）               │
//! │     查询/变更 API ── 锁协议 ── 广播事件订阅               │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ ClipboardService（Result<T, AppError> + ChangeEvent）
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕              采集管线 (Rust)                      │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ platform ─── 平台能力接口（探测·读写·图标·预览）       │
//! │  ├─ capture ──── 分类器 + 指纹引擎（纯函数）               │
//! │  │                                                       │
//! │  ├─ ingest ───── 协调器：查重/置顶/锁延迟 + 观察循环       │
//! │  │   ├─ lock_table   动画锁与待替换排队                   │
//! │  │   └─ watcher      clipboard-master 监听 + 节流/退避    │
//! │  │                                                       │
//! │  ├─ db ───────── SQLite (rusqlite) 历史账本 + 钉板        │
//! │  ├─ thumbnail ── 回退链缩略图（超时 + 大小上限）           │
//! │  ├─ storage ──── 图片负载落盘与孤儿清理                   │
//! │  ├─ notify ───── 变更事件广播                             │
//! │  └─ settings ─── JSON 设置（宽容加载）                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，服务层所有操作的返回类型 |
//! | [`platform`] | 单一能力接口 + 各平台实现；能力缺失以 `None` 表达 |
//! | [`capture`] | 固定优先级分类（文件>图片>文本，链接细化）与内容指纹 |
//! | [`ingest`] | 采集协调器状态机、锁表、观察循环与对外服务面 |
//! | [`db`] | 历史账本：按 id 寻址的插入/置顶/裁剪/查询与钉板 |
//! | [`thumbnail`] | 尽力而为的缩略图回退链，绝不阻塞采集 |
//! | [`storage`] | 图片负载目录管理与归管文件命名 |
//! | [`notify`] | `EntryAdded` / `EntryReordered` / `ThumbnailReady` 广播 |
//! | [`settings`] | 历史上限、回溯窗口、节流与缩略图策略 |

pub mod capture;
pub mod db;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod platform;
pub mod settings;
pub mod storage;
pub mod thumbnail;

pub use capture::{CapturedContent, ContentKind};
pub use db::{HistoryEntry, LedgerStats, Pinboard};
pub use error::AppError;
pub use ingest::{ClipboardService, ClipboardWatcher, IngestOutcome};
pub use notify::ChangeEvent;
pub use platform::{AppIdentity, NullAccessor, PlatformAccessor, SystemAccessor};
pub use settings::Settings;
