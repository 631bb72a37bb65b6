//! # 剪贴板采集守护进程 — 应用入口
//!
//! 本文件仅负责初始化与装配：日志、运行时、服务、观察循环。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。
//! 守护进程本身没有 UI，事件订阅仅用于落日志；展示层进程
//! 通过库接口自行订阅。

use std::path::PathBuf;
use std::sync::Arc;

use clipboard_ingest::{ChangeEvent, ClipboardService, ClipboardWatcher, SystemAccessor};

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("clipboard-ingest"))
        .unwrap_or_else(|| PathBuf::from(".clipboard-ingest"))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("setup: begin");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("创建异步运行时失败");

    let data_dir = data_dir();
    log::info!("setup: data dir {}", data_dir.display());

    let service = ClipboardService::new(
        &data_dir,
        Arc::new(SystemAccessor::new()),
        runtime.handle().clone(),
    )
    .expect("初始化剪贴板采集服务失败");

    let mut events = service.subscribe();

    ClipboardWatcher::start(Arc::clone(&service));
    log::info!("setup: complete");

    runtime.block_on(async move {
        loop {
            match events.recv().await {
                Ok(ChangeEvent::EntryAdded { entry, replaced_id }) => match replaced_id {
                    Some(old) => log::info!(
                        "📋 置顶: {} -> {} ({})",
                        old,
                        entry.id,
                        entry.kind.as_str()
                    ),
                    None => log::info!("📋 新条目: {} ({})", entry.id, entry.kind.as_str()),
                },
                Ok(ChangeEvent::EntryReordered { id }) => {
                    log::info!("📋 重排: {id}");
                }
                Ok(ChangeEvent::ThumbnailReady { id, thumbnail }) => {
                    log::info!("🖼️ 缩略图就绪: {} ({} 字节)", id, thumbnail.len());
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("事件消费滞后，丢失 {missed} 条");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
