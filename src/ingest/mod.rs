//! 采集协调器模块
//!
//! # 设计思路
//!
//! 每次剪贴板变化对应一轮采集：分类 → 指纹 → 回溯窗口内查重，
//! 然后三选一：
//!
//! - **Case A 新内容**：头部插入新条目，派发缩略图与来源应用
//!   补全任务，发出 `EntryAdded`。
//! - **Case B 命中且未锁定**：删旧插新（新 id），结转旧条目的
//!   缩略图与来源应用信息，`EntryAdded` 携带 `replaced_id` 供
//!   展示层原位替换。
//! - **Case C 命中且锁定中**：不动账本、不发通知，把候选条目
//!   排队为该锁的待替换（至多一个，后到覆盖先到）；解锁时若有
//!   排队则按 Case B 落库，否则仅把原条目移到头部并发出
//!   `EntryReordered`。
//!
//! 没有 Case C 的话，动画进行中的同一逻辑条目会被从列表里抽走，
//! 正在动画的 UI 组件随之销毁，产生可见的闪烁。延迟到解锁既保住
//! UI 连续性，又保证最终顺序正确。
//!
//! # 实现思路
//!
//! - 采集是单写者：观察循环线程是唯一的常规入库路径；解锁应用
//!   延迟替换是唯一的例外，两者都在锁表互斥锁内完成决策与落库，
//!   查重与替换对加锁/解锁原子。
//! - 分类/指纹失败静默丢弃（记日志）；账本写失败以降级错误上浮，
//!   循环本身继续运转。
//! - 缩略图与图标补全走 `tokio` 任务，发射后不管，绝不阻塞下一轮。

mod lock_table;
mod watcher;

pub use watcher::ClipboardWatcher;

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use lru::LruCache;

use crate::capture::{classify, fingerprint::fingerprint, CapturedContent, ContentKind, RawImage};
use crate::db::{HistoryEntry, Ledger, LedgerStats, NewEntry, Pinboard};
use crate::error::AppError;
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::platform::{AppIdentity, PlatformAccessor};
use crate::settings::{save_settings, Settings};
use crate::storage::{BlobStore, StorageInfo};
use crate::thumbnail::{self, ThumbnailConfig, ThumbnailTarget};

use lock_table::{LockTable, PendingReplacement};
use watcher::{IgnoreBudget, IgnoreGuard};

/// 来源应用图标缓存容量（按应用数，不是按条目数）
const ICON_CACHE_CAPACITY: usize = 64;

/// 图标统一缩到的最长边
const ICON_MAX_DIMENSION: u32 = 64;

/// 单轮采集的落库结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Case A：新条目入库
    Inserted { id: i64 },
    /// Case B：再复制置顶，旧条目被新 id 替换
    Replaced { id: i64, replaced_id: i64 },
    /// Case C：命中条目锁定中，候选已排队等待解锁
    Deferred { locked_id: i64 },
}

/// 剪贴板采集服务：协调器 + 对展示层暴露的操作面
///
/// `Arc` 共享；观察循环、缩略图任务与展示层调用都持有同一实例。
pub struct ClipboardService {
    me: Weak<ClipboardService>,
    accessor: Arc<dyn PlatformAccessor>,
    ledger: Ledger,
    blobs: BlobStore,
    notifier: ChangeNotifier,
    locks: Mutex<LockTable>,
    ignore: IgnoreBudget,
    settings: Mutex<Settings>,
    data_dir: PathBuf,
    runtime: tokio::runtime::Handle,
    icon_cache: Mutex<LruCache<String, Option<Vec<u8>>>>,
}

impl ClipboardService {
    /// 从数据目录加载设置并构建服务
    pub fn new(
        data_dir: &Path,
        accessor: Arc<dyn PlatformAccessor>,
        runtime: tokio::runtime::Handle,
    ) -> Result<Arc<Self>, AppError> {
        let settings = crate::settings::load_settings(data_dir)?;
        Self::with_settings(data_dir, settings, accessor, runtime)
    }

    /// 以显式设置构建服务（测试与嵌入场景）
    pub fn with_settings(
        data_dir: &Path,
        settings: Settings,
        accessor: Arc<dyn PlatformAccessor>,
        runtime: tokio::runtime::Handle,
    ) -> Result<Arc<Self>, AppError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Storage(format!("创建应用数据目录失败: {}", e)))?;

        let blobs = BlobStore::new(data_dir, settings.blob_dir.as_deref())?;

        let db_path = match settings.db_dir.as_deref() {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("clipboard.db"),
            _ => data_dir.join("clipboard.db"),
        };
        let ledger = Ledger::open(&db_path)?;

        let cache_size = NonZeroUsize::new(ICON_CACHE_CAPACITY)
            .ok_or_else(|| AppError::Storage("图标缓存容量无效".to_string()))?;

        Ok(Arc::new_cyclic(|me| ClipboardService {
            me: me.clone(),
            accessor,
            ledger,
            blobs,
            notifier: ChangeNotifier::new(),
            locks: Mutex::new(LockTable::default()),
            ignore: IgnoreBudget::default(),
            settings: Mutex::new(settings),
            data_dir: data_dir.to_path_buf(),
            runtime,
            icon_cache: Mutex::new(LruCache::new(cache_size)),
        }))
    }

    // ------------------------------------------------------------------------
    // 内部状态访问（互斥锁中毒时恢复继续，观察循环不能因此停摆）
    // ------------------------------------------------------------------------

    fn locks(&self) -> MutexGuard<'_, LockTable> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings_guard(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ignore_budget(&self) -> &IgnoreBudget {
        &self.ignore
    }

    pub(crate) fn event_min_interval_ms(&self) -> u64 {
        self.settings_guard().normalized_event_min_interval_ms()
    }

    fn current_thumbnail_config(&self) -> ThumbnailConfig {
        ThumbnailConfig::from(&self.settings_guard().thumbnail)
    }

    // ------------------------------------------------------------------------
    // 采集路径
    // ------------------------------------------------------------------------

    /// 观察循环的单轮采集：探测 → 读取 → 分类 → 入库
    ///
    /// 瞬态读取失败与不可分类内容静默跳过；只有账本层失败上浮，
    /// 由循环边界记录后继续下一轮。
    pub fn run_cycle(&self) -> Result<(), AppError> {
        let hint = self.accessor.detect_format();
        if hint.is_empty() {
            return Ok(());
        }

        let raw = match self.accessor.read_content(&hint) {
            Ok(raw) => raw,
            Err(err) => {
                log::debug!("⏭️ 剪贴板读取失败，跳过本轮: {err}");
                return Ok(());
            }
        };

        let Some(content) = classify(raw) else {
            return Ok(());
        };

        let source_app = self.accessor.frontmost_app();
        self.ingest(content, source_app).map(|_| ())
    }

    /// 核心状态机：对一个已分类内容执行查重/置顶/延迟决策
    ///
    /// 查重与落库在锁表互斥锁内完成，对 `lock_entry`/`unlock_entry`
    /// 原子；这是锁延迟语义正确性的前提。
    pub fn ingest(
        &self,
        content: CapturedContent,
        source_app: Option<AppIdentity>,
    ) -> Result<IngestOutcome, AppError> {
        let fp = fingerprint(&content);
        let window = self.settings_guard().effective_dedup_window();

        let mut locks = self.locks();
        let existing = self.ledger.find_recent_by_fingerprint(fp.as_str(), window)?;

        match existing {
            None => {
                drop(locks);
                let entry = self.insert_new(content, fp.as_str(), source_app)?;
                Ok(IngestOutcome::Inserted { id: entry.id })
            }
            Some(old) => {
                if locks.is_locked(old.id) {
                    locks.queue_replacement(
                        old.id,
                        PendingReplacement {
                            content,
                            source_app,
                        },
                    );
                    log::debug!("🔒 条目 {} 锁定中，置顶替换已排队", old.id);
                    return Ok(IngestOutcome::Deferred { locked_id: old.id });
                }

                let entry = self.apply_replacement(&old, content, source_app)?;
                Ok(IngestOutcome::Replaced {
                    id: entry.id,
                    replaced_id: old.id,
                })
            }
        }
    }

    /// 物化内容负载，返回（负载列值，缩略图对象）
    fn persist_payload(
        &self,
        content: &CapturedContent,
    ) -> Result<(String, Option<ThumbnailTarget>), AppError> {
        match content {
            CapturedContent::Text(text) => Ok((text.clone(), None)),
            CapturedContent::Link(url) => Ok((url.clone(), None)),
            CapturedContent::Image(image) => {
                let path = self.blobs.save_image(image)?;
                let payload = path.to_string_lossy().to_string();
                Ok((payload, Some(ThumbnailTarget::ImageBlob(path))))
            }
            CapturedContent::Files(paths) | CapturedContent::Audio(paths) => {
                // 多文件捕获只预览首个文件
                let target = paths
                    .first()
                    .map(|first| ThumbnailTarget::File(PathBuf::from(first)));
                Ok((paths.join("\n"), target))
            }
        }
    }

    /// Case A：新条目入库
    fn insert_new(
        &self,
        content: CapturedContent,
        fingerprint: &str,
        source_app: Option<AppIdentity>,
    ) -> Result<HistoryEntry, AppError> {
        let (payload, target) = self.persist_payload(&content)?;

        let entry = self.ledger.insert_at_head(NewEntry {
            kind: content.kind(),
            payload,
            fingerprint: fingerprint.to_string(),
            thumbnail: None,
            source_app_name: source_app.as_ref().map(|app| app.name.clone()),
            source_app_icon: None,
        })?;

        log::info!("📋 新条目入库: id={} kind={}", entry.id, entry.kind.as_str());
        self.notifier.emit(ChangeEvent::EntryAdded {
            entry: entry.clone(),
            replaced_id: None,
        });

        if let Some(target) = target {
            self.schedule_thumbnail(entry.id, target);
        }
        if let Some(app) = source_app {
            self.schedule_source_icon(entry.id, app);
        }

        self.prune_after_insert();
        Ok(entry)
    }

    /// Case B 效果：删旧插新并结转旧条目的补全信息
    ///
    /// 指纹相同即内容相同，旧缩略图/来源信息可以直接结转；
    /// 旧条目没有的信息用本次捕获新鲜补全。
    fn apply_replacement(
        &self,
        old: &HistoryEntry,
        content: CapturedContent,
        source_app: Option<AppIdentity>,
    ) -> Result<HistoryEntry, AppError> {
        let (payload, target) = match (&content, old.kind) {
            (CapturedContent::Image(_), ContentKind::Image) => {
                // 像素一致，负载文件复用；先插新行再删旧行，文件始终有引用
                let path = PathBuf::from(&old.payload);
                (old.payload.clone(), Some(ThumbnailTarget::ImageBlob(path)))
            }
            _ => self.persist_payload(&content)?,
        };

        let carried_name = old
            .source_app_name
            .clone()
            .or_else(|| source_app.as_ref().map(|app| app.name.clone()));

        let entry = self.ledger.insert_at_head(NewEntry {
            kind: content.kind(),
            payload,
            fingerprint: old.fingerprint.clone(),
            thumbnail: old.thumbnail.clone(),
            source_app_name: carried_name,
            source_app_icon: old.source_app_icon.clone(),
        })?;

        self.ledger.remove_by_id(old.id)?;

        log::debug!("📋 再复制置顶: {} -> {}", old.id, entry.id);
        self.notifier.emit(ChangeEvent::EntryAdded {
            entry: entry.clone(),
            replaced_id: Some(old.id),
        });

        if entry.thumbnail.is_none() {
            if let Some(target) = target {
                self.schedule_thumbnail(entry.id, target);
            }
        }
        if entry.source_app_icon.is_none() {
            if let Some(app) = source_app {
                self.schedule_source_icon(entry.id, app);
            }
        }

        Ok(entry)
    }

    /// 每次插入后把账本裁剪回上限；失败降级为日志
    fn prune_after_insert(&self) {
        let limit = self.settings_guard().history_limit;
        match self.ledger.prune_to_limit(limit) {
            Ok(0) => {}
            Ok(deleted) => log::debug!("🧹 超出历史上限，已裁剪 {deleted} 条"),
            Err(err) => log::warn!("历史裁剪失败: {err}"),
        }
    }

    // ------------------------------------------------------------------------
    // 异步补全（发射后不管，绝不阻塞采集）
    // ------------------------------------------------------------------------

    fn schedule_thumbnail(&self, id: i64, target: ThumbnailTarget) {
        let Some(service) = self.me.upgrade() else {
            return;
        };
        let config = self.current_thumbnail_config();

        self.runtime.spawn(async move {
            let accessor = Arc::clone(&service.accessor);
            let Some(bytes) = thumbnail::generate(accessor, &config, target).await else {
                log::debug!("🖼️ 条目 {id} 缩略图链路无产出（保持为空）");
                return;
            };

            match service.ledger.update_thumbnail(id, &bytes) {
                Ok(true) => {
                    service
                        .notifier
                        .emit(ChangeEvent::ThumbnailReady { id, thumbnail: bytes });
                }
                Ok(false) => log::debug!("条目 {id} 已删除，缩略图写入落空"),
                Err(err) => log::warn!("缩略图持久化失败: {err}"),
            }
        });
    }

    fn schedule_source_icon(&self, id: i64, app: AppIdentity) {
        let Some(service) = self.me.upgrade() else {
            return;
        };
        let timeout = self.current_thumbnail_config().timeout;

        self.runtime.spawn(async move {
            let key = app.cache_key();

            let cached = {
                let mut cache = service
                    .icon_cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                cache.get(&key).cloned()
            };

            let icon = match cached {
                Some(icon) => icon,
                None => {
                    let accessor = Arc::clone(&service.accessor);
                    let lookup = app.clone();
                    let raw = tokio::time::timeout(
                        timeout,
                        tokio::task::spawn_blocking(move || accessor.app_icon(&lookup)),
                    )
                    .await
                    .ok()
                    .and_then(|joined| joined.ok())
                    .flatten();

                    let encoded =
                        raw.and_then(|raw| thumbnail::encode_icon_png(&raw, ICON_MAX_DIMENSION));

                    let mut cache = service
                        .icon_cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    // 查不到也缓存，避免对无图标应用反复查询
                    cache.put(key, encoded.clone());
                    encoded
                }
            };

            if let Some(icon) = icon {
                if let Err(err) = service.ledger.update_source_app(id, &app.name, Some(&icon)) {
                    log::warn!("来源应用信息持久化失败: {err}");
                }
            }
        });
    }

    // ------------------------------------------------------------------------
    // 锁协议
    // ------------------------------------------------------------------------

    /// 在启动依赖条目位置的动画前调用
    pub fn lock_entry(&self, id: i64) {
        let mut locks = self.locks();
        if locks.lock(id) {
            log::debug!("🔒 条目 {id} 已锁定");
        }
    }

    /// 动画结束（含出错/取消路径）时恰好调用一次
    ///
    /// 有排队替换则现在应用 Case B 效果；没有则仅把原条目移到
    /// 头部并发出 `EntryReordered`。解锁未锁定的 id 是安全 no-op。
    pub fn unlock_entry(&self, id: i64) -> Result<(), AppError> {
        let mut locks = self.locks();
        match locks.unlock(id) {
            None => Ok(()),
            Some(None) => {
                if self.ledger.touch_to_head(id)? {
                    self.notifier.emit(ChangeEvent::EntryReordered { id });
                }
                Ok(())
            }
            Some(Some(pending)) => {
                let Some(old) = self.ledger.get_entry(id)? else {
                    // 锁定期间条目被删除，排队作废
                    return Ok(());
                };
                self.apply_replacement(&old, pending.content, pending.source_app)?;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // 对展示层暴露的查询与变更
    // ------------------------------------------------------------------------

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn get_history(&self, limit: u32, offset: u32) -> Result<Vec<HistoryEntry>, AppError> {
        self.ledger.get_history(limit, offset)
    }

    pub fn search(&self, term: &str, limit: u32) -> Result<Vec<HistoryEntry>, AppError> {
        self.ledger.search(term, limit)
    }

    pub fn entry_count(&self) -> Result<i64, AppError> {
        self.ledger.entry_count()
    }

    pub fn stats(&self) -> Result<LedgerStats, AppError> {
        self.ledger.stats()
    }

    pub fn delete(&self, id: i64) -> Result<bool, AppError> {
        self.ledger.remove_by_id(id)
    }

    pub fn toggle_favorite(&self, id: i64) -> Result<bool, AppError> {
        self.ledger.toggle_favorite(id)
    }

    /// 清空所有非收藏、非钉选条目，返回删除数量
    pub fn clear_history(&self) -> Result<usize, AppError> {
        self.ledger.clear_history()
    }

    /// 更新历史上限并立即裁剪，返回删除数量
    pub fn set_history_limit(&self, limit: u32) -> Result<usize, AppError> {
        {
            let mut settings = self.settings_guard();
            settings.history_limit = limit;
            save_settings(&self.data_dir, &settings)?;
        }
        self.ledger.prune_to_limit(limit)
    }

    /// 删除早于指定天数的普通条目，返回删除数量
    pub fn prune_older_than_days(&self, days: i64) -> Result<usize, AppError> {
        if days <= 0 {
            return Ok(0);
        }
        let cutoff = chrono::Utc::now().timestamp_millis() - days * 24 * 60 * 60 * 1000;
        self.ledger.prune_older_than(cutoff)
    }

    /// 把条目内容写回系统剪贴板
    ///
    /// 写回不经过采集管线：忽略预算保证监听回调跳过这次变化。
    pub fn copy_back(&self, id: i64) -> Result<(), AppError> {
        let entry = self
            .ledger
            .get_entry(id)?
            .ok_or(AppError::EntryNotFound(id))?;

        match entry.kind {
            ContentKind::Text | ContentKind::Link => {
                let _guard = IgnoreGuard::new(&self.ignore);
                self.accessor
                    .write_text(&entry.payload)
                    .map_err(|e| AppError::Clipboard(e.to_string()))
            }
            ContentKind::Image => {
                let img = image::open(&entry.payload)
                    .map_err(|e| AppError::Clipboard(format!("打开图片负载失败: {}", e)))?;
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                let raw = RawImage {
                    width: width as usize,
                    height: height as usize,
                    rgba: rgba.into_raw(),
                };

                let _guard = IgnoreGuard::new(&self.ignore);
                self.accessor
                    .write_image(&raw)
                    .map_err(|e| AppError::Clipboard(e.to_string()))
            }
            ContentKind::Files | ContentKind::Audio => {
                let paths: Vec<String> = entry.payload.lines().map(str::to_string).collect();
                let _guard = IgnoreGuard::new(&self.ignore);
                self.accessor
                    .write_files(&paths)
                    .map_err(|e| AppError::Clipboard(e.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------------
    // 钉板
    // ------------------------------------------------------------------------

    pub fn pinboard_items(&self, pinboard_id: i64) -> Result<Vec<HistoryEntry>, AppError> {
        self.ledger.pinboard_items(pinboard_id)
    }

    pub fn set_pinboard(&self, id: i64, pinboard_id: Option<i64>) -> Result<(), AppError> {
        self.ledger.set_pinboard(id, pinboard_id)
    }

    pub fn list_pinboards(&self) -> Result<Vec<Pinboard>, AppError> {
        self.ledger.list_pinboards()
    }

    pub fn create_pinboard(&self, name: String) -> Result<Pinboard, AppError> {
        self.ledger.create_pinboard(name)
    }

    pub fn rename_pinboard(&self, id: i64, name: String) -> Result<(), AppError> {
        self.ledger.rename_pinboard(id, name)
    }

    pub fn delete_pinboard(&self, id: i64) -> Result<(), AppError> {
        self.ledger.delete_pinboard(id)
    }

    // ------------------------------------------------------------------------
    // 杂项
    // ------------------------------------------------------------------------

    /// 当前设置快照
    pub fn settings(&self) -> Settings {
        self.settings_guard().clone()
    }

    /// 图片负载目录统计
    pub fn storage_info(&self) -> StorageInfo {
        self.blobs.info()
    }
}
