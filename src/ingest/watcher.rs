//! 剪贴板观察循环
//!
//! # 设计思路
//!
//! `clipboard-master` 在独立线程上监听系统剪贴板变化，把唤醒信号
//! 送进通道；采集线程收到信号后节流合并，再执行协调器的单轮采集。
//! 监听退出或创建失败时按指数退避重启，单轮采集失败只记日志，
//! 下一轮必然继续——一次失败绝不终止循环。
//!
//! # 实现思路
//!
//! - **忽略预算**：应用自身写回剪贴板（copy-back）前增加预算，
//!   监听回调逐次消费，保证写回不会重新进入采集管线。
//! - **节流**：两轮采集之间保持最小间隔，睡眠期间积压的信号
//!   合并为一轮（剪贴板总是读取最新状态，丢弃中间信号无损）。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clipboard_master::{CallbackResult, ClipboardHandler, Master};

use super::ClipboardService;

const MONITOR_RESTART_BASE_DELAY_MS: u64 = 100;
const MONITOR_RESTART_MAX_DELAY_MS: u64 = 5_000;

// ============================================================================
// 忽略预算
// ============================================================================

/// copy-back 写回的变化事件忽略预算
///
/// 写回前增加，监听回调消费；跨线程用原子计数，无锁。
#[derive(Debug, Default)]
pub(crate) struct IgnoreBudget {
    counter: AtomicU32,
}

impl IgnoreBudget {
    pub fn arm(&self, n: u32) {
        self.counter.fetch_add(n, Ordering::SeqCst);
        log::debug!("🚫 已设置剪贴板忽略预算 +{n}");
    }

    /// 消费一次预算；返回剩余量，未设置时返回 `None`
    pub fn try_consume(&self) -> Option<u32> {
        self.counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }
}

/// 忽略预算的 RAII 守卫
///
/// 构造时设置预算；预算由监听回调消费，`Drop` 无需动作。
/// `let _guard = IgnoreGuard::new(&budget);` 把"这次写入不要被采集"
/// 的意图与写入语句绑定在同一作用域里。
pub(crate) struct IgnoreGuard;

impl IgnoreGuard {
    pub fn new(budget: &IgnoreBudget) -> Self {
        budget.arm(1);
        IgnoreGuard
    }
}

// ============================================================================
// 纯辅助函数
// ============================================================================

fn compute_restart_backoff_ms(restart_attempt: u32) -> u64 {
    let exp = 1_u64 << restart_attempt.saturating_sub(1).min(6);
    MONITOR_RESTART_BASE_DELAY_MS
        .saturating_mul(exp)
        .min(MONITOR_RESTART_MAX_DELAY_MS)
}

fn throttle_remaining(elapsed: Duration, min_interval: Duration) -> Option<Duration> {
    if elapsed >= min_interval {
        None
    } else {
        Some(min_interval - elapsed)
    }
}

// ============================================================================
// 监听器
// ============================================================================

/// 剪贴板变化处理器（内部实现）
///
/// 过滤应用自身触发的变化后，把唤醒信号交给采集线程。
struct Handler {
    tx: mpsc::Sender<()>,
    service: Arc<ClipboardService>,
}

impl ClipboardHandler for Handler {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        if let Some(remaining) = self.service.ignore_budget().try_consume() {
            log::debug!("⏭️  忽略应用主动触发的剪贴板变化，剩余预算: {remaining}");
            return CallbackResult::Next;
        }

        let _ = self.tx.send(());
        CallbackResult::Next
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板错误：{}", error);
        CallbackResult::Next
    }
}

/// 剪贴板观察器：监听线程 + 采集线程
pub struct ClipboardWatcher;

impl ClipboardWatcher {
    /// 启动观察循环（后台线程，随进程退出）
    pub fn start(service: Arc<ClipboardService>) {
        let (tx, rx) = mpsc::channel();
        Self::spawn_monitor(tx, Arc::clone(&service));
        Self::spawn_ingest_loop(rx, service);
    }

    fn spawn_monitor(tx: mpsc::Sender<()>, service: Arc<ClipboardService>) {
        thread::spawn(move || {
            let mut restart_attempt: u32 = 0;
            loop {
                let handler = Handler {
                    tx: tx.clone(),
                    service: Arc::clone(&service),
                };
                match Master::new(handler) {
                    Ok(mut master) => {
                        restart_attempt = 0;
                        log::info!("📋 剪贴板监听已启动");
                        let _ = master.run();
                        log::warn!("📋 剪贴板监听已退出，将尝试重启");
                    }
                    Err(err) => {
                        log::error!("📋 创建剪贴板监听失败: {}", err);
                    }
                }

                restart_attempt = restart_attempt.saturating_add(1);
                let backoff_ms = compute_restart_backoff_ms(restart_attempt);
                log::warn!("📋 剪贴板监听 {}ms 后重试（attempt={}）", backoff_ms, restart_attempt);
                thread::sleep(Duration::from_millis(backoff_ms));
            }
        });
    }

    fn spawn_ingest_loop(rx: mpsc::Receiver<()>, service: Arc<ClipboardService>) {
        thread::spawn(move || {
            let mut last_cycle: Option<Instant> = None;

            while rx.recv().is_ok() {
                let min_interval = Duration::from_millis(service.event_min_interval_ms());
                if let Some(last) = last_cycle {
                    if let Some(remaining) = throttle_remaining(last.elapsed(), min_interval) {
                        thread::sleep(remaining);
                    }
                }

                // 合并睡眠期间积压的信号：剪贴板读取的总是最新状态
                while rx.try_recv().is_ok() {}

                last_cycle = Some(Instant::now());
                if let Err(err) = service.run_cycle() {
                    // 循环边界兜底：单轮失败不终止观察
                    log::error!("📋 采集循环处理失败（下一轮继续）: {err}");
                }
            }

            log::warn!("📋 监听通道关闭，采集线程退出");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_restart_backoff_ms, throttle_remaining, IgnoreBudget};
    use std::time::Duration;

    #[test]
    fn throttle_remaining_returns_expected_values() {
        let min = Duration::from_millis(80);
        assert_eq!(
            throttle_remaining(Duration::from_millis(20), min),
            Some(Duration::from_millis(60))
        );
        assert_eq!(throttle_remaining(Duration::from_millis(80), min), None);
        assert_eq!(throttle_remaining(Duration::from_millis(120), min), None);
    }

    #[test]
    fn restart_backoff_grows_then_caps() {
        assert_eq!(compute_restart_backoff_ms(1), 100);
        assert_eq!(compute_restart_backoff_ms(2), 200);
        assert_eq!(compute_restart_backoff_ms(3), 400);
        assert_eq!(compute_restart_backoff_ms(7), 5_000);
        assert_eq!(compute_restart_backoff_ms(20), 5_000);
    }

    #[test]
    fn ignore_budget_consumes_exactly_what_was_armed() {
        let budget = IgnoreBudget::default();
        assert_eq!(budget.try_consume(), None);

        budget.arm(2);
        assert_eq!(budget.try_consume(), Some(1));
        assert_eq!(budget.try_consume(), Some(0));
        assert_eq!(budget.try_consume(), None);
    }
}
