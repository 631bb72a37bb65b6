//! 采集管线端到端场景测试
//!
//! 只经公开 API 驱动：构建服务、注入内容、订阅事件、断言账本状态。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clipboard_ingest::capture::{classify, FormatHint, RawCapture, RawImage};
use clipboard_ingest::platform::ReadFailure;
use clipboard_ingest::{
    AppIdentity, CapturedContent, ChangeEvent, ClipboardService, ContentKind, IngestOutcome,
    NullAccessor, PlatformAccessor, Settings,
};

fn unique_temp_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock error")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("clipingest-flow-test-{nanos}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn build_service(accessor: Arc<dyn PlatformAccessor>) -> (Arc<ClipboardService>, PathBuf) {
    let dir = unique_temp_dir();
    let service = ClipboardService::with_settings(
        &dir,
        Settings::default(),
        accessor,
        tokio::runtime::Handle::current(),
    )
    .expect("build service");
    (service, dir)
}

fn text(s: &str) -> CapturedContent {
    CapturedContent::Text(s.to_string())
}

#[tokio::test]
async fn scenario_a_repeated_text_keeps_single_entry_with_replaced_id() {
    let (service, dir) = build_service(Arc::new(NullAccessor));
    let mut events = service.subscribe();

    let first = service.ingest(text("hello"), None).expect("first ingest");
    let IngestOutcome::Inserted { id: first_id } = first else {
        panic!("expected insert, got {first:?}");
    };

    let history = service.get_history(10, 0).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, ContentKind::Text);
    assert!(history[0].thumbnail.is_none());

    let second = service.ingest(text("hello"), None).expect("second ingest");
    let IngestOutcome::Replaced { id, replaced_id } = second else {
        panic!("expected replace, got {second:?}");
    };
    assert_eq!(replaced_id, first_id);

    let history = service.get_history(10, 0).expect("history after replace");
    assert_eq!(history.len(), 1, "one logical item keeps one row");
    assert_eq!(history[0].id, id);

    match events.try_recv().expect("first event") {
        ChangeEvent::EntryAdded { replaced_id, .. } => assert_eq!(replaced_id, None),
        other => panic!("unexpected event: {other:?}"),
    }
    match events.try_recv().expect("second event") {
        ChangeEvent::EntryAdded { replaced_id, .. } => assert_eq!(replaced_id, Some(first_id)),
        other => panic!("unexpected event: {other:?}"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// 只认首个文件的预览访问器
struct FirstFileOnly;

impl PlatformAccessor for FirstFileOnly {
    fn detect_format(&self) -> FormatHint {
        FormatHint::default()
    }

    fn read_content(&self, _hint: &FormatHint) -> Result<RawCapture, ReadFailure> {
        Ok(RawCapture::default())
    }

    fn frontmost_app(&self) -> Option<AppIdentity> {
        None
    }

    fn app_icon(&self, _app: &AppIdentity) -> Option<RawImage> {
        None
    }

    fn document_preview(&self, path: &Path, _max_px: u32) -> Option<RawImage> {
        (path.file_name().and_then(|n| n.to_str()) == Some("a.png")).then(|| RawImage {
            width: 16,
            height: 16,
            rgba: vec![90u8; 16 * 16 * 4],
        })
    }

    fn file_type_icon(&self, _path: &Path) -> Option<RawImage> {
        None
    }

    fn write_text(&self, _text: &str) -> Result<(), ReadFailure> {
        Ok(())
    }

    fn write_image(&self, _image: &RawImage) -> Result<(), ReadFailure> {
        Ok(())
    }

    fn write_files(&self, _paths: &[String]) -> Result<(), ReadFailure> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_b_file_list_creates_one_entry_and_thumbnails_first_file() {
    let (service, dir) = build_service(Arc::new(FirstFileOnly));
    let mut events = service.subscribe();

    let outcome = service
        .ingest(
            CapturedContent::Files(vec![
                "/data/a.png".to_string(),
                "/data/b.txt".to_string(),
                "/data/c.pdf".to_string(),
            ]),
            None,
        )
        .expect("ingest file list");
    let IngestOutcome::Inserted { id } = outcome else {
        panic!("expected insert, got {outcome:?}");
    };

    let history = service.get_history(10, 0).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, ContentKind::Files);

    // 跳过 EntryAdded，等缩略图；预览只对 a.png 可用，
    // 等得到就绪事件即证明目标是首个文件
    let added = events.recv().await.expect("added event");
    assert!(matches!(added, ChangeEvent::EntryAdded { .. }));

    let ready = tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("thumbnail within timeout")
        .expect("channel open");
    match ready {
        ChangeEvent::ThumbnailReady { id: ready_id, thumbnail } => {
            assert_eq!(ready_id, id);
            assert!(!thumbnail.is_empty());
        }
        other => panic!("expected ThumbnailReady, got {other:?}"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn scenario_c_lock_queues_latest_replacement_until_unlock() {
    let (service, dir) = build_service(Arc::new(NullAccessor));

    let IngestOutcome::Inserted { id } = service.ingest(text("payload"), None).expect("seed")
    else {
        panic!("expected insert");
    };

    let mut events = service.subscribe();
    service.lock_entry(id);

    let r1 = service
        .ingest(
            text("payload"),
            Some(AppIdentity {
                name: "EditorOne".to_string(),
                identifier: None,
            }),
        )
        .expect("ingest r1");
    let r2 = service
        .ingest(
            text("payload"),
            Some(AppIdentity {
                name: "EditorTwo".to_string(),
                identifier: None,
            }),
        )
        .expect("ingest r2");

    assert_eq!(r1, IngestOutcome::Deferred { locked_id: id });
    assert_eq!(r2, IngestOutcome::Deferred { locked_id: id });

    // 锁定期间：账本不动、零通知
    assert_eq!(service.entry_count().expect("count"), 1);
    assert_eq!(service.get_history(1, 0).expect("history")[0].id, id);
    assert!(events.try_recv().is_err());

    service.unlock_entry(id).expect("unlock");

    let history = service.get_history(10, 0).expect("history after unlock");
    assert_eq!(history.len(), 1);
    assert_ne!(history[0].id, id, "original row is gone");
    assert_eq!(
        history[0].source_app_name.as_deref(),
        Some("EditorTwo"),
        "the second queued capture wins"
    );

    match events.try_recv().expect("deferred event") {
        ChangeEvent::EntryAdded { replaced_id, .. } => assert_eq!(replaced_id, Some(id)),
        other => panic!("unexpected event: {other:?}"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn classification_prefers_file_list_over_text_of_same_selection() {
    let raw = RawCapture {
        files: vec!["/home/user/report.pdf".to_string()],
        image: None,
        text: Some("/home/user/report.pdf".to_string()),
    };

    let content = classify(raw).expect("classify");
    assert_eq!(content.kind(), ContentKind::Files);
}

#[tokio::test]
async fn favorites_survive_clear_history() {
    let (service, dir) = build_service(Arc::new(NullAccessor));

    let IngestOutcome::Inserted { id } = service.ingest(text("keep me"), None).expect("ingest")
    else {
        panic!("expected insert");
    };
    service.toggle_favorite(id).expect("favorite");
    service.ingest(text("discard one"), None).expect("ingest");
    service.ingest(text("discard two"), None).expect("ingest");

    let deleted = service.clear_history().expect("clear");
    assert_eq!(deleted, 2);

    let history = service.get_history(10, 0).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);

    let _ = std::fs::remove_dir_all(&dir);
}
