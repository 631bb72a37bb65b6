//! Windows 平台能力实现
//!
//! 文件列表（CF_HDROP）读写、前台进程识别、Shell 缩略图与
//! 文件类型图标提取。所有函数失败时返回 `None`/`Err`，不向上抛。

use std::ffi::OsString;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use windows::Win32::Foundation::{CloseHandle, GlobalFree, HWND, SIZE};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, GetClipboardData, IsClipboardFormatAvailable, OpenClipboard,
    SetClipboardData,
};
use windows::Win32::System::Memory::{GlobalAlloc, GlobalLock, GlobalUnlock, GMEM_MOVEABLE};
use windows::Win32::System::Ole::{CF_DIB, CF_HDROP, CF_UNICODETEXT};
use windows::Win32::UI::Shell::{DragQueryFileW, DROPFILES, HDROP};

use crate::capture::{FormatHint, RawImage};

use super::{AppIdentity, ReadFailure};

fn to_wide(s: &str) -> Vec<u16> {
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

// ============================================================================
// 格式探测与文件列表读写
// ============================================================================

/// 廉价探测剪贴板上存在的表示，不打开剪贴板、不物化数据
pub(super) fn probe_formats() -> FormatHint {
    unsafe {
        FormatHint {
            has_files: IsClipboardFormatAvailable(CF_HDROP.0 as u32).is_ok(),
            has_image: IsClipboardFormatAvailable(CF_DIB.0 as u32).is_ok(),
            has_text: IsClipboardFormatAvailable(CF_UNICODETEXT.0 as u32).is_ok(),
        }
    }
}

/// 从剪贴板读取 CF_HDROP 文件列表
///
/// 剪贴板被占用或无文件数据时返回 `None`。
pub(super) fn read_file_list() -> Option<Vec<String>> {
    unsafe {
        if OpenClipboard(None).is_err() {
            return None;
        }

        let result = (|| -> Option<Vec<String>> {
            let handle = GetClipboardData(CF_HDROP.0 as u32).ok()?;

            let hdrop = HDROP(handle.0);
            let count = DragQueryFileW(hdrop, 0xFFFFFFFF, None);
            if count == 0 {
                return None;
            }

            let mut files = Vec::with_capacity(count as usize);
            for i in 0..count {
                let len = DragQueryFileW(hdrop, i, None);
                if len == 0 {
                    continue;
                }

                let mut buf = vec![0u16; (len + 1) as usize];
                DragQueryFileW(hdrop, i, Some(&mut buf));

                if let Some(pos) = buf.iter().position(|&c| c == 0) {
                    buf.truncate(pos);
                }

                files.push(OsString::from_wide(&buf).to_string_lossy().to_string());
            }

            if files.is_empty() {
                None
            } else {
                log::debug!("📁 从剪贴板读取到 {} 个文件", files.len());
                Some(files)
            }
        })();

        let _ = CloseClipboard();
        result
    }
}

/// 将文件列表以 CF_HDROP 写回剪贴板
pub(super) fn write_file_list(paths: &[String]) -> Result<(), ReadFailure> {
    if paths.is_empty() {
        return Err(ReadFailure::WriteRejected("没有可写回的文件路径".to_string()));
    }

    let encoded_paths: Vec<Vec<u16>> = paths.iter().map(|path| to_wide(path)).collect();

    unsafe {
        OpenClipboard(None)
            .map_err(|e| ReadFailure::Unavailable(format!("打开剪贴板失败：{:?}", e)))?;

        EmptyClipboard().map_err(|e| {
            let _ = CloseClipboard();
            ReadFailure::WriteRejected(format!("清空剪贴板失败：{:?}", e))
        })?;

        let mut size = std::mem::size_of::<DROPFILES>();
        size += encoded_paths
            .iter()
            .map(|wide| wide.len() * std::mem::size_of::<u16>())
            .sum::<usize>();
        size += std::mem::size_of::<u16>();

        let hglobal = GlobalAlloc(GMEM_MOVEABLE, size).map_err(|e| {
            let _ = CloseClipboard();
            ReadFailure::WriteRejected(format!("分配内存失败：{:?}", e))
        })?;

        let ptr = GlobalLock(hglobal) as *mut u8;
        if ptr.is_null() {
            let _ = GlobalFree(Some(hglobal));
            let _ = CloseClipboard();
            return Err(ReadFailure::WriteRejected("锁定内存失败".to_string()));
        }

        let drop_files = ptr as *mut DROPFILES;
        std::ptr::write_bytes(drop_files, 0, 1);
        (*drop_files).pFiles = std::mem::size_of::<DROPFILES>() as u32;
        (*drop_files).pt.x = 0;
        (*drop_files).pt.y = 0;
        (*drop_files).fNC = false.into();
        (*drop_files).fWide = true.into();

        let mut file_ptr = ptr.add(std::mem::size_of::<DROPFILES>()) as *mut u16;
        for wide in &encoded_paths {
            std::ptr::copy_nonoverlapping(wide.as_ptr(), file_ptr, wide.len());
            file_ptr = file_ptr.add(wide.len());
        }
        *file_ptr = 0;

        let _ = GlobalUnlock(hglobal);

        if let Err(e) = SetClipboardData(
            CF_HDROP.0 as u32,
            Some(windows::Win32::Foundation::HANDLE(hglobal.0)),
        ) {
            let _ = GlobalFree(Some(hglobal));
            let _ = CloseClipboard();
            return Err(ReadFailure::WriteRejected(format!("设置剪贴板数据失败：{:?}", e)));
        }

        let _ = CloseClipboard();
        log::debug!("📋 文件已写回剪贴板：{} 个", paths.len());
        Ok(())
    }
}

// ============================================================================
// 前台应用识别
// ============================================================================

/// 识别当前前台窗口所属进程
///
/// 权限不足或无前台窗口时返回 `None`。
pub(super) fn frontmost_app() -> Option<AppIdentity> {
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

    unsafe {
        let hwnd: HWND = GetForegroundWindow();
        if hwnd.0.is_null() {
            return None;
        }

        let mut pid: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
        if pid == 0 {
            return None;
        }

        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;

        let mut buf = vec![0u16; 1024];
        let mut len = buf.len() as u32;
        let query = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(handle);
        query.ok()?;

        buf.truncate(len as usize);
        let exe_path = OsString::from_wide(&buf).to_string_lossy().to_string();
        let name = Path::new(&exe_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.to_string())?;

        Some(AppIdentity {
            name,
            identifier: Some(exe_path),
        })
    }
}

// ============================================================================
// Shell 缩略图与文件类型图标
// ============================================================================

/// 通过 Shell 缩略图服务渲染文档预览
///
/// 覆盖文档、媒体等多种文件类型；不可用时返回 `None`。
pub(super) fn document_preview(path: &Path, max_px: u32) -> Option<RawImage> {
    use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};
    use windows::Win32::UI::Shell::{
        IShellItemImageFactory, SHCreateItemFromParsingName, SIIGBF_BIGGERSIZEOK,
        SIIGBF_RESIZETOFIT,
    };

    let wide = to_wide(&path.to_string_lossy());
    let side = max_px.max(1) as i32;

    unsafe {
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        let need_uninit = hr.is_ok();
        if !hr.is_ok() && hr != RPC_E_CHANGED_MODE {
            return None;
        }

        let result = (|| -> Option<RawImage> {
            let factory: IShellItemImageFactory =
                SHCreateItemFromParsingName(windows::core::PCWSTR(wide.as_ptr()), None).ok()?;

            let hbitmap = factory
                .GetImage(
                    SIZE { cx: side, cy: side },
                    SIIGBF_RESIZETOFIT | SIIGBF_BIGGERSIZEOK,
                )
                .ok()?;

            let image = bitmap_to_rgba(hbitmap);
            let _ = windows::Win32::Graphics::Gdi::DeleteObject(hbitmap.into());
            image
        })();

        if need_uninit {
            CoUninitialize();
        }

        result
    }
}

/// 将 32 位 HBITMAP 转为 RGBA 像素缓冲
fn bitmap_to_rgba(hbitmap: windows::Win32::Graphics::Gdi::HBITMAP) -> Option<RawImage> {
    use windows::Win32::Graphics::Gdi::{
        GetDC, GetDIBits, ReleaseDC, BITMAPINFO, BITMAPINFOHEADER, DIB_RGB_COLORS, GetObjectW,
        BITMAP,
    };

    unsafe {
        let mut bmp = BITMAP::default();
        let got = GetObjectW(
            hbitmap.into(),
            std::mem::size_of::<BITMAP>() as i32,
            Some(&mut bmp as *mut BITMAP as *mut std::ffi::c_void),
        );
        if got == 0 || bmp.bmWidth <= 0 || bmp.bmHeight <= 0 {
            return None;
        }

        let width = bmp.bmWidth;
        let height = bmp.bmHeight;
        let pixel_count = (width as usize) * (height as usize);

        let mut bmi_header = BITMAPINFOHEADER::default();
        bmi_header.biSize = std::mem::size_of::<BITMAPINFOHEADER>() as u32;
        bmi_header.biWidth = width;
        bmi_header.biHeight = -height;
        bmi_header.biPlanes = 1;
        bmi_header.biBitCount = 32;

        let mut bmi = BITMAPINFO {
            bmiHeader: bmi_header,
            ..Default::default()
        };

        let mut bgra = vec![0u8; pixel_count * 4];
        let hdc = GetDC(None);
        let copied = GetDIBits(
            hdc,
            hbitmap,
            0,
            height as u32,
            Some(bgra.as_mut_ptr() as *mut std::ffi::c_void),
            &mut bmi,
            DIB_RGB_COLORS,
        );
        let _ = ReleaseDC(None, hdc);

        if copied == 0 {
            return None;
        }

        // BGRA -> RGBA；全零 alpha 的位图按不透明处理
        let any_alpha = bgra.chunks_exact(4).any(|px| px[3] != 0);
        let mut rgba = vec![0u8; pixel_count * 4];
        for (dst, src) in rgba.chunks_exact_mut(4).zip(bgra.chunks_exact(4)) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = if any_alpha { src[3] } else { 0xFF };
        }

        Some(RawImage {
            width: width as usize,
            height: height as usize,
            rgba,
        })
    }
}

/// 提取文件类型图标（兜底策略）
///
/// 图标无 alpha 通道信息，采用黑白双底渲染差值恢复透明度。
pub(super) fn file_type_icon(path: &Path) -> Option<RawImage> {
    use windows::Win32::Foundation::{COLORREF, RECT};
    use windows::Win32::Graphics::Gdi::*;
    use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_NORMAL;
    use windows::Win32::UI::Shell::{
        SHGetFileInfoW, SHFILEINFOW, SHGFI_ICON, SHGFI_LARGEICON, SHGFI_USEFILEATTRIBUTES,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        DestroyIcon, DrawIconEx, GetSystemMetrics, DI_NORMAL, SM_CXICON,
    };

    let input = path.to_string_lossy().to_string();
    let exists = path.exists();
    let wide = to_wide(&input);

    unsafe {
        let mut shfi = SHFILEINFOW::default();
        let mut flags = SHGFI_ICON | SHGFI_LARGEICON;
        if !exists {
            flags |= SHGFI_USEFILEATTRIBUTES;
        }

        let mut result = SHGetFileInfoW(
            windows::core::PCWSTR(wide.as_ptr()),
            if exists {
                windows::Win32::Storage::FileSystem::FILE_FLAGS_AND_ATTRIBUTES(0)
            } else {
                FILE_ATTRIBUTE_NORMAL
            },
            Some(&mut shfi),
            std::mem::size_of::<SHFILEINFOW>() as u32,
            flags,
        );

        // 路径查不到时退化为按扩展名查类型图标
        if result == 0 {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                let dummy = format!("file.{}", ext);
                let wide_dummy = to_wide(&dummy);
                result = SHGetFileInfoW(
                    windows::core::PCWSTR(wide_dummy.as_ptr()),
                    FILE_ATTRIBUTE_NORMAL,
                    Some(&mut shfi),
                    std::mem::size_of::<SHFILEINFOW>() as u32,
                    flags | SHGFI_USEFILEATTRIBUTES,
                );
            }
        }

        if result == 0 || shfi.hIcon.0.is_null() {
            return None;
        }

        let size: i32 = GetSystemMetrics(SM_CXICON).max(32);
        let pixel_count = (size * size) as usize;

        let hdc_screen = GetDC(None);
        let hdc_mem = CreateCompatibleDC(Some(hdc_screen));

        let mut bmi_header = BITMAPINFOHEADER::default();
        bmi_header.biSize = std::mem::size_of::<BITMAPINFOHEADER>() as u32;
        bmi_header.biWidth = size;
        bmi_header.biHeight = -size;
        bmi_header.biPlanes = 1;
        bmi_header.biBitCount = 32;

        let bmi = BITMAPINFO {
            bmiHeader: bmi_header,
            bmiColors: [RGBQUAD::default()],
        };

        let mut bits_ptr: *mut std::ffi::c_void = std::ptr::null_mut();
        let created = CreateDIBSection(Some(hdc_mem), &bmi, DIB_RGB_COLORS, &mut bits_ptr, None, 0);
        let Ok(dib) = created else {
            let _ = DeleteDC(hdc_mem);
            let _ = ReleaseDC(None, hdc_screen);
            let _ = DestroyIcon(shfi.hIcon);
            return None;
        };
        if bits_ptr.is_null() {
            let _ = DeleteObject(dib.into());
            let _ = DeleteDC(hdc_mem);
            let _ = ReleaseDC(None, hdc_screen);
            let _ = DestroyIcon(shfi.hIcon);
            return None;
        }
        let old_bmp = SelectObject(hdc_mem, dib.into());

        let rect = RECT {
            left: 0,
            top: 0,
            right: size,
            bottom: size,
        };

        let black_brush = CreateSolidBrush(COLORREF(0x00000000));
        FillRect(hdc_mem, &rect, black_brush);
        let _ = DeleteObject(black_brush.into());

        let _ = DrawIconEx(
            hdc_mem,
            0,
            0,
            shfi.hIcon,
            size,
            size,
            0,
            Some(HBRUSH::default()),
            DI_NORMAL,
        );

        let src_b = std::slice::from_raw_parts(bits_ptr as *const u8, pixel_count * 4);
        let pass_black: Vec<u8> = src_b.to_vec();

        let white_brush = CreateSolidBrush(COLORREF(0x00FFFFFF));
        FillRect(hdc_mem, &rect, white_brush);
        let _ = DeleteObject(white_brush.into());

        let _ = DrawIconEx(
            hdc_mem,
            0,
            0,
            shfi.hIcon,
            size,
            size,
            0,
            Some(HBRUSH::default()),
            DI_NORMAL,
        );

        let src_w = std::slice::from_raw_parts(bits_ptr as *const u8, pixel_count * 4);
        let pass_white: Vec<u8> = src_w.to_vec();

        SelectObject(hdc_mem, old_bmp);
        let _ = DeleteObject(dib.into());
        let _ = DeleteDC(hdc_mem);
        let _ = ReleaseDC(None, hdc_screen);
        let _ = DestroyIcon(shfi.hIcon);

        // 黑白双底渲染差值恢复 alpha：同一像素在黑底与白底上的亮度差
        // 正比于其透明度
        let mut rgba = vec![0u8; pixel_count * 4];
        for ((dst, black), white) in rgba
            .chunks_exact_mut(4)
            .zip(pass_black.chunks_exact(4))
            .zip(pass_white.chunks_exact(4))
        {
            let diff = (white[2] as i32 - black[2] as i32)
                .max(white[1] as i32 - black[1] as i32)
                .max(white[0] as i32 - black[0] as i32);
            let alpha = (255 - diff).clamp(0, 255) as u8;

            if alpha == 0 {
                dst.fill(0);
                continue;
            }

            let af = alpha as f32 / 255.0;
            dst[0] = ((black[2] as f32) / af).round().min(255.0) as u8;
            dst[1] = ((black[1] as f32) / af).round().min(255.0) as u8;
            dst[2] = ((black[0] as f32) / af).round().min(255.0) as u8;
            dst[3] = alpha;
        }

        Some(RawImage {
            width: size as usize,
            height: size as usize,
            rgba,
        })
    }
}
