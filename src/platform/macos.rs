//! macOS 平台能力实现
//!
//! 仅提供前台应用识别（NSWorkspace）；文档预览与类型图标能力
//! 在本平台按缺失处理。

use cocoa::base::{id, nil};
use objc::{class, msg_send, sel, sel_impl};

use super::AppIdentity;

unsafe fn ns_string_to_string(value: id) -> Option<String> {
    if value == nil {
        return None;
    }
    unsafe {
        let utf8: *const std::os::raw::c_char = msg_send![value, UTF8String];
        if utf8.is_null() {
            return None;
        }
        Some(
            std::ffi::CStr::from_ptr(utf8)
                .to_string_lossy()
                .to_string(),
        )
    }
}

/// 当前前台应用的名称与 bundle identifier
pub(super) fn frontmost_app() -> Option<AppIdentity> {
    unsafe {
        let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
        if workspace == nil {
            return None;
        }
        let app: id = msg_send![workspace, frontmostApplication];
        if app == nil {
            return None;
        }

        let name_obj: id = msg_send![app, localizedName];
        let bundle_obj: id = msg_send![app, bundleIdentifier];

        let name = ns_string_to_string(name_obj)?;
        let identifier = ns_string_to_string(bundle_obj);

        Some(AppIdentity { name, identifier })
    }
}
