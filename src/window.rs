//! Active window and cursor lookup for focus polling.

/// Frontmost application and its focused window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindow {
    pub app_name: String,
    pub window_title: String,
}

/// The window currently in front, if the platform can tell.
pub fn active_window() -> Option<ActiveWindow> {
    platform::active_window()
}

/// Current pointer position in screen coordinates.
pub fn cursor_position() -> Option<(i32, i32)> {
    platform::cursor_position()
}

/// Opt the process into per-monitor DPI awareness.
///
/// Without it Windows reports pointer coordinates scaled to 96 DPI on scaled
/// displays instead of physical pixels. Must run before any hook is installed.
/// Does nothing on other platforms.
pub fn enable_dpi_awareness() {
    platform::enable_dpi_awareness()
}

#[cfg(target_os = "macos")]
mod platform {
    use super::ActiveWindow;
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::number::CFNumber;
    use core_foundation::string::{CFString, CFStringRef};
    use core_graphics::event::CGEvent;
    use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
    use core_graphics::window::{
        copy_window_info, kCGNullWindowID, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
        kCGWindowListOptionOnScreenOnly, kCGWindowName, kCGWindowOwnerName,
    };

    fn key(raw: CFStringRef) -> CFString {
        unsafe { CFString::wrap_under_get_rule(raw) }
    }

    /// The first on-screen window at layer 0, in front-to-back order.
    pub fn active_window() -> Option<ActiveWindow> {
        let windows = copy_window_info(
            kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
            kCGNullWindowID,
        )?;

        let layer_key = key(unsafe { kCGWindowLayer });
        let owner_key = key(unsafe { kCGWindowOwnerName });
        let name_key = key(unsafe { kCGWindowName });

        for item in windows.iter() {
            let info: CFDictionary<CFString, CFType> =
                unsafe { CFDictionary::wrap_under_get_rule(*item as CFDictionaryRef) };

            let layer = info
                .find(&layer_key)
                .and_then(|v| v.downcast::<CFNumber>())
                .and_then(|n| n.to_i64());
            if layer != Some(0) {
                continue;
            }

            let text = |k: &CFString| {
                info.find(k)
                    .and_then(|v| v.downcast::<CFString>())
                    .map(|s| s.to_string())
                    .unwrap_or_default()
            };
            // Window titles need Screen Recording permission; the owner does not
            return Some(ActiveWindow {
                app_name: text(&owner_key),
                window_title: text(&name_key),
            });
        }
        None
    }

    pub fn cursor_position() -> Option<(i32, i32)> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).ok()?;
        let event = CGEvent::new(source).ok()?;
        let point = event.location();
        Some((point.x.round() as i32, point.y.round() as i32))
    }

    pub fn enable_dpi_awareness() {}
}

#[cfg(target_os = "windows")]
mod platform {
    use super::ActiveWindow;
    use std::path::Path;
    use windows::core::PWSTR;
    use windows::Win32::Foundation::{CloseHandle, HWND, POINT};
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_FORMAT,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetCursorPos, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
    };

    pub fn active_window() -> Option<ActiveWindow> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd == HWND::default() {
            return None;
        }
        Some(ActiveWindow {
            app_name: process_name(hwnd).unwrap_or_else(|| "Unknown".to_string()),
            window_title: window_text(hwnd),
        })
    }

    pub fn cursor_position() -> Option<(i32, i32)> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point) }.ok()?;
        Some((point.x, point.y))
    }

    pub fn enable_dpi_awareness() {
        // Fails when the manifest or an earlier call already set it
        if let Err(e) =
            unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) }
        {
            tracing::debug!("DPI awareness not changed: {e}");
        }
    }

    fn window_text(hwnd: HWND) -> String {
        let mut buffer = vec![0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut buffer) };
        if len <= 0 {
            return String::new();
        }
        String::from_utf16_lossy(&buffer[..len as usize])
    }

    /// Executable name (without extension) of the window's process.
    fn process_name(hwnd: HWND) -> Option<String> {
        let mut pid: u32 = 0;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
        if pid == 0 {
            return None;
        }
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }.ok()?;

        let mut buffer = vec![0u16; 512];
        let mut size = buffer.len() as u32;
        let ok = unsafe {
            QueryFullProcessImageNameW(
                handle,
                PROCESS_NAME_FORMAT(0),
                PWSTR(buffer.as_mut_ptr()),
                &mut size,
            )
        }
        .is_ok();
        let _ = unsafe { CloseHandle(handle) };
        if !ok {
            return None;
        }

        let image = String::from_utf16_lossy(&buffer[..size as usize]);
        Path::new(&image)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
mod platform {
    use super::ActiveWindow;

    pub fn active_window() -> Option<ActiveWindow> {
        None
    }

    pub fn cursor_position() -> Option<(i32, i32)> {
        None
    }

    pub fn enable_dpi_awareness() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_window_lookup_does_not_panic() {
        if let Some(window) = active_window() {
            assert!(window.app_name.len() < 4096);
        }
    }

    #[test]
    fn test_cursor_lookup_and_dpi_setup_do_not_panic() {
        enable_dpi_awareness();
        enable_dpi_awareness();
        let _ = cursor_position();
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_unsupported_platform_has_no_cursor() {
        assert_eq!(cursor_position(), None);
    }
}
