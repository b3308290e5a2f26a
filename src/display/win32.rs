//! Win32 display facilities.

use std::mem;

use tracing::{debug, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::Graphics::Gdi::{
    ChangeDisplaySettingsExW, EnumDisplayDevicesW, EnumDisplaySettingsW, CDS_TEST, CDS_TYPE,
    DEVMODEW, DEVMODE_FIELD_FLAGS, DISPLAY_DEVICEW, DISP_CHANGE_RESTART, DISP_CHANGE_SUCCESSFUL,
    ENUM_CURRENT_SETTINGS,
};
use windows::Win32::UI::WindowsAndMessaging::{
    PostMessageW, HWND_BROADCAST, SC_MONITORPOWER, WM_SYSCOMMAND,
};

use super::{
    ChangeStatus, DisplayDeviceId, DisplayEnumerator, DisplayMode, DisplaySettings,
    DisplaySnapshot, ModeFields, MonitorPower,
};
use crate::error::{Error, Result};
use crate::logging::Logger;

#[derive(Debug)]
pub struct WindowsDisplays {
    log: Logger,
}

impl WindowsDisplays {
    pub fn new(log: Logger) -> Self {
        WindowsDisplays { log }
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

impl DisplayEnumerator for WindowsDisplays {
    fn list_devices(&self) -> DisplaySnapshot {
        let mut devices = Vec::new();
        for index in 0.. {
            let mut device = DISPLAY_DEVICEW {
                cb: mem::size_of::<DISPLAY_DEVICEW>() as u32,
                ..Default::default()
            };
            let found = unsafe { EnumDisplayDevicesW(PCWSTR::null(), index, &mut device, 0) };
            if !found.as_bool() {
                break;
            }
            devices.push(DisplayDeviceId::new(from_wide(&device.DeviceName)));
        }
        self.log.scope(|| debug!(count = devices.len(), "Enumerated display devices"));
        DisplaySnapshot::new(devices)
    }
}

impl DisplaySettings for WindowsDisplays {
    fn current_mode(&self, device: &DisplayDeviceId) -> Option<DisplayMode> {
        let name = wide(device.as_str());
        let mut devmode = DEVMODEW {
            dmSize: mem::size_of::<DEVMODEW>() as u16,
            ..Default::default()
        };
        let ok = unsafe {
            EnumDisplaySettingsW(PCWSTR(name.as_ptr()), ENUM_CURRENT_SETTINGS, &mut devmode)
        };
        if !ok.as_bool() {
            self.log.scope(|| warn!(%device, "Could not read current display settings"));
            return None;
        }
        Some(DisplayMode {
            width: devmode.dmPelsWidth,
            height: devmode.dmPelsHeight,
            bits_per_pixel: devmode.dmBitsPerPel,
            frequency: devmode.dmDisplayFrequency,
            fields: ModeFields(devmode.dmFields.0),
        })
    }

    fn apply_mode(
        &self,
        device: &DisplayDeviceId,
        mode: &DisplayMode,
        test_only: bool,
    ) -> ChangeStatus {
        let name = wide(device.as_str());
        let devmode = DEVMODEW {
            dmSize: mem::size_of::<DEVMODEW>() as u16,
            dmFields: DEVMODE_FIELD_FLAGS(mode.fields.bits()),
            dmPelsWidth: mode.width,
            dmPelsHeight: mode.height,
            dmBitsPerPel: mode.bits_per_pixel,
            dmDisplayFrequency: mode.frequency,
            ..Default::default()
        };
        let flags = if test_only { CDS_TEST } else { CDS_TYPE(0) };
        let status = unsafe {
            ChangeDisplaySettingsExW(
                PCWSTR(name.as_ptr()),
                Some(&devmode as *const DEVMODEW),
                HWND::default(),
                flags,
                None,
            )
        };
        match status {
            DISP_CHANGE_SUCCESSFUL => ChangeStatus::Successful,
            DISP_CHANGE_RESTART => ChangeStatus::RestartRequired,
            other => ChangeStatus::Failed(other.0),
        }
    }
}

impl MonitorPower for WindowsDisplays {
    fn broadcast_power(&self, lparam: isize) -> Result<()> {
        unsafe {
            PostMessageW(
                HWND_BROADCAST,
                WM_SYSCOMMAND,
                WPARAM(SC_MONITORPOWER as usize),
                LPARAM(lparam),
            )
        }
        .map_err(|err| Error::Platform(err.to_string()))
    }
}
