//! Display traits.
//!
//! The OS display subsystem is reached through three narrow facilities:
//!  - enumerating display devices
//!  - reading and applying a display mode
//!  - broadcasting the monitor power command
//!
//! Only Windows has a real implementation. Everywhere else the facilities
//! report themselves unavailable once, at construction, and then answer
//! every call with an empty snapshot or a failure.

pub mod dummy;
#[cfg(windows)]
mod win32;

use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::logging::Logger;

/// A display adapter name as the OS reports it, e.g. `\\.\DISPLAY2`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayDeviceId(String);

impl DisplayDeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        DisplayDeviceId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DisplayDeviceId {
    fn from(name: &str) -> Self {
        DisplayDeviceId::new(name)
    }
}

/// Device ids in enumeration order, captured at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplaySnapshot {
    devices: Vec<DisplayDeviceId>,
}

impl DisplaySnapshot {
    pub fn new(devices: Vec<DisplayDeviceId>) -> Self {
        let mut snapshot = DisplaySnapshot::default();
        for device in devices {
            if !snapshot.contains(&device) {
                snapshot.devices.push(device);
            }
        }
        snapshot
    }

    pub fn devices(&self) -> &[DisplayDeviceId] {
        &self.devices
    }

    pub fn first(&self) -> Option<&DisplayDeviceId> {
        self.devices.first()
    }

    pub fn contains(&self, device: &DisplayDeviceId) -> bool {
        self.devices.contains(device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices present here but not in `before`, in this snapshot's order.
    pub fn added_since(&self, before: &DisplaySnapshot) -> Vec<DisplayDeviceId> {
        self.devices
            .iter()
            .filter(|device| !before.contains(device))
            .cloned()
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for DisplaySnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        DisplaySnapshot::new(
            iter.into_iter()
                .map(|name| DisplayDeviceId::new(name.as_ref()))
                .collect(),
        )
    }
}

/// Which fields of a [`DisplayMode`] a change should touch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeFields(u32);

impl ModeFields {
    pub const WIDTH: ModeFields = ModeFields(0x0008_0000);
    pub const HEIGHT: ModeFields = ModeFields(0x0010_0000);

    pub fn empty() -> Self {
        ModeFields(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ModeFields) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ModeFields {
    type Output = ModeFields;

    fn bitor(self, rhs: ModeFields) -> ModeFields {
        ModeFields(self.0 | rhs.0)
    }
}

/// The part of the OS display-mode descriptor this tool cares about.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub frequency: u32,
    pub fields: ModeFields,
}

/// What the OS said about a mode change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    Successful,
    RestartRequired,
    Failed(i32),
}

pub trait DisplayEnumerator {
    /// Every display device the OS knows of, stopping at the first index it
    /// reports as absent. Empty when the facility is unavailable.
    fn list_devices(&self) -> DisplaySnapshot;
}

pub trait DisplaySettings {
    /// The mode the device is running right now.
    fn current_mode(&self, device: &DisplayDeviceId) -> Option<DisplayMode>;

    /// Apply `mode`. With `test_only` the OS only validates the change.
    fn apply_mode(
        &self,
        device: &DisplayDeviceId,
        mode: &DisplayMode,
        test_only: bool,
    ) -> ChangeStatus;
}

pub trait MonitorPower {
    /// Broadcast the monitor power system command to every top-level window.
    fn broadcast_power(&self, lparam: isize) -> Result<()>;
}

/// All three display facilities of one platform.
pub trait DisplayBackend: DisplayEnumerator + DisplaySettings + MonitorPower {}

impl<T: DisplayEnumerator + DisplaySettings + MonitorPower> DisplayBackend for T {}

/// The display facilities of the machine we are running on.
pub fn system(log: &Logger) -> Rc<dyn DisplayBackend> {
    #[cfg(windows)]
    {
        Rc::new(win32::WindowsDisplays::new(log.clone()))
    }
    #[cfg(not(windows))]
    {
        Rc::new(Unavailable::new(log))
    }
}

/// Stand-in for platforms without the display facilities.
#[derive(Debug)]
pub struct Unavailable;

impl Unavailable {
    pub fn new(log: &Logger) -> Self {
        log.scope(|| {
            warn!("Display facilities are not available on this platform, display steps will fail")
        });
        Unavailable
    }
}

impl DisplayEnumerator for Unavailable {
    fn list_devices(&self) -> DisplaySnapshot {
        DisplaySnapshot::default()
    }
}

impl DisplaySettings for Unavailable {
    fn current_mode(&self, _device: &DisplayDeviceId) -> Option<DisplayMode> {
        None
    }

    fn apply_mode(&self, _: &DisplayDeviceId, _: &DisplayMode, _: bool) -> ChangeStatus {
        ChangeStatus::Failed(-1)
    }
}

impl MonitorPower for Unavailable {
    fn broadcast_power(&self, _lparam: isize) -> Result<()> {
        Err(Error::Unavailable("monitor power control"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_since_keeps_only_new_devices_in_order() {
        let before: DisplaySnapshot = ["D1", "D3"].into_iter().collect();
        let after: DisplaySnapshot = ["D1", "D4", "D2", "D3"].into_iter().collect();

        assert_eq!(
            after.added_since(&before),
            vec![DisplayDeviceId::from("D4"), DisplayDeviceId::from("D2")]
        );
        assert!(before.added_since(&after).is_empty());
        assert!(after.added_since(&after).is_empty());
    }

    #[test]
    fn snapshot_drops_duplicates() {
        let snapshot: DisplaySnapshot = ["D1", "D2", "D1"].into_iter().collect();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.first(), Some(&DisplayDeviceId::new("D1")));
    }

    #[test]
    fn mode_fields() {
        let both = ModeFields::WIDTH | ModeFields::HEIGHT;
        assert!(both.contains(ModeFields::WIDTH));
        assert!(both.contains(ModeFields::HEIGHT));
        assert!(!ModeFields::WIDTH.contains(ModeFields::HEIGHT));
        assert_eq!(both.bits(), 0x0018_0000);
    }

    #[test]
    fn unavailable_answers_without_failing_hard() {
        let backend = Unavailable::new(&Logger::silent());
        let device = DisplayDeviceId::new("D1");

        assert!(backend.list_devices().is_empty());
        assert!(backend.current_mode(&device).is_none());
        assert!(backend.broadcast_power(2).is_err());
    }
}
