//! Dummy displays.
//!
//! This is purely for testing or debugging.
//! It plays back scripted enumerations and records every change.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use tracing::debug;

use super::{
    ChangeStatus, DisplayDeviceId, DisplayEnumerator, DisplayMode, DisplaySettings,
    DisplaySnapshot, ModeFields, MonitorPower,
};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedMode {
    pub device: DisplayDeviceId,
    pub mode: DisplayMode,
    pub test_only: bool,
}

#[derive(Debug)]
pub struct DummyDisplays {
    /// Successive answers to `list_devices`; the last one repeats forever.
    snapshots: RefCell<VecDeque<DisplaySnapshot>>,
    enumerations: Cell<usize>,
    mode: Cell<Option<DisplayMode>>,
    test_status: Cell<ChangeStatus>,
    commit_status: Cell<ChangeStatus>,
    applied: RefCell<Vec<AppliedMode>>,
    power_failures: Cell<usize>,
    power_calls: RefCell<Vec<isize>>,
}

impl Default for DummyDisplays {
    fn default() -> Self {
        DummyDisplays {
            snapshots: RefCell::new(VecDeque::new()),
            enumerations: Cell::new(0),
            mode: Cell::new(Some(DisplayMode {
                width: 1280,
                height: 720,
                bits_per_pixel: 32,
                frequency: 60,
                fields: ModeFields::empty(),
            })),
            test_status: Cell::new(ChangeStatus::Successful),
            commit_status: Cell::new(ChangeStatus::Successful),
            applied: RefCell::new(Vec::new()),
            power_failures: Cell::new(0),
            power_calls: RefCell::new(Vec::new()),
        }
    }
}

impl DummyDisplays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next answer of `list_devices`.
    pub fn then_list<S: AsRef<str>>(self, devices: &[S]) -> Self {
        self.snapshots
            .borrow_mut()
            .push_back(devices.iter().collect());
        self
    }

    pub fn without_mode(self) -> Self {
        self.mode.set(None);
        self
    }

    pub fn test_reports(self, status: ChangeStatus) -> Self {
        self.test_status.set(status);
        self
    }

    pub fn commit_reports(self, status: ChangeStatus) -> Self {
        self.commit_status.set(status);
        self
    }

    /// Make the first `count` power broadcasts fail.
    pub fn failing_power(self, count: usize) -> Self {
        self.power_failures.set(count);
        self
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.get()
    }

    pub fn applied(&self) -> Vec<AppliedMode> {
        self.applied.borrow().clone()
    }

    pub fn power_calls(&self) -> Vec<isize> {
        self.power_calls.borrow().clone()
    }
}

impl DisplayEnumerator for DummyDisplays {
    fn list_devices(&self) -> DisplaySnapshot {
        self.enumerations.set(self.enumerations.get() + 1);
        let mut snapshots = self.snapshots.borrow_mut();
        if snapshots.len() > 1 {
            snapshots.pop_front().unwrap_or_default()
        } else {
            snapshots.front().cloned().unwrap_or_default()
        }
    }
}

impl DisplaySettings for DummyDisplays {
    fn current_mode(&self, _device: &DisplayDeviceId) -> Option<DisplayMode> {
        self.mode.get()
    }

    fn apply_mode(
        &self,
        device: &DisplayDeviceId,
        mode: &DisplayMode,
        test_only: bool,
    ) -> ChangeStatus {
        debug!(%device, width = mode.width, height = mode.height, test_only, "dummy: apply mode");
        self.applied.borrow_mut().push(AppliedMode {
            device: device.clone(),
            mode: *mode,
            test_only,
        });
        if test_only {
            self.test_status.get()
        } else {
            self.commit_status.get()
        }
    }
}

impl MonitorPower for DummyDisplays {
    fn broadcast_power(&self, lparam: isize) -> Result<()> {
        debug!(lparam, "dummy: monitor power");
        self.power_calls.borrow_mut().push(lparam);
        let failures = self.power_failures.get();
        if failures > 0 {
            self.power_failures.set(failures - 1);
            return Err(Error::Platform("broadcast refused".into()));
        }
        Ok(())
    }
}
