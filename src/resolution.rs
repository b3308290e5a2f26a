//! # Resolution
//!
//! Parsing the client's `WIDTHxHEIGHT` and applying it to a display.
//!
//! A mode change is always validated in test mode first. A change that
//! fails validation is never applied for real, so the display cannot be
//! left in a mode nobody confirmed.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use crate::display::{ChangeStatus, DisplayBackend, DisplayDeviceId, DisplayMode, ModeFields};
use crate::error::{Error, Result};
use crate::logging::Logger;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        lazy_static! {
            static ref RESOLUTION: Regex = Regex::new(r"^\s*(\d+)\s*[xX]\s*(\d+)\s*$").unwrap();
        }

        let invalid = || Error::InvalidResolution(s.to_owned());
        let captures = RESOLUTION.captures(s).ok_or_else(invalid)?;
        let width = captures[1].parse::<u32>().map_err(|_| invalid())?;
        let height = captures[2].parse::<u32>().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Resolution { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub struct ResolutionSetter {
    displays: Rc<dyn DisplayBackend>,
    log: Logger,
}

impl ResolutionSetter {
    pub fn new(displays: Rc<dyn DisplayBackend>, log: Logger) -> Self {
        ResolutionSetter { displays, log }
    }

    /// Apply `width`x`height` to `device`, or to the first enumerated device
    /// when none is given.
    pub fn set_resolution(
        &self,
        width: u32,
        height: u32,
        device: Option<&DisplayDeviceId>,
    ) -> bool {
        self.log.scope(|| {
            let device = match device {
                Some(device) => device.clone(),
                None => match self.displays.list_devices().first() {
                    Some(first) => {
                        warn!(device = %first, "No display given, falling back to the first one");
                        first.clone()
                    }
                    None => {
                        error!("No display devices found");
                        return false;
                    }
                },
            };

            let current = match self.displays.current_mode(&device) {
                Some(mode) => mode,
                None => {
                    error!(%device, "Could not read the current display mode");
                    return false;
                }
            };
            let mode = DisplayMode {
                width,
                height,
                fields: ModeFields::WIDTH | ModeFields::HEIGHT,
                ..current
            };

            match self.displays.apply_mode(&device, &mode, true) {
                ChangeStatus::Successful => {}
                status => {
                    error!(%device, ?status, "Display rejected the mode in test mode");
                    return false;
                }
            }

            match self.displays.apply_mode(&device, &mode, false) {
                ChangeStatus::Successful => {
                    info!(%device, width, height, "Resolution set");
                    true
                }
                status => {
                    error!(%device, width, height, ?status, "Failed to apply the mode");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::dummy::DummyDisplays;

    #[test]
    fn parse_resolution() -> Result<()> {
        let full_hd: Resolution = "1920x1080".parse()?;
        assert_eq!((full_hd.width, full_hd.height), (1920, 1080));
        let upper: Resolution = "2560X1440".parse()?;
        assert_eq!((upper.width, upper.height), (2560, 1440));
        assert_eq!(" 1280 x 720 ".parse::<Resolution>()?.to_string(), "1280x720");

        let rejected = [
            "bad",
            "",
            "1920",
            "1920x",
            "x1080",
            "0x1080",
            "1920x0",
            "-1x5",
            "1920x1080x60",
            "99999999999x1",
        ];
        for bad in rejected {
            assert!(bad.parse::<Resolution>().is_err(), "{:?} should not parse", bad);
        }
        Ok(())
    }

    #[test]
    fn commits_after_a_successful_test() {
        let displays = Rc::new(DummyDisplays::new().then_list(&["D1", "D2"]));
        let setter = ResolutionSetter::new(displays.clone(), Logger::silent());

        assert!(setter.set_resolution(1920, 1080, Some(&"D2".into())));

        let applied = displays.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied[0].test_only);
        assert!(!applied[1].test_only);
        for change in &applied {
            assert_eq!(change.device, DisplayDeviceId::new("D2"));
            assert_eq!((change.mode.width, change.mode.height), (1920, 1080));
            assert_eq!(change.mode.fields, ModeFields::WIDTH | ModeFields::HEIGHT);
            // untouched fields keep the current mode's values
            assert_eq!((change.mode.bits_per_pixel, change.mode.frequency), (32, 60));
        }
    }

    #[test]
    fn failed_test_is_never_committed() {
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1"])
                .test_reports(ChangeStatus::Failed(-2)),
        );
        let setter = ResolutionSetter::new(displays.clone(), Logger::silent());

        assert!(!setter.set_resolution(1920, 1080, None));
        assert_eq!(displays.applied().len(), 1);
        assert!(displays.applied()[0].test_only);
    }

    #[test]
    fn restart_required_in_test_mode_counts_as_failure() {
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1"])
                .test_reports(ChangeStatus::RestartRequired),
        );
        let setter = ResolutionSetter::new(displays.clone(), Logger::silent());

        assert!(!setter.set_resolution(800, 600, None));
        assert_eq!(displays.applied().len(), 1);
    }

    #[test]
    fn failed_commit_is_reported() {
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1"])
                .commit_reports(ChangeStatus::Failed(-1)),
        );
        let setter = ResolutionSetter::new(displays.clone(), Logger::silent());

        assert!(!setter.set_resolution(800, 600, None));
        assert_eq!(displays.applied().len(), 2);
    }

    #[test]
    fn defaults_to_the_first_device() {
        let displays = Rc::new(DummyDisplays::new().then_list(&["D1", "D2"]));
        let setter = ResolutionSetter::new(displays.clone(), Logger::silent());

        assert!(setter.set_resolution(1024, 768, None));
        assert_eq!(displays.applied()[0].device, DisplayDeviceId::new("D1"));
    }

    #[test]
    fn nothing_to_change() {
        let empty = Rc::new(DummyDisplays::new());
        assert!(!ResolutionSetter::new(empty.clone(), Logger::silent()).set_resolution(1, 1, None));
        assert!(empty.applied().is_empty());

        let unreadable = Rc::new(DummyDisplays::new().then_list(&["D1"]).without_mode());
        assert!(!ResolutionSetter::new(unreadable.clone(), Logger::silent())
            .set_resolution(1, 1, None));
        assert!(unreadable.applied().is_empty());
    }
}
