//! # Virtual display
//!
//! The driver-control tool adds and removes the virtual display but never
//! says which device it created. We find out by enumerating the displays
//! before and after and taking the difference.

use std::rc::Rc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::command::{argv, CommandResult, CommandRunner};
use crate::display::{DisplayBackend, DisplayDeviceId, DisplaySnapshot};
use crate::logging::Logger;

/// How long to wait for a freshly added device to show up in enumeration.
///
/// Registration is asynchronous relative to the tool's exit, so the
/// enumerator is polled with a doubling interval until something new
/// appears or the budget runs out.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SettlePolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub budget: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy {
            interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            budget: Duration::from_secs(2),
        }
    }
}

impl SettlePolicy {
    /// Look once, right away.
    pub fn immediate() -> Self {
        SettlePolicy {
            interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            budget: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Exactly one new device appeared.
    Created(DisplayDeviceId),
    /// The tool succeeded but the new device could not be pinned down.
    /// Empty when nothing appeared, otherwise every candidate, sorted.
    Ambiguous(Vec<DisplayDeviceId>),
    /// The tool itself failed.
    Failed(CommandResult),
}

pub struct VirtualDisplayController {
    runner: Rc<dyn CommandRunner>,
    displays: Rc<dyn DisplayBackend>,
    settle: SettlePolicy,
    log: Logger,
}

impl VirtualDisplayController {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        displays: Rc<dyn DisplayBackend>,
        settle: SettlePolicy,
        log: Logger,
    ) -> Self {
        VirtualDisplayController {
            runner,
            displays,
            settle,
            log,
        }
    }

    pub fn create(&self, driver_tool_path: &str) -> CreateOutcome {
        self.log.scope(|| {
            let before = self.displays.list_devices();
            debug!(devices = ?before.devices(), "Displays before add");

            let result = self.runner.run(&argv([driver_tool_path, "add"]));
            if !result.success() {
                error!(code = result.exit_code, "Driver tool could not add a virtual display");
                return CreateOutcome::Failed(result);
            }

            let mut added = self.wait_for_new_devices(&before);
            match added.len() {
                1 => {
                    let device = added.remove(0);
                    info!(%device, "Virtual display created");
                    CreateOutcome::Created(device)
                }
                0 => {
                    warn!("Driver tool reported success but no new display appeared");
                    CreateOutcome::Ambiguous(added)
                }
                _ => {
                    added.sort();
                    warn!(candidates = ?added, "Several new displays appeared, refusing to guess");
                    CreateOutcome::Ambiguous(added)
                }
            }
        })
    }

    /// Ask the driver tool to remove the virtual display. Removal is not
    /// verified.
    pub fn remove(&self, driver_tool_path: &str) -> CommandResult {
        self.log.scope(|| {
            let result = self.runner.run(&argv([driver_tool_path, "remove"]));
            if result.success() {
                info!("Virtual display removed");
            } else {
                error!(code = result.exit_code, "Driver tool could not remove the virtual display");
            }
            result
        })
    }

    fn wait_for_new_devices(&self, before: &DisplaySnapshot) -> Vec<DisplayDeviceId> {
        let mut waited = Duration::ZERO;
        let mut step = self.settle.interval;
        loop {
            if waited < self.settle.budget {
                let pause = step
                    .max(Duration::from_millis(1))
                    .min(self.settle.budget - waited);
                thread::sleep(pause);
                waited += pause;
            }

            let added = self.displays.list_devices().added_since(before);
            if !added.is_empty() || waited >= self.settle.budget {
                debug!(?waited, count = added.len(), "Display enumeration settled");
                return added;
            }
            step = (step * 2).min(self.settle.max_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ScriptedRunner;
    use crate::display::dummy::DummyDisplays;
    use crate::logging::testing::Recorded;
    use tracing::Level;

    const TOOL: &str = r"C:\Tools\deviceinstaller64.exe";

    fn controller(
        runner: &Rc<ScriptedRunner>,
        displays: &Rc<DummyDisplays>,
        settle: SettlePolicy,
        log: Logger,
    ) -> VirtualDisplayController {
        VirtualDisplayController::new(runner.clone(), displays.clone(), settle, log)
    }

    #[test]
    fn single_new_device_is_returned() {
        let runner = Rc::new(ScriptedRunner::new());
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1", "D3"])
                .then_list(&["D1", "D2", "D3"]),
        );
        let vdc = controller(&runner, &displays, SettlePolicy::immediate(), Logger::silent());

        assert_eq!(vdc.create(TOOL), CreateOutcome::Created("D2".into()));
        assert_eq!(runner.calls(), vec![argv([TOOL, "add"])]);
    }

    #[test]
    fn unchanged_displays_are_ambiguous() {
        let recorded = Recorded::default();
        let runner = Rc::new(ScriptedRunner::new());
        let displays = Rc::new(DummyDisplays::new().then_list(&["D1", "D2"]));
        let vdc = controller(&runner, &displays, SettlePolicy::immediate(), recorded.logger());

        assert_eq!(vdc.create(TOOL), CreateOutcome::Ambiguous(vec![]));
        assert!(recorded.contains(Level::WARN, "no new display appeared"));
    }

    #[test]
    fn several_new_devices_are_ambiguous_and_sorted() {
        let runner = Rc::new(ScriptedRunner::new());
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1"])
                .then_list(&["D1", "D9", "D2"]),
        );
        let vdc = controller(&runner, &displays, SettlePolicy::immediate(), Logger::silent());

        assert_eq!(
            vdc.create(TOOL),
            CreateOutcome::Ambiguous(vec!["D2".into(), "D9".into()])
        );
    }

    #[test]
    fn a_device_that_disappeared_is_not_new() {
        let runner = Rc::new(ScriptedRunner::new());
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1", "D2"])
                .then_list(&["D2", "D3"]),
        );
        let vdc = controller(&runner, &displays, SettlePolicy::immediate(), Logger::silent());

        assert_eq!(vdc.create(TOOL), CreateOutcome::Created("D3".into()));
    }

    #[test]
    fn tool_failure_skips_verification() {
        let runner = Rc::new(ScriptedRunner::new().reply(CommandResult::failed(1, "Error")));
        let displays = Rc::new(DummyDisplays::new().then_list(&["D1"]));
        let vdc = controller(&runner, &displays, SettlePolicy::immediate(), Logger::silent());

        assert_eq!(
            vdc.create(TOOL),
            CreateOutcome::Failed(CommandResult::failed(1, "Error"))
        );
        assert_eq!(displays.enumerations(), 1);
    }

    #[test]
    fn polls_until_the_device_registers() {
        let runner = Rc::new(ScriptedRunner::new());
        let displays = Rc::new(
            DummyDisplays::new()
                .then_list(&["D1"])
                .then_list(&["D1"])
                .then_list(&["D1"])
                .then_list(&["D1", "D2"]),
        );
        let settle = SettlePolicy {
            interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            budget: Duration::from_millis(500),
        };
        let vdc = controller(&runner, &displays, settle, Logger::silent());

        assert_eq!(vdc.create(TOOL), CreateOutcome::Created("D2".into()));
        assert_eq!(displays.enumerations(), 4);
    }

    #[test]
    fn polling_gives_up_after_the_budget() {
        let runner = Rc::new(ScriptedRunner::new());
        let displays = Rc::new(DummyDisplays::new().then_list(&["D1"]));
        let settle = SettlePolicy {
            interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(10),
            budget: Duration::from_millis(30),
        };
        let vdc = controller(&runner, &displays, settle, Logger::silent());

        assert_eq!(vdc.create(TOOL), CreateOutcome::Ambiguous(vec![]));
        // before + polls at 5, 15, 25 and 30 ms
        assert_eq!(displays.enumerations(), 5);
    }

    #[test]
    fn remove_runs_the_tool_once() {
        let runner = Rc::new(ScriptedRunner::new().reply(CommandResult::failed(2, "gone")));
        let displays = Rc::new(DummyDisplays::new());
        let vdc = controller(&runner, &displays, SettlePolicy::immediate(), Logger::silent());

        assert_eq!(vdc.remove(TOOL).exit_code, 2);
        assert_eq!(runner.calls(), vec![argv([TOOL, "remove"])]);
        assert_eq!(displays.enumerations(), 0);
    }
}
