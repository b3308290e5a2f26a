//! # Monitor power
//!
//! The physical display is switched with a broadcast system command. There
//! is no read-back: success means the broadcast went out, not that the
//! monitor actually changed state.

use std::rc::Rc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::display::DisplayBackend;
use crate::logging::Logger;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerState {
    On,
    /// Defined by the OS, never requested here.
    LowPower,
    Off,
}

impl PowerState {
    /// The parameter of the monitor power system command.
    pub fn lparam(self) -> isize {
        match self {
            PowerState::On => -1,
            PowerState::LowPower => 1,
            PowerState::Off => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

pub struct PowerToggle {
    displays: Rc<dyn DisplayBackend>,
    retry: RetryPolicy,
    log: Logger,
}

impl PowerToggle {
    pub fn new(displays: Rc<dyn DisplayBackend>, retry: RetryPolicy, log: Logger) -> Self {
        PowerToggle {
            displays,
            retry,
            log,
        }
    }

    pub fn set_power(&self, on: bool) -> bool {
        let state = if on { PowerState::On } else { PowerState::Off };
        self.log.scope(|| {
            for attempt in 1..=self.retry.attempts {
                match self.displays.broadcast_power(state.lparam()) {
                    Ok(()) => {
                        info!(?state, attempt, "Monitor power command sent");
                        return true;
                    }
                    Err(err) => {
                        warn!(?state, attempt, %err, "Monitor power command failed");
                        if attempt < self.retry.attempts {
                            debug!(delay = ?self.retry.delay, "Retrying monitor power command");
                            thread::sleep(self.retry.delay);
                        }
                    }
                }
            }
            error!(?state, attempts = self.retry.attempts, "Giving up on monitor power command");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::dummy::DummyDisplays;
    use crate::logging::testing::Recorded;
    use tracing::Level;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn off_sends_two_and_on_sends_minus_one() {
        let displays = Rc::new(DummyDisplays::new());
        let power = PowerToggle::new(displays.clone(), quick(), Logger::silent());

        assert!(power.set_power(false));
        assert!(power.set_power(true));
        assert_eq!(displays.power_calls(), vec![2, -1]);
    }

    #[test]
    fn succeeds_on_a_later_attempt() {
        let displays = Rc::new(DummyDisplays::new().failing_power(2));
        let power = PowerToggle::new(displays.clone(), quick(), Logger::silent());

        assert!(power.set_power(false));
        assert_eq!(displays.power_calls().len(), 3);
    }

    #[test]
    fn gives_up_after_three_attempts() {
        let recorded = Recorded::default();
        let displays = Rc::new(DummyDisplays::new().failing_power(10));
        let power = PowerToggle::new(displays.clone(), quick(), recorded.logger());

        assert!(!power.set_power(true));
        assert_eq!(displays.power_calls(), vec![-1, -1, -1]);
        assert!(recorded.contains(Level::ERROR, "Giving up"));
    }

    #[test]
    fn first_success_stops_retrying() {
        let displays = Rc::new(DummyDisplays::new());
        let power = PowerToggle::new(displays.clone(), RetryPolicy::default(), Logger::silent());

        assert!(power.set_power(false));
        assert_eq!(displays.power_calls().len(), 1);
    }

    #[test]
    fn low_power_parameter() {
        assert_eq!(PowerState::LowPower.lparam(), 1);
    }
}
