//! Per-application GPU preference.
//!
//! Windows keeps the graphics preference of each executable as a string
//! value under the DirectX user preferences key, named by the executable's
//! full path. `GpuPreference=2;` selects the high-performance adapter.

use std::rc::Rc;

use tracing::{error, info};

use crate::logging::Logger;
use crate::registry::Registry;

pub const USER_GPU_PREFERENCES: &str = r"Software\Microsoft\DirectX\UserGpuPreferences";
pub const HIGH_PERFORMANCE: &str = "GpuPreference=2;";

pub struct GpuPreference {
    registry: Rc<dyn Registry>,
    log: Logger,
}

impl GpuPreference {
    pub fn new(registry: Rc<dyn Registry>, log: Logger) -> Self {
        GpuPreference { registry, log }
    }

    pub fn force_high_performance(&self, exe_path: &str) -> bool {
        self.log.scope(|| {
            match self
                .registry
                .set_string(USER_GPU_PREFERENCES, exe_path, HIGH_PERFORMANCE)
            {
                Ok(()) => {
                    info!(exe = exe_path, "High-performance GPU preference set");
                    true
                }
                Err(err) => {
                    error!(exe = exe_path, %err, "Could not set GPU preference");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::logging::testing::Recorded;
    use crate::registry::MemoryRegistry;
    use tracing::Level;

    #[test]
    fn writes_the_preference_under_the_exe_path() -> Result<()> {
        let registry = Rc::new(MemoryRegistry::new());
        let gpu = GpuPreference::new(registry.clone(), Logger::silent());

        assert!(gpu.force_high_performance(r"C:\App.exe"));
        assert_eq!(
            registry.get_string(USER_GPU_PREFERENCES, r"C:\App.exe")?,
            Some("GpuPreference=2;".to_owned())
        );
        Ok(())
    }

    #[test]
    fn registry_errors_become_false() {
        let recorded = Recorded::default();
        let gpu = GpuPreference::new(Rc::new(MemoryRegistry::read_only()), recorded.logger());

        assert!(!gpu.force_high_performance(r"C:\App.exe"));
        assert!(recorded.contains(Level::ERROR, "Could not set GPU preference"));
    }
}
