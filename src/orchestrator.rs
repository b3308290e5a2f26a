//! # Lifecycle
//!
//! `start` brings a streaming session up, `stop` tears it down. Every step
//! has a severity: a failing [`Severity::Required`] step ends the run, a
//! failing [`Severity::BestEffort`] step is logged and the run goes on.
//! Nothing is remembered between runs.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{error, info, warn};

use crate::command::CommandRunner;
use crate::config::Config;
use crate::display::DisplayBackend;
use crate::games::GameScanner;
use crate::gpu::GpuPreference;
use crate::installer::Installer;
use crate::logging::Logger;
use crate::metadata::MetadataProvider;
use crate::power::{PowerToggle, RetryPolicy};
use crate::registry::Registry;
use crate::resolution::{Resolution, ResolutionSetter};
use crate::sunshine::{cover_file_name, locate_apps_file, AppsFile};
use crate::virtual_display::{CreateOutcome, SettlePolicy, VirtualDisplayController};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Required,
    BestEffort,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    ParseResolution,
    ForceGpu,
    CreateDisplay,
    SetResolution,
    PowerOff,
    PowerOn,
    RemoveDisplay,
}

impl Step {
    pub fn severity(self) -> Severity {
        match self {
            Step::ParseResolution | Step::CreateDisplay | Step::SetResolution => {
                Severity::Required
            }
            Step::ForceGpu | Step::PowerOff | Step::PowerOn | Step::RemoveDisplay => {
                Severity::BestEffort
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub ok: bool,
}

/// What a `start` or `stop` run did, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<StepOutcome>,
    pub aborted: bool,
}

impl RunReport {
    /// Note the outcome of `step`. False when the run has to stop here.
    fn record(&mut self, step: Step, ok: bool) -> bool {
        self.steps.push(StepOutcome { step, ok });
        if !ok && step.severity() == Severity::Required {
            self.aborted = true;
            return false;
        }
        true
    }

    pub fn completed(&self) -> bool {
        !self.aborted
    }

    pub fn executed(&self) -> Vec<Step> {
        self.steps.iter().map(|outcome| outcome.step).collect()
    }

    /// Whether `step` succeeded, if it ran at all.
    pub fn outcome(&self, step: Step) -> Option<bool> {
        self.steps
            .iter()
            .find(|outcome| outcome.step == step)
            .map(|outcome| outcome.ok)
    }
}

/// The OS facing pieces the orchestrator drives.
pub struct Backends {
    pub runner: Rc<dyn CommandRunner>,
    pub displays: Rc<dyn DisplayBackend>,
    pub registry: Rc<dyn Registry>,
}

pub struct Orchestrator {
    config: Config,
    gpu: GpuPreference,
    virtual_display: VirtualDisplayController,
    resolution: ResolutionSetter,
    power: PowerToggle,
    installer: Installer,
    log: Logger,
}

impl Orchestrator {
    pub fn new(config: Config, backends: Backends, log: Logger) -> Self {
        Orchestrator::with_policies(
            config,
            backends,
            SettlePolicy::default(),
            RetryPolicy::default(),
            log,
        )
    }

    pub fn with_policies(
        config: Config,
        backends: Backends,
        settle: SettlePolicy,
        retry: RetryPolicy,
        log: Logger,
    ) -> Self {
        log.scope(|| {
            if !Path::new(&config.sunshine_path).exists() {
                warn!(path = %config.sunshine_path, "Sunshine executable not found");
            }
            if !Path::new(&config.driver_tool_path).exists() {
                warn!(path = %config.driver_tool_path, "Driver tool not found");
            }
        });

        let Backends {
            runner,
            displays,
            registry,
        } = backends;
        Orchestrator {
            gpu: GpuPreference::new(registry, log.clone()),
            virtual_display: VirtualDisplayController::new(
                runner.clone(),
                displays.clone(),
                settle,
                log.clone(),
            ),
            resolution: ResolutionSetter::new(displays.clone(), log.clone()),
            power: PowerToggle::new(displays, retry, log.clone()),
            installer: Installer::new(runner, log.clone()),
            config,
            log,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn start(&self, client_res: &str) -> RunReport {
        self.log.scope(|| {
            let mut report = RunReport::default();
            info!(resolution = client_res, "Starting setup");

            let resolution = match client_res.parse::<Resolution>() {
                Ok(resolution) => resolution,
                Err(err) => {
                    error!(%err, "Refusing to start");
                    report.record(Step::ParseResolution, false);
                    return report;
                }
            };
            report.record(Step::ParseResolution, true);

            info!("Forcing the high-performance GPU for Sunshine");
            let gpu = self.gpu.force_high_performance(&self.config.sunshine_path);
            if !report.record(Step::ForceGpu, gpu) {
                return report;
            }

            info!("Preparing virtual display");
            let device = match self.virtual_display.create(&self.config.driver_tool_path) {
                CreateOutcome::Created(device) => {
                    report.record(Step::CreateDisplay, true);
                    device
                }
                outcome => {
                    error!(?outcome, "Failed to create virtual display, aborting setup");
                    report.record(Step::CreateDisplay, false);
                    return report;
                }
            };

            info!(%device, %resolution, "Setting resolution");
            let (width, height) = (resolution.width, resolution.height);
            let applied = self.resolution.set_resolution(width, height, Some(&device));
            if !report.record(Step::SetResolution, applied) {
                error!("Failed to set resolution, aborting setup");
                return report;
            }

            info!("Turning off physical display");
            let off = self.power.set_power(false);
            if !off {
                warn!("Failed to turn off physical display");
            }
            if !report.record(Step::PowerOff, off) {
                return report;
            }

            info!("Setup complete, ready for streaming");
            report
        })
    }

    pub fn stop(&self) -> RunReport {
        self.log.scope(|| {
            let mut report = RunReport::default();
            info!("Stopping setup");

            let on = self.power.set_power(true);
            if !on {
                warn!("Failed to turn on physical display");
            }
            if !report.record(Step::PowerOn, on) {
                return report;
            }

            let removed = self
                .virtual_display
                .remove(&self.config.driver_tool_path)
                .success();
            if !report.record(Step::RemoveDisplay, removed) {
                return report;
            }

            info!("Teardown complete");
            report
        })
    }

    /// Put every installed game into Sunshine's app list, with cover art
    /// where the catalog has some. `connect` builds the catalog client from
    /// the configured credentials.
    pub fn scan_games<P, F>(&self, scanner: &GameScanner, connect: F) -> bool
    where
        P: MetadataProvider,
        F: FnOnce(&str, &str) -> P,
    {
        self.log.scope(|| {
            let (client_id, client_secret) = match self.config.igdb_credentials() {
                Some(credentials) => credentials,
                None => {
                    error!("IGDB credentials not found, set IGDB_CLIENT_ID and IGDB_CLIENT_SECRET");
                    return false;
                }
            };

            let games = scanner.scan_system();
            info!(count = games.len(), "Found games");

            let mut catalog = connect(client_id, client_secret);
            if !catalog.authenticate() {
                error!("Failed to authenticate with IGDB, aborting");
                return false;
            }

            let program_files = env::var_os("ProgramFiles").map(PathBuf::from);
            let apps_path = locate_apps_file(
                Path::new(&self.config.sunshine_path),
                program_files.as_deref(),
            );
            let apps = AppsFile::new(apps_path, self.log.clone());
            let covers = apps.covers_dir();
            if let Err(err) = fs::create_dir_all(&covers) {
                error!(?covers, %err, "Could not create covers directory");
                return false;
            }

            for game in &games {
                info!(game = %game.name, "Processing");
                let mut image_path = String::new();
                match catalog.search_game(&game.name) {
                    Some(metadata) => {
                        if let Some(url) = metadata.cover_url() {
                            let dest = covers.join(cover_file_name(&game.name));
                            if catalog.download_cover(&url, &dest) {
                                info!(game = %game.name, "Downloaded cover");
                                image_path = dest.display().to_string();
                            }
                        }
                    }
                    None => warn!(game = %game.name, "No metadata found"),
                }
                apps.add_game(&game.name, &game.cmd, &game.working_dir, &image_path);
            }

            info!("Game scan and update complete");
            true
        })
    }

    /// Download, unpack and install the virtual display driver.
    pub fn install(&self) -> bool {
        self.log.scope(|| {
            info!("Installing dependencies");
            let url = match self.config.virtual_display_driver_url.as_deref() {
                Some(url) if !url.trim().is_empty() => url,
                _ => {
                    error!("No virtual_display_driver_url configured, nothing to download");
                    return false;
                }
            };

            let deps_dir = match self.deps_dir() {
                Some(dir) => dir,
                None => return false,
            };

            let checksum = self.config.virtual_display_driver_sha256.as_deref();
            let installed = self.installer.install(url, checksum, &deps_dir);
            info!(
                ?deps_dir,
                "If the driver is not working, install it by hand from the extracted files"
            );
            installed
        })
    }

    fn deps_dir(&self) -> Option<PathBuf> {
        let path = PathBuf::from(&self.config.deps_path);
        if path.is_absolute() {
            return Some(path);
        }
        match env::current_dir() {
            Ok(cwd) => Some(cwd.join(path)),
            Err(err) => {
                error!(%err, "Could not resolve the dependency directory");
                None
            }
        }
    }
}
