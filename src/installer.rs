//! # Driver installation
//!
//! Fetches the virtual display driver package, unpacks it and runs what it
//! ships with: the certificate installer batch file and the driver `.inf`
//! through `pnputil`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use glob::{glob_with, MatchOptions, Pattern};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::command::{argv, CommandRunner};
use crate::error::{Error, Result};
use crate::logging::Logger;

pub const PACKAGE_NAME: &str = "Virtual-Display-Driver.zip";

pub struct Installer {
    runner: Rc<dyn CommandRunner>,
    agent: ureq::Agent,
    log: Logger,
}

impl Installer {
    pub fn new(runner: Rc<dyn CommandRunner>, log: Logger) -> Self {
        Installer {
            runner,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(300))
                .build(),
            log,
        }
    }

    /// Download `url` to `dest`, checking its SHA-256 when `checksum` is
    /// given. A failed or mismatching download leaves nothing behind.
    pub fn download_file(&self, url: &str, dest: &Path, checksum: Option<&str>) -> bool {
        self.log.scope(|| {
            info!(%url, ?dest, "Downloading");
            match self.fetch(url, dest, checksum) {
                Ok(()) => {
                    info!(?dest, "Download complete");
                    true
                }
                Err(err) => {
                    error!(%url, %err, "Failed to download file");
                    if dest.exists() {
                        let _ = fs::remove_file(dest);
                    }
                    false
                }
            }
        })
    }

    fn fetch(&self, url: &str, dest: &Path, checksum: Option<&str>) -> Result<()> {
        let response = self.agent.get(url).call()?;
        let mut reader = response.into_reader();
        let mut file = fs::File::create(dest)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            io::Write::write_all(&mut file, &buf[..n])?;
        }

        if let Some(expected) = checksum {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(Error::ChecksumMismatch {
                    expected: expected.to_owned(),
                    actual,
                });
            }
            info!("Checksum verified");
        }
        Ok(())
    }

    /// Unpack `zip_path` into `dest`. Entries that would land outside
    /// `dest` abort the extraction.
    pub fn extract_zip(&self, zip_path: &Path, dest: &Path) -> bool {
        self.log.scope(|| {
            info!(?zip_path, ?dest, "Extracting");
            match extract(zip_path, dest) {
                Ok(count) => {
                    info!(files = count, "Extraction complete");
                    true
                }
                Err(err) => {
                    error!(?zip_path, %err, "Failed to extract zip file");
                    false
                }
            }
        })
    }

    /// Run every certificate installer and install every driver found under
    /// `deps_dir`. True when at least one of them went through.
    pub fn install_driver(&self, deps_dir: &Path) -> bool {
        self.log.scope(|| {
            info!(?deps_dir, "Searching for driver files");
            let certs = find(deps_dir, |name| name == "install_cert.bat");
            let infs = find(deps_dir, |name| name.ends_with(".inf"));

            let mut cert_installed = false;
            for bat in &certs {
                info!(?bat, "Running certificate installer");
                let script = bat.display().to_string();
                let result = self.runner.run(&argv(["cmd.exe", "/c", script.as_str()]));
                cert_installed |= result.success();
            }

            let mut driver_installed = false;
            for inf in &infs {
                info!(?inf, "Installing driver via pnputil");
                let inf = inf.display().to_string();
                let result = self
                    .runner
                    .run(&argv(["pnputil", "/add-driver", inf.as_str(), "/install"]));
                driver_installed |= result.success();
            }

            match (cert_installed, driver_installed) {
                (true, true) => {
                    info!("Driver installation steps completed");
                    true
                }
                (true, false) | (false, true) => {
                    warn!("Partial installation completed");
                    true
                }
                (false, false) if certs.is_empty() && infs.is_empty() => {
                    warn!("No installable driver files found");
                    false
                }
                (false, false) => {
                    error!("Driver installation failed");
                    false
                }
            }
        })
    }

    /// The whole `install` flow: download, verify, unpack, install, clean up.
    pub fn install(&self, url: &str, checksum: Option<&str>, deps_dir: &Path) -> bool {
        let prepared = self.log.scope(|| match fs::create_dir_all(deps_dir) {
            Ok(()) => true,
            Err(err) => {
                error!(?deps_dir, %err, "Could not create dependency directory");
                false
            }
        });
        if !prepared {
            return false;
        }

        let zip_path = deps_dir.join(PACKAGE_NAME);
        if !self.download_file(url, &zip_path, checksum) {
            return false;
        }
        if !self.extract_zip(&zip_path, deps_dir) {
            return false;
        }

        self.log.scope(|| {
            info!(?deps_dir, "Dependencies extracted, attempting driver installation");
        });
        let installed = self.install_driver(deps_dir);
        self.log.scope(|| {
            if installed {
                info!("Automated installation steps finished");
            } else {
                warn!("Manual installation might be required, check the extracted files");
            }
            if let Err(err) = fs::remove_file(&zip_path) {
                warn!(?zip_path, %err, "Could not remove the downloaded package");
            }
        });
        installed
    }
}

fn extract(zip_path: &Path, dest: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(fs::File::open(zip_path)?)?;
    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::UnsafeArchivePath(entry.name().to_owned()))?;
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(?target, "Extracting entry");
        io::copy(&mut entry, &mut fs::File::create(&target)?)?;
        count += 1;
    }
    Ok(count)
}

/// Files anywhere under `root` whose lowercased name satisfies `wanted`.
fn find(root: &Path, wanted: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let pattern = format!("{}/**/*", Pattern::escape(&root.display().to_string()));
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    match glob_with(&pattern, options) {
        Ok(paths) => {
            let mut found: Vec<PathBuf> = paths
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .filter(|path| {
                    path.file_name()
                        .map(|name| wanted(&name.to_string_lossy().to_lowercase()))
                        .unwrap_or(false)
                })
                .collect();
            found.sort();
            found
        }
        Err(err) => {
            error!(%err, "Bad search pattern");
            Vec::new()
        }
    }
}
