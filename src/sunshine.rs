//! # Sunshine game list
//!
//! Sunshine keeps its applications in `apps.json`. Games are matched by
//! name: a known name is updated in place, anything else is appended. The
//! file is read whole and written whole; keys we do not know are kept.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::Result;
use crate::logging::Logger;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(rename = "image-path", default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct AppsDocument {
    #[serde(default)]
    env: Map<String, Value>,
    #[serde(default)]
    apps: Vec<AppEntry>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Where Sunshine's `apps.json` lives: the first that exists of
/// `<exe dir>/config/apps.json`, `<exe dir>/apps.json` and
/// `<program files>/Sunshine/config/apps.json`, else the first.
pub fn locate_apps_file(sunshine_path: &Path, program_files: Option<&Path>) -> PathBuf {
    let base = sunshine_path.parent().unwrap_or_else(|| Path::new(""));
    let program_files = program_files.unwrap_or_else(|| Path::new(r"C:\Program Files"));
    let candidates = [
        base.join("config").join("apps.json"),
        base.join("apps.json"),
        program_files.join("Sunshine").join("config").join("apps.json"),
    ];
    candidates
        .iter()
        .find(|path| path.exists())
        .unwrap_or(&candidates[0])
        .clone()
}

/// Keep letters, digits and spaces; drop trailing whitespace.
pub fn cover_file_name(game_name: &str) -> String {
    let safe: String = game_name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    format!("{}.jpg", safe.trim_end())
}

pub struct AppsFile {
    path: PathBuf,
    log: Logger,
}

impl AppsFile {
    pub fn new(path: PathBuf, log: Logger) -> Self {
        log.scope(|| info!(?path, "Using Sunshine app list"));
        AppsFile { path, log }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `covers/` next to `apps.json`.
    pub fn covers_dir(&self) -> PathBuf {
        self.path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("covers")
    }

    /// Add or update a game. An empty `image_path` keeps an existing image.
    pub fn add_game(&self, name: &str, cmd: &str, working_dir: &str, image_path: &str) -> bool {
        self.log.scope(|| match self.upsert(name, cmd, working_dir, image_path) {
            Ok(()) => {
                info!(game = name, "Updated Sunshine app list");
                true
            }
            Err(err) => {
                error!(game = name, path = ?self.path, %err, "Failed to update Sunshine app list");
                false
            }
        })
    }

    pub fn apps(&self) -> Result<Vec<AppEntry>> {
        Ok(self.read()?.apps)
    }

    fn upsert(&self, name: &str, cmd: &str, working_dir: &str, image_path: &str) -> Result<()> {
        let mut document = self.read()?;
        match document.apps.iter_mut().find(|app| app.name == name) {
            Some(app) => {
                app.cmd = Some(cmd.to_owned());
                app.working_dir = Some(working_dir.to_owned());
                if !image_path.is_empty() {
                    app.image_path = Some(image_path.to_owned());
                }
            }
            None => document.apps.push(AppEntry {
                name: name.to_owned(),
                cmd: Some(cmd.to_owned()),
                working_dir: Some(working_dir.to_owned()),
                image_path: Some(image_path.to_owned()),
                extra: Map::new(),
            }),
        }
        self.write(&document)
    }

    fn read(&self) -> Result<AppsDocument> {
        if !self.path.exists() {
            return Ok(AppsDocument::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(AppsDocument::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, document: &AppsDocument) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        document.serialize(&mut ser)?;
        fs::File::create(&self.path)?.write_all(&buf)?;
        Ok(())
    }
}
