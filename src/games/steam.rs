//! Steam library scanning.
//!
//! Steam records its library folders in `steamapps/libraryfolders.vdf` and
//! one `appmanifest_<appid>.acf` per installed game. Both are KeyValues
//! text; we only need a few `"key" "value"` pairs out of them, so they are
//! picked out with regexes rather than parsed properly.

use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};
use std::rc::Rc;

use glob::{glob, Pattern};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, warn};

use super::{Game, GameSource, Platform};
use crate::logging::Logger;
use crate::registry::Registry;

pub const STEAM_KEY: &str = r"Software\Valve\Steam";

lazy_static! {
    static ref LIBRARY_PATH: Regex = Regex::new(r#""path"\s+"([^"]+)""#).unwrap();
    static ref NAME: Regex = Regex::new(r#""name"\s+"([^"]+)""#).unwrap();
    static ref INSTALL_DIR: Regex = Regex::new(r#""installdir"\s+"([^"]+)""#).unwrap();
    static ref APP_ID: Regex = Regex::new(r#""appid"\s+"(\d+)""#).unwrap();
}

/// Library roots listed in `libraryfolders.vdf`.
pub fn parse_library_folders(content: &str) -> Vec<PathBuf> {
    LIBRARY_PATH
        .captures_iter(content)
        .map(|cap| PathBuf::from(cap[1].replace(r"\\", r"\")))
        .collect()
}

/// The game described by an app manifest found in `steamapps`.
pub fn parse_app_manifest(content: &str, steamapps: &Path) -> Option<Game> {
    let name = NAME.captures(content)?[1].to_owned();
    let install_dir = INSTALL_DIR.captures(content)?[1].to_owned();
    let working_dir = steamapps.join("common").join(install_dir);
    let cmd = match APP_ID.captures(content) {
        Some(cap) => format!("steam://rungameid/{}", &cap[1]),
        None => working_dir.display().to_string(),
    };
    Some(Game {
        name,
        cmd,
        working_dir: working_dir.display().to_string(),
        platform: Platform::Steam,
    })
}

pub struct SteamLibrary {
    registry: Rc<dyn Registry>,
    steam_path: Option<PathBuf>,
    log: Logger,
}

impl SteamLibrary {
    /// `steam_path` overrides the location recorded in the registry.
    pub fn new(registry: Rc<dyn Registry>, steam_path: Option<PathBuf>, log: Logger) -> Self {
        SteamLibrary {
            registry,
            steam_path,
            log,
        }
    }

    fn steam_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.steam_path {
            return Some(path.clone());
        }
        match self.registry.get_string(STEAM_KEY, "SteamPath") {
            // Steam writes this one with forward slashes.
            Ok(Some(path)) => Some(PathBuf::from(path.replace('/', MAIN_SEPARATOR_STR))),
            Ok(None) => {
                warn!("Steam does not appear to be installed");
                None
            }
            Err(err) => {
                error!(%err, "Could not look up the Steam install");
                None
            }
        }
    }

    fn manifests(steamapps: &Path) -> Vec<PathBuf> {
        let pattern = format!(
            "{}/appmanifest_*.acf",
            Pattern::escape(&steamapps.display().to_string())
        );
        match glob(&pattern) {
            Ok(paths) => paths.filter_map(|entry| entry.ok()).collect(),
            Err(err) => {
                error!(%err, "Bad manifest pattern");
                Vec::new()
            }
        }
    }
}

impl GameSource for SteamLibrary {
    fn platform(&self) -> Platform {
        Platform::Steam
    }

    fn scan(&self) -> Vec<Game> {
        self.log.scope(|| {
            let mut games = Vec::new();
            let steam = match self.steam_path() {
                Some(path) => path,
                None => return games,
            };

            let folders_file = steam.join("steamapps").join("libraryfolders.vdf");
            let mut libraries = match fs::read_to_string(&folders_file) {
                Ok(content) => parse_library_folders(&content),
                Err(err) => {
                    warn!(path = ?folders_file, %err, "Steam library folders file not readable");
                    return games;
                }
            };
            if !libraries.contains(&steam) {
                libraries.push(steam);
            }

            for library in libraries {
                let steamapps = library.join("steamapps");
                if !steamapps.is_dir() {
                    debug!(?library, "Library has no steamapps folder");
                    continue;
                }
                for manifest in Self::manifests(&steamapps) {
                    let parsed = fs::read_to_string(&manifest)
                        .ok()
                        .and_then(|content| parse_app_manifest(&content, &steamapps));
                    match parsed {
                        Some(game) => games.push(game),
                        None => warn!(?manifest, "Skipping unreadable app manifest"),
                    }
                }
            }
            debug!(count = games.len(), "Steam scan finished");
            games
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    const LIBRARY_FOLDERS: &str = r#""libraryfolders"
{
    "1"
    {
        "path"      "C:\\Program Files (x86)\\Steam"
    }
    "2"
    {
        "path"      "D:\\Games\\SteamLibrary"
    }
}
"#;

    const MANIFEST: &str = r#""AppState"
{
    "appid"     "10"
    "Universe"      "1"
    "name"      "Counter-Strike"
    "StateFlags"        "4"
    "installdir"        "Half-Life"
}
"#;

    #[test]
    fn library_folders() {
        let paths = parse_library_folders(LIBRARY_FOLDERS);
        assert_eq!(
            paths,
            vec![
                PathBuf::from(r"C:\Program Files (x86)\Steam"),
                PathBuf::from(r"D:\Games\SteamLibrary"),
            ]
        );
    }

    #[test]
    fn app_manifest() {
        let steamapps = Path::new("lib").join("steamapps");
        let game = parse_app_manifest(MANIFEST, &steamapps).unwrap();

        assert_eq!(game.name, "Counter-Strike");
        assert_eq!(game.cmd, "steam://rungameid/10");
        assert_eq!(
            game.working_dir,
            steamapps.join("common").join("Half-Life").display().to_string()
        );
        assert_eq!(game.platform, Platform::Steam);
    }

    #[test]
    fn manifest_without_appid_launches_the_directory() {
        let content = MANIFEST.replace(r#""appid"     "10""#, "");
        let game = parse_app_manifest(&content, Path::new("steamapps")).unwrap();
        assert_eq!(game.cmd, game.working_dir);
    }

    #[test]
    fn manifest_without_name_is_skipped() {
        assert!(parse_app_manifest(r#""installdir" "x""#, Path::new("steamapps")).is_none());
    }

    #[test]
    fn scans_every_library() {
        let root = tempfile::tempdir().unwrap();
        let steam = root.path().join("Steam [main]");
        let extra = root.path().join("Library");
        for lib in [&steam, &extra] {
            fs::create_dir_all(lib.join("steamapps")).unwrap();
        }
        // The main path is missing from the vdf and has to be added back.
        fs::write(
            steam.join("steamapps").join("libraryfolders.vdf"),
            format!("\"path\" \"{}\"", extra.display().to_string().replace('\\', r"\\")),
        )
        .unwrap();
        fs::write(steam.join("steamapps").join("appmanifest_10.acf"), MANIFEST).unwrap();
        fs::write(
            extra.join("steamapps").join("appmanifest_620.acf"),
            MANIFEST
                .replace("Counter-Strike", "Portal 2")
                .replace(r#""10""#, r#""620""#),
        )
        .unwrap();
        fs::write(extra.join("steamapps").join("appmanifest_1.acf"), "garbage").unwrap();
        fs::write(extra.join("steamapps").join("notes.txt"), MANIFEST).unwrap();

        let registry = Rc::new(MemoryRegistry::new().with(
            STEAM_KEY,
            "SteamPath",
            &steam.display().to_string(),
        ));
        let library = SteamLibrary::new(registry, None, Logger::silent());

        let mut cmds: Vec<String> = library.scan().into_iter().map(|g| g.cmd).collect();
        cmds.sort();
        assert_eq!(cmds, ["steam://rungameid/10", "steam://rungameid/620"]);
    }

    #[test]
    fn no_steam_no_games() {
        let library = SteamLibrary::new(Rc::new(MemoryRegistry::new()), None, Logger::silent());
        assert!(library.scan().is_empty());
    }
}
