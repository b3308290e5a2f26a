//! Game discovery.
//!
//! Each launcher we know about is a [`GameSource`]. The scanner asks all
//! of them and concatenates what they found.

pub mod steam;

use std::fmt;

use tracing::info;

use crate::logging::Logger;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Platform {
    Steam,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Steam => f.write_str("steam"),
        }
    }
}

/// An installed game and how to launch it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Game {
    pub name: String,
    pub cmd: String,
    pub working_dir: String,
    pub platform: Platform,
}

pub trait GameSource {
    fn platform(&self) -> Platform;

    /// Installed games. Problems are logged, never fatal.
    fn scan(&self) -> Vec<Game>;
}

pub struct GameScanner {
    sources: Vec<Box<dyn GameSource>>,
    log: Logger,
}

impl GameScanner {
    pub fn new(sources: Vec<Box<dyn GameSource>>, log: Logger) -> Self {
        GameScanner { sources, log }
    }

    pub fn scan_system(&self) -> Vec<Game> {
        let mut games = Vec::new();
        for source in &self.sources {
            self.log.scope(|| info!(platform = %source.platform(), "Scanning library"));
            games.extend(source.scan());
        }
        games
    }
}
