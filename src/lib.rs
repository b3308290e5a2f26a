//! Automates the host side of game streaming: a virtual display sized for
//! the client, the physical monitor switched off while streaming, Sunshine
//! pinned to the discrete GPU, and the installed games listed in Sunshine.

pub mod command;
pub mod config;
pub mod display;
pub mod error;
pub mod games;
pub mod gpu;
pub mod installer;
pub mod logging;
pub mod metadata;
pub mod orchestrator;
pub mod power;
pub mod registry;
pub mod resolution;
pub mod sunshine;
pub mod virtual_display;

#[cfg(test)]
mod test_server;
