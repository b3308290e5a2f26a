use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Arg, ArgMatches, Command};
use tracing::{info, warn};

use streamctl::command::SystemRunner;
use streamctl::config::{self, Config};
use streamctl::display;
use streamctl::games::steam::SteamLibrary;
use streamctl::games::GameScanner;
use streamctl::logging::{self, Logger};
use streamctl::metadata::IgdbClient;
use streamctl::orchestrator::{Backends, Orchestrator};
use streamctl::registry::SystemRegistry;

fn cli() -> Command<'static> {
    Command::new("streamctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Prepares this machine for game streaming")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Settings file [default: <config dir>/streamctl/settings.json]")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log debug output")
                .takes_value(false)
                .global(true),
        )
        .subcommand(
            Command::new("start")
                .about("Create the virtual display and switch the physical one off")
                .arg(
                    Arg::new("client-res")
                        .long("client-res")
                        .value_name("WIDTHxHEIGHT")
                        .help("Resolution of the streaming client, e.g. 1920x1080")
                        .takes_value(true)
                        .required(true),
                ),
        )
        .subcommand(Command::new("stop").about("Wake the physical display, remove the virtual one"))
        .subcommand(Command::new("install").about("Download and install the display driver"))
        .subcommand(Command::new("scan").about("Add installed games to Sunshine"))
}

fn config_path(matches: &ArgMatches) -> Option<PathBuf> {
    matches
        .value_of("config")
        .map(PathBuf::from)
        .or_else(config::default_path)
}

fn main() {
    let matches = cli().get_matches();
    logging::init(matches.is_present("verbose"));
    let log = Logger::current();

    let config = match config_path(&matches) {
        Some(path) => Config::load(&path, &log),
        None => {
            log.scope(|| warn!("No config directory on this system, using defaults"));
            Config::default()
        }
    }
    .with_env(|key| env::var(key).ok());

    let registry = Rc::new(SystemRegistry);
    let backends = Backends {
        runner: Rc::new(SystemRunner::new(log.clone())),
        displays: display::system(&log),
        registry: registry.clone(),
    };
    let steam_path = config.steam_path.as_ref().map(PathBuf::from);
    let orchestrator = Orchestrator::new(config, backends, log.clone());

    match matches.subcommand() {
        Some(("start", sub)) => {
            let client_res = sub.value_of("client-res").unwrap_or_default();
            let report = orchestrator.start(client_res);
            log.scope(|| info!(steps = ?report.executed(), aborted = report.aborted, "Started"));
        }
        Some(("stop", _)) => {
            let report = orchestrator.stop();
            log.scope(|| info!(steps = ?report.executed(), aborted = report.aborted, "Stopped"));
        }
        Some(("install", _)) => {
            orchestrator.install();
        }
        Some(("scan", _)) => {
            let scanner = GameScanner::new(
                vec![Box::new(SteamLibrary::new(registry, steam_path, log.clone()))],
                log.clone(),
            );
            orchestrator.scan_games(&scanner, |id, secret| {
                IgdbClient::new(id, secret, log.clone())
            });
        }
        _ => unreachable!("a subcommand is required"),
    }
}
