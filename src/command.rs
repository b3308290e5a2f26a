//! # External commands
//!
//! Everything this tool does to the machine beyond a handful of OS calls
//! goes through an external program. A [`CommandRunner`] runs one to
//! completion and hands back what it said; it never fails on its own.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::Command;

use tracing::{debug, error, info};

use crate::logging::Logger;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn ok(stdout: &str) -> Self {
        CommandResult {
            exit_code: 0,
            stdout: stdout.to_owned(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        CommandResult {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait CommandRunner {
    /// Run `argv[0]` with the remaining arguments and wait for it to exit.
    ///
    /// A process that could not be spawned is reported with exit code -1
    /// and the spawn error in `stderr`.
    fn run(&self, argv: &[String]) -> CommandResult;
}

/// Runs real processes.
#[derive(Debug, Default)]
pub struct SystemRunner {
    log: Logger,
}

impl SystemRunner {
    pub fn new(log: Logger) -> Self {
        SystemRunner { log }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> CommandResult {
        self.log.scope(|| {
            let (program, args) = match argv.split_first() {
                Some(split) => split,
                None => {
                    error!("Refusing to run an empty command line");
                    return CommandResult::failed(-1, "empty command line");
                }
            };

            info!(command = ?argv, "Running command");
            let output = match Command::new(program).args(args).output() {
                Ok(output) => output,
                Err(err) => {
                    error!(%program, %err, "Failed to start command");
                    return CommandResult::failed(-1, &err.to_string());
                }
            };

            let result = CommandResult {
                // Killed by a signal has no code.
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            if result.success() {
                debug!(%program, "Command finished");
            } else {
                error!(
                    %program,
                    code = result.exit_code,
                    stderr = %result.stderr.trim(),
                    "Command failed"
                );
            }
            result
        })
    }
}

/// Scripted runner.
///
/// This is purely for testing or debugging: it records every command line
/// and answers with queued results, falling back to success.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    replies: RefCell<VecDeque<CommandResult>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, result: CommandResult) -> Self {
        self.replies.borrow_mut().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> CommandResult {
        self.calls.borrow_mut().push(argv.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| CommandResult::ok(""))
    }
}

/// Builds an argv from anything string-like.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().map(|s| s.as_ref().to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::Recorded;
    use tracing::Level;

    #[test]
    fn missing_program_is_reported_not_raised() {
        let recorded = Recorded::default();
        let runner = SystemRunner::new(recorded.logger());

        let result = runner.run(&argv(["definitely-not-a-real-program-4f1c"]));

        assert_eq!(result.exit_code, -1);
        assert!(result.stdout.is_empty());
        assert!(!result.stderr.is_empty());
        assert!(recorded.contains(Level::ERROR, "Failed to start command"));
    }

    #[test]
    fn empty_command_line() {
        let runner = SystemRunner::new(Logger::silent());
        assert_eq!(runner.run(&[]).exit_code, -1);
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let runner = SystemRunner::new(Logger::silent());

        let ok = runner.run(&argv(["sh", "-c", "echo hello"]));
        assert_eq!(ok, CommandResult::ok("hello\n"));

        let recorded = Recorded::default();
        let runner = SystemRunner::new(recorded.logger());
        let failed = runner.run(&argv(["sh", "-c", "echo boom >&2; exit 3"]));
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr, "boom\n");
        assert!(recorded.contains(Level::ERROR, "Command failed"));
    }

    #[test]
    fn scripted_runner_replays_in_order() {
        let runner = ScriptedRunner::new()
            .reply(CommandResult::failed(1, "nope"))
            .reply(CommandResult::ok("fine"));

        assert_eq!(runner.run(&argv(["a"])).exit_code, 1);
        assert_eq!(runner.run(&argv(["b"])).stdout, "fine");
        assert!(runner.run(&argv(["c"])).success());
        assert_eq!(runner.calls(), vec![argv(["a"]), argv(["b"]), argv(["c"])]);
    }
}
