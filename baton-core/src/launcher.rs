/*!
Launching the running program as a subordinate process.

`ProcessLauncher` is the seam the capability probe and the process-mode
restart go through. `SystemLauncher` is the production implementation over
`std::process::Command`.
*/

use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{BatonError, Result};

static INVOCATION: Lazy<Vec<String>> = Lazy::new(|| {
    let mut argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    // argv[0] may be relative to a working directory the task later leaves.
    if let (Some(program), Ok(exe)) = (argv.first_mut(), std::env::current_exe()) {
        *program = exe.to_string_lossy().into_owned();
    }
    argv
});

/// The command line this process was started with: program followed by its arguments
///
/// Captured once per process. The program is the absolute path of the running
/// executable where the platform can report it, so a restart still resolves
/// after the task changes its working directory.
pub fn current_invocation() -> Vec<String> {
    INVOCATION.clone()
}

/// Runs subordinate processes from an argv vector (program first)
pub trait ProcessLauncher {
    /// Run `argv` to completion and return everything it wrote to stdout
    fn run_capture(&self, argv: &[String]) -> Result<String>;

    /// Start `argv` and return as soon as it has been launched
    fn spawn_detached(&self, argv: &[String]) -> Result<()>;
}

impl<L: ProcessLauncher + ?Sized> ProcessLauncher for Box<L> {
    fn run_capture(&self, argv: &[String]) -> Result<String> {
        (**self).run_capture(argv)
    }

    fn spawn_detached(&self, argv: &[String]) -> Result<()> {
        (**self).spawn_detached(argv)
    }
}

/// Production launcher backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn command_for(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BatonError::validation("cannot launch an empty command line"))?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

impl ProcessLauncher for SystemLauncher {
    fn run_capture(&self, argv: &[String]) -> Result<String> {
        debug!(argv = ?argv, "Running subordinate process");

        let output = command_for(argv)?
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| BatonError::restart(format!("Failed to execute {}: {e}", argv[0])))?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_detached(&self, argv: &[String]) -> Result<()> {
        let child = command_for(argv)?
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| BatonError::restart(format!("Failed to spawn {}: {e}", argv[0])))?;

        debug!(pid = child.id(), argv = ?argv, "Spawned successor process");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_argv_is_rejected() {
        let launcher = SystemLauncher::new();

        assert!(matches!(
            launcher.run_capture(&[]),
            Err(BatonError::Validation(_))
        ));
        assert!(matches!(
            launcher.spawn_detached(&[]),
            Err(BatonError::Validation(_))
        ));
    }

    #[test]
    fn test_current_invocation_starts_with_program() {
        let invocation = current_invocation();

        assert!(!invocation.is_empty());
        assert_eq!(invocation, current_invocation());
    }

    #[test]
    fn test_current_invocation_program_is_absolute() {
        let invocation = current_invocation();

        if std::env::current_exe().is_ok() {
            assert!(std::path::Path::new(&invocation[0]).is_absolute());
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_capture_returns_stdout_verbatim() {
        let launcher = SystemLauncher::new();
        let argv = vec!["printf".to_string(), "%s".to_string(), "probe_ok".to_string()];

        assert_eq!(launcher.run_capture(&argv).unwrap(), "probe_ok");
    }

    #[test]
    fn test_missing_program_is_a_restart_error() {
        let launcher = SystemLauncher::new();
        let argv = vec!["/nonexistent/baton-test-binary".to_string()];

        assert!(matches!(
            launcher.run_capture(&argv),
            Err(BatonError::Restart(_))
        ));
    }
}
