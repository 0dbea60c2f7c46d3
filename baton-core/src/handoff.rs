/*!
Restart mechanisms and epoch termination.

A hand-off starts the successor epoch: in process mode by re-executing the
original command line, in request mode by redirecting the host back to the
original request. The current epoch is then ended through a [`Terminator`].
*/

use chrono::{DateTime, Utc};
use tracing::info;

use crate::launcher::ProcessLauncher;
use crate::Result;

/// Starts the successor epoch
pub trait HandOff {
    fn trigger(&mut self) -> Result<()>;

    /// Name of the execution mode, for logs
    fn mode(&self) -> &'static str;
}

/// Re-executes the original command line verbatim
#[derive(Debug)]
pub struct ProcessHandOff<L: ProcessLauncher> {
    launcher: L,
    invocation: Vec<String>,
}

impl<L: ProcessLauncher> ProcessHandOff<L> {
    pub fn new(launcher: L, invocation: Vec<String>) -> Self {
        Self {
            launcher,
            invocation,
        }
    }
}

impl<L: ProcessLauncher> HandOff for ProcessHandOff<L> {
    fn trigger(&mut self) -> Result<()> {
        info!(argv = ?self.invocation, "Re-executing for the next epoch");
        self.launcher.spawn_detached(&self.invocation)
    }

    fn mode(&self) -> &'static str {
        "process"
    }
}

/// The host side of a request-mode epoch
pub trait RequestHost {
    /// Target of the current request, as received
    fn request_uri(&self) -> String;

    /// When the host started serving the current request
    fn request_time(&self) -> DateTime<Utc>;

    /// Answer the current request with a redirect to `location`
    fn redirect(&mut self, location: &str) -> Result<()>;
}

/// Redirects the host back to the original request target
#[derive(Debug)]
pub struct RedirectHandOff<H: RequestHost> {
    host: H,
}

impl<H: RequestHost> RedirectHandOff<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }
}

impl<H: RequestHost> HandOff for RedirectHandOff<H> {
    fn trigger(&mut self) -> Result<()> {
        let location = self.host.request_uri();
        info!(location = %location, "Redirecting for the next epoch");
        self.host.redirect(&location)
    }

    fn mode(&self) -> &'static str {
        "request"
    }
}

/// Ends the current epoch once the successor has been started
pub trait Terminator {
    fn terminate(&self, code: i32);
}

/// Exits the process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHost, RecordingLauncher};

    #[test]
    fn test_process_hand_off_spawns_original_argv() {
        let launcher = RecordingLauncher::answering("");
        let argv: Vec<String> = ["job", "--items", "5"].iter().map(|s| s.to_string()).collect();
        let mut handoff = ProcessHandOff::new(launcher.clone(), argv.clone());

        handoff.trigger().unwrap();

        assert_eq!(launcher.spawned(), vec![argv]);
        assert!(launcher.captured().is_empty());
        assert_eq!(handoff.mode(), "process");
    }

    #[test]
    fn test_process_hand_off_surfaces_spawn_failure() {
        let mut handoff = ProcessHandOff::new(RecordingLauncher::failing(), vec!["job".into()]);

        assert!(handoff.trigger().is_err());
    }

    #[test]
    fn test_redirect_targets_request_uri_unmodified() {
        let host = RecordingHost::new("/reports/build?year=2024&page=3");
        let mut handoff = RedirectHandOff::new(host.clone());

        handoff.trigger().unwrap();

        assert_eq!(host.redirects(), vec!["/reports/build?year=2024&page=3".to_string()]);
        assert_eq!(handoff.mode(), "request");
    }
}
