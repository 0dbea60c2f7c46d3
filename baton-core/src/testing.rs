/*!
Recording doubles for the process, host and termination seams.

They let embedding applications exercise a relay end to end without
spawning processes or exiting. Every double is cheap to clone and clones
share their recordings.
*/

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::handoff::{RequestHost, Terminator};
use crate::launcher::ProcessLauncher;
use crate::{BatonError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct LauncherLog {
    answer: Option<String>,
    captured: Vec<Vec<String>>,
    spawned: Vec<Vec<String>>,
}

/// Launcher that records argv vectors instead of running them
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    log: Arc<Mutex<LauncherLog>>,
}

impl RecordingLauncher {
    /// Every captured run prints `output`; every spawn succeeds
    pub fn answering(output: impl Into<String>) -> Self {
        let launcher = Self::default();
        lock(&launcher.log).answer = Some(output.into());
        launcher
    }

    /// Every run and spawn fails as if the program could not be executed
    pub fn failing() -> Self {
        Self::default()
    }

    /// Argv vectors passed to `run_capture`, in order
    pub fn captured(&self) -> Vec<Vec<String>> {
        lock(&self.log).captured.clone()
    }

    /// Argv vectors passed to `spawn_detached`, in order
    pub fn spawned(&self) -> Vec<Vec<String>> {
        lock(&self.log).spawned.clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn run_capture(&self, argv: &[String]) -> Result<String> {
        let mut log = lock(&self.log);
        log.captured.push(argv.to_vec());
        log.answer
            .clone()
            .ok_or_else(|| BatonError::restart("exec is not available"))
    }

    fn spawn_detached(&self, argv: &[String]) -> Result<()> {
        let mut log = lock(&self.log);
        log.spawned.push(argv.to_vec());
        match log.answer {
            Some(_) => Ok(()),
            None => Err(BatonError::restart("exec is not available")),
        }
    }
}

#[derive(Debug)]
struct HostLog {
    uri: String,
    request_time: DateTime<Utc>,
    redirects: Vec<String>,
}

/// Request host that records redirects
#[derive(Debug, Clone)]
pub struct RecordingHost {
    log: Arc<Mutex<HostLog>>,
}

impl RecordingHost {
    /// A request for `uri` that started now
    pub fn new(uri: impl Into<String>) -> Self {
        Self::started_at(uri, Utc::now())
    }

    /// A request for `uri` that started at `request_time`
    pub fn started_at(uri: impl Into<String>, request_time: DateTime<Utc>) -> Self {
        Self {
            log: Arc::new(Mutex::new(HostLog {
                uri: uri.into(),
                request_time,
                redirects: Vec::new(),
            })),
        }
    }

    /// Locations redirected to, in order
    pub fn redirects(&self) -> Vec<String> {
        lock(&self.log).redirects.clone()
    }
}

impl RequestHost for RecordingHost {
    fn request_uri(&self) -> String {
        lock(&self.log).uri.clone()
    }

    fn request_time(&self) -> DateTime<Utc> {
        lock(&self.log).request_time
    }

    fn redirect(&mut self, location: &str) -> Result<()> {
        lock(&self.log).redirects.push(location.to_string());
        Ok(())
    }
}

/// Terminator that records exit codes and returns
#[derive(Debug, Clone, Default)]
pub struct RecordingTerminator {
    codes: Arc<Mutex<Vec<i32>>>,
}

impl RecordingTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit codes requested so far
    pub fn codes(&self) -> Vec<i32> {
        lock(&self.codes).clone()
    }

    pub fn terminated(&self) -> bool {
        !lock(&self.codes).is_empty()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        lock(&self.codes).push(code);
    }
}
