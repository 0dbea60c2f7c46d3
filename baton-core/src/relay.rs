/*!
The relay: one epoch of a budgeted task.

A [`Relay`] owns the state store, its persistence backend, the execution
budget and the restart mechanism. The task calls one of the `check*`
methods periodically; once less than the threshold of budget remains, the
relay checkpoints, starts the successor epoch and ends the current one.
*/

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::budget::{Budget, BudgetStatus, Clock, SystemClock};
use crate::config::RelayConfig;
use crate::handoff::{
    HandOff, ProcessExit, ProcessHandOff, RedirectHandOff, RequestHost, Terminator,
};
use crate::launcher::{current_invocation, ProcessLauncher, SystemLauncher};
use crate::metadata::Checkpoint;
use crate::probe;
use crate::state::StateStore;
use crate::storage::{FileBackend, SessionBackend, SessionContext, StateBackend};
use crate::{BatonError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    HandingOff,
    Closed,
}

/// Builder for a [`Relay`]
///
/// The execution mode is chosen by the terminal method:
/// [`RelayBuilder::start_process`] or [`RelayBuilder::start_request`].
pub struct RelayBuilder {
    config: RelayConfig,
    clock: Box<dyn Clock>,
    terminator: Box<dyn Terminator>,
    invocation: Option<Vec<String>>,
    epoch_start: Option<DateTime<Utc>>,
}

impl RelayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            clock: Box::new(SystemClock),
            terminator: Box::new(ProcessExit),
            invocation: None,
            epoch_start: None,
        }
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn terminator<T: Terminator + 'static>(mut self, terminator: T) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    /// Command line to probe and re-execute; defaults to this process's own
    pub fn invocation<I, S>(mut self, invocation: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation = Some(invocation.into_iter().map(Into::into).collect());
        self
    }

    /// Start of the epoch; defaults to construction time in process mode and
    /// the request time in request mode
    pub fn epoch_start(mut self, at: DateTime<Utc>) -> Self {
        self.epoch_start = Some(at);
        self
    }

    /// Start an epoch that restarts by re-executing its command line
    ///
    /// If the command line carries the probe sentinel, the probe is answered
    /// on stdout, the process is terminated and
    /// [`BatonError::ProbeAnswered`] is returned should termination return.
    ///
    /// # Errors
    /// * [`BatonError::RestartCapabilityUnavailable`] if the probe fails
    /// * [`BatonError::StorageUnwritable`] if the checkpoint file cannot be written
    /// * [`BatonError::BudgetConfigUnavailable`] if the host ceiling is unreadable
    pub fn start_process<L>(self, launcher: L) -> Result<Relay>
    where
        L: ProcessLauncher + 'static,
    {
        let Self {
            config,
            clock,
            terminator,
            invocation,
            epoch_start,
        } = self;
        config.validate()?;

        // The host's ceiling runs from process start, so the probe round
        // trip below counts against the budget.
        let epoch_start = epoch_start.unwrap_or_else(|| clock.now());
        let invocation = invocation.unwrap_or_else(current_invocation);

        if probe::respond_if_probed(&invocation, &config.probe)? {
            debug!("Answered capability probe, ending probe invocation");
            terminator.terminate(0);
            return Err(BatonError::ProbeAnswered);
        }

        probe::verify(&config.probe, &launcher, &invocation)?;
        let backend = FileBackend::new(&config.storage_key)?;
        let ceiling = config.resolve_ceiling()?;
        let budget = Budget::new(ceiling, config.threshold_secs, epoch_start);

        Relay::assemble(
            Box::new(backend),
            Box::new(ProcessHandOff::new(launcher, invocation)),
            clock,
            terminator,
            budget,
        )
    }

    /// Start an epoch that restarts by redirecting the host
    ///
    /// # Errors
    /// * [`BatonError::SessionUnavailable`] if the session cannot be started
    /// * [`BatonError::BudgetConfigUnavailable`] if the host ceiling is unreadable
    pub fn start_request<S, H>(self, session: S, host: H) -> Result<Relay>
    where
        S: SessionContext + 'static,
        H: RequestHost + 'static,
    {
        let Self {
            config,
            clock,
            terminator,
            epoch_start,
            ..
        } = self;
        config.validate()?;

        let backend = SessionBackend::new(session, config.storage_key.clone())?;
        let ceiling = config.resolve_ceiling()?;

        let epoch_start = epoch_start.unwrap_or_else(|| host.request_time());
        let budget = Budget::new(ceiling, config.threshold_secs, epoch_start);

        Relay::assemble(
            Box::new(backend),
            Box::new(RedirectHandOff::new(host)),
            clock,
            terminator,
            budget,
        )
    }
}

/// One live epoch of a budgeted task
///
/// Ending the epoch normally, through [`Relay::finish`], [`Relay::discard`]
/// or by dropping the relay, removes the checkpoint exactly once. After a
/// hand-off has begun the checkpoint is left for the successor.
///
/// # Example
/// ```rust,no_run
/// use baton_core::{Relay, RelayConfig};
/// use serde_json::json;
///
/// let mut relay = Relay::start(RelayConfig::default().with_storage_key("/tmp/import.state"))?;
/// let mut next = relay.value_or("import.next", json!(0)).as_u64().unwrap_or(0);
///
/// while next < 1_000 {
///     // ... one unit of work ...
///     next += 1;
///     relay.check_with([("import.next", json!(next))])?;
/// }
///
/// relay.finish()?;
/// # Ok::<(), baton_core::BatonError>(())
/// ```
pub struct Relay {
    store: StateStore,
    backend: Box<dyn StateBackend>,
    handoff: Box<dyn HandOff>,
    clock: Box<dyn Clock>,
    terminator: Box<dyn Terminator>,
    budget: Budget,
    epoch: u64,
    resumed: bool,
    phase: Phase,
}

impl Relay {
    pub fn builder(config: RelayConfig) -> RelayBuilder {
        RelayBuilder::new(config)
    }

    /// Start a process-mode epoch with the system launcher, clock and exit
    pub fn start(config: RelayConfig) -> Result<Self> {
        RelayBuilder::new(config).start_process(SystemLauncher::new())
    }

    fn assemble(
        mut backend: Box<dyn StateBackend>,
        handoff: Box<dyn HandOff>,
        clock: Box<dyn Clock>,
        terminator: Box<dyn Terminator>,
        budget: Budget,
    ) -> Result<Self> {
        let (store, epoch, resumed) = match backend.load()? {
            Some(checkpoint) => (checkpoint.state, checkpoint.epoch, true),
            None => (StateStore::new(), 0, false),
        };

        info!(
            mode = handoff.mode(),
            storage = %backend.describe(),
            epoch,
            resumed,
            ceiling_secs = budget.ceiling().num_seconds(),
            threshold_secs = budget.threshold().num_seconds(),
            "Relay started"
        );

        Ok(Self {
            store,
            backend,
            handoff,
            clock,
            terminator,
            budget,
            epoch,
            resumed,
            phase: Phase::Running,
        })
    }

    /// Index of this epoch; 0 unless resumed from a checkpoint
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether state was loaded from a previous epoch's checkpoint
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Time left before the ceiling, or `None` if unlimited
    pub fn remaining(&self) -> Option<Duration> {
        self.budget.remaining(self.clock.now())
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.store.get(path)
    }

    pub fn value_or(&self, path: &str, default: Value) -> Value {
        self.store.value_or(path, default)
    }

    pub fn set(&mut self, path: &str, value: Value) -> bool {
        self.store.set(path, value)
    }

    pub fn set_many<I, K>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.store.set_many(updates)
    }

    pub fn delete(&mut self, path: &str) -> Option<Value> {
        self.store.delete(path)
    }

    /// Check the budget, handing off if it is nearly exhausted
    pub fn check(&mut self) -> Result<BudgetStatus> {
        self.check_inner(None::<fn()>)
    }

    /// Apply `updates`, then check the budget
    ///
    /// The updates land in the store before any checkpoint is taken, so the
    /// successor sees them.
    pub fn check_with<I, K>(&mut self, updates: I) -> Result<BudgetStatus>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.store.set_many(updates);
        self.check_inner(None::<fn()>)
    }

    /// Check the budget, running `on_before_restart` in this epoch if a
    /// hand-off is triggered
    pub fn check_then<F>(&mut self, on_before_restart: F) -> Result<BudgetStatus>
    where
        F: FnOnce(),
    {
        self.check_inner(Some(on_before_restart))
    }

    /// Apply `updates`, then check the budget with a pre-restart callback
    pub fn check_with_then<I, K, F>(
        &mut self,
        updates: I,
        on_before_restart: F,
    ) -> Result<BudgetStatus>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
        F: FnOnce(),
    {
        self.store.set_many(updates);
        self.check_inner(Some(on_before_restart))
    }

    fn check_inner<F>(&mut self, on_before_restart: Option<F>) -> Result<BudgetStatus>
    where
        F: FnOnce(),
    {
        if self.phase != Phase::Running {
            return Ok(BudgetStatus::HandedOff);
        }

        let now = self.clock.now();
        let Some(remaining) = self.budget.remaining(now) else {
            return Ok(BudgetStatus::Unlimited);
        };

        if !self.budget.must_hand_off(now) {
            debug!(
                epoch = self.epoch,
                remaining_ms = remaining.num_milliseconds(),
                "Budget check passed"
            );
            return Ok(BudgetStatus::Remaining(remaining));
        }

        self.hand_off(remaining, on_before_restart)?;
        Ok(BudgetStatus::HandedOff)
    }

    fn hand_off<F>(&mut self, remaining: Duration, on_before_restart: Option<F>) -> Result<()>
    where
        F: FnOnce(),
    {
        info!(
            epoch = self.epoch,
            remaining_ms = remaining.num_milliseconds(),
            threshold_secs = self.budget.threshold().num_seconds(),
            "Execution budget nearly exhausted, handing off"
        );

        if self.store.is_empty() {
            // A checkpoint loaded by this epoch is stale once its state is gone.
            self.backend.clean()?;
        } else {
            let checkpoint = Checkpoint::new(self.epoch + 1, self.store.clone());
            self.backend.flush(&checkpoint)?;
        }

        self.phase = Phase::HandingOff;

        if let Some(callback) = on_before_restart {
            callback();
        }

        self.handoff.trigger()?;
        self.terminator.terminate(0);
        Ok(())
    }

    /// Remove the checkpoint from storage without ending the epoch
    pub fn clean(&mut self) -> Result<()> {
        self.backend.clean()
    }

    /// End the epoch normally, removing the checkpoint
    pub fn finish(mut self) -> Result<()> {
        self.teardown()
    }

    /// Drop all state and end the epoch, removing the checkpoint
    pub fn discard(mut self) -> Result<()> {
        self.store.clear();
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.phase != Phase::Running {
            return Ok(());
        }
        self.phase = Phase::Closed;

        debug!(epoch = self.epoch, storage = %self.backend.describe(), "Epoch finished");
        self.backend.clean()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "Failed to remove checkpoint at end of epoch");
        }
    }
}
