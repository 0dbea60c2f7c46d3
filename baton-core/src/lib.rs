/*!
# Baton Core Engine

Checkpoint and self-restart for tasks that run under a wall-clock execution
budget.

A task that would be killed when its host's execution ceiling expires runs
inside a [`Relay`]. The relay carries nested state for the task, watches the
remaining budget and, shortly before the ceiling, checkpoints the state and
hands off to a freshly started instance of the task, which resumes from the
checkpoint. To the task it looks like one continuous run.

## Architecture

- [`state`]: nested key-value store addressed by dotted paths
- [`storage`]: checkpoint backends (file for process mode, host session for request mode)
- [`probe`]: startup check that the program can re-invoke itself
- [`budget`]: remaining-time arithmetic against an injectable clock
- [`handoff`]: restart mechanisms (re-exec or redirect) and epoch termination
- [`relay`]: the facade tying them together for one epoch

Every external effect (process launching, session storage, redirects, exit,
time) sits behind a trait, with production implementations here and
recording doubles in [`testing`].

## Usage

```rust,no_run
use baton_core::{probe, Relay, RelayConfig};
use serde_json::json;

let config = RelayConfig::from_env()?;

// Answer a capability probe before any argument parsing.
if probe::respond_if_probed(&baton_core::launcher::current_invocation(), &config.probe)? {
    return Ok(());
}

let mut relay = Relay::start(config)?;
let mut done = relay.value_or("done", json!(0)).as_u64().unwrap_or(0);
while done < 10_000 {
    done += 1;
    relay.check_with([("done", json!(done))])?;
}
relay.finish()?;
# Ok::<(), baton_core::BatonError>(())
```
*/

pub mod budget;
pub mod config;
pub mod error;
pub mod handoff;
pub mod launcher;
pub mod metadata;
pub mod observability;
pub mod probe;
pub mod relay;
pub mod state;
pub mod storage;
pub mod testing;

#[cfg(test)]
mod error_tests;

pub use budget::{Budget, BudgetStatus, Clock, ManualClock, SystemClock};
pub use config::{ProbeConfig, RelayConfig};
pub use error::{BatonError, Result};
pub use handoff::{HandOff, ProcessExit, RequestHost, Terminator};
pub use launcher::{ProcessLauncher, SystemLauncher};
pub use metadata::{Checkpoint, CheckpointMetadata};
pub use relay::{Relay, RelayBuilder};
pub use state::StateStore;
pub use storage::{FileBackend, MemorySession, SessionBackend, SessionContext, StateBackend};
