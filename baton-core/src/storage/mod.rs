/*!
Persistence backends for checkpoints.

This module defines the storage abstraction (port) and the two concrete
backends (adapters): a durable file for process mode and a host-provided
session context for request mode. The relay only talks to the trait, so the
epoch logic is independent of where the state lives.
*/

pub mod file;
pub mod session;

use crate::metadata::Checkpoint;
use crate::Result;

/// Storage abstraction for loading, flushing and removing a checkpoint
///
/// Every backend addresses exactly one checkpoint, named by the configured
/// storage key.
pub trait StateBackend {
    /// Load the checkpoint left by a previous epoch
    ///
    /// # Returns
    /// `None` if no checkpoint exists, or an error if one exists but cannot
    /// be read or fails verification
    fn load(&mut self) -> Result<Option<Checkpoint>>;

    /// Persist the checkpoint, replacing any previous one
    fn flush(&mut self, checkpoint: &Checkpoint) -> Result<()>;

    /// Remove the checkpoint; succeeds if there is nothing to remove
    fn clean(&mut self) -> Result<()>;

    /// Human-readable description of where the checkpoint lives
    fn describe(&self) -> String;
}

impl<B: StateBackend + ?Sized> StateBackend for Box<B> {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        (**self).load()
    }

    fn flush(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).flush(checkpoint)
    }

    fn clean(&mut self) -> Result<()> {
        (**self).clean()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

pub use file::FileBackend;
pub use session::{MemorySession, SessionBackend, SessionContext};
