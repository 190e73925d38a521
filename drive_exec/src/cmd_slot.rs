//! Latest-value command handoff between threads
//!
//! A command source (operator input, a network client) runs on its own thread
//! and writes into the slot, the control loop reads from it once per cycle.
//! Newer commands overwrite older ones which have not yet been read, commands
//! are never queued.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The writing half of a command slot.
pub struct CmdWriter<T> {
    slot: Arc<Mutex<Slot<T>>>
}

/// The reading half of a command slot.
pub struct CmdReader<T> {
    slot: Arc<Mutex<Slot<T>>>
}

struct Slot<T> {
    /// The newest unread command.
    value: Option<T>,

    /// When the last command was written.
    written_at: Option<Instant>,

    /// Number of unread commands which were overwritten.
    num_overwritten: u64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CmdSlotError {
    #[error("The command slot was poisoned by a panic on the other side")]
    Poisoned,

    #[error("The other half of the command slot has been dropped")]
    Disconnected
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Create a new empty command slot, returning the writing and reading halves.
pub fn cmd_slot<T>() -> (CmdWriter<T>, CmdReader<T>) {
    let slot = Arc::new(Mutex::new(Slot {
        value: None,
        written_at: None,
        num_overwritten: 0
    }));

    (
        CmdWriter { slot: slot.clone() },
        CmdReader { slot }
    )
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T> CmdWriter<T> {
    /// Write a new command, replacing any unread one.
    pub fn write(&self, cmd: T) -> Result<(), CmdSlotError> {
        // Only the writer is left, nobody will ever read this
        if Arc::strong_count(&self.slot) < 2 {
            return Err(CmdSlotError::Disconnected)
        }

        let mut slot = self.slot.lock().map_err(|_| CmdSlotError::Poisoned)?;

        if slot.value.is_some() {
            slot.num_overwritten += 1;
        }
        slot.value = Some(cmd);
        slot.written_at = Some(Instant::now());

        Ok(())
    }
}

impl<T> CmdReader<T> {
    /// Take the newest unread command, if there is one.
    pub fn take(&mut self) -> Result<Option<T>, CmdSlotError> {
        let mut slot = self.slot.lock().map_err(|_| CmdSlotError::Poisoned)?;

        Ok(slot.value.take())
    }

    /// Time since the last command was written, or `None` if nothing has been
    /// written yet.
    pub fn age(&self) -> Result<Option<Duration>, CmdSlotError> {
        let slot = self.slot.lock().map_err(|_| CmdSlotError::Poisoned)?;

        Ok(slot.written_at.map(|t| t.elapsed()))
    }

    /// Number of commands which were overwritten before being read.
    pub fn num_overwritten(&self) -> Result<u64, CmdSlotError> {
        let slot = self.slot.lock().map_err(|_| CmdSlotError::Poisoned)?;

        Ok(slot.num_overwritten)
    }

    /// True if the writer has been dropped.
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.slot) < 2
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_latest_value() {
        let (tx, mut rx) = cmd_slot();

        assert_eq!(rx.take().unwrap(), None);
        assert_eq!(rx.age().unwrap(), None);

        tx.write(1).unwrap();
        tx.write(2).unwrap();
        tx.write(3).unwrap();

        // Only the newest is seen, once
        assert_eq!(rx.take().unwrap(), Some(3));
        assert_eq!(rx.take().unwrap(), None);
        assert_eq!(rx.num_overwritten().unwrap(), 2);
        assert!(rx.age().unwrap().is_some());
    }

    #[test]
    fn test_across_threads() {
        let (tx, mut rx) = cmd_slot();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                tx.write(i).unwrap();
            }
        });
        handle.join().unwrap();

        assert_eq!(rx.take().unwrap(), Some(99));
        assert!(rx.is_disconnected());
    }

    #[test]
    fn test_disconnected_writer() {
        let (tx, rx) = cmd_slot::<u32>();
        drop(rx);
        assert!(matches!(tx.write(1), Err(CmdSlotError::Disconnected)));
    }
}
