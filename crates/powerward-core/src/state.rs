//! Believed power state cell
//!
//! A `watch` channel with exactly one writer. The reconciliation loop owns
//! the [`StateWriter`]; everything else holds a [`StateReader`].

use powerward_api::BelievedState;
use tokio::sync::watch;

/// Create the believed-state cell, seeded with the startup probe result
pub fn believed_state(initial: BelievedState) -> (StateWriter, StateReader) {
    let (tx, rx) = watch::channel(initial);
    (StateWriter { tx }, StateReader { rx })
}

/// Sole writer of the believed state. Deliberately not `Clone`.
#[derive(Debug)]
pub struct StateWriter {
    tx: watch::Sender<BelievedState>,
}

impl StateWriter {
    /// Replace the believed state. Returns whether power or verification changed.
    pub fn set(&self, state: BelievedState) -> bool {
        self.tx.send_if_modified(|current| {
            let changed =
                current.power != state.power || current.verification != state.verification;
            *current = state;
            changed
        })
    }

    pub fn current(&self) -> BelievedState {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateReader {
    rx: watch::Receiver<BelievedState>,
}

impl StateReader {
    pub fn current(&self) -> BelievedState {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. Returns `false` once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerward_api::{PowerState, Verification};

    #[tokio::test]
    async fn readers_see_writes() {
        let (writer, reader) = believed_state(BelievedState::probed(false, powerward_util::now()));
        let mut other = writer.reader();

        assert!(writer.set(BelievedState {
            power: PowerState::Online,
            verification: Verification::Verified,
            since: powerward_util::now(),
        }));

        assert!(other.changed().await);
        assert_eq!(reader.current().power, PowerState::Online);
        assert_eq!(other.current().verification, Verification::Verified);
    }

    #[tokio::test]
    async fn same_state_is_not_a_change() {
        let initial = BelievedState::probed(true, powerward_util::now());
        let (writer, _reader) = believed_state(initial.clone());
        assert!(!writer.set(initial));
    }

    #[tokio::test]
    async fn reader_notices_dropped_writer() {
        let (writer, mut reader) = believed_state(BelievedState::probed(true, powerward_util::now()));
        drop(writer);
        assert!(!reader.changed().await);
    }
}
