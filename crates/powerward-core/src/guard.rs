//! Single-flight guard for transition procedures

use powerward_api::{Direction, InFlightTransition, TransitionTrigger};
use powerward_util::TransitionId;
use std::sync::{Arc, Mutex, MutexGuard};

type Slot = Arc<Mutex<Option<InFlightTransition>>>;

/// At most one power procedure runs against the managed host at a time.
///
/// Acquisition never waits: a second caller gets `None` and is expected to
/// retry later.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    slot: Slot,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(
        &self,
        direction: Direction,
        trigger: TransitionTrigger,
    ) -> Option<FlightPermit> {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return None;
        }

        let info = InFlightTransition {
            transition_id: TransitionId::new(),
            direction,
            trigger,
            started_at: powerward_util::now(),
        };
        *slot = Some(info.clone());

        Some(FlightPermit {
            slot: Arc::clone(&self.slot),
            info,
        })
    }

    /// The procedure currently holding the guard, if any
    pub fn current(&self) -> Option<InFlightTransition> {
        lock(&self.slot).clone()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

/// Proof of holding the guard; releases it on drop
#[derive(Debug)]
pub struct FlightPermit {
    slot: Slot,
    info: InFlightTransition,
}

impl FlightPermit {
    pub fn id(&self) -> &TransitionId {
        &self.info.transition_id
    }

    pub fn direction(&self) -> Direction {
        self.info.direction
    }

    pub fn trigger(&self) -> TransitionTrigger {
        self.info.trigger
    }

    pub fn info(&self) -> &InFlightTransition {
        &self.info
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        *lock(&self.slot) = None;
    }
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<InFlightTransition>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected() {
        let guard = SingleFlight::new();
        let permit = guard
            .try_acquire(Direction::PowerOn, TransitionTrigger::Schedule)
            .unwrap();
        assert!(guard.is_busy());
        assert!(
            guard
                .try_acquire(Direction::PowerOff, TransitionTrigger::Manual)
                .is_none()
        );

        let current = guard.current().unwrap();
        assert_eq!(&current.transition_id, permit.id());
        assert_eq!(current.direction, Direction::PowerOn);
    }

    #[test]
    fn drop_releases_guard() {
        let guard = SingleFlight::new();
        {
            let _permit = guard
                .try_acquire(Direction::PowerOff, TransitionTrigger::Manual)
                .unwrap();
        }
        assert!(!guard.is_busy());
        assert!(guard.current().is_none());
        assert!(
            guard
                .try_acquire(Direction::PowerOn, TransitionTrigger::Schedule)
                .is_some()
        );
    }

    #[test]
    fn clones_share_one_slot() {
        let guard = SingleFlight::new();
        let other = guard.clone();
        let _permit = other
            .try_acquire(Direction::PowerOn, TransitionTrigger::Manual)
            .unwrap();
        assert!(guard.is_busy());
    }

    #[test]
    fn released_even_on_panic() {
        let guard = SingleFlight::new();
        let inner = guard.clone();
        let result = std::thread::spawn(move || {
            let _permit = inner
                .try_acquire(Direction::PowerOn, TransitionTrigger::Schedule)
                .unwrap();
            panic!("procedure blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.is_busy());
    }
}
