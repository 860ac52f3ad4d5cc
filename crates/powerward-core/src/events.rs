//! Core events emitted by the executor and reconciliation loop

use powerward_api::{
    BelievedState, EventPayload, InFlightTransition, TransitionFailure, TransitionReport,
};

/// Events emitted by the core
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A procedure acquired the guard
    TransitionStarted(InFlightTransition),

    /// A procedure ran to completion, verified or not
    TransitionFinished(TransitionReport),

    /// A procedure aborted on a fatal step
    TransitionFailed(TransitionFailure),

    /// The reconciliation loop wrote a new believed state
    BelievedStateChanged(BelievedState),
}

impl From<CoreEvent> for EventPayload {
    fn from(event: CoreEvent) -> Self {
        match event {
            CoreEvent::TransitionStarted(info) => EventPayload::TransitionStarted {
                transition_id: info.transition_id,
                direction: info.direction,
                trigger: info.trigger,
            },
            CoreEvent::TransitionFinished(report) => EventPayload::TransitionFinished(report),
            CoreEvent::TransitionFailed(failure) => EventPayload::TransitionFailed(failure),
            CoreEvent::BelievedStateChanged(state) => EventPayload::BelievedStateChanged(state),
        }
    }
}
