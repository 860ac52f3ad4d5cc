//! Human-readable rendering of daemon replies and events

use chrono::{DateTime, Utc};
use powerward_api::{
    BelievedState, Event, EventPayload, ResponsePayload, ServiceStateSnapshot, TransitionOutcome,
    TransitionReport, Verification,
};
use powerward_util::format_duration;

pub fn render_payload(payload: &ResponsePayload, now: DateTime<Utc>) -> String {
    match payload {
        ResponsePayload::State(snapshot) => render_snapshot(snapshot, now),
        ResponsePayload::TransitionAccepted {
            transition_id,
            direction,
        } => format!("{} started ({})", direction, transition_id.short()),
        ResponsePayload::Reachable { reachable: true } => "reachable".into(),
        ResponsePayload::Reachable { reachable: false } => "unreachable".into(),
        ResponsePayload::Health(health) => format!(
            "live: {}\nready: {}\nmanaged: {}\ntransition in flight: {}",
            health.live, health.ready, health.managed, health.transition_in_flight
        ),
        ResponsePayload::Subscribed { client_id } => format!("subscribed as {}", client_id),
        ResponsePayload::Unsubscribed => "unsubscribed".into(),
        ResponsePayload::Pong => "pong".into(),
    }
}

fn render_snapshot(snapshot: &ServiceStateSnapshot, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!("believed:  {}", render_believed(&snapshot.believed, now)),
        format!("desired:   {}", snapshot.desired),
        format!(
            "schedule:  {}{}",
            snapshot.schedule,
            if snapshot.managed { "" } else { " (not managed)" }
        ),
    ];

    if let Some(t) = &snapshot.in_flight {
        lines.push(format!(
            "running:   {} ({:?}, {} ago)",
            t.direction,
            t.trigger,
            elapsed(t.started_at, now)
        ));
    }
    if let Some(report) = &snapshot.last_transition {
        lines.push(format!("last run:  {}", render_report(report)));
    }
    if let Some(failure) = &snapshot.last_failure {
        lines.push(format!(
            "last fail: {} at {}: {}",
            failure.direction,
            failure.at.format("%Y-%m-%d %H:%M:%S UTC"),
            failure.error
        ));
    }

    lines.join("\n")
}

fn render_believed(state: &BelievedState, now: DateTime<Utc>) -> String {
    let how = match state.verification {
        Verification::Probed => "probed at startup",
        Verification::Verified => "verified",
        Verification::Unverified => "unverified",
    };
    format!("{} ({}, for {})", state.power, how, elapsed(state.since, now))
}

fn render_report(report: &TransitionReport) -> String {
    let outcome = match report.outcome {
        TransitionOutcome::Verified { attempts } => format!("verified after {} probe(s)", attempts),
        TransitionOutcome::Unverified { attempts } => {
            format!("unverified after {} probe(s)", attempts)
        }
    };
    let mut text = format!(
        "{} ({:?}) {}, finished {}",
        report.direction,
        report.trigger,
        outcome,
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for failure in &report.step_failures {
        text.push_str(&format!("\n           step {} failed: {}", failure.step, failure.error));
    }
    text
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_duration((now - since).to_std().unwrap_or_default())
}

pub fn render_event(event: &Event) -> String {
    let at = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::TransitionStarted {
            transition_id,
            direction,
            trigger,
        } => format!(
            "{} {} started ({:?}, {})",
            at,
            direction,
            trigger,
            transition_id.short()
        ),
        EventPayload::TransitionFinished(report) => {
            format!("{} {}", at, render_report(report))
        }
        EventPayload::TransitionFailed(failure) => {
            format!("{} {} failed: {}", at, failure.direction, failure.error)
        }
        EventPayload::BelievedStateChanged(state) => {
            format!("{} believed state now {} ({:?})", at, state.power, state.verification)
        }
        EventPayload::Shutdown => format!("{} daemon shutting down", at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use powerward_api::{
        API_VERSION, Direction, PowerState, ScheduleInfo, StepFailure, TransitionTrigger,
    };
    use powerward_util::{TransitionId, WallClock};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, minute, 0).unwrap()
    }

    fn snapshot() -> ServiceStateSnapshot {
        ServiceStateSnapshot {
            api_version: API_VERSION,
            managed: true,
            believed: BelievedState {
                power: PowerState::Online,
                verification: Verification::Unverified,
                since: at(17, 2),
            },
            desired: PowerState::Online,
            schedule: ScheduleInfo {
                start: WallClock::new(17, 0).unwrap(),
                end: WallClock::new(20, 0).unwrap(),
                timezone: "Europe/London".into(),
            },
            in_flight: None,
            last_transition: Some(TransitionReport {
                transition_id: TransitionId::new(),
                direction: Direction::PowerOn,
                trigger: TransitionTrigger::Schedule,
                outcome: TransitionOutcome::Unverified { attempts: 5 },
                step_failures: vec![StepFailure {
                    step: "boot-all-vms".into(),
                    error: "connection refused".into(),
                }],
                started_at: at(17, 0),
                finished_at: at(17, 2),
            }),
            last_failure: None,
        }
    }

    #[test]
    fn status_lists_state_and_last_run() {
        let text = render_payload(&ResponsePayload::State(snapshot()), at(18, 2));

        assert!(text.contains("believed:  online (unverified, for 1h 0m 0s)"));
        assert!(text.contains("desired:   online"));
        assert!(text.contains("schedule:  17:00-20:00 Europe/London"));
        assert!(text.contains("unverified after 5 probe(s)"));
        assert!(text.contains("step boot-all-vms failed: connection refused"));
        assert!(!text.contains("running:"));
        assert!(!text.contains("not managed"));
    }

    #[test]
    fn clock_skew_does_not_panic() {
        // Daemon clock ahead of ours
        let text = render_payload(&ResponsePayload::State(snapshot()), at(16, 0));
        assert!(text.contains("for 0s"));
    }

    #[test]
    fn reachability_text() {
        let now = at(12, 0);
        assert_eq!(
            render_payload(&ResponsePayload::Reachable { reachable: true }, now),
            "reachable"
        );
        assert_eq!(
            render_payload(&ResponsePayload::Reachable { reachable: false }, now),
            "unreachable"
        );
    }

    #[test]
    fn shutdown_event_text() {
        let event = Event::new(EventPayload::Shutdown);
        assert!(render_event(&event).ends_with("daemon shutting down"));
    }
}
