use std::time::Duration;

use proptest::prelude::*;

use execd::exec::{CancelPhase, CancelStep, CancelTimings, Escalation, Signal};
use execd::types::{Output, OutputStatus, OutputType};

fn output_type() -> impl Strategy<Value = OutputType> {
    prop_oneof![
        Just(OutputType::Stdout),
        Just(OutputType::Stderr),
        Just(OutputType::Exit),
        Just(OutputType::System),
    ]
}

fn status() -> impl Strategy<Value = Option<OutputStatus>> {
    prop_oneof![
        Just(None),
        Just(Some(OutputStatus::Success)),
        Just(Some(OutputStatus::Error)),
        Just(Some(OutputStatus::Cancelled)),
        Just(Some(OutputStatus::Killed)),
    ]
}

fn rank(phase: CancelPhase) -> u8 {
    match phase {
        CancelPhase::Running => 0,
        CancelPhase::TermSent => 1,
        CancelPhase::KillSent => 2,
        CancelPhase::ConfirmedDead | CancelPhase::TimedOut => 3,
    }
}

proptest! {
    // Any line a process prints stays on one NDJSON line and decodes back.
    #[test]
    fn events_are_single_ndjson_lines(msg in ".*", ty in output_type(), st in status()) {
        let mut out = Output::line(ty, msg, "id");
        out.status = st;

        let line = execd::exec::encoder::encode_line(&out).unwrap();
        prop_assert_eq!(line.last(), Some(&b'\n'));
        prop_assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);

        let back: Output = serde_json::from_slice(&line).unwrap();
        prop_assert_eq!(back, out);
    }

    // Phases only move forward, SIGKILL goes out at most once and never
    // before the grace period, and nothing happens after finishing.
    #[test]
    fn escalation_is_monotonic(
        grace_ms in 1u64..500,
        wait_ms in 1u64..500,
        steps in proptest::collection::vec((0u64..200, any::<bool>()), 1..50),
    ) {
        let timings = CancelTimings {
            poll_interval: Duration::from_millis(1),
            sigterm_grace: Duration::from_millis(grace_ms),
            sigkill_wait: Duration::from_millis(wait_ms),
        };
        let mut esc = Escalation::new(timings);
        prop_assert_eq!(esc.start(true), CancelStep::Deliver(Signal::Term));

        let mut elapsed = Duration::ZERO;
        let mut kills = 0;
        let mut prev = rank(esc.phase());
        for (delta, active) in steps {
            elapsed += Duration::from_millis(delta);
            let finished_before = esc.phase().is_finished();
            let step = esc.observe(elapsed, active);

            if finished_before {
                prop_assert!(matches!(step, CancelStep::Finished(_)));
            }
            if step == CancelStep::Deliver(Signal::Kill) {
                kills += 1;
                prop_assert!(elapsed >= timings.sigterm_grace);
            }
            prop_assert!(step != CancelStep::Deliver(Signal::Term));

            let now = rank(esc.phase());
            prop_assert!(now >= prev);
            prev = now;
        }
        prop_assert!(kills <= 1);
    }
}
