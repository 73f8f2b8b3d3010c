// src/exec/escalation.rs

//! Pure state machine for the staged SIGTERM → SIGKILL cancel protocol.
//!
//! [`Escalation`] never sleeps and never reads a clock. The async shell
//! ([`CmdExecutor::cancel`](crate::exec::CmdExecutor::cancel)) feeds it the
//! elapsed time since cancellation started plus whether the process is still
//! active, and performs whatever [`CancelStep`] comes back:
//!
//! ```text
//! Running --start--> TermSent --grace--> KillSent --kill_wait--> TimedOut
//!                        \                   \
//!                         +---- inactive ----+--> ConfirmedDead
//! ```

use std::time::Duration;

use super::signal::Signal;

/// Durations driving the cancel protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelTimings {
    /// How often the process is checked for having exited.
    pub poll_interval: Duration,
    /// Time after SIGTERM before escalating to SIGKILL.
    pub sigterm_grace: Duration,
    /// Additional time after the grace period before giving up.
    pub sigkill_wait: Duration,
}

impl CancelTimings {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
    pub const DEFAULT_SIGTERM_GRACE: Duration = Duration::from_secs(10);
    pub const DEFAULT_SIGKILL_WAIT: Duration = Duration::from_secs(10);

    /// Total time after which cancellation reports failure.
    pub fn kill_deadline(&self) -> Duration {
        self.sigterm_grace.saturating_add(self.sigkill_wait)
    }
}

impl Default for CancelTimings {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            sigterm_grace: Self::DEFAULT_SIGTERM_GRACE,
            sigkill_wait: Self::DEFAULT_SIGKILL_WAIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPhase {
    Running,
    TermSent,
    KillSent,
    ConfirmedDead,
    TimedOut,
}

impl CancelPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, CancelPhase::ConfirmedDead | CancelPhase::TimedOut)
    }
}

/// What the shell should do after feeding an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelStep {
    /// Queue this signal for the run loop, then keep polling.
    Deliver(Signal),
    /// Nothing to do until the next poll.
    Wait,
    /// The protocol ended in the given phase.
    Finished(CancelPhase),
}

#[derive(Debug, Clone)]
pub struct Escalation {
    timings: CancelTimings,
    phase: CancelPhase,
}

impl Escalation {
    pub fn new(timings: CancelTimings) -> Self {
        Self {
            timings,
            phase: CancelPhase::Running,
        }
    }

    pub fn phase(&self) -> CancelPhase {
        self.phase
    }

    pub fn timings(&self) -> CancelTimings {
        self.timings
    }

    /// Begin cancelling. An already-inactive process finishes immediately.
    pub fn start(&mut self, process_active: bool) -> CancelStep {
        if self.phase != CancelPhase::Running {
            return self.observe(Duration::ZERO, process_active);
        }
        if !process_active {
            self.phase = CancelPhase::ConfirmedDead;
            return CancelStep::Finished(self.phase);
        }
        self.phase = CancelPhase::TermSent;
        CancelStep::Deliver(Signal::Term)
    }

    /// Feed one poll result taken `elapsed` after [`Escalation::start`].
    pub fn observe(&mut self, elapsed: Duration, process_active: bool) -> CancelStep {
        match self.phase {
            CancelPhase::ConfirmedDead | CancelPhase::TimedOut => {
                return CancelStep::Finished(self.phase);
            }
            CancelPhase::Running => return self.start(process_active),
            CancelPhase::TermSent | CancelPhase::KillSent => {}
        }

        if !process_active {
            self.phase = CancelPhase::ConfirmedDead;
            return CancelStep::Finished(self.phase);
        }

        if elapsed >= self.timings.kill_deadline() {
            self.phase = CancelPhase::TimedOut;
            return CancelStep::Finished(self.phase);
        }

        if self.phase == CancelPhase::TermSent && elapsed >= self.timings.sigterm_grace {
            self.phase = CancelPhase::KillSent;
            return CancelStep::Deliver(Signal::Kill);
        }

        CancelStep::Wait
    }
}
