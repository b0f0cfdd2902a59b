//! Busy flag
//!
//! `is_busy` is true while a completion is streaming or while the optimistic
//! flag raised at submit time is still set. The optimistic flag drops when a
//! full round trip has been observed, when the transport errors, or when the
//! safety deadline passes, whichever happens first.
//!
//! Every submit opens a new numbered round. Signals tagged with an older
//! round are ignored so a late stream cannot flip the flag for a newer one.

use std::time::Duration;

use tokio::time::Instant;

/// Handle for one submit, passed to the transport forwarder and the timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundTrip {
    pub round: u64,
    pub deadline: Instant,
}

#[derive(Debug)]
pub struct BusyTracker {
    safety_timeout: Duration,
    round: u64,
    deadline: Option<Instant>,

    /// Optimistic thinking flag
    thinking: bool,

    /// Transport reports a completion streaming
    in_flight: bool,

    /// `in_flight` has been true at some point during this round
    observed_in_flight: bool,
}

impl BusyTracker {
    pub const fn new(safety_timeout: Duration) -> Self {
        Self {
            safety_timeout,
            round: 0,
            deadline: None,
            thinking: false,
            in_flight: false,
            observed_in_flight: false,
        }
    }

    pub const fn is_busy(&self) -> bool {
        self.thinking || self.in_flight
    }

    pub const fn round(&self) -> u64 {
        self.round
    }

    pub const fn is_current(&self, round: u64) -> bool {
        self.round == round
    }

    pub const fn safety_timeout(&self) -> Duration {
        self.safety_timeout
    }

    /// Time left before the safety timeout fires, if a round is busy
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .filter(|_| self.is_busy())
            .map(|d| d.saturating_duration_since(now))
    }

    /// Raise the optimistic flag for a new submit
    pub fn raise(&mut self, now: Instant) -> RoundTrip {
        self.round += 1;
        let deadline = now + self.safety_timeout;
        self.deadline = Some(deadline);
        self.thinking = true;
        self.in_flight = false;
        self.observed_in_flight = false;

        tracing::debug!(round = self.round, timeout = ?self.safety_timeout, "Busy raised");
        RoundTrip {
            round: self.round,
            deadline,
        }
    }

    pub fn transport_started(&mut self, round: u64) {
        if !self.is_current(round) || !self.thinking {
            return;
        }
        self.in_flight = true;
        self.observed_in_flight = true;
    }

    /// Stream ended normally. Returns whether the flag dropped.
    pub fn transport_finished(&mut self, round: u64) -> bool {
        if !self.is_current(round) {
            return false;
        }
        let was_busy = self.is_busy();
        self.in_flight = false;
        if self.observed_in_flight {
            self.thinking = false;
        }
        was_busy && !self.is_busy()
    }

    /// Stream failed or was rejected. Returns whether the flag dropped.
    pub fn transport_failed(&mut self, round: u64) -> bool {
        if !self.is_current(round) {
            return false;
        }
        self.clear()
    }

    /// Safety timer fired. Returns whether the flag dropped.
    pub fn expire(&mut self, round: u64, now: Instant) -> bool {
        if !self.is_current(round) || self.deadline.is_some_and(|d| now < d) {
            return false;
        }
        let dropped = self.clear();
        if dropped {
            tracing::warn!(round, "Busy flag cleared by safety timeout");
        }
        dropped
    }

    fn clear(&mut self) -> bool {
        let was_busy = self.is_busy();
        self.thinking = false;
        self.in_flight = false;
        self.deadline = None;
        was_busy
    }
}
