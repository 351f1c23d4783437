//! `spec.pausedUntil` handling

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::parse_time;

/// Requeue interval while paused without an end time
pub const PAUSED_REQUEUE: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseState {
    NotPaused,
    /// `pausedUntil: "true"`
    Indefinite,
    /// Paused until a future time
    Until(DateTime<Utc>),
}

impl PauseState {
    pub fn is_paused(&self) -> bool {
        !matches!(self, PauseState::NotPaused)
    }

    /// How long to wait before looking at a paused object again
    pub fn requeue_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            PauseState::NotPaused => None,
            PauseState::Indefinite => Some(PAUSED_REQUEUE),
            PauseState::Until(until) => Some((*until - now).to_std().unwrap_or(Duration::ZERO)),
        }
    }
}

/// Interpret a `pausedUntil` value at `now`.
///
/// Timestamps in the past and values that are neither `"true"` nor RFC3339
/// mean not paused.
pub fn pause_state(paused_until: Option<&str>, now: DateTime<Utc>) -> PauseState {
    let Some(value) = paused_until.map(str::trim).filter(|v| !v.is_empty()) else {
        return PauseState::NotPaused;
    };
    if value.eq_ignore_ascii_case("true") {
        return PauseState::Indefinite;
    }
    match parse_time(value) {
        Some(until) if until > now => PauseState::Until(until),
        Some(_) => PauseState::NotPaused,
        None => {
            warn!(paused_until = %value, "ignoring pausedUntil that is neither \"true\" nor an RFC3339 time");
            PauseState::NotPaused
        }
    }
}
