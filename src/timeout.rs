//! Timeout policy for jobs waiting on external work.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::job::JobState;

/// Check whether more than `threshold` has elapsed since the job's last
/// transition.
///
/// Pure function of `state.ts` and `now`. A `now` earlier than `state.ts`
/// never times out, and a threshold too large for [`TimeDelta`] never trips.
pub fn is_timed_out(state: &JobState, threshold: Duration, now: DateTime<Utc>) -> bool {
    match TimeDelta::from_std(threshold) {
        Ok(threshold) => now.signed_duration_since(state.ts) > threshold,
        Err(_) => false,
    }
}
