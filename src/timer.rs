//! Turn timer derived from `round_started_at`.
//!
//! Nothing here counts down locally: every reading is recomputed from the
//! absolute start of the turn, so all observers agree regardless of when they
//! connected.

use std::time::Duration;

use time::OffsetDateTime;

use crate::types::GameSession;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// The timer does not run in Setup, interstitials, or once the game is won.
pub fn is_frozen(session: &GameSession) -> bool {
    session.is_finished() || !session.stage.is_active()
}

/// Time left in the current turn. A frozen timer reports the full duration.
pub fn remaining(session: &GameSession, now: OffsetDateTime) -> Duration {
    let total = Duration::from_millis(session.options.timer_duration_ms);
    if is_frozen(session) {
        return total;
    }
    let elapsed = now - session.round_started_at;
    if elapsed.is_negative() {
        return total;
    }
    total.saturating_sub(elapsed.unsigned_abs())
}

/// True when an enforced timer has run out on a running turn.
pub fn is_expired(session: &GameSession, now: OffsetDateTime) -> bool {
    session.options.enforce_timer
        && session.options.timer_duration_ms > 0
        && !is_frozen(session)
        && remaining(session, now).is_zero()
}

/// How long until the running turn expires, if the timer is enforced.
pub fn until_expiry(session: &GameSession, now: OffsetDateTime) -> Option<Duration> {
    if !session.options.enforce_timer || session.options.timer_duration_ms == 0 || is_frozen(session) {
        return None;
    }
    Some(remaining(session, now))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{T0, playing_session};
    use crate::engine::{self, end_turn};
    use crate::scoring::HighestScore;
    use crate::types::Team;

    #[test]
    fn remaining_counts_down_from_round_start() {
        let session = playing_session();
        assert_eq!(remaining(&session, T0), Duration::from_millis(30_000));
        let later = T0 + time::Duration::milliseconds(12_500);
        assert_eq!(remaining(&session, later), Duration::from_millis(17_500));
        let past = T0 + time::Duration::minutes(5);
        assert_eq!(remaining(&session, past), Duration::ZERO);
    }

    #[test]
    fn expires_after_duration_on_active_stage() {
        let session = playing_session();
        assert!(!is_expired(&session, T0 + time::Duration::milliseconds(29_999)));
        assert!(is_expired(&session, T0 + time::Duration::milliseconds(30_001)));
    }

    #[test]
    fn frozen_during_interstitial_and_after_win() {
        let mut session = playing_session();
        engine::advance_stage(&mut session, &HighestScore, T0).unwrap();
        let late = T0 + time::Duration::minutes(10);
        assert!(is_frozen(&session));
        assert_eq!(remaining(&session, late), Duration::from_millis(30_000));
        assert!(!is_expired(&session, late));

        let mut session = playing_session();
        session.winning_team = Some(Team::Red);
        assert!(!is_expired(&session, late));
        assert_eq!(until_expiry(&session, late), None);
    }

    #[test]
    fn unenforced_timer_never_expires() {
        let mut session = playing_session();
        session.options.enforce_timer = false;
        assert!(!is_expired(&session, T0 + time::Duration::hours(1)));
    }

    #[test]
    fn end_turn_restarts_the_clock() {
        let mut session = playing_session();
        let expiry = T0 + time::Duration::milliseconds(30_001);
        assert!(is_expired(&session, expiry));
        end_turn(&mut session, 0, expiry).unwrap();
        assert!(!is_expired(&session, expiry));
        assert_eq!(until_expiry(&session, expiry), Some(Duration::from_millis(30_000)));
    }
}
