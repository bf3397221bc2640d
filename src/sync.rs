//! Poll-based state synchronization.
//!
//! Clients send the last `state_id` they saw. If it still matches, they get a
//! bodiless 304; otherwise the full session. Reads go against the published
//! snapshot and never queue behind the session task, except when the snapshot
//! shows an expired turn, in which case the poll first asks the task to end
//! that round so the answer reflects the enforced timer.

use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::engine::active_team;
use crate::error::GameError;
use crate::game::{Dispatched, GameCommand, Registry};
use crate::timer;
use crate::types::{GameSession, Stage, Team};

/// Version token for a revision. Zero-padded so tokens also sort by age.
pub fn version_token(revision: u64) -> String {
    format!("{revision:019}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncResponse {
    Changed(Arc<GameSession>),
    Unchanged,
}

/// Compares the client's last-seen token against `snapshot`.
pub fn diff(snapshot: Arc<GameSession>, last_seen: Option<&str>) -> SyncResponse {
    match last_seen {
        Some(token) if token == snapshot.version_token => SyncResponse::Unchanged,
        _ => SyncResponse::Changed(snapshot),
    }
}

/// Answers a fetch-state poll.
pub async fn fetch_state(
    registry: &Registry,
    game_id: &str,
    last_seen: Option<&str>,
) -> Result<SyncResponse, GameError> {
    let handle = registry.get(game_id)?;
    let mut snapshot = handle.snapshot();

    if timer::is_expired(&snapshot, registry.clock().now()) {
        let round = snapshot.round;
        match handle.dispatch(GameCommand::ExpireTurn { round }).await {
            Ok(Dispatched::Session(latest)) => snapshot = latest,
            Ok(Dispatched::ConfirmationRequired { .. }) => {}
            Err(e) if e.is_conflict() => {
                tracing::debug!("Game {} expiry for round {} already applied", game_id, round);
                snapshot = handle.snapshot();
            }
            Err(e) => return Err(e),
        }
    }

    Ok(diff(snapshot, last_seen))
}

/// A session serialized as the response body.
pub struct SessionBody(pub Arc<GameSession>);

impl IntoResponse for SessionBody {
    fn into_response(self) -> Response {
        Json(self.0.as_ref()).into_response()
    }
}

impl IntoResponse for SyncResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Changed(session) => SessionBody(session).into_response(),
            Self::Unchanged => StatusCode::NOT_MODIFIED.into_response(),
        }
    }
}

// ─── Observer transitions ─────────────────────────────────────────

/// Edge-triggered events between two observed snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    GameReset,
    StageChanged { stage: Stage },
    TurnPassed { round: u32, team: Team },
    GameWon { team: Team },
}

/// Events an observer should react to when moving from `prev` to `next`.
/// A reset reports only `GameReset`.
pub fn derive_transitions(prev: Option<&GameSession>, next: &GameSession) -> Vec<SessionTransition> {
    let Some(prev) = prev else {
        return Vec::new();
    };

    if next.created_at != prev.created_at || next.stage < prev.stage || next.round < prev.round {
        return vec![SessionTransition::GameReset];
    }

    let mut transitions = Vec::new();
    if next.stage != prev.stage {
        transitions.push(SessionTransition::StageChanged { stage: next.stage });
    }
    if next.round != prev.round {
        transitions.push(SessionTransition::TurnPassed {
            round: next.round,
            team: active_team(next),
        });
    }
    if let (None, Some(team)) = (prev.winning_team, next.winning_team) {
        transitions.push(SessionTransition::GameWon { team });
    }
    transitions
}
