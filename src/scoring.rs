use crate::types::{GameSession, Team};

/// Decides the winner once a game reaches its terminal interstitial.
pub trait ScoringPolicy: Send + Sync {
    fn winner(&self, session: &GameSession) -> Team;
}

/// Most points wins; a tie is a draw, reported as `Team::Neutral`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestScore;

impl ScoringPolicy for HighestScore {
    fn winner(&self, session: &GameSession) -> Team {
        let points = session.team_points;
        match points.red.cmp(&points.blue) {
            std::cmp::Ordering::Greater => Team::Red,
            std::cmp::Ordering::Less => Team::Blue,
            std::cmp::Ordering::Equal => Team::Neutral,
        }
    }
}
