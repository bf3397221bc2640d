//! Pure state transitions for a game session.
//!
//! Every function here takes the session by `&mut` and either applies a
//! complete transition or returns an error leaving the session untouched.
//! Time and randomness come in as arguments so the actor that owns the session
//! stays the only place where the outside world is read.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use time::OffsetDateTime;

use crate::error::GameError;
use crate::scoring::ScoringPolicy;
use crate::types::*;

/// Whether a command changed visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

/// Word deck and options a new session is created from.
#[derive(Debug, Clone)]
pub struct NewGame {
    pub seed: u64,
    pub perm_index: usize,
    pub word_set: Vec<String>,
    pub options: GameOptions,
}

/// Team on turn for `round`. Round 0 belongs to `starting_team`.
pub fn current_team(round: u32, starting_team: Team) -> Team {
    if round % 2 == 0 {
        starting_team
    } else {
        starting_team.other()
    }
}

pub fn active_team(session: &GameSession) -> Team {
    current_team(session.round, session.starting_team)
}

/// Words not yet guessed in the current stage.
pub fn remaining(session: &GameSession) -> usize {
    session.revealed.iter().filter(|r| !**r).count()
}

/// Builds a fresh Setup session.
pub fn new_session(
    id: &str,
    game: NewGame,
    config: &GameConfig,
    now: OffsetDateTime,
) -> GameSession {
    let mut team_rng = ChaCha8Rng::seed_from_u64(game.seed ^ game.perm_index as u64);
    let starting_team = if team_rng.random_bool(0.5) {
        Team::Red
    } else {
        Team::Blue
    };

    let words = if game.options.random_words {
        draw_words(&game.word_set, game.seed, game.perm_index, config.words_per_game)
    } else {
        Vec::new()
    };

    GameSession {
        id: id.to_string(),
        version_token: String::new(),
        created_at: now,
        updated_at: now,
        stage: Stage::Setup,
        round: 0,
        starting_team,
        team_players: Vec::new(),
        routing_order: Vec::new(),
        current_player_index: 0,
        revealed: vec![false; words.len()],
        words,
        current_word: None,
        team_points: TeamPoints::default(),
        round_started_at: now,
        options: game.options,
        winning_team: None,
        seed: game.seed,
        perm_index: game.perm_index,
        word_set: game.word_set,
    }
}

/// Deck position for the game after `previous`.
///
/// The same word set keeps its permutation and moves to the next slice; a
/// changed or exhausted set starts over with a new seed.
pub fn next_deck(
    previous: &GameSession,
    word_set: &[String],
    words_per_game: usize,
    fresh_seed: u64,
) -> (u64, usize) {
    if previous.word_set != word_set {
        return (fresh_seed, 0);
    }
    let perm_index = previous.perm_index + words_per_game;
    if perm_index + words_per_game > word_set.len() {
        (fresh_seed, 0)
    } else {
        (previous.seed, perm_index)
    }
}

fn draw_words(word_set: &[String], seed: u64, perm_index: usize, count: usize) -> Vec<String> {
    let mut perm: Vec<usize> = (0..word_set.len()).collect();
    perm.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    perm.iter()
        .skip(perm_index)
        .take(count)
        .map(|&i| word_set[i].clone())
        .collect()
}

/// Order in which the words of `stage` are drawn. Reproducible for a given seed.
pub fn word_order(seed: u64, stage: Stage, len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(
        seed.wrapping_add(stage.ordinal() as u64),
    ));
    order
}

fn next_unrevealed(session: &GameSession) -> Option<String> {
    word_order(session.seed, session.stage, session.words.len())
        .into_iter()
        .find(|&i| !session.revealed[i])
        .map(|i| session.words[i].clone())
}

/// Interleaves red and blue starting with `starting_team`.
///
/// The rotation is `2 * reds * blues` long so each red player meets each blue
/// player, and index parity always matches round parity.
pub fn routing_order(players: &[Player], starting_team: Team) -> Vec<Player> {
    let first: Vec<&Player> = players.iter().filter(|p| p.team == starting_team).collect();
    let second: Vec<&Player> = players
        .iter()
        .filter(|p| p.team == starting_team.other())
        .collect();

    let rotation = first.len() * second.len() * 2;
    let mut order = Vec::with_capacity(rotation);
    for turn in 0..rotation {
        let side = if turn % 2 == 0 { &first } else { &second };
        order.push(side[(turn / 2) % side.len()].clone());
    }
    order
}

fn rebuild_routing(session: &mut GameSession) {
    session.routing_order = routing_order(&session.team_players, session.starting_team);
    session.current_player_index = match session.routing_order.len() {
        0 => 0,
        len => session.round as usize % len,
    };
}

fn require_setup(session: &GameSession, action: &str) -> Result<(), GameError> {
    if session.stage != Stage::Setup {
        return Err(GameError::precondition(format!(
            "can't {action} past the setup stage"
        )));
    }
    Ok(())
}

fn require_unfinished(session: &GameSession) -> Result<(), GameError> {
    if session.is_finished() {
        return Err(GameError::precondition("game is over, start a new game"));
    }
    Ok(())
}

fn clean_name(name: &str) -> Result<String, GameError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GameError::validation("player name cannot be empty"));
    }
    Ok(name.to_string())
}

fn find_player(session: &GameSession, name: &str) -> Result<usize, GameError> {
    session
        .team_players
        .iter()
        .position(|p| p.player_name == name)
        .ok_or_else(|| GameError::validation(format!("player {name} not found")))
}

fn find_word(words: &[String], word: &str) -> Option<usize> {
    words.iter().position(|w| w.eq_ignore_ascii_case(word))
}

// ─── Roster ───────────────────────────────────────────────────────

/// Adds a player to the smaller team, `tie_break` when both are equal.
pub fn add_player(
    session: &mut GameSession,
    name: &str,
    tie_break: Team,
) -> Result<Applied, GameError> {
    require_setup(session, "add players")?;
    let name = clean_name(name)?;
    if session.team_players.iter().any(|p| p.player_name == name) {
        return Err(GameError::validation(format!("player {name} already joined")));
    }

    let (red, blue) = (session.players_on(Team::Red), session.players_on(Team::Blue));
    let team = match red.cmp(&blue) {
        std::cmp::Ordering::Less => Team::Red,
        std::cmp::Ordering::Greater => Team::Blue,
        std::cmp::Ordering::Equal => tie_break,
    };

    session.team_players.push(Player {
        player_name: name,
        team,
    });
    rebuild_routing(session);
    Ok(Applied::Changed)
}

/// Renames and/or moves a player, keeping their place in the roster.
pub fn change_player(
    session: &mut GameSession,
    old_name: &str,
    team: Team,
    new_name: Option<&str>,
) -> Result<Applied, GameError> {
    require_setup(session, "change players")?;
    if !team.is_playable() {
        return Err(GameError::validation("players must be on red or blue"));
    }
    let idx = find_player(session, old_name)?;

    let name = match new_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => n.to_string(),
        None => old_name.to_string(),
    };
    let taken = session
        .team_players
        .iter()
        .enumerate()
        .any(|(i, p)| i != idx && p.player_name == name);
    if taken {
        return Err(GameError::validation(format!("player {name} already joined")));
    }

    let player = &mut session.team_players[idx];
    if player.player_name == name && player.team == team {
        return Ok(Applied::Unchanged);
    }
    player.player_name = name;
    player.team = team;
    rebuild_routing(session);
    Ok(Applied::Changed)
}

/// Removes a player. Mid-game this is allowed only while their team keeps
/// someone to play; the turn pointer is re-derived from the round.
pub fn delete_player(session: &mut GameSession, name: &str) -> Result<Applied, GameError> {
    require_unfinished(session)?;
    let idx = find_player(session, name)?;

    let team = session.team_players[idx].team;
    if session.stage != Stage::Setup && session.players_on(team) <= 1 {
        return Err(GameError::precondition(format!(
            "team {team} would have no players left"
        )));
    }

    session.team_players.remove(idx);
    rebuild_routing(session);
    Ok(Applied::Changed)
}

// ─── Word pool ────────────────────────────────────────────────────

pub fn add_word(session: &mut GameSession, word: &str) -> Result<Applied, GameError> {
    require_setup(session, "add words")?;
    let word = word.trim();
    if word.is_empty() {
        return Err(GameError::validation("word cannot be empty"));
    }
    if find_word(&session.words, word).is_some() {
        return Ok(Applied::Unchanged);
    }
    session.words.push(word.to_string());
    session.revealed.push(false);
    Ok(Applied::Changed)
}

pub fn delete_word(session: &mut GameSession, word: &str) -> Result<Applied, GameError> {
    require_setup(session, "remove words")?;
    let idx = find_word(&session.words, word.trim())
        .ok_or_else(|| GameError::validation(format!("word {word} not in the pool")))?;
    session.words.remove(idx);
    session.revealed.remove(idx);
    Ok(Applied::Changed)
}

// ─── Stages ───────────────────────────────────────────────────────

/// Leaves Setup once both teams are staffed and the pool is large enough.
pub fn start_game(session: &mut GameSession, config: &GameConfig) -> Result<Applied, GameError> {
    require_setup(session, "start the game")?;

    let min_players = config.min_players_per_team.max(1);
    for team in [Team::Red, Team::Blue] {
        if session.players_on(team) < min_players {
            return Err(GameError::precondition(format!(
                "team {team} needs at least {min_players} player(s)"
            )));
        }
    }
    if session.words.len() < config.min_words_to_start {
        return Err(GameError::precondition(format!(
            "need at least {} words, have {}",
            config.min_words_to_start,
            session.words.len()
        )));
    }

    session.round = 0;
    rebuild_routing(session);
    session.revealed = vec![false; session.words.len()];
    session.current_word = None;
    session.team_points = TeamPoints::default();
    session.stage = Stage::EndSetup;
    Ok(Applied::Changed)
}

/// Moves to the next stage. Entering an active stage deals its first word and
/// restarts the clock; entering the terminal interstitial settles the winner.
pub fn advance_stage(
    session: &mut GameSession,
    policy: &dyn ScoringPolicy,
    now: OffsetDateTime,
) -> Result<Applied, GameError> {
    require_unfinished(session)?;
    if session.stage == Stage::Setup {
        return Err(GameError::precondition("use start-game to leave setup"));
    }
    let Some(next) = session.stage.next() else {
        return Err(GameError::precondition("no stage after the last one"));
    };

    session.stage = next;
    if next.is_active() {
        session.revealed = vec![false; session.words.len()];
        session.current_word = next_unrevealed(session);
        session.round_started_at = now;
    } else {
        session.current_word = None;
        if next.is_terminal() {
            session.winning_team = Some(policy.winner(session));
        }
    }
    Ok(Applied::Changed)
}

// ─── Turns ────────────────────────────────────────────────────────

/// Consumes the word in hand and deals the next one. A no-op outside active
/// stages and after the game is won.
pub fn next_word(session: &mut GameSession, correct: bool) -> Applied {
    if session.is_finished() || !session.stage.is_active() {
        return Applied::Unchanged;
    }

    let mut changed = false;
    if let Some(word) = session.current_word.take() {
        if let Some(idx) = session.words.iter().position(|w| *w == word) {
            session.revealed[idx] = true;
        }
        if correct {
            let team = active_team(session);
            session.team_points.award(team);
        }
        changed = true;
    }

    session.current_word = next_unrevealed(session);
    if changed || session.current_word.is_some() {
        Applied::Changed
    } else {
        Applied::Unchanged
    }
}

/// Passes the turn to the next player. `expected_round` guards against a
/// manual end-turn racing the timer.
pub fn end_turn(
    session: &mut GameSession,
    expected_round: u32,
    now: OffsetDateTime,
) -> Result<Applied, GameError> {
    if expected_round != session.round {
        return Err(GameError::stale_round(expected_round, session.round));
    }
    require_unfinished(session)?;
    if !session.stage.is_active() {
        return Err(GameError::precondition(format!(
            "no turn to end during stage {}",
            session.stage
        )));
    }

    session.round += 1;
    if !session.routing_order.is_empty() {
        session.current_player_index =
            (session.current_player_index + 1) % session.routing_order.len();
    }
    session.round_started_at = now;
    Ok(Applied::Changed)
}
