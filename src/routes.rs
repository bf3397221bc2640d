use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::GameError;
use crate::game::{GameCommand, Registry};
use crate::sync::{self, SessionBody, SyncResponse};
use crate::types::*;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/game-state", post(game_state))
        .route("/add-player", post(add_player))
        .route("/change-player", post(change_player))
        .route("/delete-player", post(delete_player))
        .route("/add-word", post(add_word))
        .route("/delete-word", post(delete_word))
        .route("/start-game", post(start_game))
        .route("/start-next-stage", post(start_next_stage))
        .route("/next-word", post(next_word))
        .route("/end-turn", post(end_turn))
        .route("/next-game", post(next_game))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Routes ───────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn game_state(
    State(state): State<AppState>,
    Json(req): Json<FetchStateRequest>,
) -> Result<SyncResponse, GameError> {
    sync::fetch_state(&state.registry, &req.game_id, req.state_id.as_deref()).await
}

async fn add_player(
    State(state): State<AppState>,
    Json(req): Json<PlayerRequest>,
) -> Result<SessionBody, GameError> {
    let handle = state.registry.get_or_create(Some(&req.game_id))?;
    let session = handle
        .apply(GameCommand::AddPlayer {
            player_name: req.player_name,
        })
        .await?;
    Ok(SessionBody(session))
}

async fn change_player(
    State(state): State<AppState>,
    Json(req): Json<ChangePlayerRequest>,
) -> Result<SessionBody, GameError> {
    let command = GameCommand::ChangePlayer {
        old_player_name: req.old_player_name,
        team: req.team,
        player_name: req.player_name,
    };
    Ok(SessionBody(state.registry.command(&req.game_id, command).await?))
}

async fn delete_player(
    State(state): State<AppState>,
    Json(req): Json<PlayerRequest>,
) -> Result<SessionBody, GameError> {
    let command = GameCommand::DeletePlayer {
        player_name: req.player_name,
    };
    Ok(SessionBody(state.registry.command(&req.game_id, command).await?))
}

async fn add_word(
    State(state): State<AppState>,
    Json(req): Json<WordRequest>,
) -> Result<SessionBody, GameError> {
    let command = GameCommand::AddWord { word: req.word };
    Ok(SessionBody(state.registry.command(&req.game_id, command).await?))
}

async fn delete_word(
    State(state): State<AppState>,
    Json(req): Json<WordRequest>,
) -> Result<SessionBody, GameError> {
    let command = GameCommand::DeleteWord { word: req.word };
    Ok(SessionBody(state.registry.command(&req.game_id, command).await?))
}

async fn start_game(
    State(state): State<AppState>,
    Json(req): Json<GameIdRequest>,
) -> Result<SessionBody, GameError> {
    Ok(SessionBody(
        state.registry.command(&req.game_id, GameCommand::StartGame).await?,
    ))
}

async fn start_next_stage(
    State(state): State<AppState>,
    Json(req): Json<GameIdRequest>,
) -> Result<SessionBody, GameError> {
    Ok(SessionBody(
        state.registry.command(&req.game_id, GameCommand::StartNextStage).await?,
    ))
}

async fn next_word(
    State(state): State<AppState>,
    Json(req): Json<NextWordRequest>,
) -> Result<SessionBody, GameError> {
    let command = GameCommand::NextWord {
        correct: req.correct,
    };
    Ok(SessionBody(state.registry.command(&req.game_id, command).await?))
}

async fn end_turn(
    State(state): State<AppState>,
    Json(req): Json<EndTurnRequest>,
) -> Result<SessionBody, GameError> {
    let command = GameCommand::EndTurn {
        expected_round: req.current_round,
    };
    Ok(SessionBody(state.registry.command(&req.game_id, command).await?))
}

async fn next_game(
    State(state): State<AppState>,
    Json(req): Json<NextGameRequest>,
) -> Result<Json<NextGameOutcome>, GameError> {
    let handle = state.registry.get_or_create(req.game_id.as_deref())?;
    Ok(Json(handle.next_game(req).await?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::game::tests::test_registry;

    async fn json_body(res: Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn test_app() -> Router {
        let (registry, _) = test_registry();
        app(AppState { registry })
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn lobby(app: &Router, game_id: &str, words: &[&str]) -> Value {
        for name in ["Ann", "Bob"] {
            let res = post_json(app, "/add-player", json!({ "game_id": game_id, "player_name": name })).await;
            assert_eq!(res.status(), StatusCode::OK);
        }
        let mut last = Value::Null;
        for word in words {
            let res = post_json(app, "/add-word", json!({ "game_id": game_id, "word": word })).await;
            assert_eq!(res.status(), StatusCode::OK);
            last = json_body(res).await;
        }
        last
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app();
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_game_waits_for_enough_words() {
        let app = test_app();
        let session = lobby(&app, "g", &["cat", "dog", "bird"]).await;
        assert_eq!(session["stage"], 0);
        assert_eq!(session["team_players"].as_array().unwrap().len(), 2);

        let res = post_json(&app, "/start-game", json!({ "game_id": "g" })).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(res).await["code"], "INVALID_PRECONDITION");

        for word in ["fish", "horse"] {
            post_json(&app, "/add-word", json!({ "game_id": "g", "word": word })).await;
        }
        let res = post_json(&app, "/start-game", json!({ "game_id": "g" })).await;
        assert_eq!(res.status(), StatusCode::OK);
        let session = json_body(res).await;
        assert_eq!(session["stage"], 1);
        assert_eq!(session["round"], 0);
        assert_eq!(session["routing_order"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unchanged_state_is_not_modified() {
        let app = test_app();
        let session = lobby(&app, "poll", &["cat"]).await;
        let token = session["state_id"].clone();

        let res = post_json(&app, "/game-state", json!({ "game_id": "poll", "state_id": token })).await;
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert!(res.into_body().collect().await.unwrap().to_bytes().is_empty());

        let res = post_json(&app, "/game-state", json!({ "game_id": "poll" })).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["state_id"], token);
    }

    #[tokio::test]
    async fn stale_end_turn_conflicts() {
        let app = test_app();
        lobby(&app, "turns", &["cat", "dog", "bird", "fish", "horse"]).await;
        post_json(&app, "/start-game", json!({ "game_id": "turns" })).await;
        post_json(&app, "/start-next-stage", json!({ "game_id": "turns" })).await;

        let res = post_json(&app, "/next-word", json!({ "game_id": "turns", "correct": true })).await;
        let points = json_body(res).await["team_points"].clone();
        assert_eq!(points["red"].as_u64().unwrap() + points["blue"].as_u64().unwrap(), 1);

        let res = post_json(&app, "/end-turn", json!({ "game_id": "turns", "current_round": 0 })).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["round"], 1);

        let res = post_json(&app, "/end-turn", json!({ "game_id": "turns", "current_round": 0 })).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(res).await["code"], "STALE_ROUND");
    }

    #[tokio::test]
    async fn unknown_game_and_bad_input() {
        let app = test_app();
        let res = post_json(&app, "/start-game", json!({ "game_id": "ghost" })).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["code"], "GAME_NOT_FOUND");

        lobby(&app, "input", &[]).await;
        let res = post_json(&app, "/add-word", json!({ "game_id": "input", "word": "   " })).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn next_game_confirms_before_discarding_a_game() {
        let app = test_app();
        lobby(&app, "again", &["cat", "dog", "bird", "fish", "horse"]).await;
        post_json(&app, "/start-game", json!({ "game_id": "again" })).await;

        let res = post_json(&app, "/next-game", json!({ "game_id": "again" })).await;
        assert_eq!(res.status(), StatusCode::OK);
        let prompt = json_body(res).await;
        assert_eq!(prompt["status"], "confirmation_required");

        let res = post_json(
            &app,
            "/next-game",
            json!({ "game_id": "again", "confirm": prompt["state_id"], "enforce_timer": false }),
        )
        .await;
        let reset = json_body(res).await;
        assert_eq!(reset["status"], "reset");
        assert_eq!(reset["game"]["stage"], 0);
        assert_eq!(reset["game"]["enforce_timer"], false);
        assert_ne!(reset["game"]["state_id"], prompt["state_id"]);
    }

    #[tokio::test]
    async fn next_game_without_id_creates_a_session() {
        let app = test_app();
        let res = post_json(&app, "/next-game", json!({})).await;
        let reset = json_body(res).await;
        assert_eq!(reset["status"], "reset");
        let game_id = reset["game"]["id"].as_str().unwrap().to_string();

        let res = post_json(&app, "/game-state", json!({ "game_id": game_id })).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
