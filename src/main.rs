use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

mod chat;
mod config;
mod db;
mod dialogue;
mod store;

use chat::{Channel, ChatEntry, ChatRouter};
use config::Config;
use db::Database;
use dialogue::{DialogueEngine, DialogueError, DialogueNode, DialogueOption, NpcRegistry, Reward};
use store::{MemoryStore, PlayerState, PlayerStateStore};

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
struct AppState {
    engine: Arc<DialogueEngine<MemoryStore>>,
    store: Arc<MemoryStore>,
    chat: Arc<ChatRouter>,
    db: Arc<Database>,
    chat_rate_limiter: RateLimiter,
}

impl AppState {
    async fn new(config: &Config) -> Self {
        // Initialize database
        let db = Database::new(&config.database_url)
            .await
            .expect("Failed to initialize database");

        // Load NPC content from JSON files
        let registry = Arc::new(NpcRegistry::new(std::path::Path::new(&config.data_dir)));
        if let Err(e) = registry.load_all().await {
            error!("Failed to load NPC registry: {}", e);
        }

        // Hydrate the in-memory store from persisted snapshots
        let store = Arc::new(MemoryStore::new());
        match db.load_player_states().await {
            Ok(states) => {
                let count = states.len();
                for (player_id, state) in states {
                    store.insert(&player_id, state);
                }
                if count > 0 {
                    info!("Hydrated {} player state(s) from database", count);
                }
            }
            Err(e) => error!("Failed to load player states: {}", e),
        }

        // Start hot-reload watcher for NPC content (dev mode)
        #[cfg(debug_assertions)]
        {
            match registry.start_file_watcher() {
                Ok(mut rx) => {
                    tokio::spawn(async move {
                        while let Some(event) = rx.recv().await {
                            match event {
                                dialogue::HotReloadEvent::Reloaded(path) => {
                                    info!("NPC content hot-reload: {}", path);
                                }
                                dialogue::HotReloadEvent::Error(e) => {
                                    error!("NPC content hot-reload error: {}", e);
                                }
                            }
                        }
                    });
                    info!("NPC content hot-reload enabled");
                }
                Err(e) => {
                    warn!("Failed to start NPC content hot-reload: {}", e);
                }
            }
        }

        Self {
            engine: Arc::new(DialogueEngine::new(registry, store.clone())),
            store,
            chat: Arc::new(ChatRouter::new()),
            db: Arc::new(db),
            // Chat: 20 messages per 10 seconds per IP
            chat_rate_limiter: RateLimiter::new(20, 10),
        }
    }
}

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter entry: (request_count, window_start_time)
type RateLimitEntry = (u32, std::time::Instant);

/// Simple IP-based rate limiter
#[derive(Clone)]
struct RateLimiter {
    /// IP -> (request_count, window_start)
    entries: Arc<DashMap<String, RateLimitEntry>>,
    /// Max requests per window
    max_requests: u32,
    /// Window duration
    window_duration: Duration,
}

impl RateLimiter {
    fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration: Duration::from_secs(window_secs),
        }
    }

    /// Check if request is allowed. Returns true if allowed, false if rate limited.
    fn check(&self, ip: &str) -> bool {
        let now = std::time::Instant::now();

        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset window if expired
        if now.duration_since(*window_start) > self.window_duration {
            *count = 0;
            *window_start = now;
        }

        // Check limit
        if *count >= self.max_requests {
            return false;
        }

        *count += 1;
        true
    }
}

// ============================================================================
// HTTP Handlers - NPC Dialogue
// ============================================================================

#[derive(Deserialize)]
struct DialogueQuery {
    #[serde(rename = "playerId")]
    player_id: String,
}

const NPC_NOT_FOUND_TEXT: &str = "This NPC does not exist.";
const INVALID_CHOICE_TEXT: &str = "I don't understand that choice.";

/// GET /npc/:npc_id/dialogue?playerId=... - Opening dialogue node
async fn npc_dialogue(
    State(state): State<AppState>,
    Path(npc_id): Path<String>,
    Query(query): Query<DialogueQuery>,
) -> impl IntoResponse {
    match state.engine.greet(&npc_id, &query.player_id).await {
        Ok(node) => (StatusCode::OK, Json(node)),
        Err(DialogueError::NpcNotFound(_)) => {
            warn!("Dialogue requested for unknown NPC '{}'", npc_id);
            (
                StatusCode::NOT_FOUND,
                Json(DialogueNode {
                    text: NPC_NOT_FOUND_TEXT.to_string(),
                    options: Vec::new(),
                }),
            )
        }
        // greet never reports InvalidOption; stub it anyway
        Err(DialogueError::InvalidOption { .. }) => (
            StatusCode::NOT_FOUND,
            Json(DialogueNode {
                text: INVALID_CHOICE_TEXT.to_string(),
                options: Vec::new(),
            }),
        ),
    }
}

#[derive(Deserialize)]
struct ChooseRequest {
    #[serde(rename = "playerId")]
    player_id: String,
    #[serde(rename = "optionId")]
    option_id: String,
}

#[derive(Serialize)]
struct ChooseResponse {
    text: String,
    options: Vec<DialogueOption>,
    #[serde(rename = "applyRewards", skip_serializing_if = "Option::is_none")]
    apply_rewards: Option<Reward>,
    #[serde(rename = "updateQuest", skip_serializing_if = "Option::is_none")]
    update_quest: Option<dialogue::QuestUpdate>,
}

impl ChooseResponse {
    fn stub(text: &str) -> Self {
        Self {
            text: text.to_string(),
            options: Vec::new(),
            apply_rewards: None,
            update_quest: None,
        }
    }
}

/// POST /npc/:npc_id/choose - Select a dialogue option
async fn npc_choose(
    State(state): State<AppState>,
    Path(npc_id): Path<String>,
    Json(req): Json<ChooseRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .choose(&npc_id, &req.option_id, &req.player_id)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChooseResponse {
                text: outcome.node.text,
                options: outcome.node.options,
                apply_rewards: outcome.reward,
                update_quest: outcome.quest_update,
            }),
        ),
        Err(DialogueError::NpcNotFound(_)) => {
            warn!("Choice sent to unknown NPC '{}'", npc_id);
            (StatusCode::NOT_FOUND, Json(ChooseResponse::stub(NPC_NOT_FOUND_TEXT)))
        }
        Err(DialogueError::InvalidOption { option_id, .. }) => {
            warn!("Invalid option '{}' for NPC '{}'", option_id, npc_id);
            (StatusCode::NOT_FOUND, Json(ChooseResponse::stub(INVALID_CHOICE_TEXT)))
        }
    }
}

// ============================================================================
// HTTP Handlers - Player State
// ============================================================================

/// GET /player/:player_id/state - Full player state, lazily created
async fn player_state(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Json<PlayerState> {
    Json(state.store.get_or_create(&player_id))
}

// ============================================================================
// HTTP Handlers - Chat
// ============================================================================

#[derive(Deserialize)]
struct ChatSendRequest {
    #[serde(rename = "playerId")]
    player_id: String,
    channel: String,
    message: String,
}

#[derive(Serialize)]
struct ChatSendResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    echo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// POST /chat/send - Append a message to a channel
async fn chat_send(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<ChatSendRequest>,
) -> impl IntoResponse {
    let client_ip = addr.ip().to_string();

    if !state.chat_rate_limiter.check(&client_ip) {
        warn!("Chat rate limit exceeded from {}", client_ip);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ChatSendResponse {
                status: "error",
                echo: None,
                error: Some("Too many messages. Please slow down.".to_string()),
            }),
        );
    }

    let channel = match Channel::from_str(&req.channel) {
        Some(c) => c,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ChatSendResponse {
                    status: "error",
                    echo: None,
                    error: Some(format!("Unknown channel '{}'", req.channel)),
                }),
            );
        }
    };

    match state.chat.send(channel, &req.player_id, &req.message) {
        Some(entry) => {
            info!("[Chat] {} {}: {}", channel.as_str(), req.player_id, entry.text);
            (
                StatusCode::OK,
                Json(ChatSendResponse {
                    status: "ok",
                    echo: Some(entry.text),
                    error: None,
                }),
            )
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(ChatSendResponse {
                status: "error",
                echo: None,
                error: Some("Empty message".to_string()),
            }),
        ),
    }
}

#[derive(Serialize)]
struct ChatHistoryResponse {
    channel: String,
    messages: Vec<ChatEntry>,
}

/// GET /chat/:channel/history - Recent entries for a channel
async fn chat_history(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<ChatHistoryResponse>, (StatusCode, Json<serde_json::Value>)> {
    let channel = Channel::from_str(&channel).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("Unknown channel '{}'", channel) })),
        )
    })?;

    Ok(Json(ChatHistoryResponse {
        channel: channel.as_str().to_string(),
        messages: state.chat.history(channel),
    }))
}

// ============================================================================
// HTTP Handlers - Scores
// ============================================================================

#[derive(Deserialize)]
struct AddScoreRequest {
    name: String,
    score: i64,
}

/// POST /scores - Record a score
async fn add_score(
    State(state): State<AppState>,
    Json(req): Json<AddScoreRequest>,
) -> impl IntoResponse {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing name or score" })),
        );
    }

    match state.db.add_score(&name, req.score).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": id, "name": name, "score": req.score })),
        ),
        Err(e) => {
            error!("Failed to add score for '{}': {}", name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to add score" })),
            )
        }
    }
}

/// GET /scores - Scores ordered descending
async fn list_scores(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.top_scores().await {
        Ok(scores) => (StatusCode::OK, Json(serde_json::json!(scores))),
        Err(e) => {
            error!("Failed to list scores: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to list scores" })),
            )
        }
    }
}

/// POST /scores/reset - Clear the score table
async fn reset_scores(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.reset_scores().await {
        Ok(removed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "removed": removed })),
        ),
        Err(e) => {
            error!("Failed to reset scores: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to reset scores" })),
            )
        }
    }
}

// ============================================================================
// HTTP Handlers - Health
// ============================================================================

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("elderscape_server=info".parse().unwrap()),
        )
        .init();

    let config = Config::load(std::path::Path::new(config::DEFAULT_CONFIG_PATH))
        .expect("Failed to load configuration");

    let state = AppState::new(&config).await;

    // Spawn auto-save loop
    let save_state = state.clone();
    let autosave_interval = Duration::from_secs(config.autosave_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(autosave_interval);
        loop {
            interval.tick().await;

            let mut saved_count = 0;
            for (player_id, snapshot) in save_state.store.snapshot() {
                if let Err(e) = save_state.db.save_player_state(&player_id, &snapshot).await {
                    warn!("Auto-save failed for player {}: {}", player_id, e);
                } else {
                    saved_count += 1;
                }
            }

            if saved_count > 0 {
                info!("Auto-saved {} player state(s) to database", saved_count);
            }
        }
    });

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // NPC dialogue
        .route("/npc/:npc_id/dialogue", get(npc_dialogue))
        .route("/npc/:npc_id/choose", post(npc_choose))
        // Player state
        .route("/player/:player_id/state", get(player_state))
        // Chat
        .route("/chat/send", post(chat_send))
        .route("/chat/:channel/history", get(chat_history))
        // Scores
        .route("/scores", get(list_scores).post(add_score))
        .route("/scores/reset", post(reset_scores))
        // In development, you may want CorsLayer::permissive()
        // For production, specify allowed origins explicitly
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("ElderScape server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}
