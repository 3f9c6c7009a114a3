use std::{convert::Infallible, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::Stream;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    agents::AgentService,
    chat::{ChatEvent, ChatService},
    commerce::ShopifyClient,
    config::{Config, StoreBackend},
    error::{AppError, AppResult},
    llm::{BackendSelector, ProviderRegistry},
    store::{AgentStore, MemoryStore, PgStore},
    types::{
        AgentInput, AgentStatusBody, AppState, ChatRequest, CommerceConfig, Owner,
        ShopConnectionTest, UiConfig,
    },
    validation::normalize_connection_test,
    widget::render_widget_script,
};

/// Wires services over `store` with the provider registry built from the
/// configured credentials.
pub fn build_state(config: Config, store: Arc<dyn AgentStore>) -> Arc<AppState> {
    let http = reqwest::Client::new();
    let backends = Arc::new(ProviderRegistry::new(
        http.clone(),
        config.credentials.clone(),
        config.endpoints.clone(),
    ));
    build_state_with(config, store, http, backends)
}

pub fn build_state_with(
    config: Config,
    store: Arc<dyn AgentStore>,
    http: reqwest::Client,
    backends: Arc<dyn BackendSelector>,
) -> Arc<AppState> {
    let agents = AgentService::new(store);
    let shopify = ShopifyClient::new(http, config.commerce_base_url.clone());
    let chat = ChatService::new(agents.clone(), shopify.clone(), backends);
    Arc::new(AppState {
        config,
        agents,
        chat,
        shopify,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/{id}",
            get(get_agent).patch(update_agent).delete(delete_agent),
        )
        .route("/api/agents/{id}/status", patch(set_agent_status))
        .route(
            "/api/agents/{id}/ui-config",
            get(get_ui_config).post(save_ui_config),
        )
        .route(
            "/api/agents/{id}/integrations/shopify",
            get(get_shopify_integration).post(save_shopify_integration),
        )
        .route(
            "/api/integrations/shopify/test",
            post(test_shopify_connection),
        )
        .route("/api/chat/{slug}", post(chat))
        .route("/widget/{file}", get(widget_script))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Malformed ids can never name a record.
fn agent_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": Utc::now().to_rfc3339() }))
}

async fn list_agents(State(state): State<Arc<AppState>>, owner: Owner) -> impl IntoResponse {
    let agents = state.agents.list(&owner).await;
    Json(json!({ "agents": agents }))
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    body: Result<Json<AgentInput>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = body?;
    let agent = state.agents.create(&owner, &input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "agent": agent }))).into_response())
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let agent = state.agents.get_by_id(&owner, agent_id(&id)?).await?;
    Ok(Json(json!({ "agent": agent })).into_response())
}

async fn update_agent(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
    body: Result<Json<AgentInput>, JsonRejection>,
) -> AppResult<Response> {
    let id = agent_id(&id)?;
    let Json(input) = body?;
    let agent = state.agents.update(&owner, id, &input).await?;
    Ok(Json(json!({ "agent": agent })).into_response())
}

async fn set_agent_status(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
    body: Result<Json<AgentStatusBody>, JsonRejection>,
) -> AppResult<Response> {
    let id = agent_id(&id)?;
    let Json(body) = body?;
    let agent = state.agents.set_active(&owner, id, body.is_active).await?;
    Ok(Json(json!({ "agent": agent })).into_response())
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.agents.delete(&owner, agent_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_ui_config(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let config = state.agents.ui_config(&owner, agent_id(&id)?).await?;
    Ok(Json(json!({ "uiConfig": config })).into_response())
}

async fn save_ui_config(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
    body: Result<Json<UiConfig>, JsonRejection>,
) -> AppResult<Response> {
    let id = agent_id(&id)?;
    let Json(config) = body?;
    let config = state.agents.save_ui_config(&owner, id, &config).await?;
    Ok(Json(json!({ "success": true, "uiConfig": config })).into_response())
}

async fn get_shopify_integration(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let view = state.agents.commerce_config(&owner, agent_id(&id)?).await?;
    Ok(Json(json!({ "integration": view })).into_response())
}

async fn save_shopify_integration(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
    body: Result<Json<CommerceConfig>, JsonRejection>,
) -> AppResult<Response> {
    let id = agent_id(&id)?;
    let Json(config) = body?;
    let view = state.agents.save_commerce_config(&owner, id, config).await?;
    Ok(Json(json!({ "success": true, "integration": view })).into_response())
}

async fn test_shopify_connection(
    State(state): State<Arc<AppState>>,
    _owner: Owner,
    body: Result<Json<ShopConnectionTest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    let body = normalize_connection_test(body).map_err(AppError::Validation)?;
    match state
        .shopify
        .shop_info(&body.shop_domain, &body.access_token)
        .await
    {
        Ok(shop) => Ok(Json(json!({ "success": true, "shop": shop })).into_response()),
        Err(err) => {
            warn!(shop = %body.shop_domain, error = %err, "shop connection test failed");
            Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Failed to connect to Shopify. Please check your credentials."
                })),
            )
                .into_response())
        }
    }
}

fn sse_frame(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Delta(text) => Event::default()
            .event("delta")
            .data(serde_json::to_string(&text).unwrap_or_default()),
        ChatEvent::Done => Event::default().event("done").data("[DONE]"),
        ChatEvent::Error(message) => Event::default()
            .event("error")
            .data(json!({ "error": message }).to_string()),
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(request) = body?;
    let events = state.chat.invoke(&slug, request.messages).await?;
    let stream = ReceiverStream::new(events).map(|event| Ok(sse_frame(event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn widget_script(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> AppResult<Response> {
    let slug = file.strip_suffix(".js").ok_or(AppError::NotFound)?;
    let agent = state.agents.get_by_slug(slug).await?;
    let ui = state.agents.public_ui_config(&agent).await.map_err(|err| {
        warn!(slug = %agent.slug, error = %err, "ui config lookup failed");
        AppError::from(err)
    })?;
    let script = render_widget_script(&state.config.public_base_url, &agent, ui.as_ref());
    Ok((
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "public, max-age=300"),
        ],
        script,
    )
        .into_response())
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    let store: Arc<dyn AgentStore> = match config.store {
        StoreBackend::Memory => {
            warn!("using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&config.database_url)
                .await
                .context("failed to connect to postgres (set DATABASE_URL or POSTGRES_* env vars)")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("failed to run sqlx migrations")?;
            Arc::new(PgStore::new(pool))
        }
    };
    if config.auth_signing_secret.is_empty() {
        warn!("AUTH_SIGNING_SECRET is not set; owner routes will reject every request");
    }

    let port = config.port;
    let app = router(build_state(config, store));
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(port, "chattercraft server running at http://localhost:{port}");
    axum::serve(listener, app)
        .await
        .context("server runtime failure")?;
    Ok(())
}
