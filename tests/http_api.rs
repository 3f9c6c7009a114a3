use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chattercraft_server::{
    app::{build_state_with, router},
    auth::sign_owner_token,
    config::Config,
    llm::{BackendSelector, DeltaStream, LlmError, ModelBackend},
    store::MemoryStore,
    types::{ChatTurn, ModelProvider},
};
use chrono::Utc;
use futures_util::stream;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{header as header_is, method, path},
    Mock, MockServer, ResponseTemplate,
};

const SECRET: &str = "integration-secret";

struct EchoBackend;

#[async_trait]
impl ModelBackend for EchoBackend {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Gemini
    }

    async fn stream_chat(&self, transcript: &[ChatTurn]) -> Result<DeltaStream, LlmError> {
        let last = transcript
            .last()
            .map(|turn| turn.content.clone())
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(vec![
            Ok::<_, LlmError>("You said: ".to_string()),
            Ok(last),
        ])))
    }
}

struct EchoSelector;

impl BackendSelector for EchoSelector {
    fn select(&self, _provider: ModelProvider) -> Result<Arc<dyn ModelBackend>, LlmError> {
        Ok(Arc::new(EchoBackend))
    }
}

fn app_with(config: Config) -> Router {
    router(build_state_with(
        config,
        Arc::new(MemoryStore::new()),
        reqwest::Client::new(),
        Arc::new(EchoSelector),
    ))
}

fn app() -> Router {
    app_with(Config::local("http://localhost:4000", SECRET))
}

fn token(owner: &str) -> String {
    sign_owner_token(SECRET, owner, Utc::now().timestamp() + 3600).unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, String) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token(owner)));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn support_bot() -> Value {
    json!({
        "name": "Support Bot",
        "slug": "support-bot",
        "systemPrompt": "You are a helpful assistant.",
        "modelProvider": "primary"
    })
}

async fn create_support_bot(app: &Router) -> Value {
    let (status, _, body) = send(
        app,
        Method::POST,
        "/api/agents",
        Some("user_1"),
        Some(support_bot()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    serde_json::from_str::<Value>(&body).unwrap()["agent"].clone()
}

#[tokio::test]
async fn health_needs_no_token() {
    let (status, _, body) = send(&app(), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["ok"], true);
}

#[tokio::test]
async fn owner_routes_reject_missing_and_forged_tokens() {
    let app = app();
    let (status, _, body) = send(&app, Method::GET, "/api/agents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Unauthorized"}"#);

    let forged = sign_owner_token("other-secret", "user_1", Utc::now().timestamp() + 60).unwrap();
    let request = Request::builder()
        .uri("/api/agents")
        .header(header::AUTHORIZATION, format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_lifecycle_over_http() {
    let app = app();
    let agent = create_support_bot(&app).await;
    assert_eq!(agent["slug"], "support-bot");
    assert_eq!(agent["modelProvider"], "gemini");
    assert_eq!(agent["isActive"], true);
    let id = agent["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/agents",
        Some("user_2"),
        Some(support_bot()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("Slug already taken"));

    let (status, _, body) = send(&app, Method::GET, "/api/agents", Some("user_1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = serde_json::from_str::<Value>(&body).unwrap();
    assert_eq!(listed["agents"].as_array().map(Vec::len), Some(1));

    let uri = format!("/api/agents/{id}");
    let (status, _, _) = send(&app, Method::GET, &uri, Some("user_2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(
        &app,
        Method::PATCH,
        &uri,
        Some("user_1"),
        Some(json!({ "name": "Help Desk" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated = serde_json::from_str::<Value>(&body).unwrap();
    assert_eq!(updated["agent"]["name"], "Help Desk");
    assert_eq!(updated["agent"]["slug"], "support-bot");

    let (status, _, _) = send(&app, Method::DELETE, &uri, Some("user_1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, Method::GET, &uri, Some("user_1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let app = app();
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/agents",
        Some("user_1"),
        Some(json!({ "name": "X", "slug": "Bad Slug", "systemPrompt": "short", "modelProvider": "primary" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = serde_json::from_str::<Value>(&body).unwrap();
    assert_eq!(body["error"], "Invalid form data");
    assert!(body["issues"]["slug"].is_array());

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/agents",
        Some("user_1"),
        Some(json!({ "name": "Support Bot", "colour": "red" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, Method::GET, "/api/agents/not-a-uuid", Some("user_1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ui_config_round_trip_and_widget_script() {
    let app = app();
    let agent = create_support_bot(&app).await;
    let id = agent["id"].as_str().unwrap();

    let (status, headers, body) =
        send(&app, Method::GET, "/widget/support-bot.js", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
    assert!(body.contains(r#""headerTitle":"Support Bot""#));
    assert!(body.contains(r#""http://localhost:4000""#));

    let uri = format!("/api/agents/{id}/ui-config");
    let (status, _, _) = send(
        &app,
        Method::POST,
        &uri,
        Some("user_1"),
        Some(json!({ "primaryColor": "#ff0000", "headerTitle": "Ask us" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, _, body) = send(&app, Method::GET, &uri, Some("user_1"), None).await;
    let saved = serde_json::from_str::<Value>(&body).unwrap();
    assert_eq!(saved["uiConfig"]["primaryColor"], "#ff0000");
    assert_eq!(saved["uiConfig"]["widgetWidth"], 380);

    let (_, _, body) = send(&app, Method::GET, "/widget/support-bot.js", None, None).await;
    assert!(body.contains(r##""primaryColor":"#ff0000""##));
    assert!(body.contains(r#""headerTitle":"Ask us""#));

    let (status, _, _) = send(
        &app,
        Method::POST,
        &uri,
        Some("user_1"),
        Some(json!({ "primaryColor": "red" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn widget_is_hidden_for_inactive_and_unknown_agents() {
    let app = app();
    let agent = create_support_bot(&app).await;
    let id = agent["id"].as_str().unwrap();

    let (status, _, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/agents/{id}/status"),
        Some("user_1"),
        Some(json!({ "isActive": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, Method::GET, "/widget/support-bot.js", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, Method::GET, "/widget/missing.js", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, Method::GET, "/widget/support-bot", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_streams_server_sent_events() {
    let app = app();
    create_support_bot(&app).await;

    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/api/chat/support-bot",
        None,
        Some(json!({ "messages": [{ "id": "m1", "role": "user", "content": "hello" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let first = body.find("data: \"You said: \"").unwrap();
    let second = body.find("data: \"hello\"").unwrap();
    let done = body.find("event: done").unwrap();
    assert!(first < second && second < done);
    assert!(body.contains("data: [DONE]"));
    assert!(!body.contains("event: error"));
}

#[tokio::test]
async fn chat_errors_before_streaming_are_json() {
    let app = app();
    create_support_bot(&app).await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/chat/nobody",
        None,
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Not found"}"#);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/chat/support-bot",
        None,
        Some(json!({ "messages": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shop_integration_is_saved_redacted_and_testable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/api/2023-07/shop.json"))
        .and(header_is("X-Shopify-Access-Token", "shpat_good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "shop": { "name": "Acme", "email": "owner@acme.test", "domain": "acme.test" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/api/2023-07/shop.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut config = Config::local("http://localhost:4000", SECRET);
    config.commerce_base_url = Some(server.uri());
    let app = app_with(config);
    let agent = create_support_bot(&app).await;
    let id = agent["id"].as_str().unwrap();

    let uri = format!("/api/agents/{id}/integrations/shopify");
    let (status, _, body) = send(
        &app,
        Method::POST,
        &uri,
        Some("user_1"),
        Some(json!({
            "shopDomain": "acme.myshopify.com",
            "apiKey": "key",
            "apiSecretKey": "secret",
            "accessToken": "shpat_good"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!body.contains("shpat_good"));

    let (_, _, body) = send(&app, Method::GET, &uri, Some("user_1"), None).await;
    let view = serde_json::from_str::<Value>(&body).unwrap();
    assert_eq!(view["integration"]["shopDomain"], "acme");
    assert_eq!(view["integration"]["maxProductsToShow"], 3);
    assert_eq!(view["integration"]["hasCredentials"], true);
    assert!(!body.contains("secret"));

    let test = |token: &str| {
        json!({ "shopDomain": "acme", "apiKey": "key", "accessToken": token })
    };
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/integrations/shopify/test",
        Some("user_1"),
        Some(test("shpat_good")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["shop"]["name"], "Acme");

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/integrations/shopify/test",
        Some("user_1"),
        Some(test("shpat_bad")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Failed to connect to Shopify"));
}
