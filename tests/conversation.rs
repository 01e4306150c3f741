//! Webhook client integration tests against a local mock backend

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;
use uuid::Uuid;

use triage_desk::{
    ConversationClient, ConversationError, ConversationStatus, WebhookClient, parse_response,
};

/// Serve `router` on an ephemeral port and return the webhook URL
async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Url::parse(&format!("http://{addr}/webhook/triage")).unwrap()
}

fn client(url: Url) -> WebhookClient {
    WebhookClient::new(url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_posts_message_and_session_id() {
    let received = Arc::new(Mutex::new(None::<Value>));
    let captured = Arc::clone(&received);

    let router = Router::new().route(
        "/webhook/triage",
        post(move |Json(body): Json<Value>| {
            let captured = Arc::clone(&captured);
            async move {
                *captured.lock().unwrap() = Some(body);
                Json(json!({
                    "output": "```json\n{\"message\":\"Olá! Qual é o seu nome?\",\"status\":\"normal\"}\n```"
                }))
            }
        }),
    );

    let session_id = Uuid::new_v4();
    let body = client(serve(router).await)
        .send_message("iniciar", session_id)
        .await
        .unwrap();

    let reply = parse_response(&body);
    assert_eq!(reply.message, "Olá! Qual é o seu nome?");
    assert_eq!(reply.status, ConversationStatus::Normal);

    let request = received.lock().unwrap().clone().unwrap();
    assert_eq!(request["message"], "iniciar");
    assert_eq!(request["sessionId"], session_id.to_string());
}

#[tokio::test]
async fn test_array_envelope_uses_first_item() {
    let router = Router::new().route(
        "/webhook/triage",
        post(|| async {
            Json(json!([
                { "output": { "message": "Chame a equipe", "status": "alerta_emergencia" } },
                { "output": "ignored" }
            ]))
        }),
    );

    let body = client(serve(router).await)
        .send_message("dor no peito", Uuid::new_v4())
        .await
        .unwrap();

    let reply = parse_response(&body);
    assert_eq!(reply.message, "Chame a equipe");
    assert_eq!(reply.status, ConversationStatus::EmergencyAlert);
}

#[tokio::test]
async fn test_plain_text_reply_becomes_message() {
    let router = Router::new().route(
        "/webhook/triage",
        post(|| async { "Pode repetir, por favor?" }),
    );

    let body = client(serve(router).await)
        .send_message("hmm", Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(body, Value::String("Pode repetir, por favor?".to_string()));
    let reply = parse_response(&body);
    assert_eq!(reply.message, "Pode repetir, por favor?");
    assert_eq!(reply.status, ConversationStatus::Normal);
}

#[tokio::test]
async fn test_server_error_status() {
    let router = Router::new().route(
        "/webhook/triage",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "workflow crashed").into_response() }),
    );

    let err = client(serve(router).await)
        .send_message("olá", Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err, ConversationError::Server(500));
}

#[tokio::test]
async fn test_unknown_webhook_is_communication_error() {
    let router = Router::new().route("/other", post(|| async { "nope" }));

    let err = client(serve(router).await)
        .send_message("olá", Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, ConversationError::Communication(_)));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let router = Router::new().route(
        "/webhook/triage",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "output": "tarde" }))
        }),
    );

    let client = WebhookClient::new(serve(router).await, Duration::from_millis(200)).unwrap();
    let err = client
        .send_message("olá", Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err, ConversationError::Timeout);
}

#[tokio::test]
async fn test_closed_port_is_connection_refused() {
    // Bind and drop to find a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/webhook/triage")).unwrap();
    let err = client(url)
        .send_message("olá", Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err, ConversationError::ConnectionRefused);
}
