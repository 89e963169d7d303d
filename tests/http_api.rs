//! HTTP API Tests
//!
//! Drives the full router in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use aeromq::broker::{Broker, BrokerConfig, DeliveryConfig};
use aeromq::http_server::{HttpServer, HttpServerConfig};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with(config: BrokerConfig) -> (Arc<Broker>, Router) {
    let broker = Broker::new(config).unwrap();
    let router = HttpServer::new(Arc::clone(&broker)).router();
    (broker, router)
}

fn app() -> (Arc<Broker>, Router) {
    app_with(BrokerConfig::default())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

// =============================================================================
// PUBLISH
// =============================================================================

#[tokio::test]
async fn test_publish_echoes_message() {
    let (_broker, app) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "hello", "topic": "news"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "hello");
    assert_eq!(body["topic"], "news");
    assert_eq!(body["sequence"], 1);
}

/// Without a topic the message lands on the default topic.
#[tokio::test]
async fn test_publish_default_topic() {
    let (broker, app) = app();

    let (status, body) = send(&app, Method::POST, "/publish", Some(json!({"message": "hi"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "default");
    assert_eq!(broker.head("default").unwrap(), 1);
}

#[tokio::test]
async fn test_publish_empty_message_rejected() {
    let (broker, app) = app();

    let (status, body) = send(&app, Method::POST, "/publish", Some(json!({"message": ""}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "AERO_BROKER_EMPTY_MESSAGE");
    assert!(broker.topics().is_empty());
}

#[tokio::test]
async fn test_publish_oversize_rejected() {
    let (_broker, app) = app_with(BrokerConfig {
        max_payload_bytes: 8,
        ..Default::default()
    });

    let (status, body) = send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "far too long for the limit"})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "AERO_BROKER_PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_publish_unknown_field_rejected() {
    let (_broker, app) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "hi", "priority": 5})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "AERO_HTTP_INVALID_REQUEST");
}

/// Bodies past the extractor limit are 413, not a schema error.
#[tokio::test]
async fn test_publish_oversize_body_rejected() {
    let (broker, app) = app();
    let huge = "x".repeat(3 * 1024 * 1024);

    let (status, body) = send(&app, Method::POST, "/publish", Some(json!({"message": huge}))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "AERO_HTTP_BODY_TOO_LARGE");
    assert!(broker.topics().is_empty());
}

#[tokio::test]
async fn test_configured_body_limit() {
    let broker = Broker::new(BrokerConfig::default()).unwrap();
    let config = HttpServerConfig {
        max_body_bytes: 64,
        ..Default::default()
    };
    let app = HttpServer::with_config(broker, config).router();

    let (status, _) = send(&app, Method::POST, "/publish", Some(json!({"message": "short"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "y".repeat(100)})),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "AERO_HTTP_BODY_TOO_LARGE");
}

#[tokio::test]
async fn test_publish_without_json_content_type() {
    let (_broker, app) = app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/publish")
        .body(Body::from(r#"{"message":"hi"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_publish_invalid_topic_rejected() {
    let (_broker, app) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "hi", "topic": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "AERO_BROKER_INVALID_TOPIC");
}

// =============================================================================
// SUBSCRIBE AND POLL
// =============================================================================

#[tokio::test]
async fn test_subscribe_then_poll() {
    let (_broker, app) = app();

    let (status, body) = send(&app, Method::POST, "/subscribe", Some(json!({"topic": "news"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["subscriber_id"].as_str().unwrap().to_string();

    send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "update", "topic": "news"})),
    )
    .await;

    let uri = format!("/subscribers/{}/messages", id);
    let messages = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let (status, body) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            if !messages.is_empty() {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["payload"], "update");
    assert_eq!(messages[0]["sequence"], 1);
}

/// Subscribing after a publish still returns the earlier message.
#[tokio::test]
async fn test_publish_then_subscribe_then_poll() {
    let (_broker, app) = app();

    send(
        &app,
        Method::POST,
        "/publish",
        Some(json!({"message": "hello", "topic": "news"})),
    )
    .await;

    let (_, body) = send(&app, Method::POST, "/subscribe", Some(json!({"topic": "news"}))).await;
    let uri = format!("/subscribers/{}/messages", body["subscriber_id"].as_str().unwrap());

    let messages = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let (_, body) = send(&app, Method::GET, &uri, None).await;
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            if !messages.is_empty() {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(messages[0]["payload"], "hello");
    assert_eq!(messages[0]["sequence"], 1);
}

#[tokio::test]
async fn test_unknown_subscriber_not_found() {
    let (_broker, app) = app();

    let (status, _) = send(&app, Method::GET, "/subscribers/not-a-uuid/messages", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/subscribers/{}/heartbeat", uuid::Uuid::new_v4());
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "AERO_BROKER_SUBSCRIBER_NOT_FOUND");
}

#[tokio::test]
async fn test_unsubscribe_idempotent() {
    let (broker, app) = app();

    let (_, body) = send(&app, Method::POST, "/subscribe", Some(json!({"topic": "news"}))).await;
    let uri = format!("/subscribers/{}", body["subscriber_id"].as_str().unwrap());

    let (first, _) = send(&app, Method::DELETE, &uri, None).await;
    let (second, _) = send(&app, Method::DELETE, &uri, None).await;

    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::NO_CONTENT);
    assert!(broker.subscribers().is_empty());
}

#[tokio::test]
async fn test_heartbeat_and_resume() {
    let (_broker, app) = app();

    let (_, body) = send(&app, Method::POST, "/subscribe", Some(json!({"topic": "news"}))).await;
    let id = body["subscriber_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, &format!("/subscribers/{}/heartbeat", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liveness"], "active");

    let (status, body) = send(&app, Method::POST, &format!("/subscribers/{}/resume", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cursor"], 0);
}

// =============================================================================
// TOPICS
// =============================================================================

#[tokio::test]
async fn test_topic_listing_and_reads() {
    let (_broker, app) = app();

    for text in ["one", "two", "three"] {
        send(
            &app,
            Method::POST,
            "/publish",
            Some(json!({"message": text, "topic": "news"})),
        )
        .await;
    }

    let (status, body) = send(&app, Method::GET, "/topics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["topics"][0]["name"], "news");
    assert_eq!(body["topics"][0]["head"], 3);

    let (status, body) = send(&app, Method::GET, "/topics/news/messages?since=1&limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["head"], 3);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["messages"][0]["payload"], "two");

    let (status, _) = send(&app, Method::DELETE, "/topics/news", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, "/topics/news/messages", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "AERO_BROKER_UNKNOWN_TOPIC");
}

// =============================================================================
// STATUS AND OBSERVABILITY
// =============================================================================

#[tokio::test]
async fn test_broker_status_healthy_then_degraded() {
    let (broker, app) = app_with(BrokerConfig {
        backlog_threshold: 2,
        push_channel_capacity: 1,
        delivery: DeliveryConfig {
            write_timeout_ms: 60_000,
            ..Default::default()
        },
        ..Default::default()
    });

    let (status, body) = send(&app, Method::GET, "/broker_status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    // A push consumer that never reads stalls the topic
    let (_id, _rx) = broker.subscribe_push("news").unwrap();
    for i in 0..5 {
        broker.publish("news", format!("m{}", i)).unwrap();
    }

    let (_, body) = send(&app, Method::GET, "/broker_status", None).await;
    assert_eq!(body["status"], "degraded: 1 topic over backlog threshold");

    let (_, body) = send(&app, Method::GET, "/broker_status/details", None).await;
    assert_eq!(body["health"], "degraded");
    assert_eq!(body["topics_over_threshold"], 1);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (_broker, app) = app();

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["broker"], "healthy");

    send(&app, Method::POST, "/publish", Some(json!({"message": "hi"}))).await;
    send(&app, Method::POST, "/publish", Some(json!({"message": ""}))).await;

    let (status, body) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages_published"], 1);
    assert_eq!(body["publishes_rejected"], 1);
}
