//! Broker HTTP Routes
//!
//! Publish, subscribe and status endpoints used by the browser UI, plus
//! subscriber and topic management.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::broker::{
    Broker, BrokerError, BrokerStatus, Liveness, SubscriberId, SubscriberInfo, TopicInfo,
    WireMessage,
};

/// Shared broker handle
pub type BrokerState = Arc<Broker>;

/// Messages returned per topic read when no limit is given
const DEFAULT_READ_LIMIT: usize = 100;

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishRequest {
    pub message: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub message: String,
    pub topic: String,
    pub sequence: u64,
    pub subscribers: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeRequest {
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub topic: String,
    pub subscriber_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriberMessagesResponse {
    pub subscriber_id: String,
    pub liveness: Liveness,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub subscriber_id: String,
    pub liveness: Liveness,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub subscriber_id: String,
    pub cursor: u64,
}

#[derive(Debug, Serialize)]
pub struct SubscribersResponse {
    pub subscribers: Vec<SubscriberInfo>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<TopicInfo>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct TopicMessagesResponse {
    pub topic: String,
    pub head: u64,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    pub max: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

/// Error body shared by every broker endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn broker_error(err: BrokerError) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: err.to_string(),
            error: err.code().to_string(),
        }),
    )
}

/// Body-level rejections keep their status; malformed JSON and schema
/// violations are all 400
fn invalid_request(rejection: JsonRejection) -> ApiError {
    let (status, code) = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => (StatusCode::PAYLOAD_TOO_LARGE, "AERO_HTTP_BODY_TOO_LARGE"),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "AERO_HTTP_UNSUPPORTED_MEDIA_TYPE",
        ),
        _ => (StatusCode::BAD_REQUEST, "AERO_HTTP_INVALID_REQUEST"),
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: rejection.body_text(),
            error: code.to_string(),
        }),
    )
}

fn parse_id(id: &str) -> Result<SubscriberId, ApiError> {
    SubscriberId::parse(id).map_err(broker_error)
}

// ==================
// Router
// ==================

/// Create broker routes
pub fn broker_routes(state: BrokerState) -> Router {
    Router::new()
        .route("/publish", post(publish_handler))
        .route("/subscribe", post(subscribe_handler))
        .route("/broker_status", get(status_handler))
        .route("/broker_status/details", get(status_details_handler))
        .route("/subscribers", get(list_subscribers_handler))
        .route("/subscribers/:id", delete(unsubscribe_handler))
        .route("/subscribers/:id/messages", get(poll_handler))
        .route("/subscribers/:id/heartbeat", post(heartbeat_handler))
        .route("/subscribers/:id/resume", post(resume_handler))
        .route("/topics", get(list_topics_handler))
        .route("/topics/:name", delete(remove_topic_handler))
        .route("/topics/:name/messages", get(topic_messages_handler))
        .with_state(state)
}

// ==================
// Handlers
// ==================

/// Publish a message
async fn publish_handler(
    State(broker): State<BrokerState>,
    request: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResponse>, ApiError> {
    let Json(request) = request.map_err(invalid_request)?;
    let topic = request
        .topic
        .unwrap_or_else(|| broker.default_topic().to_string());

    let result = broker
        .publish(&topic, request.message.clone())
        .map_err(broker_error)?;

    Ok(Json(PublishResponse {
        success: true,
        message: request.message,
        topic,
        sequence: result.sequence,
        subscribers: result.accepted_subscriber_count,
    }))
}

/// Subscribe to a topic over a poll buffer
async fn subscribe_handler(
    State(broker): State<BrokerState>,
    request: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let Json(request) = request.map_err(invalid_request)?;
    let id = broker.subscribe_poll(&request.topic).map_err(broker_error)?;

    Ok(Json(SubscribeResponse {
        success: true,
        topic: request.topic,
        subscriber_id: id.to_string(),
    }))
}

/// One-line broker status
async fn status_handler(State(broker): State<BrokerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: broker.status().summary(),
    })
}

/// Full broker status
async fn status_details_handler(State(broker): State<BrokerState>) -> Json<BrokerStatus> {
    Json(broker.status())
}

async fn list_subscribers_handler(State(broker): State<BrokerState>) -> Json<SubscribersResponse> {
    let subscribers = broker.subscribers();
    let total = subscribers.len();
    Json(SubscribersResponse { subscribers, total })
}

/// Drain a poll subscriber's buffer
async fn poll_handler(
    State(broker): State<BrokerState>,
    Path(id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<SubscriberMessagesResponse>, ApiError> {
    let id = parse_id(&id)?;
    let messages = broker.poll(&id, query.max).map_err(broker_error)?;
    let liveness = broker.liveness(&id).map_err(broker_error)?;

    Ok(Json(SubscriberMessagesResponse {
        subscriber_id: id.to_string(),
        liveness,
        messages: messages.iter().map(|m| m.to_wire()).collect(),
    }))
}

async fn heartbeat_handler(
    State(broker): State<BrokerState>,
    Path(id): Path<String>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let id = parse_id(&id)?;
    let liveness = broker.heartbeat(&id).map_err(broker_error)?;

    Ok(Json(HeartbeatResponse {
        subscriber_id: id.to_string(),
        liveness,
    }))
}

/// Re-bind a fresh poll buffer and resume from the cursor
async fn resume_handler(
    State(broker): State<BrokerState>,
    Path(id): Path<String>,
) -> Result<Json<ResumeResponse>, ApiError> {
    let id = parse_id(&id)?;
    let cursor = broker.resume_poll(&id).map_err(broker_error)?;

    Ok(Json(ResumeResponse {
        subscriber_id: id.to_string(),
        cursor,
    }))
}

/// Unsubscribe; repeated calls succeed
async fn unsubscribe_handler(
    State(broker): State<BrokerState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    broker.unsubscribe(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_topics_handler(State(broker): State<BrokerState>) -> Json<TopicsResponse> {
    let topics = broker.topics();
    let total = topics.len();
    Json(TopicsResponse { topics, total })
}

/// Retained messages after `since`
async fn topic_messages_handler(
    State(broker): State<BrokerState>,
    Path(name): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<TopicMessagesResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_READ_LIMIT);
    let messages = broker
        .messages_since(&name, query.since, limit)
        .map_err(broker_error)?;
    let head = broker.head(&name).map_err(broker_error)?;

    Ok(Json(TopicMessagesResponse {
        topic: name,
        head,
        messages: messages.iter().map(|m| m.to_wire()).collect(),
    }))
}

async fn remove_topic_handler(
    State(broker): State<BrokerState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    broker.remove_topic(&name).map_err(broker_error)?;
    Ok(StatusCode::NO_CONTENT)
}
