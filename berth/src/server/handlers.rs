//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::deploy::coordinator::read_log;
use crate::errors::{BerthError, StoreError};
use crate::server::state::ServerState;

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps core errors onto HTTP status codes
#[derive(Debug)]
pub struct ApiError(pub BerthError);

impl From<BerthError> for ApiError {
    fn from(err: BerthError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BerthError::NotFound(_) | BerthError::Persistence(StoreError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            BerthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            BerthError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "berth".to_string(),
        version: state.version.clone(),
    })
}

/// Trigger request, every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Trigger a deployment of an application
pub async fn trigger_handler(
    State(state): State<Arc<ServerState>>,
    Path(application_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: TriggerRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TriggerRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            BerthError::ValidationError(format!("invalid request body: {}", e))
        })?
    };

    let deployment = state
        .coordinator
        .trigger_deploy(&application_id, request.title, request.description)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(deployment)))
}

/// Deployments of an application with their logs, newest first
pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(application_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployments = state
        .coordinator
        .list_deployments_for_application(&application_id)
        .await?;
    Ok(Json(deployments))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state.coordinator.get_deployment(&deployment_id).await?;
    Ok(Json(deployment))
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

/// Carriage returns from progress output are not valid inside an SSE field
fn line_event(line: &str) -> Event {
    Event::default().data(line.replace('\r', ""))
}

fn live_events(receiver: broadcast::Receiver<String>) -> EventStream {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(line) => return Some((Ok(line_event(&line)), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Log subscriber lagged, skipped {} lines", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

fn replay_events(text: String) -> EventStream {
    let events: Vec<Result<Event, Infallible>> = text
        .lines()
        .map(|line| Ok(line_event(line)))
        .collect();
    stream::iter(events).boxed()
}

/// Stream a deployment's log as server-sent events.
///
/// Live deployments stream lines as they are written; finished ones replay
/// the stored log and end.
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Sse<KeepAliveStream<EventStream>>, ApiError> {
    let deployment = state.coordinator.get_deployment(&deployment_id).await?;

    let events = match state.coordinator.subscribe(&deployment.id) {
        Some(receiver) => live_events(receiver),
        None => replay_events(read_log(&deployment).await),
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
