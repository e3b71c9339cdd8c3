//! Server-Sent Events push channel
//!
//! `GET /events?department=&sessionId=` subscribes one department session to
//! the NotificationBus. Every event is forwarded unfiltered; terminals check
//! `targetDepartments` themselves.

use std::convert::Infallible;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use presswork_common::events::{PushMessage, SessionHandle};
use presswork_common::models::Department;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{ApiResult, AppState};

/// Query string of `GET /events`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamQuery {
    pub department: Department,
    /// Stable id so a reconnecting terminal replaces its old session
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// GET /events
///
/// Streams:
/// - `ConnectionStatus` once, on connect
/// - `WorkflowEvent` for every published workflow event
/// - a `heartbeat` comment after each idle heartbeat interval
pub async fn event_stream(
    State(state): State<AppState>,
    query: Result<Query<EventStreamQuery>, QueryRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Query(query) = query?;
    let session = SessionHandle {
        session_id: query.session_id.unwrap_or_else(Uuid::new_v4),
        department: query.department,
    };

    // Subscribe before the response starts so nothing published after this
    // handler returns can be missed.
    let mut subscription = state.bus.subscribe(session);
    let heartbeat = state.heartbeat;

    info!(
        session_id = %session.session_id,
        department = %session.department,
        "Push session connected"
    );

    let stream = async_stream::stream! {
        let status = json!({
            "type": "ConnectionStatus",
            "status": "connected",
            "sessionId": session.session_id,
            "department": session.department,
        });
        yield Ok(Event::default().event("ConnectionStatus").data(status.to_string()));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(heartbeat) => {
                    debug!(session_id = %session.session_id, "SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = subscription.recv() => {
                    let Some(event) = received else {
                        info!(session_id = %session.session_id, "Push session closed by bus");
                        break;
                    };

                    let message = PushMessage::from(event);
                    match serde_json::to_string(&message) {
                        Ok(data) => {
                            yield Ok(Event::default().event(message.event_type()).data(data));
                        }
                        Err(e) => {
                            warn!(error = %e, "SSE: Failed to serialize workflow event");
                        }
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream))
}

/// Build push channel routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
