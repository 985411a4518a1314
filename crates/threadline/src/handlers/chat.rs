//! Widget-facing chat handlers.
//!
//! Every error leaves through the `{success:false, error}` envelope; the
//! widget client keys retry behavior off the status code alone.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::api::{
    CreateSessionRequest, CreateSessionResponse, ErrorResponse, GetMessagesQuery,
    GetMessagesResponse, SendMessageRequest, SendMessageResponse, ServerInfoResponse,
};
use crate::server::AppState;
use crate::session::ChatError;

// ============================================================================
// Handlers
// ============================================================================

/// POST /session
pub async fn create_session(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_body::<CreateSessionRequest>(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.chat.create_session(request.metadata).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(CreateSessionResponse {
                success: true,
                session_id: session.session_id,
                thread_id: session.thread_id,
                created_at: session.created_at,
            }),
        )
            .into_response(),
        Err(err) => chat_error(&err, "failed to create session"),
    }
}

/// POST /messages
pub async fn send_message(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_body::<SendMessageRequest>(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let session_id = request.session_id.as_deref().filter(|s| !s.is_empty());
    let content = request.content.as_deref().filter(|c| !c.is_empty());
    let (Some(session_id), Some(content)) = (session_id, content) else {
        return error_response(StatusCode::BAD_REQUEST, "sessionId and content are required");
    };

    match state.chat.send_customer_message(session_id, content).await {
        Ok(message) => Json(SendMessageResponse {
            success: true,
            message_id: message.id,
        })
        .into_response(),
        Err(err) => chat_error(&err, "failed to send message"),
    }
}

/// GET /messages?sessionId=&after=
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<GetMessagesQuery>,
) -> Response {
    let Some(session_id) = query.session_id.as_deref().filter(|s| !s.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "sessionId is required");
    };

    if !state.chat.has_session(session_id).await {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("session not found: {session_id}"),
        );
    }

    let after = query.after.as_deref().filter(|a| !a.is_empty());
    let messages = state.chat.get_messages(session_id, after).await;
    Json(GetMessagesResponse {
        success: true,
        messages,
    })
    .into_response()
}

/// GET /config
///
/// The widget's boot handshake. Every failure here reads as "try again
/// shortly" to the client, hence the blanket 503.
pub async fn server_info(State(state): State<AppState>) -> Response {
    match state.chat.server_info().await {
        Ok(info) => Json(ServerInfoResponse {
            success: true,
            server_name: info.server_name,
            server_icon: info.server_icon,
            channel_name: info.channel_name,
        })
        .into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Decode an optional JSON body; an empty body means all defaults.
fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("invalid request body: {err}"),
        )
    })
}

fn chat_error(err: &ChatError, context: &str) -> Response {
    let status = match err {
        ChatError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::GatewayUnavailable(_) => {
            error!(error = %err, "{}", context);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.to_string())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}
