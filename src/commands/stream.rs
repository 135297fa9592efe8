use serde::{Deserialize, Serialize};
use tauri::State;

use smsbox::{AppContext, ConnectionId};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseOptions {
    pub url: String,
    pub token: String,
    #[serde(default)]
    pub sse_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SseAck {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_id: Option<ConnectionId>,
}

impl SseAck {
    fn ok(message: &str, sse_id: ConnectionId) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            sse_id: Some(sse_id),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            sse_id: None,
        }
    }
}

// Async so the supervisor is spawned on the Tokio runtime.
#[tauri::command]
pub async fn create_sse_connection(
    context: State<'_, AppContext>,
    options: SseOptions,
) -> Result<SseAck, String> {
    if options.url.trim().is_empty() {
        return Ok(SseAck::failed("url is required.".to_string()));
    }
    let requested = options
        .sse_id
        .filter(|id| !id.trim().is_empty())
        .map(ConnectionId::from);
    let id = context
        .streams
        .open_connection(&options.url, &options.token, requested);
    Ok(SseAck::ok("Event stream created", id))
}

#[tauri::command]
pub fn close_sse_connection(context: State<'_, AppContext>, sse_id: String) -> SseAck {
    let id = ConnectionId::from(sse_id);
    if context.streams.close_connection(&id) {
        SseAck::ok("Event stream closed", id)
    } else {
        SseAck::ok("Event stream already closed", id)
    }
}

#[tauri::command]
pub async fn reconnect_sse_connection(
    context: State<'_, AppContext>,
    sse_id: String,
) -> Result<SseAck, String> {
    let id = ConnectionId::from(sse_id);
    Ok(match context.streams.reconnect(&id) {
        Ok(()) => SseAck::ok("Reconnecting event stream", id),
        Err(err) => SseAck::failed(err.to_string()),
    })
}
