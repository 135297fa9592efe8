//! Messages pushed from the host process to the UI.
//!
//! Each [`OutboundMessage`] maps to one named UI event with a JSON payload.
//! Components publish through an [`EventSink`]. The desktop shell forwards
//! them to every window, and tests read them from an mpsc channel.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::stream::ConnectionId;
use crate::update::types::{DownloadProgress, VersionDescriptor};

#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    UpdateChecking,
    UpdateAvailable(VersionDescriptor),
    UpdateNotAvailable,
    UpdateDownloadProgress(DownloadProgress),
    UpdateDownloaded { file_path: String, version: String },
    UpdateCancelled { version: String },
    UpdateManualInstall { file_path: String },
    UpdateError(String),
    SseConnect { sse_id: ConnectionId, message: Value },
    SseMessage { sse_id: ConnectionId, event: String, data: Value },
    SseError { sse_id: ConnectionId, error: String, fatal: bool },
    SseClose { sse_id: ConnectionId },
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::UpdateChecking => "update-checking",
            Self::UpdateAvailable(_) => "update-available",
            Self::UpdateNotAvailable => "update-not-available",
            Self::UpdateDownloadProgress(_) => "update-download-progress",
            Self::UpdateDownloaded { .. } => "update-downloaded",
            Self::UpdateCancelled { .. } => "update-cancelled",
            Self::UpdateManualInstall { .. } => "update-manual-install",
            Self::UpdateError(_) => "update-error",
            Self::SseConnect { .. } => "sse-connect",
            Self::SseMessage { .. } => "sse-message",
            Self::SseError { .. } => "sse-error",
            Self::SseClose { .. } => "sse-close",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::UpdateChecking | Self::UpdateNotAvailable => Value::Null,
            Self::UpdateAvailable(descriptor) => to_value(descriptor),
            Self::UpdateDownloadProgress(progress) => to_value(progress),
            Self::UpdateDownloaded { file_path, version } => {
                json!({ "filePath": file_path, "version": version })
            }
            Self::UpdateCancelled { version } => json!({ "version": version }),
            Self::UpdateManualInstall { file_path } => json!({ "filePath": file_path }),
            Self::UpdateError(message) => Value::String(message.clone()),
            Self::SseConnect { sse_id, message } => json!({ "sseId": sse_id, "message": message }),
            Self::SseMessage {
                sse_id,
                event,
                data,
            } => json!({ "sseId": sse_id, "event": event, "data": data }),
            Self::SseError {
                sse_id,
                error,
                fatal,
            } => json!({ "sseId": sse_id, "error": error, "fatal": fatal }),
            Self::SseClose { sse_id } => json!({ "sseId": sse_id }),
        }
    }

    /// Connection the message belongs to, for stream relays.
    pub fn sse_id(&self) -> Option<&ConnectionId> {
        match self {
            Self::SseConnect { sse_id, .. }
            | Self::SseMessage { sse_id, .. }
            | Self::SseError { sse_id, .. }
            | Self::SseClose { sse_id } => Some(sse_id),
            _ => None,
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Receiver of host→UI messages.
pub trait EventSink: Send + Sync {
    fn emit(&self, message: OutboundMessage);
}

impl EventSink for UnboundedSender<OutboundMessage> {
    fn emit(&self, message: OutboundMessage) {
        if self.send(message).is_err() {
            log::debug!("Dropping host message; UI channel closed");
        }
    }
}
