//! Privileged-side core of the smsbox desktop client.
//!
//! Owns the self-update cycle, the server-push relay for SMS verification
//! codes and the proxied backend requests. Nothing here depends on the
//! windowing toolkit; the desktop shell wires an [`bridge::EventSink`] and an
//! [`update::AppLifecycle`] into an [`AppContext`].

pub mod api;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod stream;
pub mod update;

pub use api::{ApiProxy, ApiRequest, ApiResponse};
pub use bridge::{EventSink, OutboundMessage};
pub use config::Settings;
pub use context::{AppContext, APP_VERSION};
pub use error::{Error, Result};
pub use stream::{ConnectionId, ConnectionState, EventStreamProxy};
pub use update::{UpdateCoordinator, UpdateState, VersionDescriptor};
