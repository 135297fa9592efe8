use std::sync::Arc;

use crate::api::ApiProxy;
use crate::bridge::EventSink;
use crate::config::Settings;
use crate::error::Result;
use crate::http::{ReqwestTransport, Transport};
use crate::stream::EventStreamProxy;
use crate::update::{AppLifecycle, UpdateCoordinator};

/// Version of the running build, compared against the backend's releases.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the privileged side owns for the lifetime of the application.
pub struct AppContext {
    pub settings: Settings,
    pub updates: Arc<UpdateCoordinator>,
    pub streams: EventStreamProxy,
    pub api: ApiProxy,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        lifecycle: Arc<dyn AppLifecycle>,
    ) -> Self {
        let updates = UpdateCoordinator::new(settings.clone(), transport.clone(), sink.clone())
            .with_lifecycle(lifecycle);
        Self {
            streams: EventStreamProxy::new(settings.clone(), transport.clone(), sink),
            api: ApiProxy::new(settings.clone(), transport),
            updates: Arc::new(updates),
            settings,
        }
    }

    /// Context backed by the real HTTP client.
    pub fn connect(
        settings: Settings,
        sink: Arc<dyn EventSink>,
        lifecycle: Arc<dyn AppLifecycle>,
    ) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(settings.request_timeout())?);
        Ok(Self::new(settings, transport, sink, lifecycle))
    }

    /// Closes every stream and abandons any download in flight.
    pub fn shutdown(&self) {
        self.streams.close_all();
        if self.updates.cancel_download() {
            log::info!("Cancelled update download on shutdown");
        }
    }
}
