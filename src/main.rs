#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod commands;

use std::sync::Arc;
use tauri::{AppHandle, Manager, RunEvent};

use smsbox::update::AppLifecycle;
use smsbox::{AppContext, EventSink, OutboundMessage, APP_VERSION};

/// Broadcasts host messages to every window.
struct WindowSink {
  app: AppHandle
}

impl EventSink for WindowSink {
  fn emit(&self, message: OutboundMessage) {
    if let Err(err) = self.app.emit_all(message.event_name(), message.payload()) {
      log::warn!("Unable to deliver {}: {err}", message.event_name());
    }
  }
}

struct ShellLifecycle {
  app: AppHandle
}

impl AppLifecycle for ShellLifecycle {
  fn request_exit(&self) {
    log::info!("Exiting so the installer can replace this build");
    self.app.exit(0);
  }
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let settings = smsbox::config::load_settings();
  log::info!("smsbox {APP_VERSION} using backend {}", settings.api_base_url);

  tauri::Builder::default()
    .setup(move |app| {
      let handle = app.handle();
      let context = AppContext::connect(
        settings,
        Arc::new(WindowSink { app: handle.clone() }),
        Arc::new(ShellLifecycle { app: handle })
      )?;
      let updates = Arc::clone(&context.updates);
      app.manage(context);
      tauri::async_runtime::spawn(async move {
        updates.run_periodic_checks(APP_VERSION).await;
      });
      Ok(())
    })
    .invoke_handler(tauri::generate_handler![
      commands::update::check_for_updates,
      commands::update::start_download_update,
      commands::update::cancel_download_update,
      commands::update::install_update,
      commands::stream::create_sse_connection,
      commands::stream::close_sse_connection,
      commands::stream::reconnect_sse_connection,
      commands::api::api_request
    ])
    .build(tauri::generate_context!())
    .expect("error while building tauri application")
    .run(|app, event| {
      if let RunEvent::Exit = event {
        if let Some(context) = app.try_state::<AppContext>() {
          context.shutdown();
        }
      }
    });
}
