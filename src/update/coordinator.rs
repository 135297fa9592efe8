use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bridge::{EventSink, OutboundMessage};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::http::{Request, Transport};

use super::download::{download_installer, installer_path};
use super::install::{AppLifecycle, InstallOutcome, Installer, NoopLifecycle, Platform, SystemInstaller};
use super::types::{DownloadSession, UpdateState, VersionCheckResponse, VersionDescriptor};
use super::version::{compare_versions, is_newer};

const SUCCESS_CODE: i64 = 200;

struct ActiveDownload {
    version: String,
    cancel: CancellationToken,
}

/// Clears the active-download slot when the download future finishes or is dropped.
struct ActiveGuard<'a> {
    slot: &'a Mutex<Option<ActiveDownload>>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

/// Releases the install flag once the install call returns or is dropped.
struct InstallGuard<'a>(&'a AtomicBool);

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives one application's update cycle: check, download, install.
pub struct UpdateCoordinator {
    settings: Settings,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    installer: Arc<dyn Installer>,
    lifecycle: Arc<dyn AppLifecycle>,
    platform: Platform,
    state: Mutex<UpdateState>,
    active: Mutex<Option<ActiveDownload>>,
    installing: AtomicBool,
}

impl UpdateCoordinator {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            settings,
            transport,
            sink,
            installer: Arc::new(SystemInstaller::default()),
            lifecycle: Arc::new(NoopLifecycle),
            platform: Platform::current(),
            state: Mutex::new(UpdateState::Idle),
            active: Mutex::new(None),
            installing: AtomicBool::new(false),
        }
    }

    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn AppLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn state(&self) -> UpdateState {
        lock(&self.state).clone()
    }

    pub fn is_downloading(&self) -> bool {
        lock(&self.active).is_some()
    }

    fn set_state(&self, next: UpdateState) {
        *lock(&self.state) = next;
    }

    /// Applies a check result unless a download or install owns the state.
    fn set_check_state(&self, next: UpdateState) {
        let mut state = lock(&self.state);
        if !state.is_busy() {
            *state = next;
        }
    }

    fn fail(&self, message: String) {
        log::warn!("Update error: {message}");
        self.set_state(UpdateState::Error {
            message: message.clone(),
        });
        self.sink.emit(OutboundMessage::UpdateError(message));
    }

    /// Queries the backend and returns the newest build newer than `current_version`.
    pub async fn fetch_latest(&self, current_version: &str) -> Result<Option<VersionDescriptor>> {
        let request = Request::get(self.settings.api_url("/version/check"))
            .query("version", current_version)
            .timeout(self.settings.request_timeout());
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(Error::HttpStatus {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }
        let envelope: VersionCheckResponse = response.json()?;
        if envelope.code != SUCCESS_CODE {
            return Err(Error::InvalidResponse(envelope.message.unwrap_or_else(|| {
                format!("Version check returned code {}", envelope.code)
            })));
        }
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter(|d| is_newer(&d.version, current_version))
            .max_by(|a, b| compare_versions(&a.version, &b.version)))
    }

    /// Runs one version check and relays its outcome. Never fails; errors become `update-error`.
    pub async fn check_for_update(&self, current_version: &str) -> Option<VersionDescriptor> {
        log::info!("Checking for updates (current version {current_version})");
        self.set_check_state(UpdateState::Checking);
        self.sink.emit(OutboundMessage::UpdateChecking);

        match self.fetch_latest(current_version).await {
            Ok(Some(descriptor)) => {
                log::info!("Update available: {}", descriptor.version);
                self.set_check_state(UpdateState::UpdateAvailable {
                    version: descriptor.version.clone(),
                });
                self.sink
                    .emit(OutboundMessage::UpdateAvailable(descriptor.clone()));
                Some(descriptor)
            }
            Ok(None) => {
                log::info!("No update available");
                self.set_check_state(UpdateState::NoUpdate);
                self.sink.emit(OutboundMessage::UpdateNotAvailable);
                None
            }
            Err(e) => {
                let message = format!("Update check failed: {e}");
                log::warn!("{message}");
                self.set_check_state(UpdateState::Error {
                    message: message.clone(),
                });
                self.sink.emit(OutboundMessage::UpdateError(message));
                None
            }
        }
    }

    /// Downloads the installer for `descriptor`. Only one download may be active at a time.
    pub async fn start_download(&self, descriptor: VersionDescriptor) -> Result<DownloadSession> {
        let cancel = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if self.installing.load(Ordering::SeqCst) {
                log::warn!("Rejecting download of {}; an install is running", descriptor.version);
                self.sink
                    .emit(OutboundMessage::UpdateError(Error::InstallInProgress.to_string()));
                return Err(Error::InstallInProgress);
            }
            if let Some(current) = active.as_ref() {
                log::warn!(
                    "Rejecting download of {}; {} is still downloading",
                    descriptor.version,
                    current.version
                );
                self.sink
                    .emit(OutboundMessage::UpdateError(Error::DownloadInProgress.to_string()));
                return Err(Error::DownloadInProgress);
            }
            *active = Some(ActiveDownload {
                version: descriptor.version.clone(),
                cancel: cancel.clone(),
            });
        }
        let _guard = ActiveGuard { slot: &self.active };

        self.set_state(UpdateState::Downloading {
            version: descriptor.version.clone(),
        });
        let target = installer_path(&self.settings.update_dir(), &descriptor.version, self.platform);
        log::info!(
            "Downloading {} from {} to {}",
            descriptor.version,
            descriptor.download_url,
            target.display()
        );

        let sink = Arc::clone(&self.sink);
        let result = download_installer(
            self.transport.as_ref(),
            &descriptor,
            &target,
            self.settings.download_stall_timeout(),
            &cancel,
            |progress| sink.emit(OutboundMessage::UpdateDownloadProgress(progress)),
        )
        .await;

        match result {
            Ok(session) => {
                log::info!(
                    "Downloaded {} ({} bytes)",
                    session.version,
                    session.downloaded_bytes
                );
                self.set_state(UpdateState::Downloaded {
                    version: session.version.clone(),
                    file_path: session.target_path.clone(),
                });
                self.sink.emit(OutboundMessage::UpdateDownloaded {
                    file_path: session.target_path.to_string_lossy().to_string(),
                    version: session.version.clone(),
                });
                Ok(session)
            }
            Err(Error::Cancelled) => {
                log::info!("Download of {} cancelled", descriptor.version);
                self.set_state(UpdateState::Idle);
                self.sink.emit(OutboundMessage::UpdateCancelled {
                    version: descriptor.version.clone(),
                });
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.fail(format!("Download failed: {e}"));
                Err(e)
            }
        }
    }

    /// Cancels the in-flight download, if any. Returns whether one was running.
    pub fn cancel_download(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Launches the downloaded installer and, when the new build took over, asks the shell to exit.
    ///
    /// Refused while a download or another install is running. The second case covers the
    /// exit delay, so a repeated request cannot launch the installer twice.
    pub async fn install_update(&self, file_path: &Path) -> Result<InstallOutcome> {
        if self.installing.swap(true, Ordering::SeqCst) {
            log::warn!("Ignoring install of {}; an install is running", file_path.display());
            self.sink
                .emit(OutboundMessage::UpdateError(Error::InstallInProgress.to_string()));
            return Err(Error::InstallInProgress);
        }
        let _guard = InstallGuard(&self.installing);
        if self.is_downloading() {
            self.sink
                .emit(OutboundMessage::UpdateError(Error::DownloadInProgress.to_string()));
            return Err(Error::DownloadInProgress);
        }
        log::info!("Installing update from {}", file_path.display());
        self.set_state(UpdateState::Installing {
            file_path: file_path.to_path_buf(),
        });

        match self.installer.install(file_path) {
            Ok(InstallOutcome::Installed) => {
                self.set_state(UpdateState::Installed);
                tokio::time::sleep(self.settings.install_exit_delay()).await;
                self.lifecycle.request_exit();
                Ok(InstallOutcome::Installed)
            }
            Ok(InstallOutcome::ManualInstallRequired) => {
                self.set_state(UpdateState::ManualInstallRequired {
                    file_path: file_path.to_path_buf(),
                });
                self.sink.emit(OutboundMessage::UpdateManualInstall {
                    file_path: file_path.to_string_lossy().to_string(),
                });
                Ok(InstallOutcome::ManualInstallRequired)
            }
            Err(e) => {
                self.fail(format!("Install failed: {e}"));
                Err(e)
            }
        }
    }

    /// Checks once after the initial delay and then on every interval, forever.
    ///
    /// Manual checks run beside this loop and do not reset its timer.
    pub async fn run_periodic_checks(&self, current_version: &str) {
        let start = Instant::now() + self.settings.initial_check_delay();
        let mut ticker = interval_at(start, self.settings.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.check_for_update(current_version).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{finite_body, open_body, ScriptedTransport};
    use bytes::Bytes;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    const MB: usize = 1024 * 1024;

    struct Harness {
        coordinator: Arc<UpdateCoordinator>,
        transport: Arc<ScriptedTransport>,
        rx: UnboundedReceiver<OutboundMessage>,
        dir: PathBuf,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn harness_with(configure: impl FnOnce(UpdateCoordinator) -> UpdateCoordinator) -> Harness {
        let dir = std::env::temp_dir().join(format!("smsbox-update-{}", uuid::Uuid::new_v4()));
        let mut settings = Settings::default();
        settings.api_base_url = "http://backend/api".to_string();
        settings.update_dir = Some(dir.clone());
        let transport = Arc::new(ScriptedTransport::default());
        let (tx, rx) = unbounded_channel();
        let coordinator = UpdateCoordinator::new(settings, transport.clone(), Arc::new(tx))
            .with_platform(Platform::Linux);
        Harness {
            coordinator: Arc::new(configure(coordinator)),
            transport,
            rx,
            dir,
        }
    }

    fn harness() -> Harness {
        harness_with(|c| c)
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn descriptor(version: &str) -> VersionDescriptor {
        VersionDescriptor {
            version: version.to_string(),
            download_url: format!("http://cdn/app-{version}"),
            release_notes: "notes".to_string(),
        }
    }

    #[tokio::test]
    async fn newer_version_is_relayed_and_downloaded_in_chunks() {
        let mut h = harness();
        h.transport.push_json(
            200,
            json!({
                "code": 200,
                "data": [{ "version": "1.4.0", "downloadUrl": "http://cdn/app-1.4.0", "releaseNotes": "notes" }]
            }),
        );

        let found = h.coordinator.check_for_update("1.3.2").await.expect("update");
        assert_eq!(found, descriptor("1.4.0"));
        {
            let requests = h.transport.requests.lock().unwrap();
            assert_eq!(requests[0].url, "http://backend/api/version/check");
            assert_eq!(requests[0].query, vec![("version".to_string(), "1.3.2".to_string())]);
        }
        assert_eq!(
            drain(&mut h.rx),
            vec![
                OutboundMessage::UpdateChecking,
                OutboundMessage::UpdateAvailable(descriptor("1.4.0")),
            ]
        );

        let chunks = (0..10).map(|_| Bytes::from(vec![7u8; MB])).collect();
        h.transport
            .push_stream(Ok(finite_body(chunks, Some(10 * MB as u64))));
        let session = h.coordinator.start_download(found).await.expect("download");
        assert_eq!(session.target_path, h.dir.join("update-1.4.0.AppImage"));

        let messages = drain(&mut h.rx);
        assert_eq!(messages.len(), 11);
        let downloaded: Vec<u64> = messages[..10]
            .iter()
            .map(|m| match m {
                OutboundMessage::UpdateDownloadProgress(p) => p.downloaded_bytes,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let expected: Vec<u64> = (1..=10).map(|i| (i * MB) as u64).collect();
        assert_eq!(downloaded, expected);
        assert_eq!(
            messages[10],
            OutboundMessage::UpdateDownloaded {
                file_path: h.dir.join("update-1.4.0.AppImage").to_string_lossy().to_string(),
                version: "1.4.0".to_string(),
            }
        );
        assert_eq!(
            std::fs::metadata(&session.target_path).expect("meta").len(),
            10 * MB as u64
        );
        assert!(matches!(h.coordinator.state(), UpdateState::Downloaded { .. }));
        assert!(!h.coordinator.is_downloading());
    }

    #[tokio::test]
    async fn picks_newest_of_several_candidates() {
        let h = harness();
        h.transport.push_json(
            200,
            json!({
                "code": 200,
                "data": [
                    { "version": "1.3.0", "downloadUrl": "a" },
                    { "version": "1.5", "downloadUrl": "b" },
                    { "version": "1.4.9", "downloadUrl": "c" }
                ]
            }),
        );
        let found = h.coordinator.check_for_update("1.3.2").await.expect("update");
        assert_eq!(found.version, "1.5");
        assert_eq!(found.download_url, "b");
    }

    #[tokio::test]
    async fn same_or_empty_result_reports_not_available() {
        let mut h = harness();
        h.transport
            .push_json(200, json!({ "code": 200, "data": [{ "version": "1.3.2.0", "downloadUrl": "x" }] }));
        h.transport.push_json(200, json!({ "code": 200, "data": [] }));

        assert!(h.coordinator.check_for_update("1.3.2").await.is_none());
        assert!(h.coordinator.check_for_update("1.3.2").await.is_none());
        assert_eq!(
            drain(&mut h.rx),
            vec![
                OutboundMessage::UpdateChecking,
                OutboundMessage::UpdateNotAvailable,
                OutboundMessage::UpdateChecking,
                OutboundMessage::UpdateNotAvailable,
            ]
        );
        assert_eq!(h.coordinator.state(), UpdateState::NoUpdate);
    }

    #[tokio::test]
    async fn failed_check_is_relayed_not_raised() {
        let mut h = harness();
        h.transport
            .push_json(200, json!({ "code": 500, "message": "version service down" }));

        assert!(h.coordinator.check_for_update("1.0.0").await.is_none());
        // The queue is now empty, so the next check sees a refused connection.
        assert!(h.coordinator.check_for_update("1.0.0").await.is_none());

        let errors: Vec<String> = drain(&mut h.rx)
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::UpdateError(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("version service down"));
        assert!(errors[1].contains("connection refused"));
        assert!(matches!(h.coordinator.state(), UpdateState::Error { .. }));
    }

    #[tokio::test]
    async fn second_download_is_rejected_and_first_can_be_cancelled() {
        let mut h = harness();
        h.transport.push_stream(Ok(open_body(vec!["partial"])));

        let first = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { coordinator.start_download(descriptor("2.0.0")).await })
        };
        loop {
            match h.rx.recv().await.expect("message") {
                OutboundMessage::UpdateDownloadProgress(p) => {
                    assert_eq!(p.downloaded_bytes, 7);
                    assert_eq!(p.percent, None);
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        let err = h
            .coordinator
            .start_download(descriptor("2.0.1"))
            .await
            .expect_err("should reject");
        assert!(matches!(err, Error::DownloadInProgress));
        assert!(matches!(h.rx.recv().await, Some(OutboundMessage::UpdateError(_))));

        assert!(h.coordinator.cancel_download());
        let result = first.await.expect("join");
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(
            h.rx.recv().await,
            Some(OutboundMessage::UpdateCancelled {
                version: "2.0.0".to_string()
            })
        );
        assert!(!h.dir.join("update-2.0.0.AppImage").exists());
        assert_eq!(h.coordinator.state(), UpdateState::Idle);
        assert!(!h.coordinator.cancel_download());
    }

    #[tokio::test]
    async fn check_during_download_relays_without_touching_state() {
        let mut h = harness();
        h.transport.push_stream(Ok(open_body(vec!["partial"])));
        let download = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { coordinator.start_download(descriptor("2.0.0")).await })
        };
        assert!(matches!(
            h.rx.recv().await,
            Some(OutboundMessage::UpdateDownloadProgress(_))
        ));

        h.transport.push_json(
            200,
            json!({ "code": 200, "data": [{ "version": "2.1.0", "downloadUrl": "x" }] }),
        );
        let found = h.coordinator.check_for_update("1.0.0").await;
        assert_eq!(found.map(|d| d.version), Some("2.1.0".to_string()));
        h.transport.push_json(200, json!({ "code": 200, "data": [] }));
        assert!(h.coordinator.check_for_update("1.0.0").await.is_none());

        assert_eq!(
            drain(&mut h.rx),
            vec![
                OutboundMessage::UpdateChecking,
                OutboundMessage::UpdateAvailable(VersionDescriptor {
                    version: "2.1.0".to_string(),
                    download_url: "x".to_string(),
                    release_notes: String::new(),
                }),
                OutboundMessage::UpdateChecking,
                OutboundMessage::UpdateNotAvailable,
            ]
        );
        assert_eq!(
            h.coordinator.state(),
            UpdateState::Downloading {
                version: "2.0.0".to_string()
            }
        );

        h.coordinator.cancel_download();
        assert!(matches!(download.await.expect("join"), Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_download_releases_the_session() {
        let mut h = harness();
        h.transport.push_stream(Ok(open_body(vec!["partial"])));

        let err = h
            .coordinator
            .start_download(descriptor("2.0.0"))
            .await
            .expect_err("should stall");

        assert!(matches!(err, Error::Network(_)));
        assert!(!h.coordinator.is_downloading());
        assert!(matches!(h.coordinator.state(), UpdateState::Error { .. }));
        assert!(matches!(drain(&mut h.rx).last(), Some(OutboundMessage::UpdateError(_))));
        assert!(!h.dir.join("update-2.0.0.AppImage").exists());
    }

    #[tokio::test]
    async fn failed_download_moves_to_error() {
        let mut h = harness();
        h.transport.push_stream(Err(Error::HttpStatus {
            status: 503,
            body: String::new(),
        }));
        let err = h
            .coordinator
            .start_download(descriptor("3.0"))
            .await
            .expect_err("should fail");
        assert_eq!(err.status(), Some(503));
        assert!(matches!(drain(&mut h.rx).last(), Some(OutboundMessage::UpdateError(_))));
        assert!(matches!(h.coordinator.state(), UpdateState::Error { .. }));
        assert!(!h.coordinator.is_downloading());
    }

    struct FixedInstaller(Option<InstallOutcome>);

    impl Installer for FixedInstaller {
        fn install(&self, _file_path: &Path) -> Result<InstallOutcome> {
            self.0
                .ok_or_else(|| Error::Install("spawn failed".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingInstaller(AtomicUsize);

    impl Installer for CountingInstaller {
        fn install(&self, _file_path: &Path) -> Result<InstallOutcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(InstallOutcome::Installed)
        }
    }

    #[derive(Default)]
    struct RecordingLifecycle(AtomicBool);

    impl AppLifecycle for RecordingLifecycle {
        fn request_exit(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn installed_update_requests_exit_after_delay() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let h = {
            let lifecycle = lifecycle.clone();
            harness_with(move |c| {
                c.with_installer(Arc::new(FixedInstaller(Some(InstallOutcome::Installed))))
                    .with_lifecycle(lifecycle)
            })
        };
        let started = Instant::now();
        let outcome = h
            .coordinator
            .install_update(Path::new("/tmp/update-1.0.AppImage"))
            .await
            .expect("install");
        assert_eq!(outcome, InstallOutcome::Installed);
        assert!(lifecycle.0.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert_eq!(h.coordinator.state(), UpdateState::Installed);
    }

    #[tokio::test(start_paused = true)]
    async fn install_cannot_overlap_itself_or_a_download() {
        let installer = Arc::new(CountingInstaller::default());
        let mut h = {
            let installer = installer.clone();
            harness_with(move |c| c.with_installer(installer))
        };
        let first = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move {
                coordinator
                    .install_update(Path::new("/tmp/update-1.0.exe"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = h
            .coordinator
            .install_update(Path::new("/tmp/update-1.0.exe"))
            .await
            .expect_err("should refuse");
        assert!(matches!(err, Error::InstallInProgress));
        let err = h
            .coordinator
            .start_download(descriptor("1.1"))
            .await
            .expect_err("should refuse");
        assert!(matches!(err, Error::InstallInProgress));
        assert_eq!(h.transport.request_count(), 0);

        let outcome = first.await.expect("join").expect("install");
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(installer.0.load(Ordering::SeqCst), 1);
        let errors = drain(&mut h.rx)
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::UpdateError(_)))
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test]
    async fn disk_image_needs_manual_install() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let mut h = {
            let lifecycle = lifecycle.clone();
            harness_with(move |c| {
                c.with_installer(Arc::new(FixedInstaller(Some(
                    InstallOutcome::ManualInstallRequired,
                ))))
                .with_lifecycle(lifecycle)
            })
        };
        let outcome = h
            .coordinator
            .install_update(Path::new("/tmp/update-1.0.dmg"))
            .await
            .expect("install");
        assert_eq!(outcome, InstallOutcome::ManualInstallRequired);
        assert!(!lifecycle.0.load(Ordering::SeqCst));
        assert_eq!(
            drain(&mut h.rx),
            vec![OutboundMessage::UpdateManualInstall {
                file_path: "/tmp/update-1.0.dmg".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn installer_failure_is_relayed() {
        let mut h = harness_with(|c| c.with_installer(Arc::new(FixedInstaller(None))));
        let err = h
            .coordinator
            .install_update(Path::new("/tmp/update.exe"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::Install(_)));
        match drain(&mut h.rx).as_slice() {
            [OutboundMessage::UpdateError(message)] => assert!(message.contains("spawn failed")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_checks_wait_for_initial_delay_then_repeat() {
        let h = harness();
        let task = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { coordinator.run_periodic_checks("1.0.0").await })
        };

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.transport.request_count(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.transport.request_count(), 1);

        // An out-of-band check does not move the schedule.
        h.coordinator.check_for_update("1.0.0").await;
        assert_eq!(h.transport.request_count(), 2);
        tokio::time::sleep(Duration::from_secs(60 * 60 - 2)).await;
        assert_eq!(h.transport.request_count(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.transport.request_count(), 3);

        task.abort();
    }
}
