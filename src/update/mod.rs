pub mod coordinator;
pub mod download;
pub mod install;
pub mod types;
pub mod version;

pub use coordinator::UpdateCoordinator;
pub use install::{AppLifecycle, InstallOutcome, Installer, NoopLifecycle, Platform, SystemInstaller};
pub use types::{DownloadProgress, DownloadSession, UpdateState, VersionDescriptor};
pub use version::is_newer;
