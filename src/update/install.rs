use serde::Serialize;
use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Silent-install switch understood by the NSIS installer.
const WINDOWS_SILENT_FLAG: &str = "/S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    pub fn installer_extension(&self) -> &'static str {
        match self {
            Self::Windows => "exe",
            Self::MacOs => "dmg",
            Self::Linux => "AppImage",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InstallOutcome {
    /// The new build has been launched; the running process should exit.
    Installed,
    /// The image was opened for the user to finish by hand.
    ManualInstallRequired,
}

/// Hands a downloaded installer to the operating system.
pub trait Installer: Send + Sync {
    fn install(&self, file_path: &Path) -> Result<InstallOutcome>;
}

/// Shuts the host application down once a new build has taken over.
pub trait AppLifecycle: Send + Sync {
    fn request_exit(&self);
}

/// Lifecycle that only logs; used when no shell is attached.
pub struct NoopLifecycle;

impl AppLifecycle for NoopLifecycle {
    fn request_exit(&self) {
        log::info!("Exit requested after update install; no shell attached");
    }
}

pub struct SystemInstaller {
    platform: Platform,
}

impl SystemInstaller {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl Default for SystemInstaller {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

fn spawn(command: &mut Command, what: &str) -> Result<()> {
    command
        .spawn()
        .map(|_| ())
        .map_err(|e| Error::Install(format!("Unable to launch {what}: {e}")))
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::fs(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

impl Installer for SystemInstaller {
    fn install(&self, file_path: &Path) -> Result<InstallOutcome> {
        if !file_path.is_file() {
            return Err(Error::Install(format!(
                "Installer not found at {}",
                file_path.display()
            )));
        }
        match self.platform {
            Platform::Windows => {
                spawn(
                    Command::new(file_path).arg(WINDOWS_SILENT_FLAG),
                    "Windows installer",
                )?;
                Ok(InstallOutcome::Installed)
            }
            Platform::MacOs => {
                spawn(Command::new("open").arg(file_path), "disk image")?;
                Ok(InstallOutcome::ManualInstallRequired)
            }
            Platform::Linux => {
                mark_executable(file_path)?;
                spawn(&mut Command::new(file_path), "AppImage")?;
                Ok(InstallOutcome::Installed)
            }
        }
    }
}
