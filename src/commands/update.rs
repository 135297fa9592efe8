use std::path::PathBuf;
use tauri::State;

use smsbox::update::InstallOutcome;
use smsbox::{AppContext, VersionDescriptor, APP_VERSION};

#[tauri::command]
pub async fn check_for_updates(
    context: State<'_, AppContext>,
) -> Result<Option<VersionDescriptor>, String> {
    Ok(context.updates.check_for_update(APP_VERSION).await)
}

/// Resolves with the installer path once the download completes.
#[tauri::command]
pub async fn start_download_update(
    context: State<'_, AppContext>,
    version_info: VersionDescriptor,
) -> Result<String, String> {
    let session = context
        .updates
        .start_download(version_info)
        .await
        .map_err(|err| err.to_string())?;
    Ok(session.target_path.to_string_lossy().to_string())
}

#[tauri::command]
pub fn cancel_download_update(context: State<'_, AppContext>) -> bool {
    context.updates.cancel_download()
}

#[tauri::command]
pub async fn install_update(
    context: State<'_, AppContext>,
    file_path: String,
) -> Result<InstallOutcome, String> {
    if file_path.trim().is_empty() {
        return Err("filePath is required.".to_string());
    }
    context
        .updates
        .install_update(&PathBuf::from(file_path))
        .await
        .map_err(|err| err.to_string())
}
