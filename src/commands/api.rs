use tauri::State;

use smsbox::{ApiRequest, ApiResponse, AppContext};

/// Failures come back inside the envelope; the command itself never rejects.
#[tauri::command]
pub async fn api_request(
    context: State<'_, AppContext>,
    request: ApiRequest,
) -> Result<ApiResponse, String> {
    Ok(context.api.request(request).await)
}
