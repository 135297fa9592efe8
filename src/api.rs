use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::http::{Request, Response, Transport};

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Envelope handed back to the UI. Failures are values, never errors.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    pub data: Value,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    fn failure(message: String, status: Option<u16>, data: Option<Value>) -> Self {
        Self {
            success: false,
            data: data.unwrap_or_else(|| json!({ "message": "request failed" })),
            status: status.unwrap_or(500),
            message: Some(message),
        }
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Forwards backend calls from the UI so they are not subject to browser origin rules.
pub struct ApiProxy {
    settings: Settings,
    transport: Arc<dyn Transport>,
}

impl ApiProxy {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn build(&self, call: &ApiRequest) -> Result<Request> {
        let method = Method::from_bytes(call.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("Unsupported method {}", call.method)))?;
        let mut request = Request::get(self.settings.api_url(&call.url))
            .timeout(self.settings.request_timeout());
        request.method = method.clone();

        if let Some(headers) = &call.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }
        match (&call.data, method == Method::GET) {
            (Some(Value::Object(params)), true) => {
                for (key, value) in params {
                    if !value.is_null() {
                        request = request.query(key, query_value(value));
                    }
                }
            }
            (Some(Value::Null) | None, _) | (Some(_), true) => {}
            (Some(body), false) => request.body = Some(body.clone()),
        }
        Ok(request)
    }

    pub async fn request(&self, call: ApiRequest) -> ApiResponse {
        let request = match self.build(&call) {
            Ok(request) => request,
            Err(e) => return ApiResponse::failure(e.to_string(), None, None),
        };
        if self.settings.enable_api_logs {
            log::info!("API proxy {} {} data={:?}", request.method, request.url, call.data);
        }

        match self.transport.execute(request).await {
            Ok(response) => self.respond(response),
            Err(e) => {
                log::error!("API proxy request to {} failed: {e}", call.url);
                ApiResponse::failure(e.to_string(), e.status(), None)
            }
        }
    }

    fn respond(&self, response: Response) -> ApiResponse {
        if self.settings.enable_api_logs {
            log::info!(
                "API proxy response {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            );
        }
        let data = response.json_or_text();
        if response.is_success() {
            return ApiResponse {
                success: true,
                data,
                status: response.status,
                message: None,
            };
        }
        let body = (!response.body.is_empty()).then_some(data);
        ApiResponse::failure(
            format!("Request failed with status code {}", response.status),
            Some(response.status),
            body,
        )
    }
}
