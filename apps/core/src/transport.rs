use serde::{Deserialize, Serialize};

use crate::contract::DetachRequest;
use crate::detach::DetachController;
use crate::view_runtime::ViewRuntime;
use crate::window::{ViewError, WindowId};

const SERIALIZE_FALLBACK: &str =
    r#"{"status":"err","error":{"code":"internal","message":"response not serializable"}}"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidJson,
    UnknownWindow,
    NoSurface,
    Window,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransportResponse {
    Ok,
    Err { error: ErrorResponse },
}

pub fn handle_request(
    controller: &mut DetachController,
    runtime: &mut ViewRuntime,
    window: WindowId,
    request: DetachRequest,
) -> TransportResponse {
    match controller.handle(window, request, runtime) {
        Ok(()) => TransportResponse::Ok,
        Err(error) => TransportResponse::Err {
            error: map_view_error(error),
        },
    }
}

/// Decodes one control-channel message from a detached window and answers it.
pub fn handle_json(
    controller: &mut DetachController,
    runtime: &mut ViewRuntime,
    window: WindowId,
    payload: &str,
) -> String {
    let response = match serde_json::from_str::<DetachRequest>(payload) {
        Ok(request) => handle_request(controller, runtime, window, request),
        Err(error) => TransportResponse::Err {
            error: ErrorResponse {
                code: ErrorCode::InvalidJson,
                message: error.to_string(),
            },
        },
    };

    serde_json::to_string(&response).unwrap_or_else(|_| SERIALIZE_FALLBACK.to_string())
}

fn map_view_error(error: ViewError) -> ErrorResponse {
    let code = match &error {
        ViewError::UnknownWindow(_) => ErrorCode::UnknownWindow,
        ViewError::NoSurface => ErrorCode::NoSurface,
        ViewError::CreateWindow(_) | ViewError::CreateSurface(_) | ViewError::Load { .. } => {
            ErrorCode::Window
        }
    };
    ErrorResponse {
        code,
        message: error.to_string(),
    }
}
