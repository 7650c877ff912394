use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relayprobe_node_api::ControlError;
use relayprobe_rpc_core::api::ErrorResponse;

/// A [`ControlError`] rendered as an HTTP error.
pub(crate) struct ApiError(pub(crate) ControlError);

impl From<ControlError> for ApiError {
    fn from(error: ControlError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Stopped | ControlError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::Connect { .. } | ControlError::NoRoute(_) | ControlError::Transfer(_) => {
                StatusCode::BAD_GATEWAY
            }
            ControlError::Protocol(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}
