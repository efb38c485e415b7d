//! Engine errors → HTTP responses.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bpmn_flow_core::{EngineError, ErrorBody, ErrorCategory};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct AppError(pub EngineError);

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err.category() {
        ErrorCategory::Lookup => StatusCode::NOT_FOUND,
        ErrorCategory::Parse | ErrorCategory::Navigation | ErrorCategory::Execution => {
            StatusCode::BAD_REQUEST
        }
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.0.code(), error = %self.0, "internal error");
            ErrorBody {
                code: self.0.code().to_string(),
                message: "Internal server error".to_string(),
                details: serde_json::json!({}),
            }
        } else {
            ErrorBody::from(&self.0)
        };
        (status, Json(ErrorResponse { error: body })).into_response()
    }
}

/// `Json` whose rejections come back in the engine's error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError(EngineError::InvalidRequest {
                message: rejection.body_text(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                EngineError::InstanceNotFound {
                    instance_id: Uuid::nil(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                EngineError::SkippedStep {
                    node_id: "ship".into(),
                    current_node_ids: vec![],
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::StepLimitExceeded { limit: 3 },
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::VersionConflict {
                    instance_id: Uuid::nil(),
                    expected: 1,
                    actual: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Store {
                    message: "disk on fire".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err.code());
        }
    }

    #[test]
    fn test_internal_message_is_generic() {
        let response = AppError(EngineError::Store {
            message: "connection string with password".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
