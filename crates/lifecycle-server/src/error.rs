use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lifecycle_core::error::LifecycleError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(LifecycleError::Validation(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Some(e) = self.0.downcast_ref::<LifecycleError>() else {
            tracing::error!("unhandled request error: {:#}", self.0);
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        };

        let status = match e {
            LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
            LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Conflict { .. } | LifecycleError::DuplicateOperation(_) => {
                StatusCode::CONFLICT
            }
            LifecycleError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LifecycleError::Backend(_)
            | LifecycleError::BackendAuth(_)
            | LifecycleError::PoisonItem { .. }
            | LifecycleError::FatalCycle(_)
            | LifecycleError::Store(_)
            | LifecycleError::EventSink(_)
            | LifecycleError::Config(_)
            | LifecycleError::Io(_)
            | LifecycleError::Yaml(_)
            | LifecycleError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {e}");
        }

        let body = match e {
            LifecycleError::Conflict { repos } => {
                serde_json::json!({ "error": e.to_string(), "repos": repos })
            }
            _ => serde_json::json!({ "error": e.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn status_of(e: LifecycleError) -> StatusCode {
        AppError(e.into()).into_response().status()
    }

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(
            status_of(LifecycleError::Validation("selectors".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::bad_request("bad body").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            status_of(LifecycleError::NotFound("no matching workflow found".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conflict_and_duplicate_map_to_409() {
        assert_eq!(
            status_of(LifecycleError::Conflict {
                repos: vec!["a".into(), "b".into()]
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LifecycleError::DuplicateOperation("a/1".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn unavailable_maps_to_503() {
        assert_eq!(
            status_of(LifecycleError::Unavailable("no directory".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn backend_and_store_failures_map_to_500() {
        assert_eq!(
            status_of(LifecycleError::Backend("502".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(LifecycleError::BackendAuth("401".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(LifecycleError::Store("io".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_lifecycle_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError(LifecycleError::NotFound("x".into()).into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
