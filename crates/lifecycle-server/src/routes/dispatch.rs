use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use lifecycle_core::operation::OperationRequest;

use crate::error::AppError;
use crate::state::AppState;

/// POST /tenants/{tenant_id}/subscriptions/{subscription_id}/{action_type}
///
/// Body: `{ "operationId"?, "context"?, "selectors": [..] }`. Answers 202 with
/// the operation id once the workflow has been triggered; the outcome is
/// only ever reported through lifecycle events.
pub async fn dispatch_operation(
    State(app): State<AppState>,
    Path((tenant_id, subscription_id, action_type)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let request: OperationRequest = if body.is_empty() {
        OperationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("malformed request body: {e}")))?
    };

    let accepted = app
        .dispatcher
        .dispatch(&tenant_id, &subscription_id, &action_type, &request)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "operationId": accepted.operation_id })),
    ))
}
