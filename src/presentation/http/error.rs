use axum::http::StatusCode;

use crate::domain::documents::error::StoreError;

/// Maps a store failure to the status the data API answers with. Server-side
/// failures are logged here so handlers can just `map_err(status_for)`.
pub fn status_for(err: anyhow::Error) -> StatusCode {
    let status = match err.downcast_ref::<StoreError>() {
        Some(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(StoreError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
        Some(StoreError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
        Some(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Some(StoreError::Backend(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = ?err, %status, "store_request_failed");
    } else {
        tracing::debug!(error = %err, %status, "store_request_rejected");
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_store_errors() {
        assert_eq!(
            status_for(StoreError::not_found("boards/x").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(StoreError::invalid("limit").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(StoreError::PermissionDenied("rules".into()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(StoreError::Unavailable("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn context_does_not_hide_the_kind() {
        let err = anyhow::Error::from(StoreError::not_found("cards/c1")).context("update_doc");
        assert_eq!(status_for(err), StatusCode::NOT_FOUND);
    }
}
