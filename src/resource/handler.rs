use super::guard::{ResourceGuard, ServedFile};
use crate::error::{GuardError, RejectReason, Result};
use crate::identity::JwtVerifier;
use crate::metrics;
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::debug;

pub const CACHE_CONTROL_VALUE: &str = "private, max-age=31536000, immutable";

/// Resource handler state
#[derive(Clone)]
pub struct ResourceState {
    pub guard: Arc<ResourceGuard>,
    pub verifier: Arc<JwtVerifier>,
}

impl ResourceState {
    pub fn new(guard: ResourceGuard, verifier: JwtVerifier) -> Self {
        Self {
            guard: Arc::new(guard),
            verifier: Arc::new(verifier),
        }
    }
}

/// Routes serving `<url_prefix>/*path` through the guard
pub fn resource_routes(state: ResourceState) -> Router {
    let route = format!("{}/*path", state.guard.url_prefix());
    Router::new()
        .route(&route, get(serve_resource))
        .with_state(state)
}

/// GET handler for private files
pub async fn serve_resource(
    State(state): State<ResourceState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response> {
    let caller = match state.verifier.authenticate(&headers) {
        Ok(caller) => Some(caller),
        Err(e) => {
            debug!(error = %e, "Resource request without valid identity");
            None
        }
    };

    // Identity is settled before an undecodable path is reported
    let Path(path) = match path {
        Ok(path) => path,
        Err(rejection) => {
            let err = match caller {
                Some(_) => GuardError::Forbidden(RejectReason::InvalidPath),
                None => GuardError::Unauthenticated,
            };
            debug!(error = %rejection, "Rejected undecodable resource path");
            metrics::record_resource_rejected(metrics::rejection_label(&err));
            return Err(err);
        }
    };

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let file = state.guard.serve(caller.as_ref(), &segments).await?;

    Ok(file_response(file))
}

/// 200 response for a served file
pub fn file_response(file: ServedFile) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file.filename),
            ),
            (header::CACHE_CONTROL, CACHE_CONTROL_VALUE.to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        file.bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_file_response_headers() {
        let response = file_response(ServedFile {
            bytes: Bytes::from_static(b"%PDF-1.4"),
            content_type: "application/pdf",
            filename: "report_card.pdf".to_string(),
        });

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/pdf");
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).unwrap(),
            "inline; filename=\"report_card.pdf\""
        );
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), CACHE_CONTROL_VALUE);
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    }
}
