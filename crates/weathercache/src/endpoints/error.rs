use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};
use weathercache_service::caching::FetchError;

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl From<FetchError> for ResponseError {
    fn from(err: FetchError) -> Self {
        let status = match err {
            FetchError::Producer(_) => StatusCode::BAD_GATEWAY,
            FetchError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        let err = match err {
            // keep the producer's own chain instead of wrapping it once more
            FetchError::Producer(err) => err,
            err => err.into(),
        };

        Self { status, err }
    }
}

impl From<(StatusCode, anyhow::Error)> for ResponseError {
    fn from((status, err): (StatusCode, anyhow::Error)) -> Self {
        Self { status, err }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            capture_anyhow(&self.err);
        }
        let mut response = Json(ApiErrorResponse::from(self.err)).into_response();
        *response.status_mut() = self.status;
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ApiErrorResponse {
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<String>>,
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        let mut chain = err.chain().map(|err| err.to_string());
        let detail = chain.next();
        let causes: Vec<_> = chain.collect();
        let causes = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };

        ApiErrorResponse { detail, causes }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use weathercache_service::caching::StoreError;

    use super::*;

    #[test]
    fn test_fetch_error_status() {
        let err = ResponseError::from(FetchError::Producer(anyhow::anyhow!("boom")));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.err.to_string(), "boom");

        let err = ResponseError::from(FetchError::Timeout(Duration::from_secs(10)));
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);

        let err = ResponseError::from(FetchError::Store(StoreError::Timeout(
            Duration::from_secs(1),
        )));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to store the refilled entry");
        let response = ApiErrorResponse::from(err);

        assert_eq!(response.detail.as_deref(), Some("failed to store the refilled entry"));
        assert_eq!(response.causes, Some(vec!["connection refused".to_owned()]));

        let response = ApiErrorResponse::from(anyhow::anyhow!("city not found"));
        assert_eq!(response.causes, None);
    }
}
