use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(e) => {
                // The cause stays in the log; clients only see a generic message.
                tracing::error!(error = %format!("{e:#}"), "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

// The `Err` side of `DegradedResult`: the substituted default and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded<T> {
    pub fallback: T,
    pub reason: String,
}

impl<T> Degraded<T> {
    pub fn new(fallback: T, reason: impl Into<String>) -> Self {
        Self {
            fallback,
            reason: reason.into(),
        }
    }
}

pub type DegradedResult<T> = Result<T, Degraded<T>>;

pub trait Settle<T> {
    fn settle(self) -> T;
}

impl<T> Settle<T> for Result<T, Degraded<T>> {
    fn settle(self) -> T {
        match self {
            Ok(v) => v,
            Err(d) => d.fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_prefers_real_value() {
        let ok: DegradedResult<i32> = Ok(7);
        assert_eq!(ok.settle(), 7);

        let degraded: DegradedResult<i32> = Err(Degraded::new(3, "timeout"));
        assert_eq!(degraded.settle(), 3);
    }

    #[test]
    fn test_error_status_codes() {
        let internal = AppError::from(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Conflict("taken".into()).into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
