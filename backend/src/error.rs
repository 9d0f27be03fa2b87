use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::inference::InferenceError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Request-level failure taxonomy. Degraded dependencies (missing model
/// weights, vision outage) never surface here; they resolve to fallback
/// behavior inside the pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("internal error during analysis: {0}")]
    Internal(String),
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Persistence(_) | AnalysisError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

impl From<InferenceError> for AnalysisError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Preprocessing(e) => AnalysisError::InvalidInput(e.to_string()),
            InferenceError::Model(e) => AnalysisError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::PreprocessError;

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let err = AnalysisError::InvalidInput("not an image".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn persistence_and_internal_map_to_server_error() {
        assert_eq!(
            AnalysisError::Persistence("disk full".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AnalysisError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn preprocess_failures_become_client_errors() {
        let err: AnalysisError = InferenceError::Preprocessing(PreprocessError::UnsupportedFormat).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
