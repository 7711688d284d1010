use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use sentrydns_domain::config::ConfigError;
use sentrydns_domain::ResolverError;
use serde_json::json;

pub enum ApiError {
    Resolver(ResolverError),
    Config(ConfigError),
}

impl From<ResolverError> for ApiError {
    fn from(err: ResolverError) -> Self {
        Self::Resolver(err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Resolver(err) => {
                let status = match err {
                    ResolverError::MalformedRequest(_)
                    | ResolverError::InvalidDomainName(_)
                    | ResolverError::InvalidUpstreamAddress(_)
                    | ResolverError::InvalidCidr(_) => StatusCode::BAD_REQUEST,
                    ResolverError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Config(err) => {
                let status = match err {
                    ConfigError::Parse(_) | ConfigError::Validation(_) => StatusCode::BAD_REQUEST,
                    ConfigError::FileRead(_, _) | ConfigError::FileWrite(_, _) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
