use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::IdentityError;
use crate::repo::RepoError;

/// Production posture hides `details` from clients.
static EXPOSE_DETAILS: Lazy<bool> = Lazy::new(|| {
    !std::env::var("APP_ENV").map(|v| v.eq_ignore_ascii_case("production")).unwrap_or(false)
});

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub message: String,
    pub code: String,
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid query")] BadQuery(Value),
    #[error("Invalid params")] BadParams(Value),
    #[error("Invalid body")] BadBody(Value),
    #[error("Missing Authorization Bearer token")] NoToken,
    #[error("Empty token")] EmptyToken,
    #[error("Invalid or expired JWT")] InvalidJwt(Option<Value>),
    #[error("Not authorized (admin only)")] NotAdmin,
    #[error("Post not found")] PostNotFound,
    #[error("Tag not found")] TagNotFound,
    #[error("Cannot delete a tag that is in use by posts")] TagInUse,
    #[error("Route not found")] NotFound,
    #[error("Too many requests")] RateLimited,
    #[error("Internal server error")] Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadQuery(_) => "BAD_QUERY",
            ApiError::BadParams(_) => "BAD_PARAMS",
            ApiError::BadBody(_) => "BAD_BODY",
            ApiError::NoToken => "NO_TOKEN",
            ApiError::EmptyToken => "EMPTY_TOKEN",
            ApiError::InvalidJwt(_) => "INVALID_JWT",
            ApiError::NotAdmin => "NOT_ADMIN",
            ApiError::PostNotFound => "POST_NOT_FOUND",
            ApiError::TagNotFound => "TAG_NOT_FOUND",
            ApiError::TagInUse => "TAG_IN_USE",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::BadQuery(d) | ApiError::BadParams(d) | ApiError::BadBody(d) => Some(d.clone()),
            ApiError::InvalidJwt(d) => d.clone(),
            ApiError::Internal(msg) => Some(Value::String(msg.clone())),
            _ => None,
        }
    }

    pub fn body(&self) -> ApiErrorBody {
        ApiErrorBody {
            error: ApiErrorDetail {
                message: self.to_string(),
                code: self.code().to_string(),
                details: if *EXPOSE_DETAILS { self.details() } else { None },
            },
        }
    }

    /// Wrap `validator` failures (or any serialisable detail) as a 400.
    pub fn bad_query(details: impl Serialize) -> Self {
        ApiError::BadQuery(serde_json::to_value(details).unwrap_or(Value::Null))
    }
    pub fn bad_params(details: impl Serialize) -> Self {
        ApiError::BadParams(serde_json::to_value(details).unwrap_or(Value::Null))
    }
    pub fn bad_body(details: impl Serialize) -> Self {
        ApiError::BadBody(serde_json::to_value(details).unwrap_or(Value::Null))
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::PostNotFound,
            RepoError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        ApiError::InvalidJwt(Some(Value::String(e.to_string())))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadQuery(_) | ApiError::BadParams(_) | ApiError::BadBody(_) => StatusCode::BAD_REQUEST,
            ApiError::NoToken | ApiError::EmptyToken | ApiError::InvalidJwt(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotAdmin => StatusCode::FORBIDDEN,
            ApiError::PostNotFound | ApiError::TagNotFound | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::TagInUse => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(msg) = self {
            log::error!("internal error: {msg}");
        }
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_are_stable() {
        let cases = [
            (ApiError::NoToken, 401, "NO_TOKEN"),
            (ApiError::EmptyToken, 401, "EMPTY_TOKEN"),
            (ApiError::InvalidJwt(None), 401, "INVALID_JWT"),
            (ApiError::NotAdmin, 403, "NOT_ADMIN"),
            (ApiError::PostNotFound, 404, "POST_NOT_FOUND"),
            (ApiError::TagInUse, 409, "TAG_IN_USE"),
            (ApiError::NotFound, 404, "NOT_FOUND"),
            (ApiError::Internal("boom".into()), 500, "INTERNAL_SERVER_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn store_errors_keep_their_message_in_details() {
        let err: ApiError = RepoError::Store("relation \"posts\" does not exist".into()).into();
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["error"]["code"], "INTERNAL_SERVER_ERROR");
        assert_eq!(body["error"]["details"], "relation \"posts\" does not exist");
    }
}
