use std::collections::BTreeMap;
use std::convert::Infallible;

use serde_json::{json, Value};
use thiserror::Error;
use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    reply::{self, Reply, Response},
};

/// Error returned by every action and handler. Carries the HTTP status and
/// the JSON body that is sent back to the client.
#[derive(Debug, Error)]
#[error("{code}: {body}")]
pub struct Error {
    pub code: StatusCode,
    pub body: Value,
}

impl Error {
    pub fn new(code: StatusCode, body: Value) -> Self {
        Self { code, body }
    }

    pub fn into_response(self) -> Response {
        reply::with_status(reply::json(&self.body), self.code).into_response()
    }
}

impl reject::Reject for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlError {
    InvalidRequest,
    InvalidSession,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl HtmlError {
    pub fn code(&self) -> StatusCode {
        match self {
            HtmlError::InvalidRequest => StatusCode::BAD_REQUEST,
            HtmlError::InvalidSession => StatusCode::UNAUTHORIZED,
            HtmlError::Unauthorized => StatusCode::UNAUTHORIZED,
            HtmlError::Forbidden => StatusCode::FORBIDDEN,
            HtmlError::NotFound => StatusCode::NOT_FOUND,
            HtmlError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn new(self, info: &str) -> Error {
        let body = match self {
            HtmlError::InvalidRequest => json!({ "errors": info }),
            _ => json!({ "detail": info }),
        };

        Error::new(self.code(), body)
    }

    pub fn default(self) -> Error {
        match self {
            HtmlError::InvalidRequest => self.new("Invalid request"),
            HtmlError::InvalidSession => self.new("Invalid token."),
            HtmlError::Unauthorized => self.new("Authentication credentials were not provided."),
            HtmlError::Forbidden => {
                self.new("You do not have permission to perform this action.")
            }
            HtmlError::NotFound => self.new("Not found."),
            HtmlError::InternalServerError => self.new("Internal server error"),
        }
    }
}

/// Field scoped validation failures, rendered as `{"field": ["message", ..]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    #[cfg(test)]
    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            return Ok(());
        }
        Err(self)
    }
}

impl From<ValidationErrors> for Error {
    fn from(value: ValidationErrors) -> Self {
        Error::new(StatusCode::BAD_REQUEST, json!(value.fields))
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("referenced row does not exist: {0}")]
    MissingReference(String),
    #[error("check constraint violated: {0}")]
    Check(String),
    #[error("database error: {0}")]
    Other(String),
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self::Other(info)
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) if e.is_unique_violation() => {
                Self::Conflict(e.constraint().unwrap_or_default().to_owned())
            }
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => {
                Self::MissingReference(e.constraint().unwrap_or_default().to_owned())
            }
            sqlx::Error::Database(e) if e.is_check_violation() => {
                Self::Check(e.constraint().unwrap_or_default().to_owned())
            }
            sqlx::Error::RowNotFound => Self::new("RowNotFound".to_owned()),
            sqlx::Error::PoolTimedOut => Self::new("Pool timed out".to_owned()),
            sqlx::Error::PoolClosed => Self::new("Pool closed".to_owned()),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::Conflict(_) => HtmlError::InvalidRequest.new("Already exists"),
            QueryError::MissingReference(_) => {
                HtmlError::InvalidRequest.new("Referenced object does not exist")
            }
            QueryError::Check(_) => HtmlError::InvalidRequest.new("Constraint violated"),
            QueryError::Other(info) => {
                log::error!("Query failed: {info}");
                HtmlError::InternalServerError.default()
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

#[derive(Debug, Error)]
#[error("cache error: {info}")]
pub struct CacheError {
    info: String,
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        log::error!("{value}");
        HtmlError::InternalServerError.default()
    }
}

#[derive(Debug, Error)]
#[error("({info})")]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }

    pub fn info(&self) -> &str {
        &self.info
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&value.info)
    }
}

impl From<TypeError> for Rejection {
    fn from(value: TypeError) -> Self {
        Error::from(value).into()
    }
}

/// Turns every rejection that reaches the top of the filter tree into a JSON
/// response.
pub async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if let Some(error) = rejection.find::<Error>() {
        let error = Error::new(error.code, error.body.clone());
        return Ok(error.into_response());
    }

    let error = if rejection.is_not_found() {
        HtmlError::NotFound.default()
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        HtmlError::InvalidRequest.new(&e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        HtmlError::InvalidRequest.new(&e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        Error::new(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "detail": "Method not allowed." }),
        )
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        Error::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({ "detail": "Payload too large." }),
        )
    } else if rejection
        .find::<warp::reject::UnsupportedMediaType>()
        .is_some()
    {
        Error::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            json!({ "detail": "Unsupported media type." }),
        )
    } else {
        log::error!("Unhandled rejection: {rejection:?}");
        HtmlError::InternalServerError.default()
    };

    Ok(error.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_render_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("tags", "At least one tag is required.");
        errors.add("tags", "Tags must be unique.");
        errors.add("cooking_time", "Must be at least 1.");

        let error: Error = errors.into();
        assert_eq!(error.code, StatusCode::BAD_REQUEST);
        assert_eq!(
            error.body,
            json!({
                "cooking_time": ["Must be at least 1."],
                "tags": ["At least one tag is required.", "Tags must be unique."],
            })
        );
    }

    #[test]
    fn empty_validation_errors_pass() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn conflicts_are_client_errors() {
        let error: Error = QueryError::Conflict("unique_favorite".to_owned()).into();
        assert_eq!(error.code, StatusCode::BAD_REQUEST);

        let error: Error = QueryError::new("connection reset".to_owned()).into();
        assert_eq!(error.code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.body, json!({ "detail": "Internal server error" }));
    }

    #[test]
    fn invalid_request_uses_errors_key() {
        let error = HtmlError::InvalidRequest.new("Already exists");
        assert_eq!(error.body, json!({ "errors": "Already exists" }));
        assert_eq!(HtmlError::Forbidden.default().code, StatusCode::FORBIDDEN);
    }
}
