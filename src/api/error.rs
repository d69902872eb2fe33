use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::borrow::Cow;
use std::collections::HashMap;
use log::error;
use crate::api::{APPLICATION_JSON, CONTENT_TYPE_HEADER};
use crate::entities::{Entity, Outcome};
use crate::error::GalleryError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{0} already exists")]
    Conflict(Entity),

    #[error("media record is {size} bytes, the maximum is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("error in the request body")]
    UnprocessableEntity {
        errors: HashMap<Cow<'static, str>, Vec<Cow<'static, str>>>,
    },

    #[error("an internal server error occurred")]
    Storage(GalleryError),
}

impl ApiError {
    pub fn unprocessable_entity<K, V>(errors: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<Cow<'static, str>>,
    {
        let mut error_map = HashMap::new();

        for (key, val) in errors {
            error_map
                .entry(key.into())
                .or_insert_with(Vec::new)
                .push(val.into());
        }

        Self::UnprocessableEntity { errors: error_map }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GalleryError> for ApiError {
    fn from(value: GalleryError) -> Self {
        match value {
            GalleryError::InvalidName { name, reason } => Self::unprocessable_entity([("name", format!("'{}': {}", name, reason))]),
            GalleryError::RecordTooLarge { size, max } => Self::PayloadTooLarge { size, max },
            other => Self::Storage(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::UnprocessableEntity { errors } => {
                #[derive(serde::Serialize)]
                struct Errors {
                    errors: HashMap<Cow<'static, str>, Vec<Cow<'static, str>>>,
                }

                return (StatusCode::UNPROCESSABLE_ENTITY, Json(Errors { errors })).into_response();
            }

            Self::Conflict(entity) => {
                #[derive(serde::Serialize)]
                struct Conflict {
                    conflict: Entity,
                }

                let mut response = (StatusCode::CONFLICT, Json(Conflict { conflict: entity })).into_response();
                response.headers_mut().insert(CONTENT_TYPE_HEADER, HeaderValue::from_static(APPLICATION_JSON));
                return response;
            }

            Self::Storage(ref e) => {
                error!("Storage error: {:?}", e);
            }

            _ => (),
        }

        (self.status_code(), self.to_string()).into_response()
    }
}

/// Turns the expected failure modes of an [`Outcome`] into HTTP errors.
pub trait OutcomeExt<T> {
    fn into_api_result(self) -> Result<T, ApiError>;
}

impl<T> OutcomeExt<T> for Outcome<T> {
    fn into_api_result(self) -> Result<T, ApiError> {
        match self {
            Outcome::Done(x) => Ok(x),
            Outcome::NotFound(entity) => Err(ApiError::NotFound(entity)),
            Outcome::Conflict(entity) => Err(ApiError::Conflict(entity)),
        }
    }
}
