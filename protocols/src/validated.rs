// Validated JSON extractor for automatic request validation
//
// Deserializes the request body and runs the validator crate's Validate
// trait before the handler sees it. Rejections carry the same structured
// error body as every other pre-stream failure.

/// Trait for request types that need post-deserialization normalization
pub trait Normalizable {
    /// Normalize the request by applying defaults and transformations
    fn normalize(&mut self) {
        // Default: no-op
    }
}

#[cfg(feature = "axum")]
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "axum")]
use serde::de::DeserializeOwned;
#[cfg(feature = "axum")]
use validator::Validate;

#[cfg(feature = "axum")]
use crate::error::{ErrorBody, KIND_VALIDATION};

/// A JSON extractor that validates and normalizes the request body.
///
/// On deserialization or validation failure it short-circuits with a
/// 400 response carrying `{"error": {"kind": "ValidationError", ...}}`,
/// so handlers only ever see well-formed requests.
#[cfg(feature = "axum")]
pub struct ValidatedJson<T>(pub T);

#[cfg(feature = "axum")]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Normalizable + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(mut data) =
            Json::<T>::from_request(req, state)
                .await
                .map_err(|err: JsonRejection| {
                    let message = match err {
                        JsonRejection::JsonDataError(e) => format!("Invalid JSON data: {e}"),
                        JsonRejection::JsonSyntaxError(e) => format!("JSON syntax error: {e}"),
                        JsonRejection::MissingJsonContentType(_) => {
                            "Missing Content-Type: application/json header".to_string()
                        }
                        _ => format!("Failed to parse JSON: {err}"),
                    };

                    (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorBody::new(KIND_VALIDATION, message)),
                    )
                        .into_response()
                })?;

        data.normalize();

        data.validate().map_err(|validation_errors| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(KIND_VALIDATION, validation_errors.to_string())),
            )
                .into_response()
        })?;

        Ok(ValidatedJson(data))
    }
}

// Implement Deref to allow transparent access to the inner value
#[cfg(feature = "axum")]
impl<T> std::ops::Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(feature = "axum")]
impl<T> std::ops::DerefMut for ValidatedJson<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
