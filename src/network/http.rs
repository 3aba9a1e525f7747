//! Conversions between hyper messages and engine types

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

use crate::config::LimitsConfig;
use crate::stub::RequestDescriptor;
use crate::synthesizer::SynthesizedResponse;
use crate::{MockError, Result};

/// Body type of every response this crate produces
pub type ResponseBody = Full<Bytes>;

/// Stateless helpers shared by the stub listener and the control API
pub struct HttpHandler;

impl HttpHandler {
    /// Create a plain-text response
    ///
    /// # Panics
    ///
    /// Panics if response builder fails (should never happen with valid inputs)
    #[must_use]
    pub fn create_response(status: StatusCode, body: &str) -> Response<ResponseBody> {
        Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "text/plain")
            .body(Full::new(Bytes::from(body.to_string())))
            .expect("Failed to build response")
    }

    /// Create a JSON response
    ///
    /// # Panics
    ///
    /// Panics if response builder fails (should never happen with valid inputs)
    #[must_use]
    pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
        let body = serde_json::to_vec(value).unwrap_or_else(|e| {
            serde_json::to_vec(&serde_json::json!({ "message": e.to_string() }))
                .unwrap_or_default()
        });

        Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .expect("Failed to build response")
    }

    /// Create an empty response
    ///
    /// # Panics
    ///
    /// Panics if response builder fails (should never happen)
    #[must_use]
    pub fn empty_response(status: StatusCode) -> Response<ResponseBody> {
        Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .expect("Failed to build response")
    }

    /// Status code an error is reported with
    #[must_use]
    pub fn error_status(error: &MockError) -> StatusCode {
        match error {
            MockError::Validation(_) | MockError::InvalidTarget(_) | MockError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            MockError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MockError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create an error response carrying the error message
    #[must_use]
    pub fn error_response(error: &MockError) -> Response<ResponseBody> {
        Self::json_response(
            Self::error_status(error),
            &serde_json::json!({ "message": error.to_string() }),
        )
    }

    /// Turn a synthesized response into a hyper response
    ///
    /// Headers that hyper cannot represent are skipped.
    #[must_use]
    pub fn into_hyper(response: SynthesizedResponse) -> Response<ResponseBody> {
        let status =
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut builder = Response::builder().status(status);
        for (name, value) in &response.headers {
            if super::is_transport_header(name) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                hyper::header::HeaderName::from_bytes(name.as_bytes()),
                hyper::header::HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }

        builder
            .body(Full::new(Bytes::from(response.body)))
            .unwrap_or_else(|_| Self::empty_response(StatusCode::INTERNAL_SERVER_ERROR))
    }

    /// Check declared size and header count before reading the body
    ///
    /// # Errors
    ///
    /// Returns error if request is too large or has too many headers
    pub fn validate_request<B>(request: &Request<B>, limits: &LimitsConfig) -> Result<()> {
        if let Some(length) = request
            .headers()
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if length > limits.max_request_size {
                return Err(MockError::DataTooLarge {
                    size: length,
                    limit: limits.max_request_size,
                });
            }
        }

        let header_count = request.headers().len();
        if header_count > limits.max_headers {
            return Err(MockError::Validation(format!(
                "Too many headers: {header_count}"
            )));
        }

        Ok(())
    }

    /// Read request body with size limit
    ///
    /// # Errors
    ///
    /// Returns error if body is too large or read fails
    pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let collected = body
            .collect()
            .await
            .map_err(|e| MockError::Other(format!("Failed to read body: {e}")))?;

        let bytes = collected.to_bytes();

        if bytes.len() > max_size {
            return Err(MockError::DataTooLarge {
                size: bytes.len(),
                limit: max_size,
            });
        }

        Ok(bytes)
    }

    /// Convert a hyper request into a [`RequestDescriptor`]
    ///
    /// # Errors
    ///
    /// Returns error if the request breaks the configured limits
    pub async fn into_descriptor<B>(
        request: Request<B>,
        limits: &LimitsConfig,
    ) -> Result<RequestDescriptor>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        Self::validate_request(&request, limits)?;

        let (parts, body) = request.into_parts();
        let body = Self::read_body(body, limits.max_request_size).await?;

        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(RequestDescriptor {
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers,
            body: body.to_vec(),
        })
    }
}
