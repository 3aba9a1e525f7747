//! HTTP client for forwarding requests to the recording target

use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::recording::CaptureTarget;
use crate::stub::RequestDescriptor;
use crate::synthesizer::SynthesizedResponse;
use crate::{MockError, Result};

use super::is_transport_header;

/// Upstream request timeout
pub const UPSTREAM_TIMEOUT_MS: u64 = 30_000;

/// HTTP client for forwarding requests
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new(max_response_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self {
            client,
            max_response_size,
        }
    }

    /// Forward a request to the target and collect the full response
    ///
    /// # Errors
    ///
    /// Returns [`MockError::Upstream`] if the request cannot be built, sent or
    /// read, and [`MockError::DataTooLarge`] if the body exceeds the limit
    pub async fn forward(
        &self,
        target: &CaptureTarget,
        request: &RequestDescriptor,
    ) -> Result<ForwardedResponse> {
        let uri = target
            .url_for(&request.path_and_query())
            .parse::<Uri>()
            .map_err(|e| MockError::Upstream(format!("Invalid upstream URI: {e}")))?;

        debug!("Forwarding {} to {}", request.method, uri);

        let method = request.method.parse::<Method>().map_err(|e| {
            MockError::Upstream(format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(hyper::header::HOST, target.authority.as_str());

        for (name, value) in &request.headers {
            if is_transport_header(name) || name.eq_ignore_ascii_case("host") {
                continue;
            }
            builder = builder.header(name, value);
        }

        let upstream_request = builder
            .body(Full::new(Bytes::copy_from_slice(&request.body)))
            .map_err(|e| MockError::Upstream(format!("Failed to build request: {e}")))?;

        let response = tokio::time::timeout(
            Duration::from_millis(UPSTREAM_TIMEOUT_MS),
            self.client.request(upstream_request),
        )
        .await
        .map_err(|_| MockError::Upstream(format!("timed out after {UPSTREAM_TIMEOUT_MS} ms")))?
        .map_err(|e| {
            warn!("Upstream request failed: {e}");
            MockError::Upstream(e.to_string())
        })?;

        let status = response.status().as_u16();
        let mut headers = Vec::with_capacity(response.headers().len());
        let mut opaque_headers = Vec::new();
        for (name, value) in response.headers() {
            match std::str::from_utf8(value.as_bytes()) {
                Ok(value) => headers.push((name.to_string(), value.to_string())),
                Err(_) => {
                    warn!("Dropping non-UTF-8 value of upstream header {}", name);
                    opaque_headers.push(name.to_string());
                }
            }
        }

        let limit = self.max_response_size;
        let body = Limited::new(response.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    MockError::DataTooLarge { size: limit + 1, limit }
                } else {
                    MockError::Upstream(format!("Failed to read response body: {e}"))
                }
            })?
            .to_bytes();

        Ok(ForwardedResponse {
            status,
            headers,
            body: body.to_vec(),
            opaque_headers,
        })
    }
}

/// Response received from the recording target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// Names of headers left out of `headers` because their value is not UTF-8
    pub opaque_headers: Vec<String>,
}

impl From<ForwardedResponse> for SynthesizedResponse {
    fn from(response: ForwardedResponse) -> Self {
        Self {
            status: response.status,
            headers: response
                .headers
                .into_iter()
                .filter(|(name, _)| !is_transport_header(name))
                .collect(),
            body: response.body,
        }
    }
}
