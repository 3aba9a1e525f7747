//! REST control API on the admin port

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::header::{HeaderValue, ORIGIN};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::app::MockNet;
use crate::catalog;
use crate::recording::{endpoint_key, RecordingOptions, Transition};
use crate::stub::StubDefinition;
use crate::Result;

use super::server::{Listener, RequestHandler};
use super::{HttpHandler, ResponseBody};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// The control API listener
pub struct ControlApi {
    routes: Arc<ControlRoutes>,
    listener: Mutex<Option<Listener>>,
}

impl ControlApi {
    /// Create a stopped control API for `app`
    #[must_use]
    pub fn new(app: Arc<MockNet>) -> Self {
        Self {
            routes: Arc::new(ControlRoutes { app }),
            listener: Mutex::new(None),
        }
    }

    /// Bind the admin port and start serving
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn start(&self) -> Result<(Transition, SocketAddr)> {
        let mut listener = self.listener.lock().await;

        if let Some(current) = listener.as_ref() {
            return Ok((Transition::AlreadyInState, current.addr()));
        }

        let config = self.routes.app.config();
        let bound = Listener::bind(
            &config.host,
            config.admin_port,
            config.limits.max_connections,
            Arc::clone(&self.routes),
        )
        .await?;
        let addr = bound.addr();
        *listener = Some(bound);

        info!("Control API listening on {}", addr);
        Ok((Transition::Changed, addr))
    }

    /// Stop serving
    pub async fn stop(&self) -> Transition {
        let Some(bound) = self.listener.lock().await.take() else {
            return Transition::AlreadyInState;
        };

        bound.shutdown().await;
        info!("Control API stopped");
        Transition::Changed
    }

    /// Address the control API is bound to, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(Listener::addr)
    }
}

struct ControlRoutes {
    app: Arc<MockNet>,
}

impl RequestHandler for ControlRoutes {
    fn handle(
        &self,
        request: Request<Incoming>,
    ) -> impl Future<Output = Response<ResponseBody>> + Send {
        async move {
            let origin = request
                .headers()
                .get(ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let mut response = self.route(request).await;

            if let Some(origin) = origin {
                if self.app.config().origin_allowed(&origin) {
                    if let Ok(value) = HeaderValue::from_str(&origin) {
                        let headers = response.headers_mut();
                        headers.insert("access-control-allow-origin", value);
                        headers.insert("vary", HeaderValue::from_static("Origin"));
                    }
                }
            }

            response
        }
    }
}

impl ControlRoutes {
    async fn route(&self, request: Request<Incoming>) -> Response<ResponseBody> {
        let (parts, body) = request.into_parts();
        debug!("Control {} {}", parts.method, parts.uri.path());

        if parts.method == Method::OPTIONS {
            let mut response = HttpHandler::empty_response(StatusCode::NO_CONTENT);
            let headers = response.headers_mut();
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static(ALLOW_METHODS),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static(ALLOW_HEADERS),
            );
            return response;
        }

        let body = match HttpHandler::read_body(body, self.app.config().limits.max_request_size)
            .await
        {
            Ok(body) => body,
            Err(e) => return HttpHandler::error_response(&e),
        };

        let segments: Vec<String> = parts
            .uri
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s).map_or_else(|_| s.to_string(), |d| d.into_owned())
            })
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match (parts.method.as_str(), segments.as_slice()) {
            ("POST", ["api", "mock", "start"]) => self.start_server().await,
            ("POST", ["api", "mock", "stop"]) => self.stop_server().await,
            ("GET", ["api", "mock", "status"]) => ok(&json!({
                "isRunning": self.app.server().is_running()
            })),
            ("POST", ["api", "mock", "reset"]) => {
                self.app.registry().reset().await;
                message(StatusCode::OK, "All stubs removed")
            }
            ("POST", ["api", "mock", "seed", "docusign"]) => {
                let registered =
                    catalog::seed_docusign(self.app.registry(), self.app.store()).await;
                ok(&json!({
                    "message": format!("Registered {registered} DocuSign stubs"),
                    "registered": registered
                }))
            }
            ("POST", ["api", "mock", id, "document"]) => self.save_document(id).await,
            ("POST", ["api", "mock"]) => self.add_stub(&body).await,
            ("GET", ["api", "mock"]) => ok(&self.app.registry().list().await),
            ("GET", ["api", "mock", id]) => match self.app.registry().get(id).await {
                Some(stub) => ok(&stub),
                None => not_found(id),
            },
            ("PUT", ["api", "mock", id]) => self.replace_stub(id, &body).await,
            ("DELETE", ["api", "mock", id]) => {
                if self.app.registry().remove(id).await {
                    message(StatusCode::OK, &format!("Stub {id} removed"))
                } else {
                    not_found(id)
                }
            }
            ("POST", ["api", "recording", "start"]) => self.start_recording(&body).await,
            ("POST", ["api", "recording", "stop"]) => self.stop_recording().await,
            ("GET", ["api", "recording", "status"]) => {
                ok(&self.app.recorder().status().await)
            }
            _ => message(StatusCode::NOT_FOUND, "Not found"),
        }
    }

    async fn start_server(&self) -> Response<ResponseBody> {
        match self.app.server().start().await {
            Ok((transition, addr)) => {
                let text = if transition.changed() {
                    "Mock server started"
                } else {
                    "Mock server already running"
                };
                ok(&json!({ "message": text, "port": addr.port() }))
            }
            Err(e) => {
                warn!("Failed to start mock server: {}", e);
                failure(&e)
            }
        }
    }

    async fn stop_server(&self) -> Response<ResponseBody> {
        let text = if self.app.server().stop().await.changed() {
            "Mock server stopped"
        } else {
            "Mock server not running"
        };
        message(StatusCode::OK, text)
    }

    async fn add_stub(&self, body: &[u8]) -> Response<ResponseBody> {
        let stub: StubDefinition = match parse_body(body) {
            Ok(stub) => stub,
            Err(e) => return failure(&e),
        };

        match self.app.registry().add(stub).await {
            Ok(id) => ok(&json!({ "message": "Stub added", "id": id })),
            Err(e) => failure(&e),
        }
    }

    async fn replace_stub(&self, id: &str, body: &[u8]) -> Response<ResponseBody> {
        let stub: StubDefinition = match parse_body(body) {
            Ok(stub) => stub,
            Err(e) => return failure(&e),
        };

        match self.app.registry().replace(id, stub).await {
            Ok(true) => message(StatusCode::OK, &format!("Stub {id} updated")),
            Ok(false) => not_found(id),
            Err(e) => failure(&e),
        }
    }

    async fn save_document(&self, id: &str) -> Response<ResponseBody> {
        let Some(stub) = self.app.registry().get(id).await else {
            return not_found(id);
        };

        let key = endpoint_key(&stub.path);
        match catalog::save_stub_document(self.app.store(), &stub, &key).await {
            Ok(true) => ok(&json!({ "message": format!("Stored {key}"), "key": key })),
            Ok(false) => message(
                StatusCode::BAD_REQUEST,
                &format!("Stub {id} has no JSON response body"),
            ),
            Err(e) => {
                warn!(id = %id, key = %key, error = %e, "Failed to store stub document");
                failure(&e)
            }
        }
    }

    async fn start_recording(&self, body: &[u8]) -> Response<ResponseBody> {
        let options: RecordingOptions = match parse_body(body) {
            Ok(options) => options,
            Err(e) => return failure(&e),
        };

        match self.app.recorder().start(options).await {
            Ok((transition, status)) => {
                let text = if transition.changed() {
                    "Recording started"
                } else {
                    "Already recording"
                };
                ok(&json!({ "message": text, "status": status }))
            }
            Err(e) => failure(&e),
        }
    }

    async fn stop_recording(&self) -> Response<ResponseBody> {
        let outcome = self.app.recorder().stop().await;
        let text = if outcome.transition.changed() {
            "Recording stopped"
        } else {
            "Not recording"
        };

        let mut body = json!({ "message": text, "captured": outcome.captured });
        if let Some(path) = &outcome.mapping_file {
            body["mappingFile"] = json!(path.display().to_string());
        }
        if let Some(error) = &outcome.mapping_error {
            body["mappingError"] = json!(error);
        }
        ok(&body)
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

fn ok<T: serde::Serialize>(value: &T) -> Response<ResponseBody> {
    HttpHandler::json_response(StatusCode::OK, value)
}

fn message(status: StatusCode, text: &str) -> Response<ResponseBody> {
    HttpHandler::json_response(status, &json!({ "message": text }))
}

fn not_found(id: &str) -> Response<ResponseBody> {
    message(StatusCode::NOT_FOUND, &format!("Stub {id} not found"))
}

fn failure(error: &crate::MockError) -> Response<ResponseBody> {
    message(StatusCode::BAD_REQUEST, &error.to_string())
}
