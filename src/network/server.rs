//! Stub listener lifecycle and the accept loop shared with the control API

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, LimitsConfig};
use crate::matcher::find_match;
use crate::recording::{RecordingEngine, Transition};
use crate::registry::StubRegistry;
use crate::stub::RequestDescriptor;
use crate::synthesizer::{synthesize, SynthesizedResponse};
use crate::Result;

use super::connection_pool::ConnectionPool;
use super::{HttpHandler, ResponseBody, SHUTDOWN_TIMEOUT_MS};

/// Turns one HTTP request into one response
pub(crate) trait RequestHandler: Send + Sync + 'static {
    fn handle(
        &self,
        request: Request<Incoming>,
    ) -> impl Future<Output = Response<ResponseBody>> + Send;
}

/// A bound listener with its accept loop running
pub(crate) struct Listener {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
    pool: ConnectionPool,
}

impl Listener {
    /// Bind `host:port` and start accepting connections
    pub(crate) async fn bind<H: RequestHandler>(
        host: &str,
        port: u16,
        max_connections: usize,
        handler: Arc<H>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        let pool = ConnectionPool::new(max_connections);
        let (shutdown_tx, _) = broadcast::channel(1);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            handler,
            pool.clone(),
            shutdown_tx.clone(),
        ));

        Ok(Self {
            addr,
            shutdown_tx,
            accept_task,
            pool,
        })
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, ask open connections to finish and wait for them
    pub(crate) async fn shutdown(self) {
        self.shutdown_tx.send(()).ok();

        if let Err(e) = self.accept_task.await {
            warn!("Accept task ended abnormally: {}", e);
        }

        let timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        if !self.pool.drain(timeout).await {
            warn!(
                addr = %self.addr,
                open = self.pool.active_connections(),
                "Connections still open after {} ms",
                SHUTDOWN_TIMEOUT_MS
            );
        }
    }
}

async fn accept_loop<H: RequestHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    pool: ConnectionPool,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!("Accept loop shutting down");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let io = TokioIo::new(stream);

                        let Some(guard) = pool.try_acquire() else {
                            warn!("Connection limit reached, rejecting {}", peer_addr);
                            tokio::spawn(reject_connection(io));
                            continue;
                        };

                        let handler = Arc::clone(&handler);
                        let mut conn_shutdown = shutdown_tx.subscribe();

                        tokio::spawn(async move {
                            let _guard = guard;
                            let service = service_fn(move |request| {
                                let handler = Arc::clone(&handler);
                                async move { Ok::<_, Infallible>(handler.handle(request).await) }
                            });

                            let conn = http1::Builder::new().serve_connection(io, service);
                            tokio::pin!(conn);

                            let result = tokio::select! {
                                result = conn.as_mut() => result,
                                _ = conn_shutdown.recv() => {
                                    conn.as_mut().graceful_shutdown();
                                    conn.await
                                }
                            };

                            if let Err(e) = result {
                                debug!("Connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        }
    }
}

async fn reject_connection(io: TokioIo<tokio::net::TcpStream>) {
    let service = service_fn(|_request: Request<Incoming>| async {
        Ok::<_, Infallible>(HttpHandler::create_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Connection limit reached",
        ))
    });

    if let Err(e) = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(io, service)
        .await
    {
        debug!("Rejected connection error: {}", e);
    }
}

/// Resolves stub-listener requests: forwards while recording, matches otherwise
pub(crate) struct StubResponder {
    registry: Arc<StubRegistry>,
    recorder: Arc<RecordingEngine>,
    limits: LimitsConfig,
}

impl StubResponder {
    async fn respond(&self, request: &RequestDescriptor) -> Result<SynthesizedResponse> {
        if let Some(response) = self.recorder.forward_and_capture(request).await? {
            return Ok(response);
        }

        let snapshot = self.registry.snapshot().await;
        match find_match(&snapshot, request) {
            Some(matched) => {
                debug!(
                    id = %matched.stub.id(),
                    params = ?matched.path_params,
                    "Matched {} {}",
                    request.method,
                    request.path
                );
                Ok(synthesize(matched.definition()))
            }
            None => {
                warn!("No stub matched {} {}", request.method, request.path);
                Ok(SynthesizedResponse::no_match())
            }
        }
    }
}

impl RequestHandler for StubResponder {
    fn handle(
        &self,
        request: Request<Incoming>,
    ) -> impl Future<Output = Response<ResponseBody>> + Send {
        async move {
            let descriptor = match HttpHandler::into_descriptor(request, &self.limits).await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Rejected request: {}", e);
                    return HttpHandler::error_response(&e);
                }
            };

            match self.respond(&descriptor).await {
                Ok(response) => HttpHandler::into_hyper(response),
                Err(e) => {
                    warn!(
                        method = %descriptor.method,
                        path = %descriptor.path,
                        error = %e,
                        "Request failed"
                    );
                    HttpHandler::error_response(&e)
                }
            }
        }
    }
}

/// The stub listener: serves registered stubs, or forwards while recording
pub struct MockServer {
    config: Arc<Config>,
    responder: Arc<StubResponder>,
    listener: Mutex<Option<Listener>>,
    running: AtomicBool,
}

impl MockServer {
    /// Create a stopped server
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        registry: Arc<StubRegistry>,
        recorder: Arc<RecordingEngine>,
    ) -> Self {
        let responder = Arc::new(StubResponder {
            registry,
            recorder,
            limits: config.limits.clone(),
        });

        Self {
            config,
            responder,
            listener: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Bind the configured port and start serving
    ///
    /// Starting a running server is a no-op reported as
    /// [`Transition::AlreadyInState`].
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn start(&self) -> Result<(Transition, SocketAddr)> {
        let mut listener = self.listener.lock().await;

        if let Some(current) = listener.as_ref() {
            debug!(addr = %current.addr(), "Mock server already running");
            return Ok((Transition::AlreadyInState, current.addr()));
        }

        let bound = Listener::bind(
            &self.config.host,
            self.config.port,
            self.config.limits.max_connections,
            Arc::clone(&self.responder),
        )
        .await?;
        let addr = bound.addr();

        *listener = Some(bound);
        self.running.store(true, Ordering::Release);

        info!("Mock server listening on {}", addr);
        Ok((Transition::Changed, addr))
    }

    /// Stop serving and drain open connections
    pub async fn stop(&self) -> Transition {
        let mut listener = self.listener.lock().await;

        let Some(bound) = listener.take() else {
            debug!("Mock server already stopped");
            return Transition::AlreadyInState;
        };

        let addr = bound.addr();
        bound.shutdown().await;
        self.running.store(false, Ordering::Release);

        info!("Mock server on {} stopped", addr);
        Transition::Changed
    }

    /// Whether the listener is bound
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Address the listener is bound to, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(Listener::addr)
    }

    /// Resolve one request without going through a socket
    ///
    /// # Errors
    ///
    /// Returns error if forwarding to the recording target fails
    pub async fn respond(&self, request: &RequestDescriptor) -> Result<SynthesizedResponse> {
        self.responder.respond(request).await
    }
}
