//! Capture session state machine
//!
//! `Idle --start(target)--> Recording --stop()--> Idle`. Starting while
//! recording and stopping while idle both succeed without changing anything.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use hyper::Uri;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::stub::StubDefinition;
use crate::{MockError, Result};

/// Request body of `POST /api/recording/start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    /// Base URL requests are forwarded to while recording
    #[serde(default)]
    pub target_url: String,
    /// Persist each captured response through the store
    #[serde(default = "default_true")]
    pub save_mapping: bool,
    /// Also write every captured stub to this file when recording stops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_mapping_to_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl RecordingOptions {
    /// Options recording from `target_url` with persistence enabled
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            save_mapping: true,
            save_mapping_to_file: None,
        }
    }
}

/// Whether a start/stop call changed the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    /// The state changed
    Changed,
    /// The resource was already in the requested state
    AlreadyInState,
}

impl Transition {
    /// Whether the call changed the state
    #[must_use]
    pub fn changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Parsed recording target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    /// `http` or `https`
    pub scheme: String,
    /// `host[:port]`
    pub authority: String,
    /// Path prefix prepended to forwarded paths, without trailing slash
    pub base_path: String,
}

impl CaptureTarget {
    /// Parse and validate a target URL
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidTarget`] if the URL is empty, relative, has
    /// no host or uses a scheme other than http/https
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(MockError::InvalidTarget("target URL cannot be empty".to_string()));
        }

        let uri: Uri = url
            .parse()
            .map_err(|e| MockError::InvalidTarget(format!("'{url}': {e}")))?;

        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https") => {
                s.to_ascii_lowercase()
            }
            Some(s) => {
                return Err(MockError::InvalidTarget(format!(
                    "'{url}': unsupported scheme '{s}'"
                )))
            }
            None => {
                return Err(MockError::InvalidTarget(format!(
                    "'{url}': URL must be absolute"
                )))
            }
        };

        let authority = match uri.authority() {
            Some(a) if !a.host().is_empty() => a.to_string(),
            _ => return Err(MockError::InvalidTarget(format!("'{url}': missing host"))),
        };

        Ok(Self {
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// URL a request path is forwarded to
    #[must_use]
    pub fn url_for(&self, path_and_query: &str) -> String {
        let separator = if path_and_query.starts_with('/') { "" } else { "/" };
        format!(
            "{}://{}{}{separator}{path_and_query}",
            self.scheme, self.authority, self.base_path
        )
    }
}

/// Status reported by `GET /api/recording/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    /// Whether a session is active
    pub is_recording: bool,
    /// Target of the active session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// Pairs captured so far in the active session
    pub captured: usize,
    /// Persistence failures in the active session
    pub persistence_failures: usize,
    /// Most recent persistence failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// What a session produced, returned when it stops
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    /// Options the session was started with
    pub options: RecordingOptions,
    /// Stubs captured, latest capture per id
    pub stubs: Vec<StubDefinition>,
    /// Persistence failures during the session
    pub persistence_failures: usize,
}

struct ActiveCapture {
    options: RecordingOptions,
    target: CaptureTarget,
    started_at: SystemTime,
    stubs: Vec<StubDefinition>,
    captured: usize,
    persistence_failures: usize,
    last_error: Option<String>,
}

/// The process-wide capture session
pub struct CaptureSession {
    active: Mutex<Option<ActiveCapture>>,
    recording: AtomicBool,
}

impl CaptureSession {
    /// Create an idle session
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            recording: AtomicBool::new(false),
        }
    }

    /// Start recording against `options.target_url`
    ///
    /// While already recording this is a no-op: the existing target is kept
    /// and [`Transition::AlreadyInState`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidTarget`] if the target URL is empty or
    /// malformed
    pub async fn start(&self, options: RecordingOptions) -> Result<(Transition, CaptureStatus)> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            info!(target_url = %current.options.target_url, "Recording already active");
            return Ok((Transition::AlreadyInState, status_of(Some(current))));
        }

        let target = CaptureTarget::parse(&options.target_url)?;

        info!(
            target_url = %options.target_url,
            save_mapping = options.save_mapping,
            "Recording started"
        );

        *active = Some(ActiveCapture {
            options,
            target,
            started_at: SystemTime::now(),
            stubs: Vec::new(),
            captured: 0,
            persistence_failures: 0,
            last_error: None,
        });
        self.recording.store(true, Ordering::SeqCst);

        Ok((Transition::Changed, status_of(active.as_ref())))
    }

    /// Stop recording; a no-op success while idle
    pub async fn stop(&self) -> (Transition, Option<CaptureSummary>) {
        let mut active = self.active.lock().await;

        let Some(finished) = active.take() else {
            info!("Recording not active, nothing to stop");
            return (Transition::AlreadyInState, None);
        };
        self.recording.store(false, Ordering::SeqCst);

        let elapsed = SystemTime::now()
            .duration_since(finished.started_at)
            .unwrap_or_default();
        info!(
            captured = finished.captured,
            failures = finished.persistence_failures,
            elapsed_ms = elapsed.as_millis(),
            "Recording stopped"
        );

        (
            Transition::Changed,
            Some(CaptureSummary {
                options: finished.options,
                stubs: finished.stubs,
                persistence_failures: finished.persistence_failures,
            }),
        )
    }

    /// Whether a session is active
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Current status
    pub async fn status(&self) -> CaptureStatus {
        status_of(self.active.lock().await.as_ref())
    }

    /// Target and persistence flag of the active session
    pub async fn target(&self) -> Option<(CaptureTarget, bool)> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|a| (a.target.clone(), a.options.save_mapping))
    }

    /// Note a captured stub
    ///
    /// Returns `false`, recording nothing, if the session has stopped meanwhile.
    pub async fn record_capture(&self, stub: &StubDefinition) -> bool {
        let mut active = self.active.lock().await;
        let Some(a) = active.as_mut() else {
            return false;
        };

        a.captured += 1;
        match a.stubs.iter_mut().find(|s| s.id == stub.id) {
            Some(existing) => *existing = stub.clone(),
            None => a.stubs.push(stub.clone()),
        }
        true
    }

    /// Note a persistence failure; capture continues in memory
    pub async fn record_failure(&self, error: &MockError) {
        let mut active = self.active.lock().await;
        if let Some(a) = active.as_mut() {
            a.persistence_failures += 1;
            a.last_error = Some(error.to_string());
        }
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

fn status_of(active: Option<&ActiveCapture>) -> CaptureStatus {
    match active {
        Some(a) => CaptureStatus {
            is_recording: true,
            target_url: Some(a.options.target_url.clone()),
            captured: a.captured,
            persistence_failures: a.persistence_failures,
            last_error: a.last_error.clone(),
        },
        None => CaptureStatus {
            is_recording: false,
            target_url: None,
            captured: 0,
            persistence_failures: 0,
            last_error: None,
        },
    }
}
