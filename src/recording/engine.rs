//! Turns forwarded traffic into stubs

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::network::{is_transport_header, ForwardedResponse, HttpClient};
use crate::registry::StubRegistry;
use crate::storage::StubStore;
use crate::stub::{RequestDescriptor, StubDefinition};
use crate::synthesizer::SynthesizedResponse;
use crate::{MockError, Result};

use super::key::endpoint_key;
use super::session::{CaptureSession, CaptureStatus, RecordingOptions, Transition};

/// Prefix of ids given to captured stubs
pub const CAPTURE_ID_PREFIX: &str = "capture-";

/// Result of stopping a recording
#[derive(Debug, Clone)]
pub struct StopOutcome {
    /// Whether a session was actually stopped
    pub transition: Transition,
    /// Distinct stubs captured by the stopped session
    pub captured: usize,
    /// Where the captured stubs were written, if requested and successful
    pub mapping_file: Option<std::path::PathBuf>,
    /// Why writing the mapping file failed
    pub mapping_error: Option<String>,
}

/// Recording engine: owns the capture session and feeds the registry
pub struct RecordingEngine {
    session: CaptureSession,
    registry: Arc<StubRegistry>,
    store: Arc<dyn StubStore>,
    client: HttpClient,
}

impl RecordingEngine {
    /// Create a new recording engine
    #[must_use]
    pub fn new(registry: Arc<StubRegistry>, store: Arc<dyn StubStore>, client: HttpClient) -> Self {
        Self {
            session: CaptureSession::new(),
            registry,
            store,
            client,
        }
    }

    /// Start recording
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidTarget`] for an empty or malformed target
    pub async fn start(&self, options: RecordingOptions) -> Result<(Transition, CaptureStatus)> {
        self.session.start(options).await
    }

    /// Stop recording and write the mapping file if one was requested
    ///
    /// Always succeeds; a failed mapping-file write is reported in the outcome.
    pub async fn stop(&self) -> StopOutcome {
        let (transition, summary) = self.session.stop().await;

        let Some(summary) = summary else {
            return StopOutcome {
                transition,
                captured: 0,
                mapping_file: None,
                mapping_error: None,
            };
        };

        let mut outcome = StopOutcome {
            transition,
            captured: summary.stubs.len(),
            mapping_file: None,
            mapping_error: None,
        };

        if let Some(path) = summary.options.save_mapping_to_file {
            match write_mapping_file(&path, &summary.stubs).await {
                Ok(()) => {
                    info!(path = %path.display(), stubs = summary.stubs.len(), "Wrote mapping file");
                    outcome.mapping_file = Some(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to write mapping file");
                    outcome.mapping_error = Some(e.to_string());
                }
            }
        }

        outcome
    }

    /// Whether a session is active
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    /// Current session status
    pub async fn status(&self) -> CaptureStatus {
        self.session.status().await
    }

    /// Forward `request` to the target and capture the exchange
    ///
    /// Returns `Ok(None)` when no session is active.
    ///
    /// # Errors
    ///
    /// Returns error if forwarding fails; capture problems are only logged
    pub async fn forward_and_capture(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<SynthesizedResponse>> {
        let Some((target, persist)) = self.session.target().await else {
            return Ok(None);
        };

        let response = self.client.forward(&target, request).await?;

        if let Err(e) = self.capture(request, &response, persist).await {
            warn!(method = %request.method, path = %request.path, error = %e, "Capture failed");
        }

        Ok(Some(response.into()))
    }

    /// Convert an observed exchange into a stub, register it and optionally
    /// persist its response body
    ///
    /// Returns the stub id, or `None` when nothing was registered: the session
    /// stopped while the exchange was in flight, or the response cannot be
    /// stored verbatim (non-UTF-8 body or header values), which is recorded
    /// as a persistence failure.
    ///
    /// # Errors
    ///
    /// Returns error if the stub cannot be registered
    pub async fn capture(
        &self,
        request: &RequestDescriptor,
        response: &ForwardedResponse,
        persist: bool,
    ) -> Result<Option<String>> {
        let key = endpoint_key(&request.path);

        let stub = match captured_stub(request, response, &key) {
            Ok(stub) => stub,
            Err(e) => {
                warn!(key = %key, error = %e, "Exchange cannot be captured verbatim");
                self.session.record_failure(&e).await;
                return Ok(None);
            }
        };
        stub.validate()?;

        if !self.session.record_capture(&stub).await {
            debug!(key = %key, "Recording stopped before the exchange completed");
            return Ok(None);
        }

        let id = self.registry.upsert(stub).await?;

        debug!(
            id = %id,
            key = %key,
            status = response.status,
            "Captured {} {}",
            request.method,
            request.path
        );

        if persist {
            if let Err(e) = self.persist(&key, &response.body).await {
                warn!(key = %key, error = %e, "Persisting capture failed, keeping it in memory");
                self.session.record_failure(&e).await;
            }
        }

        Ok(Some(id))
    }

    async fn persist(&self, key: &str, body: &[u8]) -> Result<()> {
        if body.iter().all(u8::is_ascii_whitespace) {
            debug!(key = %key, "Empty response body, nothing to persist");
            return Ok(());
        }

        let document: Value = serde_json::from_slice(body)
            .map_err(|e| MockError::persistence(key, format!("response body is not JSON: {e}")))?;

        let store = Arc::clone(&self.store);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.save(&key, &document))
            .await
            .map_err(|e| MockError::Other(format!("Persistence task failed: {e}")))?
    }
}

/// Deterministic id for the stub captured from `METHOD path`
#[must_use]
pub fn captured_stub_id(method: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(path.as_bytes());
    let digest = hasher.finalize();

    format!("{CAPTURE_ID_PREFIX}{}", hex::encode(&digest[..8]))
}

fn captured_stub(
    request: &RequestDescriptor,
    response: &ForwardedResponse,
    key: &str,
) -> Result<StubDefinition> {
    if let Some(name) = response.opaque_headers.first() {
        return Err(MockError::persistence(
            key,
            format!("header '{name}' is not UTF-8"),
        ));
    }

    let body = std::str::from_utf8(&response.body)
        .map_err(|e| MockError::persistence(key, format!("response body is not UTF-8: {e}")))?;

    let mut stub = StubDefinition::new(request.method.to_ascii_uppercase(), request.path.clone())
        .with_id(captured_stub_id(&request.method, &request.path))
        .with_name(key)
        .with_status(response.status)
        .with_response_body(body);

    for (name, value) in &response.headers {
        if !is_transport_header(name) {
            stub.response_headers.insert(name.clone(), value.clone());
        }
    }

    Ok(stub)
}

async fn write_mapping_file(path: &std::path::Path, stubs: &[StubDefinition]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(stubs)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine_with_store() -> (RecordingEngine, Arc<StubRegistry>, Arc<MemoryStore>) {
        let registry = Arc::new(StubRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let engine = RecordingEngine::new(
            Arc::clone(&registry),
            Arc::clone(&store) as Arc<dyn StubStore>,
            HttpClient::new(1024 * 1024),
        );
        (engine, registry, store)
    }

    fn json_response(body: &str) -> ForwardedResponse {
        ForwardedResponse {
            status: 200,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("content-length".to_string(), body.len().to_string()),
                ("connection".to_string(), "keep-alive".to_string()),
            ],
            body: body.as_bytes().to_vec(),
            ..ForwardedResponse::default()
        }
    }

    async fn started_engine() -> (RecordingEngine, Arc<StubRegistry>, Arc<MemoryStore>) {
        let (engine, registry, store) = engine_with_store();
        engine
            .start(RecordingOptions::new("http://127.0.0.1:1"))
            .await
            .unwrap();
        (engine, registry, store)
    }

    #[test]
    fn test_captured_stub_id_is_stable() {
        let a = captured_stub_id("get", "/envelopes");
        let b = captured_stub_id("GET", "/envelopes");
        let c = captured_stub_id("GET", "/envelopes/1");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(CAPTURE_ID_PREFIX));
        assert_eq!(a.len(), CAPTURE_ID_PREFIX.len() + 16);
    }

    #[tokio::test]
    async fn test_capture_registers_and_persists() {
        let (engine, registry, store) = engine_with_store();
        engine
            .start(RecordingOptions::new("http://127.0.0.1:1"))
            .await
            .unwrap();

        let request = RequestDescriptor::new("GET", "/restapi/v2.1/accounts/42/envelopes");
        let id = engine
            .capture(&request, &json_response(r#"{"envelopes":[]}"#), true)
            .await
            .unwrap()
            .unwrap();

        let stub = registry.get(&id).await.unwrap();
        assert_eq!(stub.name.as_deref(), Some("EnvelopesList"));
        assert_eq!(stub.path, "/restapi/v2.1/accounts/42/envelopes");
        assert_eq!(stub.response_body, r#"{"envelopes":[]}"#);
        assert_eq!(stub.response_headers.len(), 1);

        assert_eq!(
            store.load("EnvelopesList").unwrap(),
            Some(json!({"envelopes": []}))
        );
        assert_eq!(engine.status().await.captured, 1);
    }

    #[tokio::test]
    async fn test_repeated_capture_overwrites() {
        let (engine, registry, store) = started_engine().await;
        let request = RequestDescriptor::new("GET", "/widgets");

        engine
            .capture(&request, &json_response(r#"{"v":1}"#), true)
            .await
            .unwrap();
        engine
            .capture(&request, &json_response(r#"{"v":2}"#), true)
            .await
            .unwrap();

        let stubs = registry.list().await;
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].response_body, r#"{"v":2}"#);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("WidgetsList").unwrap(), Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_non_json_body_is_persistence_failure() {
        let (engine, registry, store) = engine_with_store();
        engine
            .start(RecordingOptions::new("http://127.0.0.1:1"))
            .await
            .unwrap();

        let request = RequestDescriptor::new("GET", "/page");
        let response = ForwardedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: b"<html></html>".to_vec(),
            ..ForwardedResponse::default()
        };
        assert!(engine.capture(&request, &response, true).await.unwrap().is_some());

        // Stub kept in memory, nothing stored
        assert_eq!(registry.len().await, 1);
        assert!(store.is_empty());

        let status = engine.status().await;
        assert_eq!(status.persistence_failures, 1);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_capture_without_persistence() {
        let (engine, registry, store) = started_engine().await;
        let request = RequestDescriptor::new("GET", "/widgets/1");

        engine
            .capture(&request, &json_response("{}"), false)
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_binary_body_is_not_registered() {
        let (engine, registry, store) = started_engine().await;

        let response = ForwardedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "image/png".to_string())],
            body: vec![137, 80, 78, 71, 255, 216],
            ..ForwardedResponse::default()
        };
        let id = engine
            .capture(&RequestDescriptor::new("GET", "/logo.png"), &response, true)
            .await
            .unwrap();

        assert!(id.is_none());
        assert!(registry.is_empty().await);
        assert!(store.is_empty());

        let status = engine.status().await;
        assert_eq!(status.captured, 0);
        assert_eq!(status.persistence_failures, 1);
        assert!(status.last_error.unwrap().contains("not UTF-8"));
    }

    #[tokio::test]
    async fn test_non_utf8_header_is_not_registered() {
        let (engine, registry, _) = started_engine().await;

        let mut response = json_response("{}");
        response.opaque_headers = vec!["x-signature".to_string()];
        let id = engine
            .capture(&RequestDescriptor::new("GET", "/signed"), &response, true)
            .await
            .unwrap();

        assert!(id.is_none());
        assert!(registry.is_empty().await);
        let status = engine.status().await;
        assert!(status.last_error.unwrap().contains("x-signature"));
    }

    #[tokio::test]
    async fn test_capture_after_stop_is_dropped() {
        let (engine, registry, store) = started_engine().await;
        engine.stop().await;

        let id = engine
            .capture(&RequestDescriptor::new("GET", "/late"), &json_response("{}"), true)
            .await
            .unwrap();

        assert!(id.is_none());
        assert!(registry.is_empty().await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_encoded_path_capture_replays() {
        let (engine, registry, _) = started_engine().await;
        let request = RequestDescriptor::new("GET", "/search/hello%20world");

        engine
            .capture(&request, &json_response(r#"{"hits":0}"#), false)
            .await
            .unwrap()
            .unwrap();

        let snapshot = registry.snapshot().await;
        let result = crate::matcher::find_match(&snapshot, &request).unwrap();
        assert_eq!(result.definition().response_body, r#"{"hits":0}"#);
    }

    #[tokio::test]
    async fn test_forward_when_idle_is_none() {
        let (engine, _, _) = engine_with_store();
        let result = engine
            .forward_and_capture(&RequestDescriptor::new("GET", "/"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_stop_writes_mapping_file() {
        let temp_dir = TempDir::new().unwrap();
        let mapping = temp_dir.path().join("out").join("mappings.json");
        let (engine, _, _) = engine_with_store();

        let mut options = RecordingOptions::new("http://127.0.0.1:1");
        options.save_mapping_to_file = Some(mapping.clone());
        engine.start(options).await.unwrap();

        engine
            .capture(&RequestDescriptor::new("GET", "/a"), &json_response("{}"), false)
            .await
            .unwrap();
        engine
            .capture(&RequestDescriptor::new("GET", "/b"), &json_response("{}"), false)
            .await
            .unwrap();

        let outcome = engine.stop().await;
        assert_eq!(outcome.transition, Transition::Changed);
        assert_eq!(outcome.captured, 2);
        assert_eq!(outcome.mapping_file.as_deref(), Some(mapping.as_path()));

        let written: Vec<StubDefinition> =
            serde_json::from_str(&std::fs::read_to_string(&mapping).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].path, "/a");
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let (engine, _, _) = engine_with_store();
        let outcome = engine.stop().await;

        assert_eq!(outcome.transition, Transition::AlreadyInState);
        assert_eq!(outcome.captured, 0);
    }
}
