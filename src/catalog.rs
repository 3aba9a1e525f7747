//! Stubs built from stored endpoint documents
//!
//! A document saved under an endpoint key (by recording, or by hand) can be
//! registered again later as the response body of a stub.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::registry::StubRegistry;
use crate::storage::StubStore;
use crate::stub::StubDefinition;
use crate::{MockError, Result};

/// Prefix of ids given to stubs registered from stored documents
pub const CATALOG_ID_PREFIX: &str = "catalog-";

/// Authorization value required by catalog stubs
pub const BEARER_PLACEHOLDER: &str = "Bearer *";

/// Header carrying a per-stub trace token
pub const TRACE_TOKEN_HEADER: &str = "X-DocuSign-TraceToken";

/// A stored document and the endpoint it answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    /// Key of the stored document
    pub key: &'static str,
    /// Path template of the endpoint
    pub path: &'static str,
    /// HTTP method
    pub method: &'static str,
    /// Display name of the stub
    pub name: &'static str,
}

/// Common DocuSign eSignature endpoints
pub const DOCUSIGN_PRESETS: [Preset; 4] = [
    Preset {
        key: "EnvelopeResponse",
        path: "/restapi/v2.1/accounts/{accountId}/envelopes/{envelopeId}",
        method: "GET",
        name: "Get Envelope",
    },
    Preset {
        key: "RecipientsResponse",
        path: "/restapi/v2.1/accounts/{accountId}/envelopes/{envelopeId}/recipients",
        method: "GET",
        name: "Get Recipients",
    },
    Preset {
        key: "DocumentsResponse",
        path: "/restapi/v2.1/accounts/{accountId}/envelopes/{envelopeId}/documents",
        method: "GET",
        name: "Get Documents",
    },
    Preset {
        key: "TemplatesList",
        path: "/restapi/v2.1/accounts/{accountId}/templates",
        method: "GET",
        name: "List Templates",
    },
];

/// Register a stub answering `method path` with the document stored under `key`
///
/// Returns `Ok(false)` when no document is stored under `key`. Registering the
/// same key again replaces the earlier stub.
///
/// # Errors
///
/// Returns error if the store fails or the stub is rejected by the registry
pub async fn create_stub_from_store(
    registry: &StubRegistry,
    store: &Arc<dyn StubStore>,
    key: &str,
    path: &str,
    method: &str,
    name: &str,
) -> Result<bool> {
    let Some(document) = load_document(store, key).await? else {
        debug!(key = %key, "No stored document, skipping stub");
        return Ok(false);
    };

    let body = serde_json::to_string_pretty(&document)?;
    let stub = StubDefinition::new(method, path)
        .with_id(format!("{CATALOG_ID_PREFIX}{key}"))
        .with_name(name)
        .with_request_header("Authorization", BEARER_PLACEHOLDER)
        .with_status(200)
        .with_response_header("Content-Type", "application/json")
        .with_response_header(TRACE_TOKEN_HEADER, uuid::Uuid::new_v4().to_string())
        .with_response_body(body);

    let id = registry.upsert(stub).await?;
    info!(id = %id, key = %key, "Registered {} {} from stored document", method, path);
    Ok(true)
}

/// Register every DocuSign preset whose document is stored
///
/// Returns how many stubs were registered. A preset that fails is logged and
/// skipped.
pub async fn seed_docusign(registry: &StubRegistry, store: &Arc<dyn StubStore>) -> usize {
    let mut registered = 0;

    for preset in &DOCUSIGN_PRESETS {
        match create_stub_from_store(
            registry,
            store,
            preset.key,
            preset.path,
            preset.method,
            preset.name,
        )
        .await
        {
            Ok(true) => registered += 1,
            Ok(false) => {}
            Err(e) => warn!(key = %preset.key, error = %e, "Failed to seed preset"),
        }
    }

    info!("Seeded {} of {} DocuSign stubs", registered, DOCUSIGN_PRESETS.len());
    registered
}

/// Store the JSON response body of `stub` under `key`
///
/// Returns `Ok(false)` when the body is empty or not JSON.
///
/// # Errors
///
/// Returns error if the store rejects the key or fails to write
pub async fn save_stub_document(
    store: &Arc<dyn StubStore>,
    stub: &StubDefinition,
    key: &str,
) -> Result<bool> {
    if stub.response_body.trim().is_empty() {
        return Ok(false);
    }

    let document: Value = match serde_json::from_str(&stub.response_body) {
        Ok(document) => document,
        Err(e) => {
            debug!(key = %key, "Response body is not JSON: {}", e);
            return Ok(false);
        }
    };

    let store = Arc::clone(store);
    let key = key.to_string();
    tokio::task::spawn_blocking(move || store.save(&key, &document))
        .await
        .map_err(|e| MockError::Other(format!("Persistence task failed: {e}")))??;

    Ok(true)
}

async fn load_document(store: &Arc<dyn StubStore>, key: &str) -> Result<Option<Value>> {
    let store = Arc::clone(store);
    let key = key.to_string();
    tokio::task::spawn_blocking(move || store.load(&key))
        .await
        .map_err(|e| MockError::Other(format!("Persistence task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::find_match;
    use crate::network::{ForwardedResponse, HttpClient};
    use crate::recording::{endpoint_key, RecordingEngine, RecordingOptions};
    use crate::storage::{FileStore, MemoryStore};
    use crate::stub::RequestDescriptor;
    use serde_json::json;
    use tempfile::TempDir;

    fn memory_store() -> Arc<dyn StubStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_create_stub_from_store() {
        let registry = StubRegistry::new();
        let store = memory_store();
        store
            .save("EnvelopeResponse", &json!({"envelopeId": "abc", "status": "sent"}))
            .unwrap();

        let created = create_stub_from_store(
            &registry,
            &store,
            "EnvelopeResponse",
            "/restapi/v2.1/accounts/{accountId}/envelopes/{envelopeId}",
            "GET",
            "Get Envelope",
        )
        .await
        .unwrap();
        assert!(created);

        let stub = registry.get("catalog-EnvelopeResponse").await.unwrap();
        assert_eq!(stub.status_code, 200);
        assert_eq!(
            stub.request_headers.get("Authorization").map(String::as_str),
            Some(BEARER_PLACEHOLDER)
        );
        assert_eq!(
            stub.response_headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        let token = stub.response_headers.get(TRACE_TOKEN_HEADER).unwrap();
        assert!(uuid::Uuid::parse_str(token).is_ok());

        let body: Value = serde_json::from_str(&stub.response_body).unwrap();
        assert_eq!(body["envelopeId"], "abc");
    }

    #[tokio::test]
    async fn test_missing_document_is_false() {
        let registry = StubRegistry::new();
        let created = create_stub_from_store(
            &registry,
            &memory_store(),
            "Nothing",
            "/nothing",
            "GET",
            "Nothing",
        )
        .await
        .unwrap();

        assert!(!created);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_seeded_stub_requires_authorization() {
        let registry = StubRegistry::new();
        let store = memory_store();
        store.save("TemplatesList", &json!({"templates": []})).unwrap();

        assert_eq!(seed_docusign(&registry, &store).await, 1);

        let snapshot = registry.snapshot().await;
        let path = "/restapi/v2.1/accounts/42/templates";
        assert!(find_match(&snapshot, &RequestDescriptor::new("GET", path)).is_none());
        assert!(find_match(
            &snapshot,
            &RequestDescriptor::new("GET", path).with_header("authorization", BEARER_PLACEHOLDER)
        )
        .is_some());
    }

    #[test]
    fn test_preset_keys_match_derived_keys() {
        for preset in &DOCUSIGN_PRESETS {
            assert_eq!(preset.key, endpoint_key(preset.path), "{}", preset.path);
        }
    }

    #[tokio::test]
    async fn test_seed_from_recorded_documents() {
        let registry = Arc::new(StubRegistry::new());
        let store = memory_store();
        let engine = RecordingEngine::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            HttpClient::new(1024 * 1024),
        );
        engine
            .start(RecordingOptions::new("http://127.0.0.1:1"))
            .await
            .unwrap();

        let response = ForwardedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: br#"{"envelopeTemplates":[]}"#.to_vec(),
            ..ForwardedResponse::default()
        };
        for path in [
            "/restapi/v2.1/accounts/123/templates",
            "/restapi/v2.1/accounts/123/envelopes/98765",
        ] {
            engine
                .capture(&RequestDescriptor::new("GET", path), &response, true)
                .await
                .unwrap()
                .unwrap();
        }
        engine.stop().await;

        let seeded = StubRegistry::new();
        assert_eq!(seed_docusign(&seeded, &store).await, 2);
        assert!(seeded.get("catalog-TemplatesList").await.is_some());
        assert!(seeded.get("catalog-EnvelopeResponse").await.is_some());
    }

    #[tokio::test]
    async fn test_seed_twice_does_not_duplicate() {
        let registry = StubRegistry::new();
        let store = memory_store();
        for preset in &DOCUSIGN_PRESETS {
            store.save(preset.key, &json!({"key": preset.key})).unwrap();
        }

        assert_eq!(seed_docusign(&registry, &store).await, 4);
        assert_eq!(seed_docusign(&registry, &store).await, 4);
        assert_eq!(registry.len().await, 4);
    }

    #[tokio::test]
    async fn test_save_stub_document() {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn StubStore> = Arc::new(FileStore::new(temp_dir.path()));

        let stub = StubDefinition::new("GET", "/widgets").with_response_body(r#"{"items":[1,2]}"#);
        assert!(save_stub_document(&store, &stub, "WidgetsList").await.unwrap());
        assert_eq!(
            store.load("WidgetsList").unwrap(),
            Some(json!({"items": [1, 2]}))
        );

        let empty = StubDefinition::new("GET", "/empty");
        assert!(!save_stub_document(&store, &empty, "Empty").await.unwrap());

        let html = StubDefinition::new("GET", "/page").with_response_body("<html/>");
        assert!(!save_stub_document(&store, &html, "Page").await.unwrap());
    }
}
