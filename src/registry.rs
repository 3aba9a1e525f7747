//! Stub registry
//!
//! Owns the registered stubs in registration order. Writers build a new
//! vector and swap it in, so readers holding a snapshot never see a partial
//! update.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::stub::{PathPattern, StubDefinition};
use crate::{MockError, Result};

/// A registered stub together with its compiled path
#[derive(Debug, Clone)]
pub struct RegisteredStub {
    /// The definition as registered
    pub definition: StubDefinition,
    /// Compiled form of `definition.path`
    pub pattern: PathPattern,
}

impl RegisteredStub {
    fn compile(definition: StubDefinition) -> Self {
        let pattern = PathPattern::parse(&definition.path);
        Self {
            definition,
            pattern,
        }
    }

    /// Stub id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

/// Immutable view of the registry at one point in time
pub type Snapshot = Arc<Vec<Arc<RegisteredStub>>>;

/// Registry of stub definitions
pub struct StubRegistry {
    stubs: RwLock<Snapshot>,
}

impl StubRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            stubs: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Register a stub and return its id
    ///
    /// A fresh UUID is assigned when the definition carries no id.
    /// Identical predicates are not deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::Validation`] if method or path is empty, or the
    /// supplied id is already registered
    pub async fn add(&self, mut definition: StubDefinition) -> Result<String> {
        definition.validate()?;

        if definition.id.trim().is_empty() {
            definition.id = uuid::Uuid::new_v4().to_string();
        }

        let mut guard = self.stubs.write().await;
        if guard.iter().any(|s| s.id() == definition.id) {
            return Err(MockError::Validation(format!(
                "stub id already registered: {}",
                definition.id
            )));
        }

        let id = definition.id.clone();
        info!(
            id = %id,
            method = %definition.method,
            path = %definition.path,
            status = definition.status_code,
            "Registered stub"
        );

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::new(RegisteredStub::compile(definition)));
        *guard = Arc::new(next);

        Ok(id)
    }

    /// Replace an existing stub in place, keeping its registration position
    ///
    /// Returns `false` if no stub has that id.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::Validation`] if the new definition is invalid
    pub async fn replace(&self, id: &str, mut definition: StubDefinition) -> Result<bool> {
        definition.validate()?;
        definition.id = id.to_string();

        let mut guard = self.stubs.write().await;
        let Some(pos) = guard.iter().position(|s| s.id() == id) else {
            return Ok(false);
        };

        let mut next: Vec<_> = guard.iter().cloned().collect();
        next[pos] = Arc::new(RegisteredStub::compile(definition));
        *guard = Arc::new(next);

        debug!(id = %id, "Replaced stub");
        Ok(true)
    }

    /// Replace the stub with the same id, or append it if absent
    ///
    /// # Errors
    ///
    /// Returns [`MockError::Validation`] if the definition is invalid or has
    /// no id
    pub async fn upsert(&self, definition: StubDefinition) -> Result<String> {
        if definition.id.trim().is_empty() {
            return Err(MockError::Validation(
                "upsert requires an explicit id".to_string(),
            ));
        }

        let id = definition.id.clone();
        if self.replace(&id, definition.clone()).await? {
            return Ok(id);
        }

        match self.add(definition.clone()).await {
            Ok(id) => Ok(id),
            // Lost a race with a concurrent insert of the same id
            Err(MockError::Validation(reason)) => {
                if self.replace(&id, definition).await? {
                    Ok(id)
                } else {
                    Err(MockError::Validation(reason))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a stub; `false` if the id is unknown
    pub async fn remove(&self, id: &str) -> bool {
        let mut guard = self.stubs.write().await;
        if !guard.iter().any(|s| s.id() == id) {
            return false;
        }

        let next: Vec<_> = guard.iter().filter(|s| s.id() != id).cloned().collect();
        *guard = Arc::new(next);

        info!(id = %id, "Removed stub");
        true
    }

    /// Look up a stub by id
    pub async fn get(&self, id: &str) -> Option<StubDefinition> {
        self.stubs
            .read()
            .await
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.definition.clone())
    }

    /// All stubs in registration order
    pub async fn list(&self) -> Vec<StubDefinition> {
        self.snapshot()
            .await
            .iter()
            .map(|s| s.definition.clone())
            .collect()
    }

    /// Remove every stub
    pub async fn reset(&self) {
        let mut guard = self.stubs.write().await;
        let cleared = guard.len();
        *guard = Arc::new(Vec::new());
        info!(cleared, "Registry reset");
    }

    /// Current snapshot, for matching without holding the lock
    pub async fn snapshot(&self) -> Snapshot {
        Arc::clone(&*self.stubs.read().await)
    }

    /// Number of registered stubs
    pub async fn len(&self) -> usize {
        self.stubs.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.stubs.read().await.is_empty()
    }
}

impl Default for StubRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(path: &str) -> StubDefinition {
        StubDefinition::new("GET", path)
    }

    #[tokio::test]
    async fn test_add_assigns_id() {
        let registry = StubRegistry::new();
        let id = registry.add(stub("/a")).await.unwrap();

        assert!(!id.is_empty());
        assert_eq!(registry.get(&id).await.unwrap().path, "/a");
    }

    #[tokio::test]
    async fn test_add_keeps_supplied_id() {
        let registry = StubRegistry::new();
        let id = registry.add(stub("/a").with_id("mine")).await.unwrap();
        assert_eq!(id, "mine");
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_id() {
        let registry = StubRegistry::new();
        registry.add(stub("/a").with_id("dup")).await.unwrap();

        let result = registry.add(stub("/b").with_id("dup")).await;
        assert!(matches!(result, Err(MockError::Validation(_))));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_rejects_missing_method_or_path() {
        let registry = StubRegistry::new();

        assert!(registry.add(StubDefinition::new("", "/a")).await.is_err());
        assert!(registry.add(StubDefinition::new("GET", "")).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_preserves_order() {
        let registry = StubRegistry::new();
        let first = registry.add(stub("/first")).await.unwrap();
        let second = registry.add(stub("/first")).await.unwrap();

        let ids: Vec<_> = registry.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_false() {
        let registry = StubRegistry::new();
        registry.add(stub("/a")).await.unwrap();

        let before = registry.list().await;
        assert!(!registry.remove("missing").await);
        assert_eq!(registry.list().await, before);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = StubRegistry::new();
        let id = registry.add(stub("/a")).await.unwrap();

        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let registry = StubRegistry::new();
        for i in 0..5 {
            registry.add(stub(&format!("/s/{i}"))).await.unwrap();
        }

        registry.reset().await;
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_position() {
        let registry = StubRegistry::new();
        let a = registry.add(stub("/a")).await.unwrap();
        let b = registry.add(stub("/b")).await.unwrap();

        let replaced = registry
            .replace(&a, stub("/a2").with_status(204))
            .await
            .unwrap();
        assert!(replaced);

        let list = registry.list().await;
        assert_eq!(list[0].id, a);
        assert_eq!(list[0].path, "/a2");
        assert_eq!(list[0].status_code, 204);
        assert_eq!(list[1].id, b);
    }

    #[tokio::test]
    async fn test_replace_unknown_is_false() {
        let registry = StubRegistry::new();
        assert!(!registry.replace("nope", stub("/a")).await.unwrap());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let registry = StubRegistry::new();
        registry
            .upsert(stub("/a").with_id("cap").with_response_body("one"))
            .await
            .unwrap();
        registry
            .upsert(stub("/a").with_id("cap").with_response_body("two"))
            .await
            .unwrap();

        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].response_body, "two");
    }

    #[tokio::test]
    async fn test_upsert_requires_id() {
        let registry = StubRegistry::new();
        assert!(registry.upsert(stub("/a")).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_writes() {
        let registry = StubRegistry::new();
        registry.add(stub("/a")).await.unwrap();

        let snapshot = registry.snapshot().await;
        registry.reset().await;

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty().await);
    }
}
