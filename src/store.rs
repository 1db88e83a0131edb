//! Trait seams standing in for the cluster API client the reconciler
//! would normally talk to (informers/listers/typed clients are explicitly
//! out of scope — see SPEC_FULL §1/§6). Parallel in shape to the teacher's
//! `StorageBackend` trait (`src/storage/mod.rs`): a small async trait with
//! a blanket `Arc<T>` impl, plus an in-memory fake for tests.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AcmeError, Result};
use crate::resource::Secret;

/// CRUD + compare-and-set status update for a namespaced or cluster-scoped
/// resource `T`, keyed by `ObjectMeta::key()`.
#[async_trait]
pub trait ResourceStore<T>: Send + Sync
where
    T: Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<T>>;
    async fn list(&self) -> Result<Vec<T>>;
    async fn create(&self, obj: T) -> Result<T>;
    /// Full-object update, compare-and-set against the resource_version
    /// the caller last observed (passed as `expected_version`).
    async fn update(&self, key: &str, obj: T, expected_version: u64) -> Result<T>;
    /// Status-only update, same compare-and-set discipline, mirroring a
    /// real cluster API's `/status` subresource.
    async fn update_status(&self, key: &str, obj: T, expected_version: u64) -> Result<T>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Secret>>;
    async fn create(&self, secret: Secret) -> Result<Secret>;
    async fn update(&self, key: &str, secret: Secret, expected_version: u64) -> Result<Secret>;
}

#[async_trait]
impl<T: Clone + Send + Sync> ResourceStore<T> for Arc<dyn ResourceStore<T>> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        self.as_ref().get(key).await
    }
    async fn list(&self) -> Result<Vec<T>> {
        self.as_ref().list().await
    }
    async fn create(&self, obj: T) -> Result<T> {
        self.as_ref().create(obj).await
    }
    async fn update(&self, key: &str, obj: T, expected_version: u64) -> Result<T> {
        self.as_ref().update(key, obj, expected_version).await
    }
    async fn update_status(&self, key: &str, obj: T, expected_version: u64) -> Result<T> {
        self.as_ref().update_status(key, obj, expected_version).await
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.as_ref().delete(key).await
    }
}

/// What happened to an object, for event recording / test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Records a user-facing event against an object, the same role as
/// `client-go`'s `EventRecorder`. Conditions are the durable state;
/// events are the append-only log of what happened and why, matching the
/// design note in SPEC_FULL §2.
pub trait EventRecorder: Send + Sync {
    fn record(&self, object_key: &str, event_type: EventType, reason: &str, message: &str);
}

/// Emits events through `tracing`, the default in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, object_key: &str, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => {
                tracing::info!(object = object_key, reason, "{}", message)
            }
            EventType::Warning => {
                tracing::warn!(object = object_key, reason, "{}", message)
            }
        }
    }
}

/// Captures events in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct FakeEventRecorder {
    events: Mutex<Vec<(String, EventType, String, String)>>,
}

impl FakeEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, EventType, String, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.events.lock().unwrap().iter().any(|(_, _, r, _)| r == reason)
    }
}

impl EventRecorder for FakeEventRecorder {
    fn record(&self, object_key: &str, event_type: EventType, reason: &str, message: &str) {
        self.events.lock().unwrap().push((
            object_key.to_string(),
            event_type,
            reason.to_string(),
            message.to_string(),
        ));
    }
}

/// In-memory `ResourceStore`/`SecretStore`, parallel to the teacher's
/// `MemoryStorage` (`src/storage/memory.rs`), generalized from raw bytes
/// to a typed map with resource_version bookkeeping.
pub struct FakeResourceStore<T> {
    objects: Mutex<HashMap<String, T>>,
}

impl<T> Default for FakeResourceStore<T> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> FakeResourceStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Versioned> FakeResourceStore<T> {
    /// Synchronous key snapshot for a [`crate::controller::KeyLister`]
    /// full resync, bypassing the async `ResourceStore` trait since this
    /// fake's backing map is a plain `std::sync::Mutex`.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

/// Resources stored through this fake must expose their key and
/// resource_version so the store can perform compare-and-set without
/// knowing the concrete shape.
pub trait Versioned {
    fn store_key(&self) -> String;
    fn resource_version(&self) -> u64;
    fn set_resource_version(&mut self, version: u64);
}

#[async_trait]
impl<T> ResourceStore<T> for FakeResourceStore<T>
where
    T: Clone + Send + Sync + Versioned,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<T>> {
        Ok(self.objects.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, mut obj: T) -> Result<T> {
        let key = obj.store_key();
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(AcmeError::conflict(key));
        }
        obj.set_resource_version(1);
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update(&self, key: &str, mut obj: T, expected_version: u64) -> Result<T> {
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(key)
            .ok_or_else(|| AcmeError::not_found(key.to_string()))?;
        if current.resource_version() != expected_version {
            return Err(AcmeError::conflict(key.to_string()));
        }
        obj.set_resource_version(expected_version + 1);
        objects.insert(key.to_string(), obj.clone());
        Ok(obj)
    }

    async fn update_status(&self, key: &str, obj: T, expected_version: u64) -> Result<T> {
        self.update(key, obj, expected_version).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSecretStore {
    secrets: Mutex<HashMap<String, Secret>>,
}

impl FakeSecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>> {
        Ok(self.secrets.lock().unwrap().get(key).cloned())
    }

    async fn create(&self, mut secret: Secret) -> Result<Secret> {
        let key = secret.metadata.key();
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&key) {
            return Err(AcmeError::conflict(key));
        }
        secret.metadata.resource_version = 1;
        secrets.insert(key, secret.clone());
        Ok(secret)
    }

    async fn update(&self, key: &str, mut secret: Secret, expected_version: u64) -> Result<Secret> {
        let mut secrets = self.secrets.lock().unwrap();
        let current = secrets
            .get(key)
            .ok_or_else(|| AcmeError::not_found(key.to_string()))?;
        if current.metadata.resource_version != expected_version {
            return Err(AcmeError::conflict(key.to_string()));
        }
        secret.metadata.resource_version = expected_version + 1;
        secrets.insert(key.to_string(), secret.clone());
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Certificate, CertificateSpec, CertificateStatus, IssuerRef, KeySpec, ObjectMeta};

    fn sample_cert(name: &str) -> Certificate {
        Certificate {
            metadata: ObjectMeta::namespaced(name, "default"),
            spec: CertificateSpec {
                secret_name: format!("{name}-tls"),
                issuer_ref: IssuerRef {
                    name: "letsencrypt-prod".to_string(),
                    kind: None,
                },
                common_name: None,
                dns_names: vec!["example.com".to_string()],
                ip_addresses: vec![],
                uri_sans: vec![],
                duration_seconds: None,
                renew_before_seconds: None,
                key: KeySpec::default(),
                is_ca: false,
                usages: vec![],
            },
            status: CertificateStatus::default(),
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store: FakeResourceStore<Certificate> = FakeResourceStore::new();
        let created = store.create(sample_cert("web")).await.unwrap();
        assert_eq!(created.metadata.resource_version, 1);

        let fetched = store.get("default/web").await.unwrap().unwrap();
        assert_eq!(fetched.spec.secret_name, "web-tls");
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let store: FakeResourceStore<Certificate> = FakeResourceStore::new();
        store.create(sample_cert("web")).await.unwrap();

        let result = store.update("default/web", sample_cert("web"), 99).await;
        assert!(matches!(result, Err(AcmeError::Conflict(_))));
    }

    #[tokio::test]
    async fn fake_event_recorder_captures_reason() {
        let recorder = FakeEventRecorder::new();
        recorder.record("default/web", EventType::Normal, "CertIssued", "issued");
        assert!(recorder.has_reason("CertIssued"));
    }
}
