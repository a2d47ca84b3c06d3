use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::MetadataStore;
use crate::{BlobError, BlobRecord, BlobResult, UploadClaim, UploadLease, UploadToken};

/// In-memory metadata store, for tests and single-process development
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, BlobRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn exists(&self, name: &str) -> BlobResult<bool> {
        Ok(self.records.read().contains_key(name))
    }

    async fn create(&self, name: &str, backend: &str) -> BlobResult<BlobRecord> {
        let mut records = self.records.write();
        if records.contains_key(name) {
            return Err(BlobError::conflict(name));
        }

        let record = BlobRecord::new(name, backend);
        records.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn get(&self, name: &str) -> BlobResult<BlobRecord> {
        self.records
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::not_found(name))
    }

    async fn mark_uploaded(&self, name: &str) -> BlobResult<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| BlobError::not_found(name))?;

        record.uploaded = true;
        record.upload = None;
        Ok(())
    }

    async fn claim_upload(
        &self,
        name: &str,
        token: &UploadToken,
        lease_until: DateTime<Utc>,
    ) -> BlobResult<UploadClaim> {
        let now = Utc::now();
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| BlobError::not_found(name))?;

        if record.uploaded {
            return Ok(UploadClaim::AlreadyUploaded);
        }
        if let Some(lease) = record.upload.as_ref().filter(|l| l.lease_until > now) {
            return Ok(UploadClaim::Held {
                lease_until: lease.lease_until,
            });
        }

        record.upload = Some(UploadLease {
            token: token.clone(),
            lease_until,
        });
        Ok(UploadClaim::Acquired)
    }

    async fn release_upload(&self, name: &str, token: &UploadToken) -> BlobResult<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| BlobError::not_found(name))?;

        if record.upload.as_ref().map(|l| &l.token) == Some(token) {
            record.upload = None;
        }
        Ok(())
    }

    async fn list_pending(&self) -> BlobResult<Vec<BlobRecord>> {
        let mut pending: Vec<BlobRecord> = self
            .records
            .read()
            .values()
            .filter(|r| !r.uploaded)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_then_get() {
        let store = MemoryMetadataStore::new();
        assert!(!store.exists("report.bin").await.unwrap());

        let created = store.create("report.bin", "azure").await.unwrap();
        assert!(!created.uploaded);

        let fetched = store.get("report.bin").await.unwrap();
        assert_eq!(fetched, created);
        assert!(store.exists("report.bin").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = MemoryMetadataStore::new();
        store.create("x", "azure").await.unwrap();

        let err = store.create("x", "azure").await.unwrap_err();
        assert!(matches!(err, BlobError::Conflict { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_have_one_winner() {
        let store = Arc::new(MemoryMetadataStore::new());
        let attempts = (0..16).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create("race", "azure").await })
        });

        let mut wins = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => wins += 1,
                Err(BlobError::Conflict { .. }) => {}
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn mark_uploaded_is_idempotent() {
        let store = MemoryMetadataStore::new();
        store.create("x", "azure").await.unwrap();

        store.mark_uploaded("x").await.unwrap();
        store.mark_uploaded("x").await.unwrap();
        assert!(store.get("x").await.unwrap().uploaded);

        assert!(store.mark_uploaded("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn claims_are_fenced() {
        let store = MemoryMetadataStore::new();
        store.create("x", "azure").await.unwrap();
        let until = Utc::now() + Duration::minutes(5);

        let first = UploadToken::new();
        let second = UploadToken::new();
        assert_eq!(store.claim_upload("x", &first, until).await.unwrap(), UploadClaim::Acquired);
        assert_eq!(
            store.claim_upload("x", &second, until).await.unwrap(),
            UploadClaim::Held { lease_until: until }
        );

        // a stale token cannot drop someone else's lease
        store.release_upload("x", &second).await.unwrap();
        assert!(store.get("x").await.unwrap().upload.is_some());

        store.release_upload("x", &first).await.unwrap();
        assert_eq!(store.claim_upload("x", &second, until).await.unwrap(), UploadClaim::Acquired);

        store.mark_uploaded("x").await.unwrap();
        assert!(store.get("x").await.unwrap().upload.is_none());
        assert_eq!(
            store.claim_upload("x", &first, until).await.unwrap(),
            UploadClaim::AlreadyUploaded
        );
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let store = MemoryMetadataStore::new();
        store.create("x", "azure").await.unwrap();

        let stale = Utc::now() - Duration::seconds(1);
        store.claim_upload("x", &UploadToken::new(), stale).await.unwrap();

        let until = Utc::now() + Duration::minutes(5);
        assert_eq!(
            store.claim_upload("x", &UploadToken::new(), until).await.unwrap(),
            UploadClaim::Acquired
        );
    }

    #[tokio::test]
    async fn pending_excludes_uploaded() {
        let store = MemoryMetadataStore::new();
        store.create("a", "azure").await.unwrap();
        store.create("b", "azure").await.unwrap();
        store.mark_uploaded("a").await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "b");
    }
}
