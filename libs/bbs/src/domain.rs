//! Domain freshness markers.
//!
//! A domain is live for as long as its presence key has not expired. Owners
//! keep it live by upserting it again before the TTL lapses.

use std::sync::Arc;

use bbs_models::DomainSet;
use bbs_store::{KeyedStore, StoreNode};
use tracing::{debug, instrument};

use crate::paths::{domain_schema_path, last_segment, DOMAIN_SCHEMA_ROOT};
use crate::{BbsError, BbsResult};

#[derive(Clone)]
pub struct DomainBbs {
    store: Arc<dyn KeyedStore>,
}

impl DomainBbs {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Mark `domain` live for `ttl_in_seconds`. A TTL of zero never expires.
    ///
    /// Every call rewrites the key, so the stored index advances even when
    /// nothing else changed.
    #[instrument(skip(self))]
    pub async fn upsert_domain(&self, domain: &str, ttl_in_seconds: i64) -> BbsResult<()> {
        if domain.is_empty() || domain.contains('/') {
            return Err(BbsError::InvalidParameter { field: "domain" });
        }
        let ttl = u64::try_from(ttl_in_seconds).map_err(|_| BbsError::InvalidParameter {
            field: "ttl_in_seconds",
        })?;

        let written = self
            .store
            .set(StoreNode::new(domain_schema_path(domain), Vec::new()).with_ttl(ttl))
            .await?;

        debug!(index = written.index, "Domain upserted");
        Ok(())
    }

    /// Names of all domains whose presence key is still live.
    pub async fn domains(&self) -> BbsResult<DomainSet> {
        let nodes = self.store.list_recursively(DOMAIN_SCHEMA_ROOT).await?;
        Ok(nodes
            .iter()
            .map(|node| last_segment(&node.key).to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bbs_store::MemoryStore;
    use rstest::rstest;

    use super::*;

    fn setup() -> (Arc<MemoryStore>, DomainBbs) {
        let store = Arc::new(MemoryStore::new());
        let bbs = DomainBbs::new(store.clone());
        (store, bbs)
    }

    #[tokio::test]
    async fn test_upsert_creates_domain() {
        let (store, bbs) = setup();
        bbs.upsert_domain("the-domain", 100).await.unwrap();

        let node = store.get("/v1/domain/the-domain").await.unwrap();
        assert_eq!(node.ttl, 100);
        assert!(node.value.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_existing_domain_bumps_index() {
        let (store, bbs) = setup();
        bbs.upsert_domain("the-domain", 100).await.unwrap();
        let first = store.get("/v1/domain/the-domain").await.unwrap();

        bbs.upsert_domain("the-domain", 100).await.unwrap();
        let second = store.get("/v1/domain/the-domain").await.unwrap();

        assert!(second.index > first.index);
        assert_eq!(second.ttl, 100);
    }

    #[rstest]
    #[case("", 10, "domain")]
    #[case("a/b", 10, "domain")]
    #[case("the-domain", -1, "ttl_in_seconds")]
    #[tokio::test]
    async fn test_upsert_rejects_invalid_parameters(
        #[case] domain: &str,
        #[case] ttl: i64,
        #[case] expected_field: &str,
    ) {
        let (store, bbs) = setup();
        let err = bbs.upsert_domain(domain, ttl).await.unwrap_err();

        match err {
            BbsError::InvalidParameter { field } => assert_eq!(field, expected_field),
            other => panic!("expected invalid parameter, got {other:?}"),
        }
        assert!(store.list_recursively("/v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_domains_empty() {
        let (_store, bbs) = setup();
        assert!(bbs.domains().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_expire() {
        let (_store, bbs) = setup();
        bbs.upsert_domain("d1", 2).await.unwrap();
        bbs.upsert_domain("d2", 10).await.unwrap();

        let domains = bbs.domains().await.unwrap();
        assert_eq!(domains, DomainSet::from(["d1".to_string(), "d2".to_string()]));

        tokio::time::sleep(Duration::from_millis(3001)).await;

        let domains = bbs.domains().await.unwrap();
        assert_eq!(domains, DomainSet::from(["d2".to_string()]));
    }

    #[tokio::test]
    async fn test_domains_surface_store_failure() {
        let (store, bbs) = setup();
        store.set_unavailable(true);
        assert!(matches!(bbs.domains().await.unwrap_err(), BbsError::Store(_)));
    }
}
