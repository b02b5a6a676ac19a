use crate::config::Defaults;
use crate::storage::Storage;
use crate::types::{LogicalKey, PackageList, RepoMappings};

/// Outcome of [`ConfigRegistry::seed_repo_mappings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Nothing usable was stored; the defaults were written.
    Seeded(RepoMappings),
    /// Mappings already exist and were left alone.
    Existing(RepoMappings),
}

/// Tracked packages and their repository mappings.
///
/// Reads never fail: anything missing or unreadable resolves to the
/// configured defaults.
#[derive(Clone)]
pub struct ConfigRegistry {
    storage: Storage,
    defaults: Defaults,
}

impl ConfigRegistry {
    pub fn new(storage: Storage, defaults: Defaults) -> Self {
        ConfigRegistry { storage, defaults }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub async fn package_list(&self) -> PackageList {
        self.storage
            .read_json(&LogicalKey::PackageList)
            .await
            .unwrap_or_else(|| self.defaults.packages.clone())
    }

    pub async fn update_package_list(&self, packages: &PackageList) -> bool {
        let ok = self
            .storage
            .write_json(&LogicalKey::PackageList, packages)
            .await;
        tracing::info!(count = packages.len(), ok, "updated package list");
        ok
    }

    pub async fn repo_mappings(&self) -> RepoMappings {
        self.storage
            .read_json(&LogicalKey::RepoMappings)
            .await
            .unwrap_or_else(|| self.defaults.repo_mappings.clone())
    }

    pub async fn update_repo_mappings(&self, mappings: &RepoMappings) -> bool {
        let ok = self
            .storage
            .write_json(&LogicalKey::RepoMappings, mappings)
            .await;
        tracing::info!(count = mappings.len(), ok, "updated repo mappings");
        ok
    }

    /// Writes the default mappings if none are stored. Safe to call on every
    /// start.
    pub async fn seed_repo_mappings(&self) -> Option<SeedOutcome> {
        let stored: Option<RepoMappings> = self.storage.read_json(&LogicalKey::RepoMappings).await;

        match stored {
            Some(existing) if !existing.is_empty() => Some(SeedOutcome::Existing(existing)),
            _ => {
                let defaults = self.defaults.repo_mappings.clone();
                if !self.update_repo_mappings(&defaults).await {
                    return None;
                }
                tracing::info!("initialized repo mappings with defaults");
                Some(SeedOutcome::Seeded(defaults))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::backend::testutils::UnreachableStore;
    use crate::keys::KeyAliaser;
    use std::sync::Arc;

    fn empty_registry() -> ConfigRegistry {
        let storage = Storage::from_parts(None, Arc::new(MemoryStore::new()), KeyAliaser::default());
        ConfigRegistry::new(storage, Defaults::default())
    }

    #[tokio::test]
    async fn test_package_list_defaults_when_absent() {
        let registry = empty_registry();
        assert_eq!(registry.package_list().await, Defaults::default().packages);

        let list: PackageList = ["foo"].into_iter().collect();
        assert!(registry.update_package_list(&list).await);
        assert_eq!(registry.package_list().await, list);
    }

    #[tokio::test]
    async fn test_unparsable_list_falls_back_to_defaults() {
        let registry = empty_registry();
        registry.storage().set("package-list", "not json").await;
        assert_eq!(registry.package_list().await, Defaults::default().packages);
    }

    #[tokio::test]
    async fn test_durable_construction_failure_still_serves_defaults() {
        let keys = KeyAliaser::default();
        let storage = Storage::from_parts(
            Some(Arc::new(UnreachableStore)),
            Arc::new(MemoryStore::new()),
            keys,
        );
        let registry = ConfigRegistry::new(storage, Defaults::default());

        assert_eq!(registry.package_list().await, Defaults::default().packages);
        assert_eq!(registry.repo_mappings().await, Defaults::default().repo_mappings);
    }

    #[tokio::test]
    async fn test_seed_repo_mappings() {
        let registry = empty_registry();

        let outcome = registry.seed_repo_mappings().await.unwrap();
        assert_eq!(
            outcome,
            SeedOutcome::Seeded(Defaults::default().repo_mappings)
        );

        let custom: RepoMappings = [("foo", "org/foo")].into_iter().collect();
        assert!(registry.update_repo_mappings(&custom).await);
        assert_eq!(
            registry.seed_repo_mappings().await,
            Some(SeedOutcome::Existing(custom.clone()))
        );
        assert_eq!(registry.repo_mappings().await, custom);
    }

    #[tokio::test]
    async fn test_seed_replaces_empty_mappings() {
        let registry = empty_registry();
        assert!(registry.update_repo_mappings(&RepoMappings::default()).await);

        assert!(matches!(
            registry.seed_repo_mappings().await,
            Some(SeedOutcome::Seeded(_))
        ));
        assert_eq!(registry.repo_mappings().await.len(), 7);
    }
}
