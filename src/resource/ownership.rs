use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Persistence collaborator answering "which organization owns this file?"
///
/// Implementations look the owning record up by the canonical resource URL
/// (e.g. `/uploads/students/42/photo.jpg`) and return its scope, typically the
/// owning school's id.
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    async fn owner_scope(&self, resource_url: &str) -> Result<Option<String>>;
}

/// In-memory ownership records, seeded from configuration or tests
#[derive(Debug, Default)]
pub struct InMemoryOwnership {
    owners: DashMap<String, String>,
}

impl InMemoryOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(owners: &HashMap<String, String>) -> Self {
        let store = Self::new();
        for (url, scope) in owners {
            store.insert(url.clone(), scope.clone());
        }
        store
    }

    pub fn insert(&self, resource_url: impl Into<String>, scope: impl Into<String>) {
        self.owners.insert(resource_url.into(), scope.into());
    }

    pub fn remove(&self, resource_url: &str) {
        self.owners.remove(resource_url);
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[async_trait]
impl OwnershipLookup for InMemoryOwnership {
    async fn owner_scope(&self, resource_url: &str) -> Result<Option<String>> {
        Ok(self.owners.get(resource_url).map(|scope| scope.clone()))
    }
}
