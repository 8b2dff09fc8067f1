use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::app::ports::{NewRecord, RecordStore, StoreId};
use crate::error::{Result, TimetableError};
use crate::types::{EntityKind, NaturalKey};

/// In-memory record store for development/testing.
/// Natural keys are unique per table, like a unique column in a real database.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<HashMap<EntityKind, Vec<(StoreId, NewRecord)>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted records of one kind, in write order
    pub fn records(&self, kind: EntityKind) -> Vec<(StoreId, NewRecord)> {
        let tables = self.tables.lock().unwrap();
        tables.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.get(&kind).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create(&self, record: NewRecord) -> Result<StoreId> {
        let kind = record.kind();
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(kind).or_default();

        if table.iter().any(|(_, existing)| existing.key == record.key) {
            return Err(TimetableError::Store {
                message: format!("duplicate {} in {}", record.key, kind.table_name()),
            });
        }

        let id = Uuid::new_v4();
        debug!("Created {} with id {}", record.key, id);
        table.push((id, record));
        Ok(id)
    }

    async fn list_keys(&self, kind: EntityKind) -> Result<Vec<(NaturalKey, StoreId)>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(&kind)
            .map(|table| table.iter().map(|(id, r)| (r.key.clone(), *id)).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::RecordFields;

    fn stop(name: &str) -> NewRecord {
        NewRecord {
            key: NaturalKey::stop(name),
            fields: RecordFields::Stop {
                stop_name: name.to_string(),
                description: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_create_then_list_keys() {
        let store = InMemoryStore::new();
        let id = store.create(stop("Quay")).await.unwrap();

        let keys = store.list_keys(EntityKind::Stop).await.unwrap();
        assert_eq!(keys, vec![(NaturalKey::stop("Quay"), id)]);
        assert!(store.list_keys(EntityKind::Trip).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_is_rejected() {
        let store = InMemoryStore::new();
        store.create(stop("Quay")).await.unwrap();

        let err = store.create(stop("Quay")).await.unwrap_err();
        assert!(matches!(err, TimetableError::Store { .. }));
        assert_eq!(store.count(EntityKind::Stop), 1);
    }
}
