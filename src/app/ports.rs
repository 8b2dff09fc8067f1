use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{EntityKind, NaturalKey, RawRow, Timetable};

/// Identifier assigned by a record store, distinct from the synthetic ids
pub type StoreId = Uuid;

/// Supplies the wide-format table, one row per physical stop, in sheet order
pub trait RowSource {
    fn read_rows(&self) -> Result<Vec<RawRow>>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Hands a complete, linked timetable off for storage
pub trait RecordSink {
    fn write(&self, timetable: &Timetable) -> Result<()>;
}

/// A record ready for a store: its natural fields, its natural key and
/// foreign keys already resolved to store ids
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    pub key: NaturalKey,
    pub fields: RecordFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum RecordFields {
    Stop {
        stop_name: String,
        description: String,
    },
    BusService {
        service_number: String,
        service_name: String,
        description: String,
    },
    Route {
        route_name: String,
        service_id: StoreId,
    },
    RouteStop {
        route_stop_id: u32,
        route_id: StoreId,
        stop_id: StoreId,
        sequence_number: u32,
    },
    Trip {
        trip_id: u32,
        route_id: StoreId,
        service_id: StoreId,
        start_time: i64,
        day_of_week: String,
    },
    StopTime {
        trip_id: StoreId,
        route_stop_id: StoreId,
        departure_time: Option<String>,
        is_skipped: bool,
    },
}

impl NewRecord {
    pub fn kind(&self) -> EntityKind {
        self.key.kind()
    }
}

/// Durable storage for normalized records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one record and return the identifier the store assigned to it
    async fn create(&self, record: NewRecord) -> Result<StoreId>;

    /// Natural keys and store ids of every persisted record of one kind
    async fn list_keys(&self, kind: EntityKind) -> Result<Vec<(NaturalKey, StoreId)>>;
}
