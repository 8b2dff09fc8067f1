use std::collections::HashMap;
use tracing::{debug, warn};

use crate::app::ports::{RecordStore, StoreId};
use crate::error::{Result, TimetableError};
use crate::types::{EntityKind, Link, NaturalKey, Timetable};

/// Natural key -> durable id.
///
/// Built from the normalizer's synthetic ids in a single process, or from a
/// store's persisted records when loading. Lookups never fall back to a
/// placeholder: an unknown key means something was written out of order.
#[derive(Debug, Clone)]
pub struct KeyResolver<Id> {
    ids: HashMap<NaturalKey, Id>,
}

impl<Id> Default for KeyResolver<Id> {
    fn default() -> Self {
        Self { ids: HashMap::new() }
    }
}

impl<Id: Copy> KeyResolver<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`. The first registration wins; returns false for duplicates.
    pub fn insert(&mut self, key: NaturalKey, id: Id) -> bool {
        match self.ids.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
        }
    }

    pub fn resolve(&self, key: &NaturalKey) -> Result<Id> {
        self.ids
            .get(key)
            .copied()
            .ok_or_else(|| TimetableError::Unresolved {
                kind: key.kind(),
                key: key.clone(),
            })
    }

    /// Absorb another resolver's keys, keeping existing entries on conflict
    pub fn extend(&mut self, other: KeyResolver<Id>) {
        for (key, id) in other.ids {
            self.insert(key, id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl KeyResolver<u32> {
    /// Resolver over a timetable's own synthetic ids
    pub fn from_timetable(timetable: &Timetable) -> Self {
        SyntheticIndex::build(timetable).to_resolver()
    }
}

impl KeyResolver<StoreId> {
    /// Resolver over the records of one kind already persisted in `store`
    pub async fn from_store(store: &dyn RecordStore, kind: EntityKind) -> Result<Self> {
        let mut resolver = Self::new();
        for (key, id) in store.list_keys(kind).await? {
            if key.kind() != kind {
                return Err(TimetableError::Store {
                    message: format!("listing {} returned key {}", kind.table_name(), key),
                });
            }
            resolver.insert(key, id);
        }
        debug!("Built {} resolver with {} keys from store", kind, resolver.len());
        Ok(resolver)
    }
}

/// (kind, synthetic id) -> natural key, the reverse of `KeyResolver<u32>`.
///
/// Records read back from JSON only carry synthetic foreign keys; the loader
/// goes through this index to find the natural key a store can resolve.
#[derive(Debug, Clone, Default)]
pub struct SyntheticIndex {
    keys: HashMap<(EntityKind, u32), NaturalKey>,
}

impl SyntheticIndex {
    /// Index every record whose natural key can be derived. A record whose
    /// key depends on a dangling foreign key is left out, so lookups for it
    /// fail later instead of aborting the whole build.
    pub fn build(timetable: &Timetable) -> Self {
        let mut index = Self::default();

        for stop in &timetable.stops {
            index.insert(EntityKind::Stop, stop.stop_id, NaturalKey::stop(&stop.stop_name));
        }
        for service in &timetable.services {
            index.insert(
                EntityKind::BusService,
                service.service_id,
                NaturalKey::service(&service.service_number),
            );
        }
        for route in &timetable.routes {
            match index.target_key(&route.service_id, EntityKind::BusService) {
                Ok(NaturalKey::Service { service_number }) => {
                    index.insert(EntityKind::Route, route.route_id, NaturalKey::route(service_number));
                }
                other => skipped(EntityKind::Route, route.route_id, other),
            }
        }
        for route_stop in &timetable.route_stops {
            match index.target_key(&route_stop.route_id, EntityKind::Route) {
                Ok(NaturalKey::Route { service_number }) => index.insert(
                    EntityKind::RouteStop,
                    route_stop.route_stop_id,
                    NaturalKey::route_stop(service_number, route_stop.sequence_number),
                ),
                other => skipped(EntityKind::RouteStop, route_stop.route_stop_id, other),
            }
        }
        for trip in &timetable.trips {
            index.insert(EntityKind::Trip, trip.trip_id, NaturalKey::trip(&trip.column_reference));
        }
        for stop_time in &timetable.stop_times {
            let trip = index.target_key(&stop_time.trip_id, EntityKind::Trip);
            let route_stop = index.target_key(&stop_time.route_stop_id, EntityKind::RouteStop);
            match (trip, route_stop) {
                (
                    Ok(NaturalKey::Trip { column_reference }),
                    Ok(NaturalKey::RouteStop { sequence_number, .. }),
                ) => index.insert(
                    EntityKind::StopTime,
                    stop_time.stop_time_id,
                    NaturalKey::stop_time(column_reference, sequence_number),
                ),
                (Err(e), _) | (_, Err(e)) => skipped(EntityKind::StopTime, stop_time.stop_time_id, Err(e)),
                (Ok(key), _) => skipped(EntityKind::StopTime, stop_time.stop_time_id, Ok(key)),
            }
        }

        index
    }

    fn insert(&mut self, kind: EntityKind, id: u32, key: NaturalKey) {
        self.keys.entry((kind, id)).or_insert(key);
    }

    pub fn key_of(&self, kind: EntityKind, id: u32) -> Result<&NaturalKey> {
        self.keys
            .get(&(kind, id))
            .ok_or(TimetableError::UnknownId { kind, id })
    }

    /// Natural key of a link's target, whether still pending or already resolved
    pub fn target_key(&self, link: &Link, kind: EntityKind) -> Result<NaturalKey> {
        match link {
            Link::Pending(key) => Ok(key.clone()),
            Link::Resolved(id) => self.key_of(kind, *id).cloned(),
        }
    }

    pub fn to_resolver(&self) -> KeyResolver<u32> {
        let mut resolver = KeyResolver::new();
        for ((_, id), key) in &self.keys {
            resolver.insert(key.clone(), *id);
        }
        resolver
    }
}

fn skipped(kind: EntityKind, id: u32, target: Result<NaturalKey>) {
    match target {
        Ok(key) => warn!("{} {} links to unexpected {}, not indexed", kind, id, key),
        Err(e) => warn!("{} {} not indexed: {}", kind, id, e),
    }
}
