use metrics::counter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::app::ports::{NewRecord, RecordFields, RecordStore, StoreId};
use crate::error::Result;
use crate::pipeline::resolver::{KeyResolver, SyntheticIndex};
use crate::pipeline::throttle::WriteThrottle;
use crate::types::{BusService, EntityKind, Link, NaturalKey, Route, RouteStop, Stop, StopTime, Timetable, Trip};

/// Why a single record was not persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// A foreign key (or the record's own key) had no mapping; the record was skipped
    UnresolvedKey(String),
    /// A field could not be converted to the store's shape
    InvalidField(String),
    /// The store rejected the write
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub kind: EntityKind,
    /// Synthetic id of the record in the normalized output
    pub record_id: u32,
    pub reason: FailureReason,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::UnresolvedKey(msg) => write!(f, "{} {} skipped: {}", self.kind, self.record_id, msg),
            FailureReason::InvalidField(msg) => write!(f, "{} {} skipped: {}", self.kind, self.record_id, msg),
            FailureReason::WriteFailed(msg) => write!(f, "{} {} failed to write: {}", self.kind, self.record_id, msg),
        }
    }
}

/// Outcome of loading one timetable into a store
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub written: BTreeMap<EntityKind, usize>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn written_of(&self, kind: EntityKind) -> usize {
        self.written.get(&kind).copied().unwrap_or(0)
    }

    pub fn failures_of(&self, kind: EntityKind) -> impl Iterator<Item = &LoadFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in EntityKind::LOAD_ORDER {
            writeln!(
                f,
                "   - {} {} written ({} failed)",
                self.written_of(kind),
                kind.table_name(),
                self.failures_of(kind).count()
            )?;
        }
        for failure in &self.failures {
            writeln!(f, "   ! {failure}")?;
        }
        Ok(())
    }
}

/// Loads a linked timetable into a record store, one entity kind at a time.
///
/// Kinds are written in dependency order and every write is awaited before the
/// next, since resolving a dependent's foreign keys needs its targets visible
/// in the store. Per-record failures are collected; only a failure to read the
/// store's keys aborts the load.
pub struct LoadUseCase {
    store: Arc<dyn RecordStore>,
    throttles: HashMap<EntityKind, WriteThrottle>,
}

impl LoadUseCase {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            throttles: HashMap::new(),
        }
    }

    /// Gate writes of `kind` behind `throttle`
    pub fn with_throttle(mut self, kind: EntityKind, throttle: WriteThrottle) -> Self {
        self.throttles.insert(kind, throttle);
        self
    }

    #[instrument(skip_all)]
    pub async fn load(&self, timetable: &Timetable) -> Result<LoadReport> {
        let index = SyntheticIndex::build(timetable);
        let mut report = LoadReport::default();

        for kind in EntityKind::LOAD_ORDER {
            self.load_kind(kind, timetable, &index, &mut report).await?;
        }

        info!(
            "Load finished: {} records written, {} failures",
            report.written.values().sum::<usize>(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Store ids of every kind `kind` references, read back from the store
    async fn dependency_resolver(&self, kind: EntityKind) -> Result<KeyResolver<StoreId>> {
        let mut resolver = KeyResolver::new();
        for dep in kind.dependencies() {
            resolver.extend(KeyResolver::from_store(self.store.as_ref(), *dep).await?);
        }
        Ok(resolver)
    }

    #[instrument(skip(self, timetable, index, report), fields(table = kind.table_name()))]
    async fn load_kind(
        &self,
        kind: EntityKind,
        timetable: &Timetable,
        index: &SyntheticIndex,
        report: &mut LoadReport,
    ) -> Result<()> {
        let resolver = self.dependency_resolver(kind).await?;
        let drafts = Drafts {
            index,
            resolver: &resolver,
        }
        .prepare(kind, timetable);

        let unlimited = WriteThrottle::unlimited();
        let throttle = self.throttles.get(&kind).unwrap_or(&unlimited);
        let mut written = 0usize;
        let failures_before = report.failures.len();

        for (record_id, draft) in drafts {
            let record = match draft {
                Ok(record) => record,
                Err(reason) => {
                    warn!("Skipping {} {}: {:?}", kind, record_id, reason);
                    report.failures.push(LoadFailure { kind, record_id, reason });
                    continue;
                }
            };

            throttle.acquire().await;
            match self.store.create(record).await {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!("Error inserting {} {}: {}", kind, record_id, e);
                    report.failures.push(LoadFailure {
                        kind,
                        record_id,
                        reason: FailureReason::WriteFailed(e.to_string()),
                    });
                }
            }
        }

        let failed = report.failures.len() - failures_before;
        counter!("timetable_records_written_total", "table" => kind.table_name()).increment(written as u64);
        counter!("timetable_records_failed_total", "table" => kind.table_name()).increment(failed as u64);
        info!("Seeded {} {} ({} failed)", written, kind.table_name(), failed);

        report.written.insert(kind, written);
        Ok(())
    }
}

type Draft = std::result::Result<NewRecord, FailureReason>;

/// Turns normalized records into store records, resolving synthetic foreign
/// keys through their natural keys to the store's ids
struct Drafts<'a> {
    index: &'a SyntheticIndex,
    resolver: &'a KeyResolver<StoreId>,
}

impl Drafts<'_> {
    fn prepare(&self, kind: EntityKind, timetable: &Timetable) -> Vec<(u32, Draft)> {
        match kind {
            EntityKind::Stop => timetable.stops.iter().map(|s| (s.stop_id, self.stop(s))).collect(),
            EntityKind::BusService => timetable
                .services
                .iter()
                .map(|s| (s.service_id, self.service(s)))
                .collect(),
            EntityKind::Route => timetable.routes.iter().map(|r| (r.route_id, self.route(r))).collect(),
            EntityKind::RouteStop => timetable
                .route_stops
                .iter()
                .map(|rs| (rs.route_stop_id, self.route_stop(rs)))
                .collect(),
            EntityKind::Trip => timetable.trips.iter().map(|t| (t.trip_id, self.trip(t))).collect(),
            EntityKind::StopTime => timetable
                .stop_times
                .iter()
                .map(|st| (st.stop_time_id, self.stop_time(st)))
                .collect(),
        }
    }

    fn stop(&self, stop: &Stop) -> Draft {
        Ok(NewRecord {
            key: self.own_key(EntityKind::Stop, stop.stop_id)?,
            fields: RecordFields::Stop {
                stop_name: stop.stop_name.clone(),
                description: stop.description.clone(),
            },
        })
    }

    fn service(&self, service: &BusService) -> Draft {
        Ok(NewRecord {
            key: self.own_key(EntityKind::BusService, service.service_id)?,
            fields: RecordFields::BusService {
                service_number: service.service_number.clone(),
                service_name: service.service_name.clone(),
                description: service.description.clone(),
            },
        })
    }

    fn route(&self, route: &Route) -> Draft {
        Ok(NewRecord {
            key: self.own_key(EntityKind::Route, route.route_id)?,
            fields: RecordFields::Route {
                route_name: route.route_name.clone(),
                service_id: self.store_id(&route.service_id, EntityKind::BusService)?,
            },
        })
    }

    fn route_stop(&self, route_stop: &RouteStop) -> Draft {
        Ok(NewRecord {
            key: self.own_key(EntityKind::RouteStop, route_stop.route_stop_id)?,
            fields: RecordFields::RouteStop {
                route_stop_id: route_stop.route_stop_id,
                route_id: self.store_id(&route_stop.route_id, EntityKind::Route)?,
                stop_id: self.store_id(&route_stop.stop_id, EntityKind::Stop)?,
                sequence_number: route_stop.sequence_number,
            },
        })
    }

    fn trip(&self, trip: &Trip) -> Draft {
        // Stores keep start times as integers: "0851" -> 851. Anything but
        // a whole number ("08:51", "8am") is rejected rather than truncated.
        let start_time = trip.start_time.trim().parse::<i64>().map_err(|_| {
            FailureReason::InvalidField(format!("start_time '{}' is not numeric", trip.start_time))
        })?;
        Ok(NewRecord {
            key: self.own_key(EntityKind::Trip, trip.trip_id)?,
            fields: RecordFields::Trip {
                trip_id: trip.trip_id,
                route_id: self.store_id(&trip.route_id, EntityKind::Route)?,
                service_id: self.store_id(&trip.service_id, EntityKind::BusService)?,
                start_time,
                day_of_week: trip.day_of_week.clone(),
            },
        })
    }

    fn stop_time(&self, stop_time: &StopTime) -> Draft {
        Ok(NewRecord {
            key: self.own_key(EntityKind::StopTime, stop_time.stop_time_id)?,
            fields: RecordFields::StopTime {
                trip_id: self.store_id(&stop_time.trip_id, EntityKind::Trip)?,
                route_stop_id: self.store_id(&stop_time.route_stop_id, EntityKind::RouteStop)?,
                departure_time: stop_time.departure_time.clone(),
                is_skipped: stop_time.is_skipped,
            },
        })
    }

    fn own_key(&self, kind: EntityKind, id: u32) -> std::result::Result<NaturalKey, FailureReason> {
        self.index
            .key_of(kind, id)
            .cloned()
            .map_err(|e| FailureReason::UnresolvedKey(e.to_string()))
    }

    fn store_id(&self, link: &Link, target: EntityKind) -> std::result::Result<StoreId, FailureReason> {
        let key = self
            .index
            .target_key(link, target)
            .map_err(|e| FailureReason::UnresolvedKey(e.to_string()))?;
        self.resolver
            .resolve(&key)
            .map_err(|e| FailureReason::UnresolvedKey(e.to_string()))
    }
}
