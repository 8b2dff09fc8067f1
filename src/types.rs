use serde::de::Deserializer;
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TimetableError;

/// One physical stop row of the wide-format table, keyed by column header
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// The six record kinds produced by the normalizer, in load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Stop,
    BusService,
    Route,
    RouteStop,
    Trip,
    StopTime,
}

impl EntityKind {
    /// Dependency order: every kind only references kinds listed before it
    pub const LOAD_ORDER: [EntityKind; 6] = [
        EntityKind::Stop,
        EntityKind::BusService,
        EntityKind::Route,
        EntityKind::RouteStop,
        EntityKind::Trip,
        EntityKind::StopTime,
    ];

    /// Table name, also used as the output file stem and metrics label
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Stop => "stops",
            EntityKind::BusService => "bus_services",
            EntityKind::Route => "routes",
            EntityKind::RouteStop => "route_stops",
            EntityKind::Trip => "trips",
            EntityKind::StopTime => "stop_times",
        }
    }

    /// Kinds whose store ids must be known before this kind can be written
    pub fn dependencies(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Stop | EntityKind::BusService => &[],
            EntityKind::Route => &[EntityKind::BusService],
            EntityKind::RouteStop => &[EntityKind::Route, EntityKind::Stop],
            EntityKind::Trip => &[EntityKind::Route, EntityKind::BusService],
            EntityKind::StopTime => &[EntityKind::Trip, EntityKind::RouteStop],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Stop => "stop",
            EntityKind::BusService => "bus service",
            EntityKind::Route => "route",
            EntityKind::RouteStop => "route stop",
            EntityKind::Trip => "trip",
            EntityKind::StopTime => "stop time",
        };
        f.write_str(label)
    }
}

/// Business identifier correlating records before durable ids exist.
/// The variant determines which entity kind the key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    Stop { stop_name: String },
    Service { service_number: String },
    /// Routes are 1:1 with services, so the service number identifies them
    Route { service_number: String },
    RouteStop { service_number: String, sequence_number: u32 },
    Trip { column_reference: String },
    StopTime { column_reference: String, sequence_number: u32 },
}

impl NaturalKey {
    pub fn stop(stop_name: impl Into<String>) -> Self {
        NaturalKey::Stop { stop_name: stop_name.into() }
    }

    pub fn service(service_number: impl Into<String>) -> Self {
        NaturalKey::Service { service_number: service_number.into() }
    }

    pub fn route(service_number: impl Into<String>) -> Self {
        NaturalKey::Route { service_number: service_number.into() }
    }

    pub fn route_stop(service_number: impl Into<String>, sequence_number: u32) -> Self {
        NaturalKey::RouteStop {
            service_number: service_number.into(),
            sequence_number,
        }
    }

    pub fn trip(column_reference: impl Into<String>) -> Self {
        NaturalKey::Trip { column_reference: column_reference.into() }
    }

    pub fn stop_time(column_reference: impl Into<String>, sequence_number: u32) -> Self {
        NaturalKey::StopTime {
            column_reference: column_reference.into(),
            sequence_number,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            NaturalKey::Stop { .. } => EntityKind::Stop,
            NaturalKey::Service { .. } => EntityKind::BusService,
            NaturalKey::Route { .. } => EntityKind::Route,
            NaturalKey::RouteStop { .. } => EntityKind::RouteStop,
            NaturalKey::Trip { .. } => EntityKind::Trip,
            NaturalKey::StopTime { .. } => EntityKind::StopTime,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Stop { stop_name } => write!(f, "stop '{stop_name}'"),
            NaturalKey::Service { service_number } => write!(f, "service '{service_number}'"),
            NaturalKey::Route { service_number } => write!(f, "route of service '{service_number}'"),
            NaturalKey::RouteStop { service_number, sequence_number } => {
                write!(f, "route stop #{sequence_number} of service '{service_number}'")
            }
            NaturalKey::Trip { column_reference } => write!(f, "trip '{column_reference}'"),
            NaturalKey::StopTime { column_reference, sequence_number } => {
                write!(f, "stop time #{sequence_number} of trip '{column_reference}'")
            }
        }
    }
}

/// Foreign-key field. Passes emit `Pending` links carrying the natural key of
/// the target; the link pass swaps them for the target's synthetic id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Pending(NaturalKey),
    Resolved(u32),
}

impl Link {
    pub fn id(&self) -> Option<u32> {
        match self {
            Link::Resolved(id) => Some(*id),
            Link::Pending(_) => None,
        }
    }

    pub fn pending_key(&self) -> Option<&NaturalKey> {
        match self {
            Link::Pending(key) => Some(key),
            Link::Resolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Link::Resolved(_))
    }
}

// Only resolved links have a wire form; writing a pending one is a bug upstream.
impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Link::Resolved(id) => serializer.serialize_u32(*id),
            Link::Pending(key) => Err(S::Error::custom(TimetableError::PendingLink(key.clone()))),
        }
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Link::Resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: u32,
    pub stop_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusService {
    pub service_id: u32,
    pub service_number: String,
    pub service_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: u32,
    pub service_id: Link,
    pub route_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub route_stop_id: u32,
    pub route_id: Link,
    pub stop_id: Link,
    pub sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: u32,
    pub route_id: Link,
    pub service_id: Link,
    pub start_time: String,
    pub day_of_week: String,
    pub column_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    pub stop_time_id: u32,
    pub trip_id: Link,
    pub route_stop_id: Link,
    pub departure_time: Option<String>,
    pub is_skipped: bool,
}

/// The six normalized record sets of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timetable {
    pub services: Vec<BusService>,
    pub stops: Vec<Stop>,
    pub routes: Vec<Route>,
    pub route_stops: Vec<RouteStop>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
}

impl Timetable {
    pub fn counts(&self) -> RecordCounts {
        RecordCounts {
            services: self.services.len(),
            stops: self.stops.len(),
            routes: self.routes.len(),
            route_stops: self.route_stops.len(),
            trips: self.trips.len(),
            stop_times: self.stop_times.len(),
        }
    }

    pub fn count_of(&self, kind: EntityKind) -> usize {
        let counts = self.counts();
        match kind {
            EntityKind::Stop => counts.stops,
            EntityKind::BusService => counts.services,
            EntityKind::Route => counts.routes,
            EntityKind::RouteStop => counts.route_stops,
            EntityKind::Trip => counts.trips,
            EntityKind::StopTime => counts.stop_times,
        }
    }

    /// True once every foreign key has been resolved
    pub fn is_linked(&self) -> bool {
        self.routes.iter().all(|r| r.service_id.is_resolved())
            && self
                .route_stops
                .iter()
                .all(|rs| rs.route_id.is_resolved() && rs.stop_id.is_resolved())
            && self
                .trips
                .iter()
                .all(|t| t.route_id.is_resolved() && t.service_id.is_resolved())
            && self
                .stop_times
                .iter()
                .all(|st| st.trip_id.is_resolved() && st.route_stop_id.is_resolved())
    }
}

/// Per-kind record counts reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub services: usize,
    pub stops: usize,
    pub routes: usize,
    pub route_stops: usize,
    pub trips: usize,
    pub stop_times: usize,
}

impl fmt::Display for RecordCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   - {} bus services", self.services)?;
        writeln!(f, "   - {} stops", self.stops)?;
        writeln!(f, "   - {} routes", self.routes)?;
        writeln!(f, "   - {} route stops", self.route_stops)?;
        writeln!(f, "   - {} trips", self.trips)?;
        write!(f, "   - {} stop times", self.stop_times)
    }
}
