use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::constants;
use crate::error::{Result, TimetableError};
use crate::pipeline::classify::{classify, ColumnLayout};
use crate::pipeline::link::link;
use crate::pipeline::resolver::KeyResolver;
use crate::types::{BusService, Link, NaturalKey, RawRow, Route, RouteStop, Stop, StopTime, Timetable, Trip};

/// Display name and description for a known service number
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
}

impl ServiceInfo {
    /// Entries of the built-in catalog, keyed by service number
    pub fn default_catalog() -> impl Iterator<Item = (String, ServiceInfo)> {
        constants::DEFAULT_SERVICE_CATALOG
            .iter()
            .map(|(number, name, description)| {
                (
                    number.to_string(),
                    ServiceInfo {
                        name: name.to_string(),
                        description: description.to_string(),
                    },
                )
            })
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Header of the column holding stop names
    pub location_column: String,
    /// Cell value marking a stop the trip does not serve
    pub no_service: String,
    /// First trip id; ids below it are reserved
    pub trip_id_offset: u32,
    /// First stop-time id; ids below it are reserved
    pub stop_time_id_offset: u32,
    pub day_of_week: String,
    pub service_catalog: HashMap<String, ServiceInfo>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            location_column: constants::LOCATION_COLUMN.to_string(),
            no_service: constants::NO_SERVICE_SENTINEL.to_string(),
            trip_id_offset: constants::TRIP_ID_OFFSET,
            stop_time_id_offset: constants::STOP_TIME_ID_OFFSET,
            day_of_week: constants::DEFAULT_DAY_OF_WEEK.to_string(),
            service_catalog: ServiceInfo::default_catalog().collect(),
        }
    }
}

/// Text of a scalar cell, or `None` when the cell is missing or blank.
/// Numbers keep their JSON spelling so `800` stays `"800"`.
pub fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Derives the six relational record sets from a wide-format timetable
pub struct EntityNormalizer {
    options: NormalizeOptions,
}

impl EntityNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Run every pass and the link pass; the result has no pending links
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub fn normalize(&self, rows: &[RawRow]) -> Result<Timetable> {
        let (mut timetable, keys) = self.normalize_pending(rows)?;
        link(&mut timetable, &keys)?;
        info!("Normalized timetable: {:?}", timetable.counts());
        Ok(timetable)
    }

    /// Run the six passes, leaving foreign keys as pending natural-key links.
    /// Also returns the natural key -> synthetic id map the passes built.
    pub fn normalize_pending(&self, rows: &[RawRow]) -> Result<(Timetable, KeyResolver<u32>)> {
        if rows.is_empty() {
            return Err(TimetableError::EmptySource);
        }

        let headers = rows.iter().flat_map(|row| row.keys().map(String::as_str));
        let layout = classify(headers, &self.options.location_column)?;
        debug!(
            "Classified {} trip columns into {} services",
            layout.trip_columns.len(),
            layout.services.len()
        );

        let mut keys = KeyResolver::new();
        let stops = self.extract_stops(rows, &layout, &mut keys);
        let services = self.extract_services(&layout, &mut keys);
        let routes = self.derive_routes(&services, &mut keys);
        let route_stops = self.derive_route_stops(rows, &layout, &mut keys);
        let trips = self.derive_trips(rows, &layout, &mut keys)?;
        let stop_times = self.derive_stop_times(rows, &layout, &trips, &route_stops, &mut keys)?;

        Ok((
            Timetable {
                services,
                stops,
                routes,
                route_stops,
                trips,
                stop_times,
            },
            keys,
        ))
    }

    fn location(&self, row: &RawRow, layout: &ColumnLayout) -> Option<String> {
        cell_text(row.get(&layout.location_column))
    }

    /// Cell text when the trip serves this stop: non-blank and not the sentinel
    fn served(&self, row: &RawRow, column: &str) -> Option<String> {
        cell_text(row.get(column)).filter(|text| *text != self.options.no_service)
    }

    /// Pass 1: one stop per distinct location, numbered by first appearance
    fn extract_stops(&self, rows: &[RawRow], layout: &ColumnLayout, keys: &mut KeyResolver<u32>) -> Vec<Stop> {
        let mut stops = Vec::new();

        for row in rows {
            let Some(stop_name) = self.location(row, layout) else {
                continue;
            };
            let stop_id = stops.len() as u32 + 1;
            if keys.insert(NaturalKey::stop(&stop_name), stop_id) {
                stops.push(Stop {
                    stop_id,
                    stop_name,
                    description: String::new(),
                });
            }
        }

        debug!("Extracted {} stops", stops.len());
        stops
    }

    /// Pass 2: one service per base service, decorated from the catalog
    fn extract_services(&self, layout: &ColumnLayout, keys: &mut KeyResolver<u32>) -> Vec<BusService> {
        layout
            .services
            .iter()
            .zip(1u32..)
            .map(|(number, service_id)| {
                let info = self
                    .options
                    .service_catalog
                    .get(number)
                    .cloned()
                    .unwrap_or_default();
                keys.insert(NaturalKey::service(number), service_id);
                BusService {
                    service_id,
                    service_number: number.clone(),
                    service_name: info.name,
                    description: info.description,
                }
            })
            .collect()
    }

    /// Pass 3: exactly one route per service, named after it
    fn derive_routes(&self, services: &[BusService], keys: &mut KeyResolver<u32>) -> Vec<Route> {
        services
            .iter()
            .zip(1u32..)
            .map(|(service, route_id)| {
                keys.insert(NaturalKey::route(&service.service_number), route_id);
                Route {
                    route_id,
                    service_id: Link::Pending(NaturalKey::service(&service.service_number)),
                    route_name: service.service_name.clone(),
                }
            })
            .collect()
    }

    /// Pass 4: the stops each service's route calls at, in row order.
    /// A row counts when any trip column of the service serves it.
    fn derive_route_stops(&self, rows: &[RawRow], layout: &ColumnLayout, keys: &mut KeyResolver<u32>) -> Vec<RouteStop> {
        let mut route_stops = Vec::new();

        for service in &layout.services {
            let columns: Vec<&str> = layout.columns_of(service).collect();
            let mut sequence_number = 1u32;

            for row in rows {
                let Some(stop_name) = self.location(row, layout) else {
                    continue;
                };
                if !columns.iter().any(|column| self.served(row, column).is_some()) {
                    continue;
                }

                let route_stop_id = route_stops.len() as u32 + 1;
                keys.insert(NaturalKey::route_stop(service, sequence_number), route_stop_id);
                route_stops.push(RouteStop {
                    route_stop_id,
                    route_id: Link::Pending(NaturalKey::route(service)),
                    stop_id: Link::Pending(NaturalKey::stop(stop_name)),
                    sequence_number,
                });
                sequence_number += 1;
            }
        }

        debug!("Derived {} route stops", route_stops.len());
        route_stops
    }

    /// Pass 5: one trip per column that serves at least one stop
    fn derive_trips(&self, rows: &[RawRow], layout: &ColumnLayout, keys: &mut KeyResolver<u32>) -> Result<Vec<Trip>> {
        let mut trips = Vec::new();

        for column in &layout.trip_columns {
            let Some(start_time) = rows.iter().find_map(|row| self.served(row, column)) else {
                debug!("Column {} has no departures, no trip created", column);
                continue;
            };
            let service = &layout.service_of[column];
            let trip_id = synthetic_id(self.options.trip_id_offset, trips.len(), "trip_id_offset")?;

            keys.insert(NaturalKey::trip(column), trip_id);
            trips.push(Trip {
                trip_id,
                route_id: Link::Pending(NaturalKey::route(service)),
                service_id: Link::Pending(NaturalKey::service(service)),
                start_time,
                // Headers carry no weekend/holiday marker, so every trip gets the configured label
                day_of_week: self.options.day_of_week.clone(),
                column_reference: column.clone(),
            });
        }

        debug!("Derived {} trips", trips.len());
        Ok(trips)
    }

    /// Pass 6: one stop time per trip and route stop of the trip's route
    fn derive_stop_times(
        &self,
        rows: &[RawRow],
        layout: &ColumnLayout,
        trips: &[Trip],
        route_stops: &[RouteStop],
        keys: &mut KeyResolver<u32>,
    ) -> Result<Vec<StopTime>> {
        // First row carrying each stop name
        let mut row_of_stop: HashMap<String, &RawRow> = HashMap::new();
        for row in rows {
            if let Some(name) = self.location(row, layout) {
                row_of_stop.entry(name).or_insert(row);
            }
        }

        let mut stops_of_route: HashMap<&NaturalKey, Vec<&RouteStop>> = HashMap::new();
        for route_stop in route_stops {
            if let Some(route_key) = route_stop.route_id.pending_key() {
                stops_of_route.entry(route_key).or_default().push(route_stop);
            }
        }

        let mut stop_times = Vec::new();

        for trip in trips {
            let Some(route_key) = trip.route_id.pending_key() else {
                continue;
            };
            let Some(calls) = stops_of_route.get(route_key) else {
                continue;
            };
            let service = &layout.service_of[&trip.column_reference];

            for route_stop in calls {
                let Some(NaturalKey::Stop { stop_name }) = route_stop.stop_id.pending_key() else {
                    continue;
                };
                let departure_time = row_of_stop
                    .get(stop_name)
                    .and_then(|row| self.served(row, &trip.column_reference));
                let is_skipped = departure_time.is_none();
                let stop_time_id =
                    synthetic_id(self.options.stop_time_id_offset, stop_times.len(), "stop_time_id_offset")?;

                keys.insert(
                    NaturalKey::stop_time(&trip.column_reference, route_stop.sequence_number),
                    stop_time_id,
                );
                stop_times.push(StopTime {
                    stop_time_id,
                    trip_id: Link::Pending(NaturalKey::trip(&trip.column_reference)),
                    route_stop_id: Link::Pending(NaturalKey::route_stop(service, route_stop.sequence_number)),
                    departure_time,
                    is_skipped,
                });
            }
        }

        debug!("Derived {} stop times", stop_times.len());
        Ok(stop_times)
    }
}

/// Id of the `index`-th record numbered from `offset`; fails when the range runs past `u32::MAX`
fn synthetic_id(offset: u32, index: usize, option: &str) -> Result<u32> {
    u32::try_from(index)
        .ok()
        .and_then(|index| offset.checked_add(index))
        .ok_or_else(|| {
            TimetableError::Config(format!(
                "normalize.{option} = {offset} leaves no room for {} ids",
                index + 1
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<RawRow> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect()
    }

    fn normalizer() -> EntityNormalizer {
        EntityNormalizer::new(NormalizeOptions::default())
    }

    fn sequences_of(timetable: &Timetable, route_id: u32) -> Vec<u32> {
        timetable
            .route_stops
            .iter()
            .filter(|rs| rs.route_id == Link::Resolved(route_id))
            .map(|rs| rs.sequence_number)
            .collect()
    }

    #[test]
    fn test_single_service_scenario() {
        let input = rows(json!([
            {"Place": "A", "10": "0800"},
            {"Place": "B", "10": "0815"},
            {"Place": "C", "10": "-"}
        ]));
        let timetable = normalizer().normalize(&input).unwrap();

        let stops: Vec<_> = timetable.stops.iter().map(|s| (s.stop_id, s.stop_name.as_str())).collect();
        assert_eq!(stops, vec![(1, "A"), (2, "B"), (3, "C")]);

        assert_eq!(timetable.services.len(), 1);
        assert_eq!(timetable.services[0].service_number, "10");
        assert_eq!(timetable.routes.len(), 1);
        assert_eq!(timetable.routes[0].service_id, Link::Resolved(1));

        let calls: Vec<_> = timetable
            .route_stops
            .iter()
            .map(|rs| (rs.stop_id.id().unwrap(), rs.sequence_number))
            .collect();
        assert_eq!(calls, vec![(1, 1), (2, 2)]);

        assert_eq!(timetable.trips.len(), 1);
        let trip = &timetable.trips[0];
        assert_eq!(trip.trip_id, 101);
        assert_eq!(trip.start_time, "0800");
        assert_eq!(trip.day_of_week, "Weekday");
        assert_eq!(trip.column_reference, "10");

        let times: Vec<_> = timetable
            .stop_times
            .iter()
            .map(|st| (st.stop_time_id, st.departure_time.as_deref(), st.is_skipped))
            .collect();
        assert_eq!(times, vec![(1001, Some("0800"), false), (1002, Some("0815"), false)]);
    }

    #[test]
    fn test_empty_column_produces_no_trip() {
        let input = rows(json!([
            {"Place": "A", "3": "0900", "4": "-"},
            {"Place": "B", "3": "0910", "4": ""}
        ]));
        let timetable = normalizer().normalize(&input).unwrap();

        assert_eq!(timetable.trips.len(), 1);
        assert_eq!(timetable.trips[0].column_reference, "3");
        assert!(timetable
            .stop_times
            .iter()
            .all(|st| st.trip_id == Link::Resolved(101)));
        // The service still exists; its route simply has no stops
        assert_eq!(timetable.services.len(), 2);
        assert_eq!(sequences_of(&timetable, 2), Vec::<u32>::new());
    }

    #[test]
    fn test_suffixed_columns_share_one_service() {
        let input = rows(json!([
            {"Place": "A", "5_1": "0700", "5_2": "0900"},
            {"Place": "B", "5_1": "-", "5_2": "0915"}
        ]));
        let timetable = normalizer().normalize(&input).unwrap();

        assert_eq!(timetable.services.len(), 1);
        assert_eq!(timetable.routes.len(), 1);
        assert_eq!(timetable.trips.len(), 2);
        assert_eq!(sequences_of(&timetable, 1), vec![1, 2]);

        // 5_1 does not serve B, so it gets a skipped stop time there
        let first_trip: Vec<_> = timetable
            .stop_times
            .iter()
            .filter(|st| st.trip_id == Link::Resolved(101))
            .map(|st| (st.departure_time.as_deref(), st.is_skipped))
            .collect();
        assert_eq!(first_trip, vec![(Some("0700"), false), (None, true)]);
    }

    #[test]
    fn test_sequences_are_gapless_per_route() {
        let input = rows(json!([
            {"Place": "A", "1": "0600", "2": "-"},
            {"Place": "B", "1": "-", "2": "0630"},
            {"Place": "C", "1": "0620", "2": "0640"},
            {"Place": "D", "1": "0630", "2": "-"}
        ]));
        let timetable = normalizer().normalize(&input).unwrap();

        assert_eq!(sequences_of(&timetable, 1), vec![1, 2, 3]);
        assert_eq!(sequences_of(&timetable, 2), vec![1, 2]);
        let route_stop_ids: Vec<_> = timetable.route_stops.iter().map(|rs| rs.route_stop_id).collect();
        assert_eq!(route_stop_ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_duplicate_and_missing_locations() {
        let input = rows(json!([
            {"Place": "A", "1": "0600"},
            {"1": "0605"},
            {"Place": "", "1": "0607"},
            {"Place": "B", "1": "0610"},
            {"Place": "A", "1": "0620"}
        ]));
        let timetable = normalizer().normalize(&input).unwrap();

        let names: Vec<_> = timetable.stops.iter().map(|s| s.stop_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        // Rows without a location never become route stops
        assert_eq!(sequences_of(&timetable, 1), vec![1, 2, 3]);
        // The repeated stop reads its departure from the first row named A
        let departures: Vec<_> = timetable
            .stop_times
            .iter()
            .map(|st| st.departure_time.as_deref())
            .collect();
        assert_eq!(departures, vec![Some("0600"), Some("0610"), Some("0600")]);
    }

    #[test]
    fn test_numeric_cells_keep_their_text() {
        let input = rows(json!([
            {"Place": "A", "7": 815},
            {"Place": 42, "7": null}
        ]));
        let timetable = normalizer().normalize(&input).unwrap();

        assert_eq!(timetable.stops[1].stop_name, "42");
        assert_eq!(timetable.trips[0].start_time, "815");
        assert_eq!(timetable.stop_times.len(), 1);
    }

    #[test]
    fn test_catalog_decorates_known_services_only() {
        let input = rows(json!([{"Place": "A", "1": "0600", "99": "0700"}]));
        let timetable = normalizer().normalize(&input).unwrap();

        assert_eq!(timetable.services[0].service_name, "Noble's Hospital - Port Erin");
        assert_eq!(timetable.routes[0].route_name, "Noble's Hospital - Port Erin");
        assert_eq!(timetable.services[1].service_name, "");
        assert_eq!(timetable.services[1].description, "");
    }

    #[test]
    fn test_custom_sentinel_and_offsets() {
        let options = NormalizeOptions {
            location_column: "Stop".to_string(),
            no_service: "|".to_string(),
            trip_id_offset: 500,
            stop_time_id_offset: 9000,
            ..NormalizeOptions::default()
        };
        let input = rows(json!([
            {"Stop": "A", "1": "|"},
            {"Stop": "B", "1": "0700"}
        ]));
        let timetable = EntityNormalizer::new(options).normalize(&input).unwrap();

        assert_eq!(timetable.trips[0].trip_id, 500);
        assert_eq!(timetable.trips[0].start_time, "0700");
        assert_eq!(timetable.stop_times[0].stop_time_id, 9000);
        assert_eq!(timetable.route_stops.len(), 1);
    }

    #[test]
    fn test_offset_at_upper_bound_fits_one_id() {
        let options = NormalizeOptions {
            trip_id_offset: u32::MAX,
            stop_time_id_offset: u32::MAX,
            ..NormalizeOptions::default()
        };
        let input = rows(json!([{"Place": "A", "1": "0600"}]));
        let timetable = EntityNormalizer::new(options).normalize(&input).unwrap();

        assert_eq!(timetable.trips[0].trip_id, u32::MAX);
        assert_eq!(timetable.stop_times[0].stop_time_id, u32::MAX);
    }

    #[test]
    fn test_offset_overflow_is_a_config_error() {
        let input = rows(json!([{"Place": "A", "1": "0600", "1_1": "0700"}]));

        let options = NormalizeOptions {
            trip_id_offset: u32::MAX,
            ..NormalizeOptions::default()
        };
        let err = EntityNormalizer::new(options).normalize(&input).unwrap_err();
        assert!(matches!(err, TimetableError::Config(msg) if msg.contains("trip_id_offset")));

        let options = NormalizeOptions {
            stop_time_id_offset: u32::MAX,
            ..NormalizeOptions::default()
        };
        let err = EntityNormalizer::new(options).normalize(&input).unwrap_err();
        assert!(matches!(err, TimetableError::Config(msg) if msg.contains("stop_time_id_offset")));
    }

    #[test]
    fn test_structural_errors_are_fatal() {
        let err = normalizer().normalize(&[]).unwrap_err();
        assert!(matches!(err, TimetableError::EmptySource));

        let input = rows(json!([{"Stop": "A", "1": "0600"}]));
        let err = normalizer().normalize(&input).unwrap_err();
        assert!(matches!(err, TimetableError::MissingLocationColumn(_)));
    }

    #[test]
    fn test_passes_leave_links_pending() {
        let input = rows(json!([{"Place": "A", "10": "0800"}]));
        let (timetable, keys) = normalizer().normalize_pending(&input).unwrap();

        assert!(!timetable.is_linked());
        assert_eq!(
            timetable.route_stops[0].stop_id,
            Link::Pending(NaturalKey::stop("A"))
        );
        assert_eq!(keys.resolve(&NaturalKey::trip("10")).unwrap(), 101);
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let input = rows(json!([
            {"Place": "A", "2": "0800", "1": "0810", "1_1": "-"},
            {"Place": "B", "2": "-", "1": "0820", "1_1": "0920"}
        ]));
        let first = serde_json::to_string(&normalizer().normalize(&input).unwrap().stop_times).unwrap();
        let second = serde_json::to_string(&normalizer().normalize(&input).unwrap().stop_times).unwrap();
        assert_eq!(first, second);
    }
}
