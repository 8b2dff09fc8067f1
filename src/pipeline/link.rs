use tracing::{debug, instrument};

use crate::error::{Result, TimetableError};
use crate::pipeline::resolver::KeyResolver;
use crate::types::{EntityKind, Link, Timetable};

fn resolve_link(link: &mut Link, expected: EntityKind, keys: &KeyResolver<u32>) -> Result<()> {
    if let Link::Pending(key) = link {
        if key.kind() != expected {
            return Err(TimetableError::Unresolved {
                kind: expected,
                key: key.clone(),
            });
        }
        let id = keys.resolve(key)?;
        *link = Link::Resolved(id);
    }
    Ok(())
}

/// Replace every pending foreign key with the synthetic id of its target.
///
/// Runs once between normalization and any sink. Fails on the first key
/// with no registered target, leaving the timetable partially linked.
#[instrument(skip_all)]
pub fn link(timetable: &mut Timetable, keys: &KeyResolver<u32>) -> Result<()> {
    for route in &mut timetable.routes {
        resolve_link(&mut route.service_id, EntityKind::BusService, keys)?;
    }
    for route_stop in &mut timetable.route_stops {
        resolve_link(&mut route_stop.route_id, EntityKind::Route, keys)?;
        resolve_link(&mut route_stop.stop_id, EntityKind::Stop, keys)?;
    }
    for trip in &mut timetable.trips {
        resolve_link(&mut trip.route_id, EntityKind::Route, keys)?;
        resolve_link(&mut trip.service_id, EntityKind::BusService, keys)?;
    }
    for stop_time in &mut timetable.stop_times {
        resolve_link(&mut stop_time.trip_id, EntityKind::Trip, keys)?;
        resolve_link(&mut stop_time.route_stop_id, EntityKind::RouteStop, keys)?;
    }

    debug!("Linked {} foreign keys", foreign_key_count(timetable));
    Ok(())
}

fn foreign_key_count(timetable: &Timetable) -> usize {
    timetable.routes.len()
        + 2 * (timetable.route_stops.len() + timetable.trips.len() + timetable.stop_times.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NaturalKey, Route, Trip};

    fn trip_with(route: NaturalKey, service: NaturalKey) -> Trip {
        Trip {
            trip_id: 101,
            route_id: Link::Pending(route),
            service_id: Link::Pending(service),
            start_time: "0700".to_string(),
            day_of_week: "Weekday".to_string(),
            column_reference: "4".to_string(),
        }
    }

    #[test]
    fn test_link_resolves_pending_keys() {
        let mut keys = KeyResolver::new();
        keys.insert(NaturalKey::service("4"), 2);
        keys.insert(NaturalKey::route("4"), 3);

        let mut timetable = Timetable {
            routes: vec![Route {
                route_id: 3,
                service_id: Link::Pending(NaturalKey::service("4")),
                route_name: String::new(),
            }],
            trips: vec![trip_with(NaturalKey::route("4"), NaturalKey::service("4"))],
            ..Default::default()
        };

        link(&mut timetable, &keys).unwrap();
        assert!(timetable.is_linked());
        assert_eq!(timetable.trips[0].route_id, Link::Resolved(3));
        assert_eq!(timetable.trips[0].service_id, Link::Resolved(2));
    }

    #[test]
    fn test_trips_seeded_before_routes_fail() {
        let mut keys = KeyResolver::new();
        keys.insert(NaturalKey::service("4"), 2);

        let mut timetable = Timetable {
            trips: vec![trip_with(NaturalKey::route("4"), NaturalKey::service("4"))],
            ..Default::default()
        };

        let err = link(&mut timetable, &keys).unwrap_err();
        assert!(matches!(err, TimetableError::Unresolved { kind: EntityKind::Route, .. }));
    }

    #[test]
    fn test_key_of_wrong_kind_is_rejected() {
        let mut keys = KeyResolver::new();
        keys.insert(NaturalKey::stop("4"), 1);

        let mut timetable = Timetable {
            trips: vec![trip_with(NaturalKey::stop("4"), NaturalKey::service("4"))],
            ..Default::default()
        };

        assert!(link(&mut timetable, &keys).is_err());
    }
}
