use std::collections::{HashMap, HashSet};

use crate::constants::SERVICE_SUFFIX_SEPARATOR;
use crate::error::{Result, TimetableError};

/// Column structure of a wide-format timetable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub location_column: String,
    /// Trip columns in header order
    pub trip_columns: Vec<String>,
    /// Trip column header -> base service number
    pub service_of: HashMap<String, String>,
    /// Distinct base services in order of first appearance
    pub services: Vec<String>,
}

impl ColumnLayout {
    /// Trip columns belonging to one base service, in header order
    pub fn columns_of<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.trip_columns
            .iter()
            .filter(move |column| self.service_of.get(*column).map(String::as_str) == Some(service))
            .map(String::as_str)
    }
}

/// Base service of a trip column: everything before the first `_`.
/// `5_2` belongs to `5`; a header with no `_` is its own service.
pub fn base_service(header: &str) -> &str {
    header
        .split_once(SERVICE_SUFFIX_SEPARATOR)
        .map_or(header, |(base, _)| base)
}

/// Split headers into the location column and trip columns grouped by service.
///
/// Any header other than `location_column` is a trip column. Fails when the
/// location column is absent, since stop order cannot be recovered without it.
pub fn classify<'a, I>(headers: I, location_column: &str) -> Result<ColumnLayout>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut saw_location = false;
    let mut seen_columns = HashSet::new();
    let mut seen_services = HashSet::new();
    let mut trip_columns = Vec::new();
    let mut service_of = HashMap::new();
    let mut services = Vec::new();

    for header in headers {
        if header == location_column {
            saw_location = true;
            continue;
        }
        if !seen_columns.insert(header) {
            continue;
        }

        let service = base_service(header);
        if seen_services.insert(service) {
            services.push(service.to_string());
        }
        trip_columns.push(header.to_string());
        service_of.insert(header.to_string(), service.to_string());
    }

    if !saw_location {
        return Err(TimetableError::MissingLocationColumn(location_column.to_string()));
    }

    Ok(ColumnLayout {
        location_column: location_column.to_string(),
        trip_columns,
        service_of,
        services,
    })
}
