/// Defaults shared by the configuration layer and the normalizer.
/// Every value here can be overridden from `timetable.toml`.

/// Header of the column holding stop names
pub const LOCATION_COLUMN: &str = "Place";

/// Cell value meaning "this trip does not serve this stop"
pub const NO_SERVICE_SENTINEL: &str = "-";

/// Separator between a base service and its trip suffix (`5_2` -> `5`)
pub const SERVICE_SUFFIX_SEPARATOR: char = '_';

pub const DEFAULT_DAY_OF_WEEK: &str = "Weekday";

// Trip and stop-time ids live above these offsets so they never collide
// with the low ranges used by the other entities.
pub const TRIP_ID_OFFSET: u32 = 101;
pub const STOP_TIME_ID_OFFSET: u32 = 1001;

pub const DEFAULT_CONFIG_PATH: &str = "timetable.toml";
pub const DEFAULT_INPUT_PATH: &str = "data/output.json";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "timetable.log";

// Output file names, one JSON array per entity kind
pub const BUS_SERVICES_FILE: &str = "bus_services.json";
pub const STOPS_FILE: &str = "stops.json";
pub const ROUTES_FILE: &str = "routes.json";
pub const ROUTE_STOPS_FILE: &str = "route_stops.json";
pub const TRIPS_FILE: &str = "trips.json";
pub const STOP_TIMES_FILE: &str = "stop_times.json";

/// Stop times are by far the largest kind, so they are throttled by default
pub const STOP_TIME_WRITE_INTERVAL_MS: u64 = 50;

/// Display names for the services of the bundled dataset: (number, name, description)
pub const DEFAULT_SERVICE_CATALOG: &[(&str, &str, &str)] = &[
    (
        "1",
        "Noble's Hospital - Port Erin",
        "Main route between Noble's Hospital and Port Erin",
    ),
    (
        "1a",
        "Noble's Hospital - Port Erin",
        "Main route between Noble's Hospital and Port Erin",
    ),
    (
        "2",
        "Ballachrink - Port Erin",
        "Route between Ballachrink and Port Erin",
    ),
    (
        "12",
        "Willaston - Port Erin",
        "Route between Willaston and Port Erin via Castletown",
    ),
    (
        "12a",
        "Willaston - Port Erin",
        "Route between Willaston and Port Erin via Castletown",
    ),
];
