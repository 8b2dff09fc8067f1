use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::RecordSink;
use crate::constants;
use crate::error::Result;
use crate::types::Timetable;

/// Writes each entity collection to its own pretty-printed JSON array
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }
}

impl RecordSink for JsonFileSink {
    fn write(&self, timetable: &Timetable) -> Result<()> {
        // Serialize everything up front so a pending link leaves no partial output
        let files = [
            (constants::BUS_SERVICES_FILE, serde_json::to_string_pretty(&timetable.services)?),
            (constants::STOPS_FILE, serde_json::to_string_pretty(&timetable.stops)?),
            (constants::ROUTES_FILE, serde_json::to_string_pretty(&timetable.routes)?),
            (constants::ROUTE_STOPS_FILE, serde_json::to_string_pretty(&timetable.route_stops)?),
            (constants::TRIPS_FILE, serde_json::to_string_pretty(&timetable.trips)?),
            (constants::STOP_TIMES_FILE, serde_json::to_string_pretty(&timetable.stop_times)?),
        ];

        fs::create_dir_all(&self.output_dir)?;
        for (file_name, content) in files {
            fs::write(self.output_dir.join(file_name), content)?;
        }

        info!("Wrote timetable files to {}", self.output_dir.display());
        Ok(())
    }
}

fn read_file<T: DeserializeOwned>(dir: &Path, file_name: &str) -> Result<Vec<T>> {
    let content = fs::read_to_string(dir.join(file_name))?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a timetable previously written by `JsonFileSink`
pub fn read_timetable(dir: impl AsRef<Path>) -> Result<Timetable> {
    let dir = dir.as_ref();
    let timetable = Timetable {
        services: read_file(dir, constants::BUS_SERVICES_FILE)?,
        stops: read_file(dir, constants::STOPS_FILE)?,
        routes: read_file(dir, constants::ROUTES_FILE)?,
        route_stops: read_file(dir, constants::ROUTE_STOPS_FILE)?,
        trips: read_file(dir, constants::TRIPS_FILE)?,
        stop_times: read_file(dir, constants::STOP_TIMES_FILE)?,
    };
    info!("Read timetable from {}: {:?}", dir.display(), timetable.counts());
    Ok(timetable)
}
