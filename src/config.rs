use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants;
use crate::error::{Result, TimetableError};
use crate::pipeline::normalize::{NormalizeOptions, ServiceInfo};
use crate::pipeline::throttle::Limits;
use crate::types::EntityKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub normalize: NormalizeConfig,
    /// Display names keyed by service number
    pub services: BTreeMap<String, ServiceInfo>,
    /// Write throttles keyed by table name (`stop_times`, `trips`, ...)
    pub throttle: BTreeMap<String, ThrottleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub location_column: String,
    pub no_service: String,
    pub trip_id_offset: u32,
    pub stop_time_id_offset: u32,
    pub day_of_week: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub min_interval_ms: Option<u64>,
    pub writes_per_min: Option<u64>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::DEFAULT_INPUT_PATH),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            location_column: constants::LOCATION_COLUMN.to_string(),
            no_service: constants::NO_SERVICE_SENTINEL.to_string(),
            trip_id_offset: constants::TRIP_ID_OFFSET,
            stop_time_id_offset: constants::STOP_TIME_ID_OFFSET,
            day_of_week: constants::DEFAULT_DAY_OF_WEEK.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let services = ServiceInfo::default_catalog().collect();

        let mut throttle = BTreeMap::new();
        throttle.insert(
            EntityKind::StopTime.table_name().to_string(),
            ThrottleConfig {
                min_interval_ms: Some(constants::STOP_TIME_WRITE_INTERVAL_MS),
                writes_per_min: None,
            },
        );

        Self {
            input: InputConfig::default(),
            output: OutputConfig::default(),
            normalize: NormalizeConfig::default(),
            services,
            throttle,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `timetable.toml` when no path is given.
    /// A missing default file yields the built-in defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(constants::DEFAULT_CONFIG_PATH), false),
        };

        if !config_path.exists() {
            if explicit {
                return Err(TimetableError::Config(format!(
                    "Config file '{}' does not exist",
                    config_path.display()
                )));
            }
            debug!("No {} found, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            TimetableError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config = Self::from_toml(&config_content)?;
        info!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.normalize.location_column.trim().is_empty() {
            return Err(TimetableError::Config(
                "normalize.location_column must not be empty".to_string(),
            ));
        }
        for (table, throttle) in &self.throttle {
            if !EntityKind::LOAD_ORDER.iter().any(|k| k.table_name() == table) {
                return Err(TimetableError::Config(format!(
                    "Unknown throttle table '{table}'"
                )));
            }
            if throttle.writes_per_min == Some(0) {
                return Err(TimetableError::Config(format!(
                    "throttle.{table}.writes_per_min must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            location_column: self.normalize.location_column.clone(),
            no_service: self.normalize.no_service.clone(),
            trip_id_offset: self.normalize.trip_id_offset,
            stop_time_id_offset: self.normalize.stop_time_id_offset,
            day_of_week: self.normalize.day_of_week.clone(),
            service_catalog: self
                .services
                .iter()
                .map(|(number, info)| (number.clone(), info.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    /// Throttle limits for writes of one entity kind; unlimited when not configured
    pub fn throttle_limits(&self, kind: EntityKind) -> Limits {
        self.throttle
            .get(kind.table_name())
            .map(|t| Limits {
                min_interval: t.min_interval_ms.map(Duration::from_millis),
                writes_per_min: t.writes_per_min,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_throttle_only_stop_times() {
        let config = Config::default();
        assert_eq!(
            config.throttle_limits(EntityKind::StopTime).min_interval,
            Some(Duration::from_millis(50))
        );
        assert_eq!(config.throttle_limits(EntityKind::Trip), Limits::default());
    }

    #[test]
    fn test_default_config_carries_built_in_catalog() {
        let options = Config::default().normalize_options();
        assert_eq!(options.service_catalog, NormalizeOptions::default().service_catalog);
        assert_eq!(options.service_catalog.len(), constants::DEFAULT_SERVICE_CATALOG.len());
        assert_eq!(options.service_catalog["12a"].name, "Willaston - Port Erin");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [normalize]
            location_column = "Stop"
            trip_id_offset = 5000

            [services.X1]
            name = "Airport Express"
            description = "Non-stop to the terminal"
            "#,
        )
        .unwrap();

        let options = config.normalize_options();
        assert_eq!(options.location_column, "Stop");
        assert_eq!(options.trip_id_offset, 5000);
        assert_eq!(options.stop_time_id_offset, constants::STOP_TIME_ID_OFFSET);
        assert_eq!(options.no_service, "-");
        assert_eq!(options.service_catalog.len(), 1);
        assert_eq!(options.service_catalog["X1"].name, "Airport Express");
    }

    #[test]
    fn test_unknown_throttle_table_is_rejected() {
        let err = Config::from_toml(
            r#"
            [throttle.platforms]
            min_interval_ms = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TimetableError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/timetable.toml"))).unwrap_err();
        assert!(matches!(err, TimetableError::Config(_)));
    }
}
