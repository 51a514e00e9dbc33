//! Driving variables supplied by a weather provider.
//!
//! The kernel does not prescribe which variables a provider delivers; it
//! only requires daily records indexable by date. Mean temperature `TEMP`
//! and daytime temperature `DTEMP` are derived from `TMIN` and `TMAX` when a
//! record lacks them.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Errors raised while retrieving driving variables.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// The provider has no record for the day.
    #[error("no weather data for {day}")]
    NoData {
        /// The requested day.
        day: NaiveDate,
    },

    /// A record lacks a variable a component needs.
    #[error("weather record of {day} has no variable '{name}'")]
    MissingVariable {
        /// Day of the record.
        day: NaiveDate,
        /// The missing variable.
        name: String,
    },

    /// Failed to read a weather file.
    #[error("failed to read weather file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse weather YAML.
    #[error("failed to parse weather YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for WeatherError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Driving variables of one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingVariables {
    /// The day the values apply to.
    pub day: NaiveDate,
    /// Variable name to value.
    pub values: BTreeMap<String, f64>,
}

impl DrivingVariables {
    /// Empty record for `day`.
    pub const fn new(day: NaiveDate) -> Self {
        Self {
            day,
            values: BTreeMap::new(),
        }
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::MissingVariable`] if the record lacks `name`.
    pub fn require(&self, name: &str) -> Result<f64, WeatherError> {
        self.get(name).ok_or_else(|| WeatherError::MissingVariable {
            day: self.day,
            name: name.to_owned(),
        })
    }

    /// Set `name` to `value`.
    pub fn insert(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_owned(), value);
    }

    /// Add `TEMP` and `DTEMP` when `TMIN` and `TMAX` are available.
    fn derive_temperatures(&mut self) {
        let (Some(tmin), Some(tmax)) = (self.get("TMIN"), self.get("TMAX")) else {
            return;
        };
        let temp = self.get("TEMP").unwrap_or((tmin + tmax) / 2.0);
        self.values.entry("TEMP".to_owned()).or_insert(temp);
        self.values
            .entry("DTEMP".to_owned())
            .or_insert((temp + tmax) / 2.0);
    }
}

/// Source of daily driving variables.
pub trait WeatherDataProvider {
    /// Record for `day`.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::NoData`] if the provider has no record.
    fn get(&self, day: NaiveDate) -> Result<DrivingVariables, WeatherError>;
}

/// Driving variables for `day` with derived temperatures filled in.
///
/// # Errors
///
/// Returns the provider's error when it has no record for `day`.
pub fn driving_variables(
    provider: &dyn WeatherDataProvider,
    day: NaiveDate,
) -> Result<DrivingVariables, WeatherError> {
    let mut drv = provider.get(day)?;
    drv.derive_temperatures();
    Ok(drv)
}

/// One daily weather record as stored in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// The day of the record.
    pub day: NaiveDate,
    /// Variable name to value.
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

/// Weather held in memory, keyed by day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryWeather {
    records: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl InMemoryWeather {
    /// Build from a list of records; later records replace earlier ones.
    pub fn from_records(records: Vec<WeatherRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.day, r.values)).collect(),
        }
    }

    /// Parse a YAML list of records.
    ///
    /// ```yaml
    /// - {day: 2000-01-01, TMIN: 2.1, TMAX: 8.4, RAIN: 0.2}
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Yaml`] for malformed input.
    pub fn parse(yaml: &str) -> Result<Self, WeatherError> {
        let records: Vec<WeatherRecord> = serde_yml::from_str(yaml)?;
        Ok(Self::from_records(records))
    }

    /// Load a YAML list of records from a file.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Io`] if the file cannot be read and
    /// [`WeatherError::Yaml`] for malformed input.
    pub fn from_file(path: &Path) -> Result<Self, WeatherError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Add or replace the record of `day`.
    pub fn insert(&mut self, day: NaiveDate, values: BTreeMap<String, f64>) {
        self.records.insert(day, values);
    }

    /// Number of days held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no days are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last day held.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.keys().next()?;
        let last = self.records.keys().next_back()?;
        Some((*first, *last))
    }
}

impl WeatherDataProvider for InMemoryWeather {
    fn get(&self, day: NaiveDate) -> Result<DrivingVariables, WeatherError> {
        self.records
            .get(&day)
            .map(|values| DrivingVariables {
                day,
                values: values.clone(),
            })
            .ok_or(WeatherError::NoData { day })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn temperatures_are_derived() {
        let weather = InMemoryWeather::parse("- {day: 2000-01-01, TMIN: 2.0, TMAX: 10.0}\n").unwrap();
        let drv = driving_variables(&weather, d(2000, 1, 1)).unwrap();
        assert_eq!(drv.require("TEMP").unwrap(), 6.0);
        assert_eq!(drv.require("DTEMP").unwrap(), 8.0);
    }

    #[test]
    fn existing_temperatures_are_kept() {
        let weather =
            InMemoryWeather::parse("- {day: 2000-01-01, TMIN: 2.0, TMAX: 10.0, TEMP: 5.0}\n").unwrap();
        let drv = driving_variables(&weather, d(2000, 1, 1)).unwrap();
        assert_eq!(drv.require("TEMP").unwrap(), 5.0);
        assert_eq!(drv.require("DTEMP").unwrap(), 7.5);
    }

    #[test]
    fn missing_day_and_variable() {
        let weather = InMemoryWeather::parse("- {day: 2000-01-01, RAIN: 0.4}\n").unwrap();
        assert!(matches!(
            driving_variables(&weather, d(2000, 1, 2)).unwrap_err(),
            WeatherError::NoData { .. }
        ));
        let drv = driving_variables(&weather, d(2000, 1, 1)).unwrap();
        assert!(drv.get("TEMP").is_none());
        assert!(matches!(
            drv.require("TMAX").unwrap_err(),
            WeatherError::MissingVariable { .. }
        ));
    }

    #[test]
    fn date_range_of_records() {
        let weather = InMemoryWeather::parse(
            "- {day: 2000-01-03, RAIN: 0.0}\n- {day: 2000-01-01, RAIN: 1.0}\n",
        )
        .unwrap();
        assert_eq!(weather.len(), 2);
        assert_eq!(weather.date_range(), Some((d(2000, 1, 1), d(2000, 1, 3))));
    }
}
