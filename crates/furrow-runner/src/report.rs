//! JSON report of a finished run.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use furrow_core::{Engine, OutputRecord, SignalRecord};
use furrow_types::Value;
use serde::Serialize;

/// Everything a run produced, borrowed from the engine.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// Day the engine stopped on.
    pub last_day: NaiveDate,
    /// Snapshots taken on output days.
    pub output: &'a [OutputRecord],
    /// One snapshot per finished crop cycle.
    pub summary_output: &'a [BTreeMap<String, Option<Value>>],
    /// Snapshot taken at termination.
    pub terminal_output: &'a BTreeMap<String, Option<Value>>,
    /// Signals in delivery order.
    pub signals: &'a [SignalRecord],
}

impl<'a> Report<'a> {
    pub fn from_engine(engine: &'a Engine) -> Self {
        Self {
            last_day: engine.day(),
            output: engine.get_output(),
            summary_output: engine.get_summary_output(),
            terminal_output: engine.get_terminal_output(),
            signals: engine.signal_log(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use furrow_agro::AgroManagementDef;
    use furrow_core::{
        CropData, InMemoryWeather, ModelComponents, ModelConfig, ParameterProvider,
    };
    use furrow_models::{BucketSoilFactory, ThermalTimeCropFactory};

    use super::*;

    const WEATHER: &str = r"
- {day: 2000-01-01, TMIN: 5.0, TMAX: 15.0, RAIN: 0.0, ES0: 0.1, ET0: 0.2}
- {day: 2000-01-02, TMIN: 5.0, TMAX: 15.0, RAIN: 1.0, ES0: 0.1, ET0: 0.2}
- {day: 2000-01-03, TMIN: 5.0, TMAX: 15.0, RAIN: 0.0, ES0: 0.1, ET0: 0.2}
- {day: 2000-01-04, TMIN: 5.0, TMAX: 15.0, RAIN: 0.0, ES0: 0.1, ET0: 0.2}
";

    const SOIL: &str = "{SMW: 0.1, SMFCF: 0.3, SM0: 0.4, RDMSOL: 100.0, SOPE: 0.5, WAV: 15.0}";

    #[test]
    fn fallow_run_reports_terminal_soil_state() {
        let params = ParameterProvider::new(
            BTreeMap::new(),
            BTreeMap::new(),
            serde_yml::from_str(SOIL).unwrap(),
            CropData::default(),
        )
        .unwrap();
        let config = ModelConfig {
            output_vars: vec!["SM".to_owned()],
            terminal_output_vars: vec!["SM".to_owned(), "WBAL".to_owned()],
            ..ModelConfig::default()
        };
        let mut engine = Engine::new(
            params,
            Box::new(InMemoryWeather::parse(WEATHER).unwrap()),
            AgroManagementDef::parse("- 2000-01-01:\n- 2000-01-04:\n").unwrap(),
            config,
            ModelComponents {
                crop: Box::new(ThermalTimeCropFactory),
                soil: Box::new(BucketSoilFactory),
            },
        )
        .unwrap();
        engine.run_till_terminate().unwrap();

        let json = serde_json::to_value(Report::from_engine(&engine)).unwrap();
        assert_eq!(json["last_day"], "2000-01-04");
        assert!(json["terminal_output"]["SM"].is_f64());
        assert!(json["terminal_output"]["WBAL"].as_f64().unwrap().abs() < 1e-4);
        assert!(!json["output"].as_array().unwrap().is_empty());
        assert_eq!(json["summary_output"].as_array().unwrap().len(), 0);
    }
}
