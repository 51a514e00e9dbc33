//! End-to-end runs of the engine with minimal crop and soil components.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

use chrono::NaiveDate;
use furrow_agro::AgroManagementDef;
use furrow_core::{
    Balance, BalanceKind, ComponentFactory, ComponentParts, Context, CropData, DrivingVariables,
    Engine, EngineMode, EnginePhase, InMemoryWeather, Increments, KernelError, ModelComponents,
    ModelConfig, OutputInterval, ParameterProvider, ParameterSet, SimulationObject,
    WATER_BALANCE_TOLERANCE, check_balance,
};
use furrow_kiosk::{FieldSpec, RateVars, StateVars, VariableKiosk};
use furrow_types::{FinishType, Signal, SignalKind, SubscriberId, Value};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

const SOIL_STATES: &[FieldSpec] = &[FieldSpec::float("SM"), FieldSpec::float("TOTIRR")];
const SOIL_RATES: &[FieldSpec] = &[FieldSpec::float("RIRR")];
const CROP_STATES: &[FieldSpec] = &[FieldSpec::float("DVS")];
const CROP_RATES: &[FieldSpec] = &[FieldSpec::float("DVR")];

/// Water bucket that only gains water from irrigation.
#[derive(Debug)]
struct Bucket {
    id: SubscriberId,
    states: StateVars,
    rates: RateVars,
    sm_init: f64,
    pending: f64,
}

impl SimulationObject for Bucket {
    fn name(&self) -> &str {
        "bucket"
    }

    fn subscriber(&self) -> SubscriberId {
        self.id
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::Irrigate]
    }

    fn calc_rates(
        &mut self,
        _day: NaiveDate,
        _drv: &DrivingVariables,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let rirr = self.pending;
        self.pending = 0.0;
        self.rates.update(ctx.kiosk, |w| w.set("RIRR", rirr))?;
        Ok(())
    }

    fn integrate(
        &mut self,
        _day: NaiveDate,
        delt: f64,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let rirr = self.rates.get_f64("RIRR")? * delt;
        let sm = self.states.get_f64("SM")?;
        let total = self.states.get_f64("TOTIRR")?;
        self.states.update(ctx.kiosk, |w| {
            w.set("SM", sm + rirr)?;
            w.set("TOTIRR", total + rirr)
        })?;
        Ok(())
    }

    fn on_finalize(&mut self, day: NaiveDate, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        let balance = Balance {
            kind: BalanceKind::Water,
            component: "bucket",
            inputs: self.states.get_f64("TOTIRR")?,
            outputs: 0.0,
            storage_change: self.states.get_f64("SM")? - self.sm_init,
        };
        check_balance(&balance, day, WATER_BALANCE_TOLERANCE)?;
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        if let Signal::Irrigate { amount, efficiency } = signal {
            self.pending += amount * efficiency;
        }
        Ok(())
    }

    fn override_variable(
        &mut self,
        name: &str,
        value: f64,
        kiosk: &mut VariableKiosk,
    ) -> Result<Option<Increments>, KernelError> {
        if name != "SM" {
            return Ok(None);
        }
        let old = self.states.get_f64("SM")?;
        self.states.update(kiosk, |w| w.set("SM", value))?;
        // keep the balance closed
        self.sm_init += value - old;
        Ok(Some(Increments::from([("SM".to_owned(), value - old)])))
    }

    fn states(&self) -> Option<&StateVars> {
        Some(&self.states)
    }

    fn states_mut(&mut self) -> Option<&mut StateVars> {
        Some(&mut self.states)
    }

    fn rates(&self) -> Option<&RateVars> {
        Some(&self.rates)
    }

    fn rates_mut(&mut self) -> Option<&mut RateVars> {
        Some(&mut self.rates)
    }

    fn into_parts(self: Box<Self>) -> ComponentParts {
        ComponentParts {
            states: Some(self.states),
            rates: Some(self.rates),
            children: Vec::new(),
        }
    }
}

struct BucketFactory;

impl ComponentFactory for BucketFactory {
    fn name(&self) -> &str {
        "bucket"
    }

    fn build(
        &self,
        _day: NaiveDate,
        kiosk: &mut VariableKiosk,
        params: &ParameterProvider,
    ) -> Result<Box<dyn SimulationObject>, KernelError> {
        let sm_init = params.get_f64("SMINIT")?;
        let states = StateVars::builder(SOIL_STATES)
            .value("SM", sm_init)
            .value("TOTIRR", 0.0)
            .publish("SM")
            .build(kiosk)?;
        let rates = RateVars::new(kiosk, SOIL_RATES, &[])?;
        Ok(Box::new(Bucket {
            id: SubscriberId::new(),
            states,
            rates,
            sm_init,
            pending: 0.0,
        }))
    }
}

/// Crop whose development rate is proportional to temperature.
#[derive(Debug)]
struct Linear {
    id: SubscriberId,
    states: StateVars,
    rates: RateVars,
    rate: f64,
    matured: bool,
}

impl SimulationObject for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn subscriber(&self) -> SubscriberId {
        self.id
    }

    fn calc_rates(
        &mut self,
        _day: NaiveDate,
        drv: &DrivingVariables,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let dvr = self.rate * drv.require("TEMP")?;
        self.rates.update(ctx.kiosk, |w| w.set("DVR", dvr))?;
        Ok(())
    }

    fn integrate(
        &mut self,
        day: NaiveDate,
        delt: f64,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let dvs = self.states.get_f64("DVS")? + self.rates.get_f64("DVR")? * delt;
        self.states.update(ctx.kiosk, |w| w.set("DVS", dvs))?;
        if dvs >= 1.0 && !self.matured {
            self.matured = true;
            ctx.bus.send(Signal::CropFinish {
                day,
                finish_type: FinishType::Maturity,
                crop_delete: true,
            });
        }
        Ok(())
    }

    fn states(&self) -> Option<&StateVars> {
        Some(&self.states)
    }

    fn states_mut(&mut self) -> Option<&mut StateVars> {
        Some(&mut self.states)
    }

    fn rates(&self) -> Option<&RateVars> {
        Some(&self.rates)
    }

    fn rates_mut(&mut self) -> Option<&mut RateVars> {
        Some(&mut self.rates)
    }

    fn into_parts(self: Box<Self>) -> ComponentParts {
        ComponentParts {
            states: Some(self.states),
            rates: Some(self.rates),
            children: Vec::new(),
        }
    }
}

struct LinearFactory;

impl ComponentFactory for LinearFactory {
    fn name(&self) -> &str {
        "linear"
    }

    fn build(
        &self,
        _day: NaiveDate,
        kiosk: &mut VariableKiosk,
        params: &ParameterProvider,
    ) -> Result<Box<dyn SimulationObject>, KernelError> {
        let rate = params.get_f64("RATE")?;
        let states = StateVars::builder(CROP_STATES)
            .value("DVS", 0.0)
            .publish("DVS")
            .build(kiosk)?;
        let rates = RateVars::new(kiosk, CROP_RATES, &[])?;
        Ok(Box::new(Linear {
            id: SubscriberId::new(),
            states,
            rates,
            rate,
            matured: false,
        }))
    }
}

const HARVEST_SEASON: &str = r"
- 2000-01-01:
    CropCalendar:
        crop_name: wheat
        variety_name: winter-wheat
        crop_start_date: 2000-03-01
        crop_start_type: sowing
        crop_end_date: 2000-06-01
        crop_end_type: harvest
        max_duration: 200
    TimedEvents:
    -   event_signal: irrigate
        name: Spring irrigation
        events_table:
        - 2000-04-01: {amount: 2.0, efficiency: 0.5}
    StateEvents:
";

const MATURITY_SEASON: &str = r"
- 2000-01-01:
    CropCalendar:
        crop_name: wheat
        variety_name: winter-wheat
        crop_start_date: 2000-03-01
        crop_start_type: sowing
        crop_end_type: maturity
        max_duration: 100
    TimedEvents:
    StateEvents:
";

/// TMIN 5 and TMAX 15 every day of 2000, so TEMP is 10.
fn weather_until(last: NaiveDate) -> InMemoryWeather {
    let mut weather = InMemoryWeather::default();
    for day in d(2000, 1, 1).iter_days().take_while(|day| *day <= last) {
        weather.insert(
            day,
            [("TMIN".to_owned(), 5.0), ("TMAX".to_owned(), 15.0)]
                .into_iter()
                .collect(),
        );
    }
    weather
}

fn params(rate: f64) -> ParameterProvider {
    let soil: ParameterSet = [("SMINIT".to_owned(), Value::Float(0.5))].into_iter().collect();
    let crop: ParameterSet = [("RATE".to_owned(), Value::Float(rate))].into_iter().collect();
    ParameterProvider::new(
        ParameterSet::new(),
        ParameterSet::new(),
        soil,
        CropData::Single(crop),
    )
    .unwrap()
}

fn config() -> ModelConfig {
    ModelConfig {
        output_vars: vec!["DVS".to_owned(), "SM".to_owned()],
        summary_output_vars: vec!["DVS".to_owned()],
        terminal_output_vars: vec!["SM".to_owned(), "DVS".to_owned()],
        output_interval: OutputInterval::Monthly,
        ..ModelConfig::default()
    }
}

fn build(agro: &str, config: ModelConfig, rate: f64) -> Result<Engine, KernelError> {
    Engine::new(
        params(rate),
        Box::new(weather_until(d(2000, 12, 31))),
        AgroManagementDef::parse(agro).unwrap(),
        config,
        ModelComponents {
            crop: Box::new(LinearFactory),
            soil: Box::new(BucketFactory),
        },
    )
}

fn days_of(engine: &Engine, kind: SignalKind) -> Vec<NaiveDate> {
    engine
        .signal_log()
        .iter()
        .filter(|record| record.signal.kind() == kind)
        .map(|record| record.day)
        .collect()
}

fn approx(value: Option<&Option<Value>>, expected: f64) -> bool {
    value
        .and_then(Option::as_ref)
        .and_then(Value::as_f64)
        .is_some_and(|v| (v - expected).abs() < 1e-9)
}

#[test]
fn harvest_ends_single_season_run() {
    let mut engine = build(HARVEST_SEASON, config(), 0.001).unwrap();
    assert_eq!(engine.phase(), EnginePhase::Running);
    assert_eq!(engine.day(), d(2000, 1, 1));

    engine.run_till_terminate().unwrap();

    assert!(engine.is_terminated());
    assert_eq!(engine.day(), d(2000, 6, 1));
    assert!(!engine.crop_mounted());
    assert_eq!(days_of(&engine, SignalKind::CropStart), vec![d(2000, 3, 1)]);
    assert_eq!(days_of(&engine, SignalKind::Irrigate), vec![d(2000, 4, 1)]);

    let finishes: Vec<&Signal> = engine
        .signal_log()
        .iter()
        .filter(|r| r.signal.kind() == SignalKind::CropFinish)
        .map(|r| &r.signal)
        .collect();
    assert_eq!(
        finishes,
        vec![&Signal::CropFinish {
            day: d(2000, 6, 1),
            finish_type: FinishType::Harvest,
            crop_delete: true,
        }]
    );
    let terminates = days_of(&engine, SignalKind::Terminate);
    assert!(!terminates.is_empty());
    assert!(terminates.iter().all(|day| *day == d(2000, 6, 1)));

    // 92 integrations of DVR = 0.01 between sowing and harvest
    let summary = engine.get_summary_output();
    assert_eq!(summary.len(), 1);
    assert!(approx(summary[0].get("DVS"), 0.92));

    // the crop is gone at termination, the soil kept the irrigation
    let terminal = engine.get_terminal_output();
    assert_eq!(terminal.get("SM"), Some(&Some(Value::Float(1.5))));
    assert_eq!(terminal.get("DVS"), Some(&None));
}

#[test]
fn monthly_output_snapshots() {
    let mut engine = build(HARVEST_SEASON, config(), 0.001).unwrap();
    engine.run_till_terminate().unwrap();

    let output = engine.get_output();
    let days: Vec<NaiveDate> = output.iter().map(|r| r.day).collect();
    assert_eq!(
        days,
        vec![
            d(2000, 1, 31),
            d(2000, 2, 29),
            d(2000, 3, 31),
            d(2000, 4, 30),
            d(2000, 5, 31)
        ]
    );
    assert_eq!(output[0].values.get("DVS"), Some(&None));
    assert_eq!(output[0].values.get("SM"), Some(&Some(Value::Float(0.5))));
    assert!(approx(output[2].values.get("DVS"), 0.30));
    assert_eq!(output[3].values.get("SM"), Some(&Some(Value::Float(1.5))));
}

#[test]
fn maturity_finishes_crop_and_run() {
    // DVR = 0.625: DVS passes 1.0 on the second integration
    let mut engine = build(MATURITY_SEASON, config(), 0.0625).unwrap();
    engine.run_till_terminate().unwrap();

    assert_eq!(engine.day(), d(2000, 3, 3));
    let finish = engine
        .signal_log()
        .iter()
        .find(|r| r.signal.kind() == SignalKind::CropFinish)
        .map(|r| r.signal.clone())
        .unwrap();
    assert_eq!(
        finish,
        Signal::CropFinish {
            day: d(2000, 3, 3),
            finish_type: FinishType::Maturity,
            crop_delete: true,
        }
    );
    assert_eq!(
        engine.get_summary_output()[0].get("DVS"),
        Some(&Some(Value::Float(1.25)))
    );
    assert_eq!(days_of(&engine, SignalKind::Terminate), vec![d(2000, 3, 3)]);
}

#[test]
fn crop_start_while_crop_mounted_aborts() {
    let agro = r"
- 2000-01-01:
    CropCalendar:
        crop_name: wheat
        variety_name: winter-wheat
        crop_start_date: 2000-03-01
        crop_start_type: sowing
        crop_end_type: maturity
        max_duration: 300
    TimedEvents:
    StateEvents:
- 2000-06-01:
    CropCalendar:
        crop_name: maize
        variety_name: grain-maize
        crop_start_date: 2000-06-15
        crop_start_type: sowing
        crop_end_date: 2000-09-01
        crop_end_type: harvest
        max_duration: 120
    TimedEvents:
    StateEvents:
";
    let mut engine = build(agro, config(), 0.0001).unwrap();
    let err = engine.run_till_terminate().unwrap_err();
    assert!(matches!(
        err,
        KernelError::CropAlreadyMounted { day } if day == d(2000, 6, 15)
    ));
}

#[test]
fn variable_lookup_and_override() {
    let mut engine = build(HARVEST_SEASON, config(), 0.001).unwrap();

    // upper-case fallback
    assert_eq!(engine.get_variable("sm"), Some(Value::Float(0.5)));
    // registered but unpublished: found in the soil's rates
    assert_eq!(engine.get_variable("RIRR"), Some(Value::Float(0.0)));
    assert_eq!(engine.get_variable("DVS"), None);
    assert_eq!(engine.get_variable("LAI"), None);

    let increments = engine.set_variable("SM", 0.8).unwrap();
    assert!((increments["SM"] - 0.3).abs() < 1e-12);
    assert_eq!(engine.get_variable("SM"), Some(Value::Float(0.8)));
    assert!(engine.set_variable("WTOT", 1.0).unwrap().is_empty());

    // the balance still closes at termination
    engine.run_till_terminate().unwrap();
}

#[test]
fn run_helpers_stop_where_asked() {
    let mut engine = build(HARVEST_SEASON, config(), 0.001).unwrap();
    engine.run(10).unwrap();
    assert_eq!(engine.day(), d(2000, 1, 11));

    engine.run_till(d(2000, 2, 1)).unwrap();
    assert_eq!(engine.day(), d(2000, 2, 1));

    // not after the current day: nothing happens
    engine.run_till(d(2000, 1, 15)).unwrap();
    assert_eq!(engine.day(), d(2000, 2, 1));

    engine.run(1000).unwrap();
    assert_eq!(engine.day(), d(2000, 6, 1));
    engine.run(5).unwrap();
    assert_eq!(engine.day(), d(2000, 6, 1));
}

#[test]
fn overrides_are_cleared_when_crop_finishes() {
    let mut engine = build(HARVEST_SEASON, config(), 0.001).unwrap();
    engine
        .params_mut()
        .set("SMINIT", Value::Float(0.9))
        .unwrap();
    assert_eq!(engine.params().override_count(), 1);
    engine.run_till_terminate().unwrap();
    assert_eq!(engine.params().override_count(), 0);
    assert_eq!(
        engine.params().get("CROP_END_TYPE"),
        Some(&Value::from("harvest"))
    );
}

#[test]
fn concurrent_runs_do_not_cross_talk() {
    let dry = r"
- 2000-01-01:
    CropCalendar:
        crop_name: wheat
        variety_name: winter-wheat
        crop_start_date: 2000-03-01
        crop_start_type: sowing
        crop_end_date: 2000-06-01
        crop_end_type: harvest
        max_duration: 200
    TimedEvents:
    StateEvents:
";
    let mut wet = build(HARVEST_SEASON, config(), 0.001).unwrap();
    let mut dry = build(dry, config(), 0.001).unwrap();
    while !wet.is_terminated() || !dry.is_terminated() {
        wet.run(1).unwrap();
        dry.run(1).unwrap();
    }
    assert_eq!(wet.get_terminal_output()["SM"], Some(Value::Float(1.5)));
    assert_eq!(dry.get_terminal_output()["SM"], Some(Value::Float(0.5)));
}

#[test]
fn invalid_configuration_is_rejected() {
    let config = ModelConfig {
        output_interval_days: 0,
        ..ModelConfig::default()
    };
    assert!(matches!(
        build(HARVEST_SEASON, config, 0.001).err(),
        Some(KernelError::Config { .. })
    ));
}

#[test]
fn missing_weather_aborts_the_run() {
    let mut engine = Engine::new(
        params(0.001),
        Box::new(weather_until(d(2000, 1, 31))),
        AgroManagementDef::parse(HARVEST_SEASON).unwrap(),
        config(),
        ModelComponents {
            crop: Box::new(LinearFactory),
            soil: Box::new(BucketFactory),
        },
    )
    .unwrap();
    let err = engine.run_till_terminate().unwrap_err();
    assert!(matches!(err, KernelError::Weather { .. }));
    assert_eq!(engine.day(), d(2000, 2, 1));
}

#[test]
fn pending_timed_event_defers_termination_to_end_date() {
    let agro = r"
- 2000-01-01:
    CropCalendar:
        crop_name: wheat
        variety_name: winter-wheat
        crop_start_date: 2000-03-01
        crop_start_type: sowing
        crop_end_date: 2000-06-01
        crop_end_type: harvest
        max_duration: 200
    TimedEvents:
    -   event_signal: irrigate
        name: Summer irrigation
        events_table:
        - 2000-07-01: {amount: 2.0, efficiency: 0.5}
    StateEvents:
";
    let mut engine = build(agro, config(), 0.001).unwrap();
    assert_eq!(engine.agromanager().end_date(), d(2000, 7, 1));

    engine.run_till(d(2000, 6, 15)).unwrap();
    assert!(!engine.is_terminated());
    assert!(!engine.crop_mounted());
    assert_eq!(days_of(&engine, SignalKind::CropFinish), vec![d(2000, 6, 1)]);
    assert!(days_of(&engine, SignalKind::Terminate).is_empty());

    engine.run_till_terminate().unwrap();
    assert_eq!(engine.day(), d(2000, 7, 1));
    assert_eq!(days_of(&engine, SignalKind::Irrigate), vec![d(2000, 7, 1)]);
    let terminates = days_of(&engine, SignalKind::Terminate);
    assert!(!terminates.is_empty());
    assert!(terminates.iter().all(|day| *day == d(2000, 7, 1)));

    // the irrigation reached the rates of the last day, not the states
    assert_eq!(engine.get_variable("RIRR"), Some(Value::Float(1.0)));
    assert_eq!(
        engine.get_terminal_output().get("SM"),
        Some(&Some(Value::Float(0.5)))
    );
    assert_eq!(engine.get_summary_output().len(), 1);
}

#[test]
fn mounted_states_are_republished() {
    let engine = build(HARVEST_SEASON, config(), 0.001).unwrap();
    // the initial SM value, then the re-publish on mount
    assert_eq!(engine.kiosk().write_count(), 2);
    assert_eq!(engine.kiosk().get_f64("SM"), Some(0.5));
}

#[test]
fn hold_mode_keeps_states_after_crop_finish() {
    let config = ModelConfig {
        engine_mode: EngineMode::Hold,
        output_interval: OutputInterval::Daily,
        ..config()
    };
    let mut engine = build(MATURITY_SEASON, config, 0.0625).unwrap();

    assert!(matches!(
        engine.run(1).unwrap_err(),
        KernelError::UnsupportedInHoldMode { operation: "run" }
    ));
    assert!(matches!(
        engine.run_till_terminate().unwrap_err(),
        KernelError::UnsupportedInHoldMode {
            operation: "run_till_terminate"
        }
    ));
    assert_eq!(engine.day(), d(2000, 1, 1));

    engine.run_till(d(2000, 3, 10)).unwrap();
    assert_eq!(engine.day(), d(2000, 3, 10));
    assert!(!engine.is_terminated());
    assert!(engine.crop_mounted());
    assert_eq!(days_of(&engine, SignalKind::CropFinish), vec![d(2000, 3, 3)]);

    // finalized once, on the day after crop_finish
    let summary = engine.get_summary_output();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].get("DVS"), Some(&Some(Value::Float(1.25))));

    // daily output keeps coming with the final DVS
    let output = engine.get_output();
    let last = output.last().unwrap();
    assert_eq!(last.day, d(2000, 3, 10));
    assert_eq!(last.values.get("DVS"), Some(&Some(Value::Float(1.25))));
    let held: Vec<&Option<Value>> = output
        .iter()
        .filter(|r| r.day >= d(2000, 3, 3))
        .map(|r| &r.values["DVS"])
        .collect();
    assert_eq!(held.len(), 8);
    assert!(held.iter().all(|v| **v == Some(Value::Float(1.25))));
}
