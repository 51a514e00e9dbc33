//! The day loop.
//!
//! The [`Engine`] owns the kiosk, the signal bus, the agromanager, the timer
//! and the mounted components. Each simulated day runs these phases in
//! order:
//!
//! 1. **Clock** -- advance the timer one day; it may request output or
//!    termination.
//! 2. **Integrate** -- flush published states, integrate crop then soil,
//!    zero the rates, flush published rates.
//! 3. **Drive** -- fetch the day's driving variables.
//! 4. **Manage** -- switch campaigns, run the crop calendar, then timed
//!    events, then state events.
//! 5. **Rates** -- calculate crop then soil rates; save output when
//!    requested; finish the crop when it ended.
//! 6. **Terminate** -- when requested, finalize the soil and save the
//!    terminal output.
//!
//! Signals sent during a phase are delivered before the next phase starts.
//! Any error aborts the run; the engine never retries.
//!
//! In [`EngineMode::Hold`] the first day after `crop_finish` finalizes crop
//! and soil instead; from then on only the clock and the output snapshots
//! run, so every state keeps its final value until the caller stops
//! stepping.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use furrow_agro::{AGROMANAGER_SIGNALS, AgroManagementDef, AgroManager};
use furrow_kiosk::VariableKiosk;
use furrow_signals::SignalBus;
use furrow_types::{CropEndType, CropStartType, Signal, SignalKind, SubscriberId, Value};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::component::{self, ComponentFactory, Context, Increments, SimulationObject};
use crate::config::{EngineMode, ModelConfig};
use crate::error::KernelError;
use crate::params::ParameterProvider;
use crate::timer::Timer;
use crate::weather::{DrivingVariables, WeatherDataProvider, driving_variables};

/// Signals handled by the engine itself.
const ENGINE_SIGNALS: &[SignalKind] = &[
    SignalKind::CropStart,
    SignalKind::CropFinish,
    SignalKind::Output,
    SignalKind::SummaryOutput,
    SignalKind::Terminate,
];

/// Lifecycle phase of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    /// The first day is being set up.
    Initializing,
    /// Days can be stepped.
    Running,
    /// `terminate` was handled; stepping is a no-op.
    Terminated,
}

/// Variable values saved on one output day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Day of the snapshot.
    pub day: NaiveDate,
    /// Variable name to value; `None` when the variable is unknown.
    pub values: BTreeMap<String, Option<Value>>,
}

/// A signal delivered during the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    /// Day of the delivery.
    pub day: NaiveDate,
    /// The delivered signal.
    pub signal: Signal,
}

/// Factories of the components the engine mounts.
pub struct ModelComponents {
    /// Builds the crop on every `crop_start`.
    pub crop: Box<dyn ComponentFactory>,
    /// Builds the soil once, at initialization.
    pub soil: Box<dyn ComponentFactory>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    output: bool,
    summary_output: bool,
    /// Set by `crop_finish`; holds its `crop_delete`.
    crop_finish: Option<bool>,
    terminate: bool,
}

/// Crop cycle progress in [`EngineMode::Hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Season {
    Growing,
    /// `crop_finish` arrived; the next step finalizes.
    Finishing,
    Held,
}

/// The simulation engine for one run.
pub struct Engine {
    phase: EnginePhase,
    config: ModelConfig,
    params: ParameterProvider,
    weather: Box<dyn WeatherDataProvider>,
    crop_factory: Box<dyn ComponentFactory>,
    kiosk: VariableKiosk,
    bus: SignalBus,
    subscriber: SubscriberId,
    agro: AgroManager,
    timer: Timer,
    day: NaiveDate,
    drv: DrivingVariables,
    crop: Option<Box<dyn SimulationObject>>,
    soil: Option<Box<dyn SimulationObject>>,
    flags: Flags,
    season: Season,
    output: Vec<OutputRecord>,
    summary_output: Vec<BTreeMap<String, Option<Value>>>,
    terminal_output: BTreeMap<String, Option<Value>>,
    signal_log: Vec<SignalRecord>,
}

impl Engine {
    /// Set up a run and compute the rates of the first day.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] for invalid agromanagement or configuration,
    /// missing weather on the first day, and component build failures.
    pub fn new(
        params: ParameterProvider,
        weather: Box<dyn WeatherDataProvider>,
        agromanagement: AgroManagementDef,
        config: ModelConfig,
        components: ModelComponents,
    ) -> Result<Self, KernelError> {
        config.validate()?;

        let mut kiosk = VariableKiosk::new();
        let mut bus = SignalBus::for_kiosk(kiosk.id());
        let subscriber = SubscriberId::new();
        bus.connect_all(kiosk.id(), subscriber, ENGINE_SIGNALS)?;

        let agro = AgroManager::new(agromanagement)?;
        bus.connect_all(kiosk.id(), agro.subscriber(), AGROMANAGER_SIGNALS)?;

        let mut timer = Timer::new(agro.start_date(), agro.end_date(), &config)?;
        let (day, _) = timer.tick(&mut bus)?;
        let drv = driving_variables(weather.as_ref(), day)?;

        let mut soil = components.soil.build(day, &mut kiosk, &params)?;
        component::touch(soil.as_mut(), &mut kiosk)?;
        component::connect(soil.as_ref(), kiosk.id(), &mut bus)?;

        let mut engine = Self {
            phase: EnginePhase::Initializing,
            config,
            params,
            weather,
            crop_factory: components.crop,
            kiosk,
            bus,
            subscriber,
            agro,
            timer,
            day,
            drv,
            crop: None,
            soil: Some(soil),
            flags: Flags::default(),
            season: Season::Growing,
            output: Vec::new(),
            summary_output: Vec::new(),
            terminal_output: BTreeMap::new(),
            signal_log: Vec::new(),
        };

        info!(
            start_date = %engine.timer.start_date(),
            end_date = %engine.timer.end_date(),
            crop = engine.crop_factory.name(),
            soil = engine.soil.as_deref().map_or("none", SimulationObject::name),
            "Engine initialized"
        );

        engine.pump()?;
        engine.run_agromanager(day)?;
        engine.calc_rates(day)?;
        engine.phase = EnginePhase::Running;
        if engine.flags.terminate {
            engine.terminate_simulation(day)?;
        }
        Ok(engine)
    }

    /// Advance the run by one day.
    fn step(&mut self) -> Result<(), KernelError> {
        let (day, delt) = self.timer.tick(&mut self.bus)?;
        self.day = day;
        self.pump()?;

        match self.season {
            Season::Growing => {
                self.integrate(day, delt)?;
                self.drv = driving_variables(self.weather.as_ref(), day)?;
                self.run_agromanager(day)?;
                self.calc_rates(day)?;
            }
            Season::Finishing => self.hold_crop(day)?,
            Season::Held => {
                if self.flags.output {
                    self.save_output(day);
                }
            }
        }

        if self.flags.terminate {
            self.terminate_simulation(day)?;
        }
        Ok(())
    }

    /// Step up to `days` days, stopping early at termination.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnsupportedInHoldMode`] in
    /// [`EngineMode::Hold`], otherwise the first error raised during a step.
    pub fn run(&mut self, days: u32) -> Result<(), KernelError> {
        self.reject_in_hold_mode("run")?;
        for _ in 0..days {
            if self.is_terminated() {
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    /// Step until the run terminates.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnsupportedInHoldMode`] in
    /// [`EngineMode::Hold`], otherwise the first error raised during a step.
    pub fn run_till_terminate(&mut self) -> Result<(), KernelError> {
        self.reject_in_hold_mode("run_till_terminate")?;
        while !self.is_terminated() {
            self.step()?;
        }
        Ok(())
    }

    /// Step until `day` is reached or the run terminates.
    ///
    /// A `day` that is not after the current day is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns the first error raised during a step.
    pub fn run_till(&mut self, day: NaiveDate) -> Result<(), KernelError> {
        if day <= self.day {
            warn!(
                requested = %day,
                current = %self.day,
                "run_till date is not after the current model date"
            );
            return Ok(());
        }
        while !self.is_terminated() && self.day < day {
            self.step()?;
        }
        Ok(())
    }

    fn reject_in_hold_mode(&self, operation: &'static str) -> Result<(), KernelError> {
        if self.config.engine_mode == EngineMode::Hold {
            return Err(KernelError::UnsupportedInHoldMode { operation });
        }
        Ok(())
    }

    fn integrate(&mut self, day: NaiveDate, delt: f64) -> Result<(), KernelError> {
        self.kiosk.flush_states();

        let mut ctx = Context {
            kiosk: &mut self.kiosk,
            bus: &mut self.bus,
        };
        for obj in [self.crop.as_mut(), self.soil.as_mut()].into_iter().flatten() {
            obj.integrate(day, delt, &mut ctx)?;
        }
        if self.config.zerofy {
            for obj in [self.crop.as_mut(), self.soil.as_mut()].into_iter().flatten() {
                component::zerofy(obj.as_mut());
            }
        }

        self.kiosk.flush_rates();
        self.pump()
    }

    fn run_agromanager(&mut self, day: NaiveDate) -> Result<(), KernelError> {
        self.agro.advance_campaign(day);
        self.agro.run_crop_calendar(day, &mut self.bus);
        self.pump()?;
        self.agro.run_timed_events(day, &mut self.bus);
        self.pump()?;
        self.agro.run_state_events(day, &self.kiosk, &mut self.bus)?;
        self.pump()
    }

    fn calc_rates(&mut self, day: NaiveDate) -> Result<(), KernelError> {
        if let Some(crop) = self.crop.as_mut() {
            let mut ctx = Context {
                kiosk: &mut self.kiosk,
                bus: &mut self.bus,
            };
            crop.calc_rates(day, &self.drv, &mut ctx)?;
            self.pump()?;
        }
        if let Some(soil) = self.soil.as_mut() {
            let mut ctx = Context {
                kiosk: &mut self.kiosk,
                bus: &mut self.bus,
            };
            soil.calc_rates(day, &self.drv, &mut ctx)?;
            self.pump()?;
        }

        if self.flags.output {
            self.save_output(day);
        }
        if self.flags.summary_output {
            self.flags.summary_output = false;
            self.save_summary_output();
        }
        if let Some(crop_delete) = self.flags.crop_finish.take() {
            self.finish_crop(day, crop_delete)?;
        }
        Ok(())
    }

    /// Deliver every queued signal.
    fn pump(&mut self) -> Result<(), KernelError> {
        while let Some(delivery) = self.bus.next_delivery() {
            self.signal_log.push(SignalRecord {
                day: self.day,
                signal: delivery.signal.clone(),
            });
            if delivery.recipients.contains(&self.agro.subscriber()) {
                self.agro.on_signal(&delivery.signal, &mut self.bus);
            }
            if delivery.recipients.contains(&self.subscriber) {
                self.handle_signal(&delivery.signal)?;
            }
            let mut ctx = Context {
                kiosk: &mut self.kiosk,
                bus: &mut self.bus,
            };
            for obj in [self.crop.as_mut(), self.soil.as_mut()].into_iter().flatten() {
                component::deliver(obj.as_mut(), &delivery, &mut ctx)?;
            }
        }
        Ok(())
    }

    fn handle_signal(&mut self, signal: &Signal) -> Result<(), KernelError> {
        match signal {
            Signal::CropStart {
                day,
                crop_name,
                variety_name,
                crop_start_type,
                crop_end_type,
            } => self.start_crop(*day, crop_name, variety_name, *crop_start_type, *crop_end_type)?,
            Signal::CropFinish { crop_delete, .. } => match self.config.engine_mode {
                EngineMode::Standard => self.flags.crop_finish = Some(*crop_delete),
                EngineMode::Hold => {
                    if self.season == Season::Growing {
                        self.season = Season::Finishing;
                    }
                }
            },
            Signal::Output => self.flags.output = true,
            Signal::SummaryOutput => self.flags.summary_output = true,
            Signal::Terminate => match self.config.engine_mode {
                EngineMode::Standard => self.flags.terminate = true,
                EngineMode::Hold => debug!(day = %self.day, "terminate ignored in hold mode"),
            },
            Signal::ApplyN { .. }
            | Signal::ApplyNSnomin(_)
            | Signal::Irrigate { .. }
            | Signal::Mowing { .. } => {}
        }
        Ok(())
    }

    fn start_crop(
        &mut self,
        day: NaiveDate,
        crop_name: &str,
        variety_name: &str,
        crop_start_type: CropStartType,
        crop_end_type: CropEndType,
    ) -> Result<(), KernelError> {
        if self.crop.is_some() {
            return Err(KernelError::CropAlreadyMounted { day });
        }
        self.params
            .set_active_crop(crop_name, variety_name, crop_start_type, crop_end_type)?;
        let mut crop = self.crop_factory.build(day, &mut self.kiosk, &self.params)?;
        component::touch(crop.as_mut(), &mut self.kiosk)?;
        component::connect(crop.as_ref(), self.kiosk.id(), &mut self.bus)?;
        info!(
            %day,
            crop = crop_name,
            variety = variety_name,
            component = crop.name(),
            "Crop mounted"
        );
        self.crop = Some(crop);
        Ok(())
    }

    fn finish_crop(&mut self, day: NaiveDate, crop_delete: bool) -> Result<(), KernelError> {
        if let Some(crop) = self.crop.as_mut() {
            let mut ctx = Context {
                kiosk: &mut self.kiosk,
                bus: &mut self.bus,
            };
            component::finalize(crop.as_mut(), day, &mut ctx)?;
        }
        self.pump()?;
        self.save_summary_output();
        self.params.clear_override(None)?;

        if !crop_delete {
            return Ok(());
        }
        if let Some(crop) = self.crop.take() {
            let name = crop.name().to_owned();
            component::release(crop, &mut self.kiosk, &mut self.bus)?;
            info!(%day, component = %name, "Crop unmounted");
        }
        Ok(())
    }

    /// Finalize crop and soil once; their states are not touched again.
    fn hold_crop(&mut self, day: NaiveDate) -> Result<(), KernelError> {
        let mut ctx = Context {
            kiosk: &mut self.kiosk,
            bus: &mut self.bus,
        };
        for obj in [self.crop.as_mut(), self.soil.as_mut()].into_iter().flatten() {
            component::finalize(obj.as_mut(), day, &mut ctx)?;
        }
        self.pump()?;
        self.save_summary_output();
        self.season = Season::Held;
        info!(%day, "Crop finished, states held");
        if self.flags.output {
            self.save_output(day);
        }
        Ok(())
    }

    fn terminate_simulation(&mut self, day: NaiveDate) -> Result<(), KernelError> {
        if let Some(soil) = self.soil.as_mut() {
            let mut ctx = Context {
                kiosk: &mut self.kiosk,
                bus: &mut self.bus,
            };
            component::finalize(soil.as_mut(), day, &mut ctx)?;
        }
        self.save_terminal_output();
        self.phase = EnginePhase::Terminated;
        info!(%day, outputs = self.output.len(), "Simulation terminated");
        Ok(())
    }

    fn snapshot(&self, names: &[String]) -> BTreeMap<String, Option<Value>> {
        names
            .iter()
            .map(|name| (name.clone(), self.get_variable(name)))
            .collect()
    }

    fn save_output(&mut self, day: NaiveDate) {
        self.flags.output = false;
        let values = self.snapshot(&self.config.output_vars);
        debug!(%day, variables = values.len(), "Output saved");
        self.output.push(OutputRecord { day, values });
    }

    fn save_summary_output(&mut self) {
        let values = self.snapshot(&self.config.summary_output_vars);
        self.summary_output.push(values);
    }

    fn save_terminal_output(&mut self) {
        let values = self.snapshot(&self.config.terminal_output_vars);
        self.terminal_output.extend(values);
    }

    /// Value of a state or rate variable.
    ///
    /// `name` is tried as given, then in upper case. The variable must be
    /// registered in the kiosk; its published value is returned when
    /// present, otherwise the mounted components are searched.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        let name = if self.kiosk.exists(name) {
            name.to_owned()
        } else {
            let upper = name.to_uppercase();
            if !self.kiosk.exists(&upper) {
                return None;
            }
            upper
        };

        if let Some(value) = self.kiosk.get(&name) {
            return Some(value.clone());
        }
        [self.crop.as_deref(), self.soil.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|obj| component::get_variable(obj, &name))
    }

    /// Force a variable to `value` through the mutators of the soil, then
    /// the crop.
    ///
    /// Returns the merged increments; empty when no component has a
    /// mutator for `name`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a mutator.
    pub fn set_variable(&mut self, name: &str, value: f64) -> Result<Increments, KernelError> {
        let mut increments = Increments::new();
        for obj in [self.soil.as_mut(), self.crop.as_mut()].into_iter().flatten() {
            component::set_variable(obj.as_mut(), name, value, &mut self.kiosk, &mut increments)?;
        }
        Ok(increments)
    }

    /// Records saved on every `output` signal, in day order.
    pub fn get_output(&self) -> &[OutputRecord] {
        &self.output
    }

    /// Records saved whenever a crop finished.
    pub fn get_summary_output(&self) -> &[BTreeMap<String, Option<Value>>] {
        &self.summary_output
    }

    /// Values saved at termination.
    pub const fn get_terminal_output(&self) -> &BTreeMap<String, Option<Value>> {
        &self.terminal_output
    }

    /// Every signal delivered so far.
    pub fn signal_log(&self) -> &[SignalRecord] {
        &self.signal_log
    }

    /// Current simulated day.
    pub const fn day(&self) -> NaiveDate {
        self.day
    }

    /// Today's driving variables.
    pub const fn driving_variables(&self) -> &DrivingVariables {
        &self.drv
    }

    /// Lifecycle phase.
    pub const fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Whether `terminate` has been handled.
    pub fn is_terminated(&self) -> bool {
        self.phase == EnginePhase::Terminated
    }

    /// Whether a crop is mounted.
    pub const fn crop_mounted(&self) -> bool {
        self.crop.is_some()
    }

    /// The kiosk of the run.
    pub const fn kiosk(&self) -> &VariableKiosk {
        &self.kiosk
    }

    /// The parameter provider.
    pub const fn params(&self) -> &ParameterProvider {
        &self.params
    }

    /// Mutable parameter provider, for overrides between steps.
    pub const fn params_mut(&mut self) -> &mut ParameterProvider {
        &mut self.params
    }

    /// The agromanager.
    pub const fn agromanager(&self) -> &AgroManager {
        &self.agro
    }

    /// The model configuration.
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }
}
