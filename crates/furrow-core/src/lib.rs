//! Components, parameters, weather and the day loop of the Furrow
//! simulation kernel.
//!
//! This crate ties the kiosk, the signal bus and agromanagement together
//! into a runnable simulation: the [`Engine`] mounts pluggable crop and soil
//! components and steps them one day at a time.
//!
//! # Modules
//!
//! - [`component`] -- [`SimulationObject`] trait, [`ComponentFactory`] and the
//!   recursive operations over component trees.
//! - [`config`] -- [`ModelConfig`]: output variable lists, output interval
//!   and [`EngineMode`].
//! - [`params`] -- [`ParameterProvider`]: ordered parameter lookup with
//!   overrides.
//! - [`weather`] -- Driving variables and [`WeatherDataProvider`].
//! - [`timer`] -- [`Timer`]: the simulation clock.
//! - [`balance`] -- Mass balance checks.
//! - [`engine`] -- [`Engine`]: the day loop.
//! - [`error`] -- [`KernelError`], the root error of a run.

pub mod balance;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod timer;
pub mod weather;

pub use balance::{Balance, BalanceError, BalanceKind, WATER_BALANCE_TOLERANCE, check_balance};
pub use component::{ComponentFactory, ComponentParts, Context, Increments, SimulationObject};
pub use config::{ConfigError, EngineMode, ModelConfig, OutputInterval, OutputListUpdate};
pub use engine::{Engine, EnginePhase, ModelComponents, OutputRecord, SignalRecord};
pub use error::KernelError;
pub use params::{CropData, CropLibrary, ParameterError, ParameterProvider, ParameterSet};
pub use timer::{TIME_STEP_DAYS, Timer, TimerError};
pub use weather::{
    DrivingVariables, InMemoryWeather, WeatherDataProvider, WeatherError, WeatherRecord,
    driving_variables,
};
