//! The root error type of the simulation kernel.
//!
//! Every failure inside the day loop is a stop-the-run condition. Errors from
//! the kiosk, containers, signal bus, agromanagement, parameters, weather,
//! configuration, timer and balance checks are all wrapped into
//! [`KernelError`] and propagated unchanged to the caller of the engine.

use chrono::NaiveDate;
use furrow_agro::AgroError;
use furrow_kiosk::{ContainerError, KioskError};
use furrow_signals::SignalError;

use crate::balance::BalanceError;
use crate::config::ConfigError;
use crate::params::ParameterError;
use crate::timer::TimerError;
use crate::weather::WeatherError;

/// Errors that abort a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Variable registration or access violated the kiosk rules.
    #[error("kiosk error: {source}")]
    Kiosk {
        /// The underlying kiosk error.
        #[from]
        source: KioskError,
    },

    /// A state or rate container rejected an operation.
    #[error("container error: {source}")]
    Container {
        /// The underlying container error.
        #[from]
        source: ContainerError,
    },

    /// Signal wiring or payload construction failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying signal error.
        #[from]
        source: SignalError,
    },

    /// The agromanagement definition is invalid.
    #[error("agromanagement error: {source}")]
    Agro {
        /// The underlying agromanagement error.
        #[from]
        source: AgroError,
    },

    /// Parameter lookup or override failed.
    #[error("parameter error: {source}")]
    Parameter {
        /// The underlying parameter error.
        #[from]
        source: ParameterError,
    },

    /// Driving variables are unavailable.
    #[error("weather error: {source}")]
    Weather {
        /// The underlying weather error.
        #[from]
        source: WeatherError,
    },

    /// The model configuration is invalid.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// A mass balance did not close.
    #[error("balance error: {source}")]
    Balance {
        /// The underlying balance error.
        #[from]
        source: BalanceError,
    },

    /// The simulation clock failed.
    #[error("timer error: {source}")]
    Timer {
        /// The underlying timer error.
        #[from]
        source: TimerError,
    },

    /// `crop_start` arrived while a crop is still mounted.
    #[error("a crop_start signal was received on {day} while a crop is still mounted")]
    CropAlreadyMounted {
        /// Day of the rejected crop start.
        day: NaiveDate,
    },

    /// The run helper cannot drive an engine in [`EngineMode::Hold`](crate::EngineMode::Hold).
    #[error("{operation}() is not supported in hold mode, use run_till(<date>)")]
    UnsupportedInHoldMode {
        /// Name of the rejected run helper.
        operation: &'static str,
    },

    /// A component failed for a reason of its own.
    #[error("component '{component}' failed: {message}")]
    Component {
        /// Name of the failing component.
        component: String,
        /// Description of the failure.
        message: String,
    },
}
