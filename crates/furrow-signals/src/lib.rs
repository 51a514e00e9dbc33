//! Signal delivery for one simulation run.
//!
//! # Modules
//!
//! - [`bus`] -- Kiosk-scoped publish/subscribe queue pumped by the engine
//! - [`payload`] -- Typed signals built from event parameter tables
//! - [`error`] -- [`SignalError`]

pub mod bus;
pub mod error;
pub mod payload;

pub use bus::{Delivery, SignalBus};
pub use error::SignalError;
pub use payload::{DEFAULT_IRRIGATION_EFFICIENCY, build_signal};
