//! Variable registration and the locked state/rate container discipline.
//!
//! Every modelled variable lives in exactly one container and is registered
//! once with the run's [`VariableKiosk`]. Published variables are readable by
//! every component through the kiosk but writable only by their owner.
//!
//! # Modules
//!
//! - [`kiosk`] -- Run-wide name registry with single-writer enforcement
//! - [`container`] -- [`StateVars`] and [`RateVars`] with construct-then-seal semantics
//! - [`error`] -- [`KioskError`] and [`ContainerError`]

pub mod container;
pub mod error;
pub mod kiosk;

pub use container::{FieldSpec, FieldWriter, PRIVATE_PREFIX, RateVars, StateVars, StatesBuilder};
pub use error::{ContainerError, KioskError};
pub use kiosk::{Registration, VariableKiosk};
