//! Reference crop and soil components for the Furrow simulation kernel.
//!
//! - [`soil::BucketSoil`] -- single-layer water balance, mounted for the
//!   whole run.
//! - [`crop::ThermalTimeCrop`] -- temperature-sum crop with a nested
//!   [`crop::Phenology`] sub-component, mounted per crop cycle.
//!
//! Both come with a [`ComponentFactory`](furrow_core::ComponentFactory) to
//! hand to the engine.

pub mod afgen;
pub mod crop;
pub mod soil;

pub use afgen::{Afgen, AfgenError};
pub use crop::{ThermalTimeCrop, ThermalTimeCropFactory};
pub use soil::{BucketSoil, BucketSoilFactory};
